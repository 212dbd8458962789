/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Regions of interest
//!
//! ROIs are labelled channel ranges over a spectrum. They are used to
//! integrate counts and, together with known line energies or d-spacings, as
//! input to the calibration fits in [`super::calibration`].

use super::calibration::Calibration;
use super::errors::{Result, SpectrumError};
use super::Spectrum;
use crate::utils::fit_gaussian;
use log::debug;
use serde::{Deserialize, Serialize};

/// A labelled channel range of a spectrum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionOfInterest {
    /// First channel (inclusive)
    pub left: usize,
    /// Last channel (inclusive)
    pub right: usize,
    /// Fitted peak position in channels
    pub centroid: f64,
    /// Fitted peak width in energy units
    pub fwhm: f64,
    /// Number of edge channels averaged for the background
    pub bgd_width: usize,
    /// Whether this ROI takes part in calibration fits
    #[serde(rename = "use")]
    pub use_for_calibration: bool,
    /// Preset counts
    pub preset: f64,
    /// Line label, e.g. "Fe Ka"
    pub label: String,
    /// Lattice d-spacing in Å, for two-theta calibration
    pub d_spacing: f64,
    /// Known energy of the line in this ROI
    pub energy: f64,
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self {
            left: 0,
            right: 0,
            centroid: 0.0,
            fwhm: 0.0,
            bgd_width: 0,
            use_for_calibration: true,
            preset: 0.0,
            label: String::new(),
            d_spacing: 0.0,
            energy: 0.0,
        }
    }
}

impl RegionOfInterest {
    /// Create an ROI over channels `left..=right`
    pub fn new(left: usize, right: usize, label: impl Into<String>) -> Self {
        Self {
            left,
            right,
            label: label.into(),
            ..Self::default()
        }
    }

    /// Create an ROI whose bounds are given in energy units
    ///
    /// The bounds are converted to the nearest channels and clipped to the
    /// spectrum.
    pub fn from_energy(
        left: f64,
        right: f64,
        label: impl Into<String>,
        calibration: &Calibration,
        n_channels: usize,
    ) -> Self {
        let left = calibration.energy_to_channel_index(left, n_channels, true) as usize;
        let right = calibration.energy_to_channel_index(right, n_channels, true) as usize;
        Self::new(left, right, label)
    }

    /// Number of channels covered
    pub fn width(&self) -> usize {
        self.right - self.left + 1
    }

    fn validate(&self, n_channels: usize) -> Result<()> {
        if self.left > self.right {
            return Err(SpectrumError::Configuration(format!(
                "ROI '{}' has left channel {} after right channel {}",
                self.label, self.left, self.right
            )));
        }
        if self.right >= n_channels {
            return Err(SpectrumError::Configuration(format!(
                "ROI '{}' ends at channel {} beyond a spectrum of {} channels",
                self.label, self.right, n_channels
            )));
        }
        Ok(())
    }
}

/// Total and background-corrected counts of one ROI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiCounts {
    pub total: f64,
    pub net: f64,
}

/// The ROIs of one spectrum, kept sorted by left channel
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoiList {
    n_channels: usize,
    rois: Vec<RegionOfInterest>,
}

impl RoiList {
    /// Create an empty list for a spectrum of `n_channels` channels
    pub fn new(n_channels: usize) -> Self {
        Self {
            n_channels,
            rois: Vec::new(),
        }
    }

    /// Build a list from existing ROIs, validating and sorting them
    pub fn from_rois(n_channels: usize, rois: Vec<RegionOfInterest>) -> Result<Self> {
        let mut list = Self::new(n_channels);
        for roi in rois {
            list.add(roi)?;
        }
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    pub fn rois(&self) -> &[RegionOfInterest] {
        &self.rois
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegionOfInterest> {
        self.rois.iter()
    }

    pub fn get(&self, index: usize) -> Option<&RegionOfInterest> {
        self.rois.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut RegionOfInterest> {
        self.rois.get_mut(index)
    }

    /// Add an ROI, keeping the list sorted, and return its index
    pub fn add(&mut self, roi: RegionOfInterest) -> Result<usize> {
        roi.validate(self.n_channels)?;
        // Insert after any ROI with the same left channel
        let index = self.rois.partition_point(|r| r.left <= roi.left);
        self.rois.insert(index, roi);
        Ok(index)
    }

    /// Add an ROI whose bounds are given in energy units
    pub fn add_energy(
        &mut self,
        left: f64,
        right: f64,
        label: impl Into<String>,
        calibration: &Calibration,
    ) -> Result<usize> {
        let roi = RegionOfInterest::from_energy(left, right, label, calibration, self.n_channels);
        self.add(roi)
    }

    /// Index of the ROI spanning exactly `left..=right`
    pub fn find(&self, left: usize, right: usize) -> Option<usize> {
        self.rois
            .iter()
            .position(|r| r.left == left && r.right == right)
    }

    /// Index of the ROI whose bounds match the given energies
    pub fn find_energy(&self, left: f64, right: f64, calibration: &Calibration) -> Option<usize> {
        let l = calibration.energy_to_channel_index(left, self.n_channels, true) as usize;
        let r = calibration.energy_to_channel_index(right, self.n_channels, true) as usize;
        self.find(l, r)
    }

    /// Remove and return the ROI at `index`
    pub fn delete(&mut self, index: usize) -> Result<RegionOfInterest> {
        if index >= self.rois.len() {
            return Err(SpectrumError::Configuration(format!(
                "ROI index {} out of range for {} ROIs",
                index,
                self.rois.len()
            )));
        }
        Ok(self.rois.remove(index))
    }

    /// Total and net counts of every ROI
    ///
    /// The background under each ROI is a straight line between the mean of
    /// `background_width` channels ending at the left edge and the mean of
    /// `background_width` channels starting at the right edge. A width of 0
    /// disables background subtraction.
    pub fn counts(&self, spectrum: &Spectrum, background_width: usize) -> Result<Vec<RoiCounts>> {
        self.check_spectrum(spectrum)?;
        let data = spectrum.as_f64();
        let n = data.len();

        Ok(self
            .rois
            .iter()
            .map(|roi| {
                let (bgd_left, bgd_right) = if background_width > 0 {
                    let ll = (roi.left + 1).saturating_sub(background_width);
                    let rr = (roi.right + background_width - 1).min(n - 1);
                    (mean(&data[ll..=roi.left]), mean(&data[roi.right..=rr]))
                } else {
                    (0.0, 0.0)
                };

                let selected = &data[roi.left..=roi.right];
                let total: f64 = selected.iter().sum();
                let background = linear_background(selected.len(), bgd_left, bgd_right);
                let net = total - background.iter().sum::<f64>();
                RoiCounts { total, net }
            })
            .collect())
    }

    /// Fit the centroid and FWHM of every ROI
    ///
    /// A linear background between the two edge channels is removed. When the
    /// net counts are positive and the ROI spans at least 3 channels the peak
    /// is fitted with a Gaussian; otherwise the centroid is the ROI midpoint
    /// and the FWHM its width. FWHM is stored in energy units.
    pub fn compute_centroids(
        &mut self,
        spectrum: &Spectrum,
        calibration: &Calibration,
    ) -> Result<()> {
        self.check_spectrum(spectrum)?;
        let data = spectrum.as_f64();

        for roi in self.rois.iter_mut() {
            let selected = &data[roi.left..=roi.right];
            let background = linear_background(selected.len(), data[roi.left], data[roi.right]);
            let net_counts: Vec<f64> = selected
                .iter()
                .zip(background.iter())
                .map(|(c, b)| c - b)
                .collect();
            let net: f64 = net_counts.iter().sum();
            let chans: Vec<f64> = (roi.left..=roi.right).map(|c| c as f64).collect();

            let fitted = if net > 0.0 && chans.len() >= 3 {
                fit_gaussian(&chans, &net_counts).ok()
            } else {
                None
            };
            let (centroid, fwhm_chan) = match fitted {
                Some(estimate) => (estimate.centroid, estimate.fwhm),
                None => (
                    (roi.left + roi.right) as f64 / 2.0,
                    (roi.right - roi.left) as f64,
                ),
            };

            roi.centroid = centroid;
            roi.fwhm = calibration.channel_to_energy(centroid + fwhm_chan / 2.0)
                - calibration.channel_to_energy(centroid - fwhm_chan / 2.0);
            debug!(
                "ROI '{}' [{}, {}]: centroid={:.3} fwhm={:.4}",
                roi.label, roi.left, roi.right, roi.centroid, roi.fwhm
            );
        }
        Ok(())
    }

    fn check_spectrum(&self, spectrum: &Spectrum) -> Result<()> {
        if spectrum.len() != self.n_channels {
            return Err(SpectrumError::Configuration(format!(
                "ROI list is for {} channels but the spectrum has {}",
                self.n_channels,
                spectrum.len()
            )));
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a RoiList {
    type Item = &'a RegionOfInterest;
    type IntoIter = std::slice::Iter<'a, RegionOfInterest>;

    fn into_iter(self) -> Self::IntoIter {
        self.rois.iter()
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Straight line of `n` points from `first` to `last`
fn linear_background(n: usize, first: f64, last: f64) -> Vec<f64> {
    if n <= 1 {
        return vec![first; n];
    }
    (0..n)
        .map(|i| first + i as f64 / (n - 1) as f64 * (last - first))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gaussian_spectrum(n: usize, center: f64, sigma: f64, amplitude: f64, flat: f64) -> Spectrum {
        let values: Vec<f64> = (0..n)
            .map(|c| {
                let x = c as f64 - center;
                flat + amplitude * (-(x * x) / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        Spectrum::from_f64(&values)
    }

    #[test]
    fn test_add_keeps_sorted() {
        let mut list = RoiList::new(100);
        list.add(RegionOfInterest::new(50, 60, "b")).unwrap();
        list.add(RegionOfInterest::new(10, 20, "a")).unwrap();
        let idx = list.add(RegionOfInterest::new(70, 80, "c")).unwrap();
        assert_eq!(idx, 2);
        let labels: Vec<&str> = list.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
        assert_eq!(list.find(50, 60), Some(1));
        assert_eq!(list.find(50, 61), None);

        let removed = list.delete(0).unwrap();
        assert_eq!(removed.label, "a");
        assert_eq!(list.len(), 2);
        assert!(list.delete(5).is_err());
    }

    #[test]
    fn test_add_rejects_bad_roi() {
        let mut list = RoiList::new(100);
        assert!(list.add(RegionOfInterest::new(30, 20, "bad")).is_err());
        assert!(list.add(RegionOfInterest::new(90, 100, "bad")).is_err());
        assert!(list.is_empty());
    }

    #[test]
    fn test_energy_bounds() {
        let cal = Calibration::new(0.0, 0.01, 0.0);
        let mut list = RoiList::new(1024);
        list.add_energy(6.3, 6.5, "Fe Ka", &cal).unwrap();
        assert_eq!(list.rois()[0].left, 630);
        assert_eq!(list.rois()[0].right, 650);
        assert_eq!(list.find_energy(6.3, 6.5, &cal), Some(0));
    }

    #[test]
    fn test_counts() {
        let spectrum = Spectrum::new(vec![2, 2, 2, 10, 20, 10, 4, 4, 4]);
        let list = RoiList::from_rois(9, vec![RegionOfInterest::new(2, 6, "peak")]).unwrap();

        let no_bgd = list.counts(&spectrum, 0).unwrap();
        assert_relative_eq!(no_bgd[0].total, 46.0);
        assert_relative_eq!(no_bgd[0].net, 46.0);

        // Background line from 2 to 4 over 5 channels sums to 15
        let one = list.counts(&spectrum, 1).unwrap();
        assert_relative_eq!(one[0].net, 31.0);

        // Edge means over 2 channels are still 2 and 4
        let two = list.counts(&spectrum, 2).unwrap();
        assert_relative_eq!(two[0].net, 31.0);

        assert!(list.counts(&Spectrum::new(vec![1; 5]), 1).is_err());
    }

    #[test]
    fn test_compute_centroids() {
        let spectrum = gaussian_spectrum(200, 100.3, 3.0, 1000.0, 20.0);
        let cal = Calibration::new(0.0, 0.01, 0.0);
        let rois = vec![RegionOfInterest::new(88, 112, "peak")];
        let mut list = RoiList::from_rois(200, rois).unwrap();
        list.compute_centroids(&spectrum, &cal).unwrap();

        let roi = &list.rois()[0];
        assert_relative_eq!(roi.centroid, 100.3, epsilon = 0.1);
        assert_relative_eq!(roi.fwhm, 0.01 * 2.35482 * 3.0, epsilon = 0.01);
    }

    #[test]
    fn test_compute_centroids_falls_back_to_midpoint() {
        let spectrum = Spectrum::new(vec![5; 50]);
        let cal = Calibration::new(0.0, 0.1, 0.0);
        let mut list = RoiList::from_rois(50, vec![RegionOfInterest::new(10, 20, "flat")]).unwrap();
        list.compute_centroids(&spectrum, &cal).unwrap();

        let roi = &list.rois()[0];
        assert_relative_eq!(roi.centroid, 15.0);
        assert_relative_eq!(roi.fwhm, 1.0, epsilon = 1e-12);
    }
}
