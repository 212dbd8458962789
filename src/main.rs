/*
MIT License

Copyright (c) 2025 Ameyanagi
*/

//! Main executable for mcafit-rs

use clap::Parser;
use mcafit_rs::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();
    run(cli)
}
