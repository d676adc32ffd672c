//! Preentrenar CLI
//!
//! Single-command pretraining entry point.
//!
//! # Usage
//!
//! ```bash
//! # Run pretraining from config
//! preentrenar train config.yaml
//!
//! # Check a config without training
//! preentrenar train config.yaml --dry-run
//! preentrenar validate config.yaml
//! ```

use clap::Parser;
use preentrenar::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
