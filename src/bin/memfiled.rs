//! Binary entry point: parse CLI arguments, load the config file, and run
//! the server until an OS signal requests shutdown.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use memfiled::config::Config;
use memfiled::{logging, server, signals};

/// Run the memfiled in-memory file storage server.
#[derive(Parser)]
#[command(version, author = "Christopher Berner")]
struct Args {
    /// Path to the server's `key = value` config file.
    config: PathBuf,
}

fn main() -> ExitCode {
    // Must run before any other thread is spawned, including the logger's
    // writer thread below, so every later thread inherits the blocked mask.
    signals::block_globally();

    let args = Args::parse();
    let logger = logging::install(log::LevelFilter::Info);

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match server::run(&config, Some(logger)) {
        Ok(report) => {
            print!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}
