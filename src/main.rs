//! Bounds harness - checks window bounds persistence of a desktop runtime
//!
//! Launches applications through the runtime's remote-control protocol,
//! waits for each window to be shown and compares its bounds with the
//! requested or previously saved geometry.

use std::path::PathBuf;

use bounds_harness::cli::{self, GlobalOptions};
use bounds_harness::commands::{Commands, RuntimeArg};
use bounds_harness::common::logging;
use clap::Parser;

#[derive(Parser)]
#[command(name = "bounds-harness", about = "Window bounds persistence harness")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Runtime backend, overriding the configuration
    #[arg(long, global = true, value_enum)]
    runtime: Option<RuntimeArg>,

    /// Log requested and observed bounds of every iteration
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    let options = GlobalOptions {
        config: cli.config,
        runtime: cli.runtime,
        verbose: cli.verbose,
    };

    if let Err(e) = cli::dispatch(cli.command, options).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
