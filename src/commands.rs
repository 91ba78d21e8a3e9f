//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::common::config::RuntimeKind;

#[derive(Subcommand)]
pub enum Commands {
    /// Check that window bounds survive reconnecting to the runtime
    Restart {
        /// Number of iterations (default: 3, or $BOUNDS_HARNESS_REPEAT)
        #[arg(long)]
        repeat: Option<usize>,
    },

    /// Check that windows open at a fixed default position
    DefaultPosition {
        /// Number of iterations (default: 100, or $BOUNDS_HARNESS_REPEAT)
        #[arg(long)]
        repeat: Option<usize>,
    },

    /// Launch windows with random geometry and compare exactly
    Random {
        /// Number of iterations (default: 100, or $BOUNDS_HARNESS_REPEAT)
        #[arg(long)]
        repeat: Option<usize>,
    },

    /// Launch windows with the given geometry
    Fixed {
        #[arg(long, allow_negative_numbers = true)]
        top: i32,
        #[arg(long, allow_negative_numbers = true)]
        left: i32,
        #[arg(long)]
        width: i32,
        #[arg(long)]
        height: i32,

        /// Number of iterations (default: 1, or $BOUNDS_HARNESS_REPEAT)
        #[arg(long)]
        repeat: Option<usize>,
    },

    /// Run YAML test scenarios
    Scenario {
        /// Scenario files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// Runtime backend selectable on the command line
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum RuntimeArg {
    Simulated,
    Process,
}

impl From<RuntimeArg> for RuntimeKind {
    fn from(arg: RuntimeArg) -> Self {
        match arg {
            RuntimeArg::Simulated => RuntimeKind::Simulated,
            RuntimeArg::Process => RuntimeKind::Process,
        }
    }
}
