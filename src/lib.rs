//! Bounds harness - window bounds persistence checks for desktop runtimes
//!
//! This library drives a desktop runtime through its remote-control
//! protocol: it launches applications with requested geometry, waits for
//! each window's ready event on the runtime's shared event stream and
//! compares the displayed bounds exactly.

pub mod cli;
pub mod commands;
pub mod common;
pub mod harness;
pub mod remote;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use remote::{Bounds, LaunchSpec, RemoteRuntime};
