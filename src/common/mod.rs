//! Common utilities shared between the harness and the mock runtime

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
