//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Environment variable overriding the iteration count of a run
pub const REPEAT_ENV: &str = "BOUNDS_HARNESS_REPEAT";

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Which runtime to drive
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Lifecycle event names
    #[serde(default)]
    pub events: EventsConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Default iteration counts per scenario
    #[serde(default)]
    pub repeat: RepeatConfig,

    /// Randomized geometry bounds
    #[serde(default)]
    pub geometry: GeometryConfig,
}

/// Runtime backend
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// In-process simulated runtime
    #[default]
    Simulated,
    /// External runtime process speaking the wire protocol over stdio
    Process,
}

/// Runtime configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub kind: RuntimeKind,

    /// Runtime executable, resolved through PATH when not a path
    #[serde(default = "default_runtime_command")]
    pub command: PathBuf,

    /// Additional arguments to pass to the runtime
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            kind: RuntimeKind::default(),
            command: default_runtime_command(),
            args: Vec::new(),
        }
    }
}

fn default_runtime_command() -> PathBuf {
    PathBuf::from("mock-runtime")
}

impl RuntimeConfig {
    /// Resolve the runtime command to an executable path
    pub fn resolve_command(&self) -> Result<PathBuf> {
        if self.command.components().count() > 1 || self.command.is_absolute() {
            return Ok(self.command.clone());
        }
        which::which(&self.command).map_err(|e| {
            Error::Config(format!(
                "Runtime command '{}' not found in PATH: {}",
                self.command.display(),
                e
            ))
        })
    }
}

/// Session settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Identity the harness connects with
    #[serde(default = "default_identity")]
    pub identity: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
        }
    }
}

fn default_identity() -> String {
    "bounds-harness".to_string()
}

/// Lifecycle event names
#[derive(Debug, Deserialize)]
pub struct EventsConfig {
    /// Event signalling that a window is displayed and its bounds are final
    #[serde(default = "default_ready_event")]
    pub ready: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            ready: default_ready_event(),
        }
    }
}

fn default_ready_event() -> String {
    "shown".to_string()
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Bound on waiting for the ready event
    #[serde(default = "default_ready")]
    pub ready_secs: u64,

    /// Timeout for runtime requests
    #[serde(default = "default_request")]
    pub request_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ready_secs: default_ready(),
            request_secs: default_request(),
        }
    }
}

fn default_ready() -> u64 {
    1000
}
fn default_request() -> u64 {
    30
}

impl Timeouts {
    pub fn ready(&self) -> Duration {
        Duration::from_secs(self.ready_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// Default iteration counts
#[derive(Debug, Deserialize)]
pub struct RepeatConfig {
    /// Restart-persistence scenario
    #[serde(default = "default_restart_repeat")]
    pub restart: usize,

    /// Default-position scenario
    #[serde(default = "default_position_repeat")]
    pub default_position: usize,
}

impl Default for RepeatConfig {
    fn default() -> Self {
        Self {
            restart: default_restart_repeat(),
            default_position: default_position_repeat(),
        }
    }
}

fn default_restart_repeat() -> usize {
    3
}
fn default_position_repeat() -> usize {
    100
}

/// Bounds for randomized launch geometry
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct GeometryConfig {
    /// Upper bound of every random draw; small enough to fit most displays
    #[serde(default = "default_random_max")]
    pub random_max: i32,

    /// Added to random widths so they stay above the runtime minimum
    #[serde(default = "default_min_width")]
    pub min_width: i32,

    /// Added to random heights so they stay above the runtime minimum
    #[serde(default = "default_min_height")]
    pub min_height: i32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            random_max: default_random_max(),
            min_width: default_min_width(),
            min_height: default_min_height(),
        }
    }
}

fn default_random_max() -> i32 {
    300
}
fn default_min_width() -> i32 {
    140
}
fn default_min_height() -> i32 {
    38
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }
}

/// Resolve the iteration count for a run
///
/// An explicit value wins, then the environment override, then the
/// scenario default.
pub fn resolve_repeat(explicit: Option<usize>, env_value: Option<&str>, default: usize) -> Result<usize> {
    if let Some(n) = explicit {
        return Ok(n);
    }
    match env_value {
        Some(raw) => raw.trim().parse().map_err(|_| {
            Error::Config(format!("{} must be a non-negative integer, got '{}'", REPEAT_ENV, raw))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.runtime.kind, RuntimeKind::Simulated);
        assert_eq!(config.session.identity, "bounds-harness");
        assert_eq!(config.events.ready, "shown");
        assert_eq!(config.timeouts.ready_secs, 1000);
        assert_eq!(config.repeat.restart, 3);
        assert_eq!(config.repeat.default_position, 100);
        assert_eq!(config.geometry.min_width, 140);
        assert_eq!(config.geometry.min_height, 38);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::parse(
            r#"
[runtime]
kind = "process"
command = "/opt/runtime/bin/runtime"
args = ["--headless"]

[timeouts]
ready_secs = 5

[repeat]
restart = 7
"#,
        )
        .unwrap();

        assert_eq!(config.runtime.kind, RuntimeKind::Process);
        assert_eq!(config.runtime.args, vec!["--headless".to_string()]);
        assert_eq!(
            config.runtime.resolve_command().unwrap(),
            PathBuf::from("/opt/runtime/bin/runtime")
        );
        assert_eq!(config.timeouts.ready(), Duration::from_secs(5));
        assert_eq!(config.timeouts.request_secs, 30);
        assert_eq!(config.repeat.restart, 7);
        assert_eq!(config.repeat.default_position, 100);
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let err = Config::parse("[timeouts]\nready_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_resolve_repeat_precedence() {
        assert_eq!(resolve_repeat(Some(5), Some("9"), 3).unwrap(), 5);
        assert_eq!(resolve_repeat(None, Some(" 9 "), 3).unwrap(), 9);
        assert_eq!(resolve_repeat(None, None, 3).unwrap(), 3);
        assert!(matches!(
            resolve_repeat(None, Some("many"), 3),
            Err(Error::Config(_))
        ));
    }
}
