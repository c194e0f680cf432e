//! Process-level error type for the replica binary.

use std::fmt;

use vsr_core::config::ConfigError;
use vsr_core::VsrError;

/// Top-level error returned from `main`. Distinct from [`VsrError`]: this
/// type also covers startup failures (bad config, bind errors) that never
/// occur once a replica is running.
#[derive(Debug)]
pub enum ProcessError {
    Config(ConfigError),
    Core(VsrError),
    Io(std::io::Error),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::Config(e) => write!(f, "invalid configuration: {e}"),
            ProcessError::Core(e) => write!(f, "{e}"),
            ProcessError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ProcessError {}

impl From<ConfigError> for ProcessError {
    fn from(e: ConfigError) -> Self {
        ProcessError::Config(e)
    }
}

impl From<VsrError> for ProcessError {
    fn from(e: VsrError) -> Self {
        ProcessError::Core(e)
    }
}

impl From<std::io::Error> for ProcessError {
    fn from(e: std::io::Error) -> Self {
        ProcessError::Io(e)
    }
}
