use std::path::PathBuf;

/// Errors raised at the configuration and wire boundaries.
///
/// The simulation itself never fails; see the integrators for how degenerate
/// geometry is absorbed.
#[derive(Debug, thiserror::Error)]
pub enum MovementError {
    #[error("invalid movement settings: {0}")]
    InvalidSettings(String),

    #[error("failed to parse movement settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("I/O error reading '{0}': {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("malformed movement snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("unknown movement mode {0} (custom {1})")]
    UnknownMode(u8, u8),
}

pub type Result<T> = std::result::Result<T, MovementError>;
