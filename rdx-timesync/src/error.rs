//! Error taxonomy for the synchronization engine.
//!
//! None of these are fatal to a session. The engine logs them and keeps the
//! remaining views interactive.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The configuration source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// The configuration was readable but holds unusable values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A consumer's render target (element, layer, canvas) is not available.
    ///
    /// Consumers return this from `update`/`clear` to be logged as a warning
    /// rather than a failure.
    #[error("render target missing for {0}")]
    MissingTarget(String),

    /// A drag could not start; the scrubber stays idle.
    #[error("drag aborted: {0}")]
    DragAborted(&'static str),

    /// The loaded dataset contributed no timestamps.
    #[error("no data loaded")]
    NoData,
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
