//! Error types for the overlay engine

use thiserror::Error;

/// Result type alias for overlay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the overlay engine
///
/// None of these are fatal to the page: the coordinator and controllers log and
/// swallow them so one broken embed never disturbs the others.
#[derive(Error, Debug)]
pub enum Error {
    /// The backend's SDK has not finished loading; no adapter was created
    #[error("Player SDK not loaded for instance {0}")]
    SdkNotLoaded(String),

    /// An instance with this id is already registered
    #[error("Instance already registered: {0}")]
    DuplicateInstance(String),

    /// No instance with this id is registered
    #[error("Unknown instance: {0}")]
    UnknownInstance(String),

    /// A backend query or command failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// The adapter was detached before the operation could complete
    #[error("Instance detached: {0}")]
    InstanceDetached(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}
