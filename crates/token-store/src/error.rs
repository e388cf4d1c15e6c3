//! Error types for configuration persistence and token refresh

/// Errors from the configuration store and token source.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration file is corrupt: {0}")]
    ConfigCorrupt(String),

    #[error("failed to save configuration: {0}")]
    Save(String),

    #[error("token refresh failed: {0}")]
    Refresh(#[from] oauth_flow::Error),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
