//! Error types for the OAuth authorization flow

/// Errors from the redirect listener, consent prompt and token endpoint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to start redirect listener: {0}")]
    Bind(String),

    #[error("redirect state does not match the pending authorization request")]
    StateMismatch,

    #[error("no authorization code received: {0}")]
    NoCodeReceived(String),

    #[error("no valid yes/no answer after {attempts} attempt(s)")]
    PromptExhausted { attempts: u32 },

    #[error("failed to open browser: {0}")]
    Browser(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether the failure came from talking to the token endpoint.
    pub fn is_exchange(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Exchange(_))
    }
}

/// Result alias for flow operations.
pub type Result<T> = std::result::Result<T, Error>;
