//! CLI error categories and exit codes
//!
//! Every failure ends the invocation; the category decides the exit code so
//! scripts can tell which step went wrong.

use thiserror::Error;

pub const EXIT_OTHER: u8 = 1;
pub const EXIT_NOT_AUTHENTICATED: u8 = 2;
pub const EXIT_BIND: u8 = 10;
pub const EXIT_STATE_MISMATCH: u8 = 11;
pub const EXIT_NO_CODE: u8 = 12;
pub const EXIT_PROMPT_EXHAUSTED: u8 = 13;
pub const EXIT_EXCHANGE: u8 = 14;
pub const EXIT_CONFIG_CORRUPT: u8 = 20;
pub const EXIT_SAVE: u8 = 21;
pub const EXIT_API: u8 = 22;
pub const EXIT_INTERRUPTED: u8 = 130;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("not authenticated, run `oauthctl authenticate` first")]
    NotAuthenticated,

    #[error("{step}: {source}")]
    Flow {
        step: &'static str,
        #[source]
        source: oauth_flow::Error,
    },

    #[error("{step}: {source}")]
    Store {
        step: &'static str,
        #[source]
        source: token_store::Error,
    },

    #[error("API request failed: {0}")]
    Api(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::NotAuthenticated => EXIT_NOT_AUTHENTICATED,
            CliError::Flow { source, .. } => flow_exit_code(source),
            CliError::Store { source, .. } => match source {
                token_store::Error::ConfigCorrupt(_) => EXIT_CONFIG_CORRUPT,
                token_store::Error::Save(_) => EXIT_SAVE,
                token_store::Error::Refresh(e) => flow_exit_code(e),
            },
            CliError::Api(_) => EXIT_API,
            CliError::Other(_) => EXIT_OTHER,
        }
    }
}

fn flow_exit_code(error: &oauth_flow::Error) -> u8 {
    use oauth_flow::Error;
    match error {
        Error::Bind(_) => EXIT_BIND,
        Error::StateMismatch => EXIT_STATE_MISMATCH,
        Error::NoCodeReceived(_) => EXIT_NO_CODE,
        Error::PromptExhausted { .. } => EXIT_PROMPT_EXHAUSTED,
        Error::Http(_) | Error::Exchange(_) => EXIT_EXCHANGE,
        Error::Browser(_) | Error::InvalidUrl(_) | Error::Io(_) => EXIT_OTHER,
    }
}
