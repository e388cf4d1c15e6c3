//! Command-line surface
//!
//! Flag names for `authenticate` use underscores (`--client_id`) to stay
//! compatible with existing scripts.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "oauthctl",
    version,
    about = "Obtain, store and refresh OAuth2 tokens for an API"
)]
pub struct Cli {
    /// Print method, URL and headers of every API request
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ~/.oauthctl)
    #[arg(long, global = true, env = common::paths::CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the browser consent flow and save the resulting token
    Authenticate(AuthenticateArgs),
    /// Print the current access token, refreshing it first if expired
    Token,
    /// Show the stored client, endpoints and token expiry
    Status,
    /// Send an authenticated GET request and print the response body
    Get {
        /// Absolute URL to request
        url: String,
    },
}

impl Command {
    /// `authenticate` saves on its own and must not trigger the exit-time save.
    pub fn is_authenticate(&self) -> bool {
        matches!(self, Command::Authenticate(_))
    }
}

#[derive(Debug, Args)]
pub struct AuthenticateArgs {
    /// The OAuth client ID
    #[arg(long = "client_id")]
    pub client_id: String,

    /// The OAuth client secret
    #[arg(long = "client_secret", env = "OAUTHCTL_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// The authorization URL
    #[arg(long = "authorization_url")]
    pub authorization_url: String,

    /// The token URL
    #[arg(long = "token_url")]
    pub token_url: String,

    /// The scopes to request (repeatable, comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub scopes: Vec<String>,

    /// Add a PKCE challenge to the authorization request
    #[arg(long)]
    pub pkce: bool,

    /// Print the URL without offering to open a browser
    #[arg(long)]
    pub no_browser_prompt: bool,
}
