//! Three-legged OAuth authorization for interactive CLIs
//!
//! Stands up a transient local redirect endpoint, walks the user through
//! consent, and exchanges the captured authorization code for a token. Token
//! persistence lives in the `token-store` crate; this crate never touches disk.
//!
//! Flow:
//! 1. `redirect::RedirectService::start()` binds a free port and mints a state token
//! 2. `consent::build_authorization_url()` builds the consent URL
//! 3. `consent::ConsentUi` shows it and optionally opens a browser
//! 4. `RedirectService::wait_for_code()` blocks until the redirect arrives
//! 5. `token::exchange_code()` trades the code for a `Token`
//!
//! `consent::authorize()` runs all five steps and always shuts the listener down.

pub mod config;
pub mod consent;
pub mod constants;
pub mod error;
pub mod pkce;
pub mod prompt;
pub mod redirect;
pub mod token;

pub use config::{Endpoints, OAuthClientConfig};
pub use consent::{Authorization, ConsentOptions, ConsentUi, TerminalUi, authorize};
pub use error::{Error, Result};
pub use redirect::RedirectService;
pub use token::{Token, TokenResponse, exchange_code, refresh_token};
