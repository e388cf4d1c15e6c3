//! Interactive consent flow
//!
//! Builds the authorization URL, shows it to the user, optionally opens it in
//! the system browser, then waits for the redirect service to capture the
//! code and exchanges it for a token.
//!
//! User interaction goes through the `ConsentUi` trait so the terminal can be
//! swapped for a scripted implementation.

use std::io::Write;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::OAuthClientConfig;
use crate::constants::{DEFAULT_SCOPES, SHUTDOWN_DEADLINE};
use crate::error::{Error, Result};
use crate::pkce::{CHALLENGE_METHOD, Pkce};
use crate::prompt;
use crate::redirect::RedirectService;
use crate::token::{Token, exchange_code};

/// User-facing side of the consent flow.
///
/// Methods are called from a blocking thread, so implementations may read
/// stdin directly.
pub trait ConsentUi: Send + 'static {
    /// Show the authorization URL the user must visit.
    fn show_authorization_url(&mut self, url: &Url);

    /// Ask whether the URL should be opened in the default browser.
    fn confirm_open_in_browser(&mut self) -> Result<bool>;

    /// Launch the URL with the OS's default handler.
    fn open_in_browser(&mut self, url: &Url) -> Result<()>;

    /// Tell the user to open the URL themselves.
    fn show_manual_instructions(&mut self);

    /// Report a failed browser launch. The flow keeps waiting afterwards.
    fn report_browser_failure(&mut self, error: &Error);
}

/// Terminal implementation: stdout for messages, stdin for the prompt.
#[derive(Debug, Clone)]
pub struct TerminalUi {
    /// When false the browser question is skipped and manual instructions shown
    pub ask_to_open: bool,
}

impl Default for TerminalUi {
    fn default() -> Self {
        Self { ask_to_open: true }
    }
}

impl ConsentUi for TerminalUi {
    fn show_authorization_url(&mut self, url: &Url) {
        println!(
            "Your consent is needed to access your data, which requires going to the following URL: {url}"
        );
    }

    fn confirm_open_in_browser(&mut self) -> Result<bool> {
        if !self.ask_to_open {
            return Ok(false);
        }
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut output = std::io::stdout();
        let answer = prompt::confirm(
            &mut input,
            &mut output,
            "Do you want to open it in your default browser?",
        );
        let _ = output.flush();
        answer
    }

    fn open_in_browser(&mut self, url: &Url) -> Result<()> {
        webbrowser::open(url.as_str()).map_err(|e| Error::Browser(e.to_string()))
    }

    fn show_manual_instructions(&mut self) {
        println!("Alright. Please open the URL yourself and come back here after, we'll hang tight...");
    }

    fn report_browser_failure(&mut self, error: &Error) {
        eprintln!("{error}");
        println!("Please open the URL yourself, we'll keep waiting for the redirect...");
    }
}

/// Per-attempt options.
#[derive(Debug, Clone, Default)]
pub struct ConsentOptions {
    /// Add a PKCE challenge to the request and the verifier to the exchange
    pub pkce: bool,
}

/// Result of a completed consent flow.
#[derive(Debug, Clone)]
pub struct Authorization {
    /// The caller's config, with the redirect URL that was actually used
    pub config: OAuthClientConfig,
    pub token: Token,
}

/// Run the full flow: listen, ask for consent, wait for the code, exchange it.
///
/// The redirect listener is shut down on every path out of this function,
/// and also when the returned future is dropped before completion.
pub async fn authorize<U: ConsentUi>(
    client: &reqwest::Client,
    config: &OAuthClientConfig,
    ui: U,
    options: ConsentOptions,
) -> Result<Authorization> {
    let pkce = options.pkce.then(Pkce::generate);

    let mut service = RedirectService::start().await?;
    let config = config
        .clone()
        .with_redirect_url(service.redirect_url().as_str());

    let code = obtain_code(&config, ui, pkce.as_ref(), &mut service).await;
    service.shutdown(SHUTDOWN_DEADLINE).await;
    let code = code?;

    let verifier = pkce.as_ref().map(|p| p.verifier.as_str());
    let token = exchange_code(client, &config, &code, verifier).await?;
    info!(client_id = %config.client_id, "authorization code exchanged for a token");

    Ok(Authorization { config, token })
}

async fn obtain_code<U: ConsentUi>(
    config: &OAuthClientConfig,
    ui: U,
    pkce: Option<&Pkce>,
    service: &mut RedirectService,
) -> Result<String> {
    let url = build_authorization_url(config, service.redirect_url().as_str(), service.state(), pkce)?;
    debug!(url = %url, "authorization URL");

    // The prompt blocks on stdin; keep it off the runtime so the listener
    // can serve a redirect that arrives before the user answers.
    tokio::task::spawn_blocking(move || present(ui, &url))
        .await
        .map_err(|e| Error::Io(format!("consent prompt task failed: {e}")))??;

    service.wait_for_code().await
}

fn present<U: ConsentUi>(mut ui: U, url: &Url) -> Result<()> {
    ui.show_authorization_url(url);
    if ui.confirm_open_in_browser()? {
        if let Err(e) = ui.open_in_browser(url) {
            warn!(error = %e, "could not open browser");
            ui.report_browser_failure(&e);
        }
    } else {
        ui.show_manual_instructions();
    }
    Ok(())
}

/// Query parameters with set semantics: setting an existing key replaces its
/// value in place.
#[derive(Debug, Default)]
struct AuthParams(Vec<(&'static str, String)>);

impl AuthParams {
    fn set(&mut self, key: &'static str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }
}

/// Build the authorization URL for this attempt.
///
/// `scope` is set to `DEFAULT_SCOPES` and then to the caller's comma-joined
/// scopes, so the caller's list is what the server receives. Query parameters
/// already present on the configured authorization URL are kept.
pub fn build_authorization_url(
    config: &OAuthClientConfig,
    redirect_url: &str,
    state: &str,
    pkce: Option<&Pkce>,
) -> Result<Url> {
    let mut url = Url::parse(&config.endpoints.auth_url).map_err(|e| {
        Error::InvalidUrl(format!(
            "authorization URL {:?}: {e}",
            config.endpoints.auth_url
        ))
    })?;

    let mut params = AuthParams::default();
    params.set("response_type", "code");
    params.set("client_id", config.client_id.as_str());
    params.set("redirect_uri", redirect_url);
    params.set("state", state);
    params.set("access_type", "offline");
    params.set("scope", DEFAULT_SCOPES);
    params.set("scope", config.joined_scopes());
    if let Some(pkce) = pkce {
        params.set("code_challenge", pkce.challenge.as_str());
        params.set("code_challenge_method", CHALLENGE_METHOD);
    }

    url.query_pairs_mut()
        .extend_pairs(params.0.iter().map(|(k, v)| (*k, v.as_str())));
    Ok(url)
}
