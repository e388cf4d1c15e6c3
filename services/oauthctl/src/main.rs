//! oauthctl
//!
//! Command-line OAuth2 client:
//! 1. `authenticate` runs the consent flow through a local redirect listener
//! 2. The token and client credentials are saved to a dotfile
//! 3. Later commands reuse the saved token, refreshing it when expired
//! 4. Whatever token is current at exit is written back

mod api;
mod cli;
mod commands;
mod error;
mod session;

use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use token_store::{ConfigStore, RefreshingTokenSource};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::commands::Context;
use crate::error::{CliError, EXIT_INTERRUPTED};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // A signal handler that fails to install must not look like an interrupt
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let outcome = tokio::select! {
        result = run(cli) => Some(result),
        () = interrupted => None,
    };

    match outcome {
        Some(Ok(())) => ExitCode::SUCCESS,
        Some(Err(e)) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
        None => {
            eprintln!("interrupted");
            // A prompt blocked on stdin would keep the runtime from shutting down
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
    }
}

/// stderr logging. `LOG_LEVEL`, then `RUST_LOG`, then `warn` (`debug` with
/// `--verbose`). `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let path = common::paths::resolve_config_path(cli.config.as_deref())
        .context("failed to locate the configuration file")?;
    debug!(path = %path.display(), "configuration path resolved");
    let store = ConfigStore::new(path);

    let http = reqwest::Client::builder()
        .user_agent(concat!("oauthctl/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let is_authenticate = cli.command.is_authenticate();
    let loaded = match store.load().await {
        Ok(loaded) => loaded,
        // authenticate overwrites the file, so an unreadable one must not block it
        Err(e) if is_authenticate => {
            warn!(error = %e, "ignoring unreadable configuration");
            None
        }
        Err(source) => {
            return Err(CliError::Store {
                step: "loading configuration",
                source,
            });
        }
    };
    let source = loaded.map(|config| RefreshingTokenSource::new(http.clone(), config));

    let ctx = Context {
        http,
        store: &store,
        source: source.as_ref(),
        verbose: cli.verbose,
    };
    let outcome = commands::run(&cli.command, &ctx).await;
    let saved = session::finish_session(&store, source.as_ref(), is_authenticate).await;

    match (outcome, saved) {
        (Ok(()), Ok(_)) => Ok(()),
        (Ok(()), Err(source)) => Err(CliError::Store {
            step: "saving configuration",
            source,
        }),
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(save_error)) => {
            warn!(error = %save_error, "exit-time save also failed");
            Err(e)
        }
    }
}
