//! Subcommand handlers

use chrono::{DateTime, Utc};
use oauth_flow::{ConsentOptions, Endpoints, OAuthClientConfig, TerminalUi};
use token_store::{ConfigStore, PersistedConfiguration, RefreshingTokenSource};
use tracing::info;

use crate::api;
use crate::cli::{AuthenticateArgs, Command};
use crate::error::CliError;

/// What every handler may need.
pub struct Context<'a> {
    pub http: reqwest::Client,
    pub store: &'a ConfigStore,
    /// Present when a configuration file was loaded at startup
    pub source: Option<&'a RefreshingTokenSource>,
    pub verbose: bool,
}

impl Context<'_> {
    fn require_source(&self) -> Result<&RefreshingTokenSource, CliError> {
        self.source.ok_or(CliError::NotAuthenticated)
    }
}

pub async fn run(command: &Command, ctx: &Context<'_>) -> Result<(), CliError> {
    match command {
        Command::Authenticate(args) => authenticate(ctx, args).await,
        Command::Token => print_token(ctx).await,
        Command::Status => status(ctx).await,
        Command::Get { url } => {
            let body = api::get(&ctx.http, ctx.require_source()?, url, ctx.verbose).await?;
            println!("{body}");
            Ok(())
        }
    }
}

async fn authenticate(ctx: &Context<'_>, args: &AuthenticateArgs) -> Result<(), CliError> {
    let config = OAuthClientConfig::new(
        args.client_id.clone(),
        args.client_secret.clone(),
        Endpoints {
            auth_url: args.authorization_url.clone(),
            token_url: args.token_url.clone(),
        },
    )
    .with_scopes(args.scopes.clone());

    let ui = TerminalUi {
        ask_to_open: !args.no_browser_prompt,
    };
    let authorization = oauth_flow::authorize(
        &ctx.http,
        &config,
        ui,
        ConsentOptions { pkce: args.pkce },
    )
    .await
    .map_err(|source| CliError::Flow {
        step: "authentication",
        source,
    })?;

    println!("The authentication was successful, saving the config");
    let persisted = PersistedConfiguration::new(&authorization.config, authorization.token);
    ctx.store
        .save(&persisted)
        .await
        .map_err(|source| CliError::Store {
            step: "saving configuration",
            source,
        })?;
    info!(path = %ctx.store.path().display(), "configuration saved");
    Ok(())
}

async fn print_token(ctx: &Context<'_>) -> Result<(), CliError> {
    let token = ctx
        .require_source()?
        .current_token()
        .await
        .map_err(|source| CliError::Store {
            step: "refreshing token",
            source,
        })?;
    println!("{}", token.access_token);
    Ok(())
}

async fn status(ctx: &Context<'_>) -> Result<(), CliError> {
    let snapshot = ctx.require_source()?.snapshot().await;
    print!("{}", render_status(&snapshot, ctx.store, Utc::now()));
    Ok(())
}

fn render_status(config: &PersistedConfiguration, store: &ConfigStore, now: DateTime<Utc>) -> String {
    let token = &config.token;
    let expiry = match token.expiry {
        Some(at) if token.is_expired_at(now) => format!("{} (expired)", at.to_rfc3339()),
        Some(at) => at.to_rfc3339(),
        None => "never".to_string(),
    };
    let refresh = if token.refresh_token.is_empty() {
        "no"
    } else {
        "yes"
    };
    format!(
        "config:        {}\n\
         client_id:     {}\n\
         auth_url:      {}\n\
         token_url:     {}\n\
         token_type:    {}\n\
         expires:       {expiry}\n\
         refreshable:   {refresh}\n",
        store.path().display(),
        config.client_id,
        config.endpoints.auth_url,
        config.endpoints.token_url,
        token.kind(),
    )
}
