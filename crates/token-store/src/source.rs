//! Auto-refreshing token source
//!
//! Hands out the current access token, exchanging the refresh token first
//! when the access token has expired. The refreshed token replaces the
//! current one for the rest of the process and shows up in `snapshot()`, which
//! is what the exit-time save writes back.

use std::future::Future;
use std::pin::Pin;

use oauth_flow::{OAuthClientConfig, Token};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::PersistedConfiguration;

/// Anything that can produce a currently-valid token.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`&dyn TokenSource`).
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + '_>>;
}

/// Token source over a loaded configuration.
///
/// The Mutex is held across the refresh request, so concurrent callers wait
/// for a single refresh instead of each starting their own.
pub struct RefreshingTokenSource {
    client: reqwest::Client,
    config: OAuthClientConfig,
    current: Mutex<Token>,
}

impl RefreshingTokenSource {
    pub fn new(client: reqwest::Client, persisted: PersistedConfiguration) -> Self {
        let config = persisted.oauth_config();
        Self {
            client,
            config,
            current: Mutex::new(persisted.token),
        }
    }

    /// The current token, refreshed first if it has expired.
    pub async fn current_token(&self) -> Result<Token> {
        let mut current = self.current.lock().await;
        if current.is_valid() {
            return Ok(current.clone());
        }
        if current.refresh_token.is_empty() {
            return Err(Error::Refresh(oauth_flow::Error::Exchange(
                "access token expired and no refresh token is stored".into(),
            )));
        }

        debug!(client_id = %self.config.client_id, "access token expired, refreshing");
        let refreshed =
            oauth_flow::refresh_token(&self.client, &self.config, &current.refresh_token).await?;
        info!(expiry = ?refreshed.expiry, "access token refreshed");

        *current = refreshed.clone();
        Ok(refreshed)
    }

    /// Configuration as it should be persisted right now, including any
    /// token refreshed during this run.
    pub async fn snapshot(&self) -> PersistedConfiguration {
        let token = self.current.lock().await.clone();
        PersistedConfiguration::new(&self.config, token)
    }

    pub fn oauth_config(&self) -> &OAuthClientConfig {
        &self.config
    }
}

impl TokenSource for RefreshingTokenSource {
    fn token(&self) -> Pin<Box<dyn Future<Output = Result<Token>> + Send + '_>> {
        Box::pin(self.current_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use oauth_flow::Endpoints;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::store::ConfigStore;

    fn configuration(token_url: String, access: &str, expires_in: TimeDelta) -> PersistedConfiguration {
        PersistedConfiguration {
            client_id: "abc".into(),
            client_secret: "xyz".into(),
            endpoints: Endpoints {
                auth_url: "https://example.com/authorize".into(),
                token_url,
            },
            token: Token {
                access_token: access.into(),
                token_type: "Bearer".into(),
                refresh_token: "rt_old".into(),
                expiry: Some(Utc::now() + expires_in),
            },
        }
    }

    #[tokio::test]
    async fn reloaded_valid_token_is_used_without_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join(".oauthctl"));
        store
            .save(&configuration(
                "https://example.com/token".into(),
                "tok1",
                TimeDelta::hours(1),
            ))
            .await
            .unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        let source = RefreshingTokenSource::new(reqwest::Client::new(), loaded);
        let token = source.token().await.unwrap();
        assert_eq!(token.access_token, "tok1");
        assert_eq!(source.snapshot().await.token.access_token, "tok1");
    }

    #[tokio::test]
    async fn expired_token_refreshes_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt_old"))
            .and(body_string_contains("client_id=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok2",
                "token_type": "Bearer",
                "refresh_token": "rt_new",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = RefreshingTokenSource::new(
            reqwest::Client::new(),
            configuration(
                format!("{}/token", server.uri()),
                "tok1",
                TimeDelta::minutes(-5),
            ),
        );

        assert_eq!(source.token().await.unwrap().access_token, "tok2");
        assert_eq!(source.token().await.unwrap().access_token, "tok2");

        let snapshot = source.snapshot().await;
        assert_eq!(snapshot.token.access_token, "tok2");
        assert_eq!(snapshot.token.refresh_token, "rt_new");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok2",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = std::sync::Arc::new(RefreshingTokenSource::new(
            reqwest::Client::new(),
            configuration(
                format!("{}/token", server.uri()),
                "tok1",
                TimeDelta::minutes(-5),
            ),
        ));

        let mut handles = vec![];
        for _ in 0..5 {
            let source = source.clone();
            handles.push(tokio::spawn(async move { source.token().await }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap().access_token, "tok2");
        }
    }

    #[tokio::test]
    async fn refresh_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let source = RefreshingTokenSource::new(
            reqwest::Client::new(),
            configuration(
                format!("{}/token", server.uri()),
                "tok1",
                TimeDelta::minutes(-5),
            ),
        );

        let err = source.token().await.unwrap_err();
        assert!(matches!(err, Error::Refresh(ref e) if e.is_exchange()), "got {err:?}");
        // The stale token is still what would be saved
        assert_eq!(source.snapshot().await.token.access_token, "tok1");
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_fails() {
        let mut persisted = configuration(
            "https://example.com/token".into(),
            "tok1",
            TimeDelta::minutes(-5),
        );
        persisted.token.refresh_token.clear();

        let source = RefreshingTokenSource::new(reqwest::Client::new(), persisted);
        assert!(matches!(source.token().await, Err(Error::Refresh(_))));
    }
}
