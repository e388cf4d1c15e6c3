//! Exit-time persistence
//!
//! Commands other than `authenticate` may refresh the token while they run.
//! Whatever the source holds at exit is written back exactly once, whether
//! or not the command itself succeeded.

use token_store::{ConfigSink, RefreshingTokenSource};
use tracing::debug;

/// Save the source's snapshot unless the command was `authenticate` or no
/// configuration was loaded. Returns whether a save happened.
pub async fn finish_session(
    sink: &dyn ConfigSink,
    source: Option<&RefreshingTokenSource>,
    command_was_authenticate: bool,
) -> token_store::Result<bool> {
    if command_was_authenticate {
        debug!("authenticate already saved its configuration");
        return Ok(false);
    }
    let Some(source) = source else {
        debug!("no configuration loaded, nothing to save");
        return Ok(false);
    };

    let snapshot = source.snapshot().await;
    sink.persist(&snapshot).await?;
    debug!("configuration saved at exit");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use chrono::{TimeDelta, Utc};
    use oauth_flow::{Endpoints, Token};
    use token_store::{PersistedConfiguration, TokenSource};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingSink {
        saved: Mutex<Vec<PersistedConfiguration>>,
        fail: bool,
    }

    impl ConfigSink for RecordingSink {
        fn persist<'a>(
            &'a self,
            config: &'a PersistedConfiguration,
        ) -> Pin<Box<dyn Future<Output = token_store::Result<()>> + Send + 'a>> {
            Box::pin(async move {
                if self.fail {
                    return Err(token_store::Error::Save("read-only filesystem".into()));
                }
                self.saved.lock().unwrap().push(config.clone());
                Ok(())
            })
        }
    }

    fn persisted(token_url: String, expires_in: TimeDelta) -> PersistedConfiguration {
        PersistedConfiguration {
            client_id: "abc".into(),
            client_secret: "xyz".into(),
            endpoints: Endpoints {
                auth_url: "https://example.com/authorize".into(),
                token_url,
            },
            token: Token {
                access_token: "tok1".into(),
                token_type: "Bearer".into(),
                refresh_token: "rt_old".into(),
                expiry: Some(Utc::now() + expires_in),
            },
        }
    }

    fn source(config: PersistedConfiguration) -> RefreshingTokenSource {
        RefreshingTokenSource::new(reqwest::Client::new(), config)
    }

    #[tokio::test]
    async fn authenticate_never_triggers_exit_save() {
        let sink = RecordingSink::default();
        let source = source(persisted("https://example.com/token".into(), TimeDelta::hours(1)));

        assert!(!finish_session(&sink, Some(&source), true).await.unwrap());
        assert!(sink.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_commands_save_exactly_once() {
        let sink = RecordingSink::default();
        let source = source(persisted("https://example.com/token".into(), TimeDelta::hours(1)));

        assert!(finish_session(&sink, Some(&source), false).await.unwrap());
        let saved = sink.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].token.access_token, "tok1");
    }

    #[tokio::test]
    async fn nothing_loaded_means_nothing_saved() {
        let sink = RecordingSink::default();
        assert!(!finish_session(&sink, None, false).await.unwrap());
        assert!(sink.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refreshed_token_is_what_gets_saved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok2",
                "refresh_token": "rt_new",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sink = RecordingSink::default();
        let source = source(persisted(format!("{}/token", server.uri()), TimeDelta::minutes(-5)));
        source.token().await.unwrap();

        finish_session(&sink, Some(&source), false).await.unwrap();
        let saved = sink.saved.lock().unwrap();
        assert_eq!(saved[0].token.access_token, "tok2");
        assert_eq!(saved[0].token.refresh_token, "rt_new");
    }

    #[tokio::test]
    async fn save_failure_is_returned() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let source = source(persisted("https://example.com/token".into(), TimeDelta::hours(1)));
        let err = finish_session(&sink, Some(&source), false).await.unwrap_err();
        assert!(matches!(err, token_store::Error::Save(_)));
    }
}
