//! Redirect capture service
//!
//! Runs an ephemeral HTTP listener on a free local port for the second leg of
//! the three-legged flow. The authorization server redirects the user's
//! browser to `http://localhost:<port>/exchange?code=..&state=..`; the handler
//! checks `state` against the value generated for this attempt and hands the
//! result to the single waiting consumer through a oneshot channel.
//!
//! At most one value is ever delivered per service. Later redirects are
//! answered but never reach the consumer.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::{
    ALREADY_RECEIVED_BODY, BIND_ADDR, REDIRECT_HOST, REDIRECT_PATH, STATE_MISMATCH_BODY,
    SUCCESS_BODY,
};
use crate::error::{Error, Result};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// What the handler hands to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Delivery {
    /// State matched. `code` is empty when the server denied the request.
    Code { code: String, error: Option<String> },
    /// State did not match; the wait ends without a code.
    Rejected,
}

/// Query parameters of the redirect.
#[derive(Debug, Default, PartialEq, Eq)]
struct RedirectParams {
    code: String,
    state: String,
    error: Option<String>,
    error_description: Option<String>,
}

impl RedirectParams {
    /// Parse the raw query. The first occurrence of a repeated key wins and
    /// missing keys stay empty, so any query yields a value to check.
    fn from_query(query: Option<&str>) -> Self {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut error_description = None;
        for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            let slot = match key.as_ref() {
                "code" => &mut code,
                "state" => &mut state,
                "error" => &mut error,
                "error_description" => &mut error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        Self {
            code: code.unwrap_or_default(),
            state: state.unwrap_or_default(),
            error,
            error_description,
        }
    }
}

/// Shared state for the redirect handler.
#[derive(Clone)]
struct RedirectState {
    expected_state: Arc<str>,
    sender: Arc<Mutex<Option<oneshot::Sender<Delivery>>>>,
}

impl RedirectState {
    /// Send `delivery` if nothing has been delivered yet.
    async fn deliver(&self, delivery: Delivery) -> bool {
        match self.sender.lock().await.take() {
            Some(sender) => {
                // The consumer may have given up already; nothing to do then
                let _ = sender.send(delivery);
                true
            }
            None => false,
        }
    }
}

/// A pending authorization: listener, state token and the receiving end of
/// the code handoff.
///
/// Dropping the service signals the listener to stop, so the port is
/// released even when the consent flow is cancelled mid-wait.
pub struct RedirectService {
    redirect_url: Url,
    state: String,
    port: u16,
    receiver: Option<oneshot::Receiver<Delivery>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<std::io::Result<()>>>,
}

impl RedirectService {
    /// Bind a free local port and start serving the redirect path.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind(BIND_ADDR)
            .await
            .map_err(|e| Error::Bind(format!("binding {BIND_ADDR}: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::Bind(format!("reading bound address: {e}")))?
            .port();

        let state = generate_state();
        let redirect_url = Url::parse(&format!("http://{REDIRECT_HOST}:{port}{REDIRECT_PATH}"))
            .map_err(|e| Error::InvalidUrl(format!("redirect URL: {e}")))?;

        let (code_tx, code_rx) = oneshot::channel();
        let router = build_router(RedirectState {
            expected_state: Arc::from(state.as_str()),
            sender: Arc::new(Mutex::new(Some(code_tx))),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(port, "redirect listener started");

        Ok(Self {
            redirect_url,
            state,
            port,
            receiver: Some(code_rx),
            shutdown_tx: Some(shutdown_tx),
            server: Some(server),
        })
    }

    /// URL the authorization server must redirect to.
    pub fn redirect_url(&self) -> &Url {
        &self.redirect_url
    }

    /// Anti-forgery state token for this attempt.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the redirect. This is the only point where the flow blocks.
    ///
    /// There is no timeout; cancellation is the caller dropping the future.
    pub async fn wait_for_code(&mut self) -> Result<String> {
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| Error::NoCodeReceived("the redirect was already consumed".into()))?;

        match receiver.await {
            Ok(Delivery::Code { code, error }) if code.is_empty() => {
                let reason = error.unwrap_or_else(|| "redirect carried an empty code".into());
                Err(Error::NoCodeReceived(reason))
            }
            Ok(Delivery::Code { code, .. }) => Ok(code),
            Ok(Delivery::Rejected) => Err(Error::StateMismatch),
            Err(_) => Err(Error::NoCodeReceived(
                "redirect listener stopped before a code arrived".into(),
            )),
        }
    }

    /// Stop accepting connections and give in-flight responses up to
    /// `deadline` to complete.
    pub async fn shutdown(mut self, deadline: Duration) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let Some(server) = self.server.take() else {
            return;
        };

        match tokio::time::timeout(deadline, server).await {
            Ok(Ok(Ok(()))) => debug!(port = self.port, "redirect listener stopped"),
            Ok(Ok(Err(e))) => warn!(error = %e, "redirect listener error during shutdown"),
            Ok(Err(e)) => warn!(error = %e, "redirect listener task panicked"),
            Err(_) => warn!(
                deadline_ms = deadline.as_millis() as u64,
                "redirect listener did not stop before deadline"
            ),
        }
    }
}

impl Drop for RedirectService {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            debug!(port = self.port, "redirect service dropped, stopping listener");
            let _ = tx.send(());
        }
    }
}

/// Fresh single-use state token.
pub fn generate_state() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn build_router(state: RedirectState) -> Router {
    Router::new()
        .route(REDIRECT_PATH, get(handle_redirect))
        .with_state(state)
}

async fn handle_redirect(
    State(state): State<RedirectState>,
    RawQuery(query): RawQuery,
) -> Response {
    let params = RedirectParams::from_query(query.as_deref());
    if params.state != *state.expected_state {
        warn!("redirect state does not match, rejecting");
        state.deliver(Delivery::Rejected).await;
        return (
            StatusCode::BAD_REQUEST,
            [(CONTENT_TYPE, TEXT_PLAIN)],
            STATE_MISMATCH_BODY,
        )
            .into_response();
    }

    if let Some(error) = &params.error {
        warn!(
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "authorization server reported an error"
        );
    }

    let delivered = state
        .deliver(Delivery::Code {
            code: params.code,
            error: params.error,
        })
        .await;
    if !delivered {
        debug!("ignoring repeated redirect");
        return (
            StatusCode::CONFLICT,
            [(CONTENT_TYPE, TEXT_PLAIN)],
            ALREADY_RECEIVED_BODY,
        )
            .into_response();
    }

    info!("authorization code received");
    (StatusCode::OK, [(CONTENT_TYPE, TEXT_PLAIN)], SUCCESS_BODY).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    /// Hit the listener through 127.0.0.1 so the test does not depend on
    /// how `localhost` resolves on the machine.
    fn loopback_url(service: &RedirectService, code: &str, state: &str) -> String {
        format!(
            "http://127.0.0.1:{}{REDIRECT_PATH}?code={code}&state={state}",
            service.port()
        )
    }

    #[tokio::test]
    async fn redirect_url_uses_bound_port() {
        let service = RedirectService::start().await.unwrap();
        assert_ne!(service.port(), 0);
        assert_eq!(service.redirect_url().port(), Some(service.port()));
        assert_eq!(service.redirect_url().host_str(), Some(REDIRECT_HOST));
        assert_eq!(service.redirect_url().path(), REDIRECT_PATH);

        // The port is really ours: connecting succeeds
        tokio::net::TcpStream::connect(("127.0.0.1", service.port()))
            .await
            .expect("listener must accept connections");
        service.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn state_tokens_are_unique_per_attempt() {
        let first = RedirectService::start().await.unwrap();
        let first_state = first.state().to_string();
        first.shutdown(Duration::from_secs(1)).await;

        let second = RedirectService::start().await.unwrap();
        assert_ne!(first_state, second.state());
        second.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn matching_state_delivers_code_once() {
        let mut service = RedirectService::start().await.unwrap();
        let client = reqwest::Client::new();

        let response = client
            .get(loopback_url(&service, "code-123", service.state()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            TEXT_PLAIN
        );
        assert_eq!(response.text().await.unwrap(), SUCCESS_BODY);

        // A second redirect is answered but not delivered
        let again = client
            .get(loopback_url(&service, "code-456", service.state()))
            .send()
            .await
            .unwrap();
        assert_eq!(again.status(), reqwest::StatusCode::CONFLICT);

        assert_eq!(service.wait_for_code().await.unwrap(), "code-123");
        assert!(matches!(
            service.wait_for_code().await,
            Err(Error::NoCodeReceived(_))
        ));
        service.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn mismatched_state_is_rejected() {
        let mut service = RedirectService::start().await.unwrap();

        let response = reqwest::get(loopback_url(&service, "code-123", "forged"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(response.text().await.unwrap(), STATE_MISMATCH_BODY);

        assert!(matches!(
            service.wait_for_code().await,
            Err(Error::StateMismatch)
        ));
        service.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn empty_code_is_no_code_received() {
        let mut service = RedirectService::start().await.unwrap();
        let url = format!(
            "http://127.0.0.1:{}{REDIRECT_PATH}?code=&state={}&error=access_denied",
            service.port(),
            service.state()
        );

        let response = reqwest::get(url).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        match service.wait_for_code().await {
            Err(Error::NoCodeReceived(reason)) => assert_eq!(reason, "access_denied"),
            other => panic!("expected NoCodeReceived, got {other:?}"),
        }
        service.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn shutdown_releases_listener() {
        let service = RedirectService::start().await.unwrap();
        let port = service.port();
        service.shutdown(Duration::from_secs(1)).await;

        let result = tokio::net::TcpStream::connect(("127.0.0.1", port)).await;
        assert!(result.is_err(), "listener must be closed after shutdown");
    }

    #[tokio::test]
    async fn drop_stops_listener_and_ends_wait() {
        let service = RedirectService::start().await.unwrap();
        let port = service.port();
        drop(service);

        // Graceful shutdown runs on the background task; give it a moment
        let mut closed = false;
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .is_err()
            {
                closed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(closed, "listener must stop once the service is dropped");
    }

    #[tokio::test]
    async fn router_rejects_missing_state() {
        let (tx, mut rx) = oneshot::channel();
        let router = build_router(RedirectState {
            expected_state: Arc::from("expected"),
            sender: Arc::new(Mutex::new(Some(tx))),
        });

        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("{REDIRECT_PATH}?code=abc"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(rx.try_recv().unwrap(), Delivery::Rejected);
    }

    #[test]
    fn first_value_of_repeated_key_wins() {
        let params =
            RedirectParams::from_query(Some("code=c1&state=s1&state=s2&code=c2&error=e&x=y"));
        assert_eq!(
            params,
            RedirectParams {
                code: "c1".into(),
                state: "s1".into(),
                error: Some("e".into()),
                error_description: None,
            }
        );
        assert_eq!(RedirectParams::from_query(None), RedirectParams::default());
    }

    #[tokio::test]
    async fn repeated_state_key_still_ends_the_wait() {
        let mut service = RedirectService::start().await.unwrap();
        let url = format!(
            "http://127.0.0.1:{}{REDIRECT_PATH}?code=c&state=forged&state={}",
            service.port(),
            service.state()
        );

        let response = reqwest::get(url).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(response.text().await.unwrap(), STATE_MISMATCH_BODY);

        let result = tokio::time::timeout(Duration::from_secs(2), service.wait_for_code())
            .await
            .expect("wait must end after a rejected redirect");
        assert!(matches!(result, Err(Error::StateMismatch)), "got {result:?}");
        service.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn router_ignores_other_paths() {
        let (tx, mut rx) = oneshot::channel();
        let router = build_router(RedirectState {
            expected_state: Arc::from("expected"),
            sender: Arc::new(Mutex::new(Some(tx))),
        });

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/favicon.ico")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(rx.try_recv().is_err(), "nothing may be delivered");
    }
}
