//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (consent flow completion)
//! 2. Token refresh (whenever a stored access token has expired)
//!
//! Both POST a form to the configured token endpoint. Client credentials are
//! sent twice, as HTTP basic auth and as explicit `client_id`/`client_secret`
//! form fields, since some servers only look at one of the two.

use chrono::{DateTime, Datelike, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::config::OAuthClientConfig;
use crate::constants::EXPIRY_SKEW;
use crate::error::{Error, Result};

/// An access/refresh token pair in the standard OAuth2 token JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    /// Absolute expiry. `None` means the token does not expire and is
    /// written as the zero time.
    #[serde(
        default,
        serialize_with = "serialize_expiry",
        deserialize_with = "deserialize_expiry"
    )]
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    /// Build a token from a token endpoint response received at `now`.
    ///
    /// An `expires_in` too large to represent as a date is treated as no
    /// expiry.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expiry = response
            .expires_in
            .filter(|secs| *secs > 0)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::TimeDelta::try_seconds)
            .and_then(|delta| now.checked_add_signed(delta));
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token.unwrap_or_default(),
            expiry,
        }
    }

    /// Whether the access token must be refreshed before use at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            None => false,
            Some(expiry) => {
                let skew = chrono::TimeDelta::from_std(EXPIRY_SKEW).unwrap_or_default();
                expiry - skew <= now
            }
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// A usable token has an access value and has not expired.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    /// Canonical scheme for the Authorization header. Defaults to `Bearer`.
    pub fn kind(&self) -> &str {
        let kind = self.token_type.as_str();
        if kind.is_empty() || kind.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else if kind.eq_ignore_ascii_case("mac") {
            "MAC"
        } else if kind.eq_ignore_ascii_case("basic") {
            "Basic"
        } else {
            kind
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization_value(&self) -> String {
        format!("{} {}", self.kind(), self.access_token)
    }
}

/// RFC 3339 zero time, the on-disk form of "no expiry".
const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

fn serialize_expiry<S>(
    expiry: &Option<DateTime<Utc>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match expiry {
        Some(at) => at.serialize(serializer),
        None => serializer.serialize_str(ZERO_TIME),
    }
}

/// Files written by older tools store "no expiry" as the zero time.
fn deserialize_expiry<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let expiry = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(expiry.filter(|t| t.year() > 1))
}

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time. Servers disagree
/// on whether it is a number or a string, so both are accepted.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_expires_in",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

fn deserialize_expires_in<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl TokenResponse {
    /// Parse a token endpoint body. JSON unless the server labels it as a form.
    pub fn parse(content_type: &str, body: &str) -> Result<Self> {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.starts_with("application/x-www-form-urlencoded")
            || content_type.starts_with("text/plain")
        {
            return Ok(Self::from_form(body));
        }
        serde_json::from_str(body)
            .map_err(|e| Error::Exchange(format!("invalid token response: {e}")))
    }

    fn from_form(body: &str) -> Self {
        let mut response = TokenResponse::default();
        for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
            match key.as_ref() {
                "access_token" => response.access_token = value.into_owned(),
                "token_type" => response.token_type = value.into_owned(),
                "refresh_token" => response.refresh_token = Some(value.into_owned()),
                "expires_in" | "expires" => response.expires_in = value.trim().parse().ok(),
                "error" => response.error = Some(value.into_owned()),
                "error_description" => response.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        response
    }

    /// Reject OAuth error payloads and responses without an access token.
    fn validate(self) -> Result<Self> {
        if let Some(error) = &self.error {
            let description = self.error_description.as_deref().unwrap_or("");
            return Err(Error::Exchange(format!(
                "token endpoint returned error {error}: {description}"
            )));
        }
        if self.access_token.is_empty() {
            return Err(Error::Exchange(
                "token response is missing access_token".into(),
            ));
        }
        Ok(self)
    }
}

/// Exchange an authorization code for tokens (consent flow completion).
///
/// `verifier` is the PKCE code verifier when the authorization request
/// carried a challenge.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthClientConfig,
    code: &str,
    verifier: Option<&str>,
) -> Result<Token> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.expose().as_str()),
    ];
    if let Some(redirect_url) = config.redirect_url.as_deref() {
        form.push(("redirect_uri", redirect_url));
    }
    if let Some(verifier) = verifier {
        form.push(("code_verifier", verifier));
    }

    let response = post_token_request(client, config, &form, "token exchange").await?;
    Ok(Token::from_response(response, Utc::now()))
}

/// Refresh an access token using a refresh token.
///
/// Servers that do not rotate refresh tokens omit `refresh_token` from the
/// response; the previous one is carried over in that case.
pub async fn refresh_token(
    client: &reqwest::Client,
    config: &OAuthClientConfig,
    refresh: &str,
) -> Result<Token> {
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.expose().as_str()),
    ];

    let response = post_token_request(client, config, &form, "token refresh").await?;
    let mut token = Token::from_response(response, Utc::now());
    if token.refresh_token.is_empty() {
        token.refresh_token = refresh.to_string();
    }
    Ok(token)
}

async fn post_token_request(
    client: &reqwest::Client,
    config: &OAuthClientConfig,
    form: &[(&str, &str)],
    operation: &str,
) -> Result<TokenResponse> {
    // RFC 6749 2.3.1: credentials are form-encoded before going into basic auth
    let username = form_encode(&config.client_id);
    let password = form_encode(config.client_secret.expose());

    let response = client
        .post(&config.endpoints.token_url)
        .basic_auth(username, Some(password))
        .header(ACCEPT, "application/json")
        .form(form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("{operation} request failed: {e}")))?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading {operation} response: {e}")))?;

    if !status.is_success() {
        return Err(Error::Exchange(format!(
            "{operation} returned {status}: {body}"
        )));
    }

    debug!(%status, operation, "token endpoint responded");
    TokenResponse::parse(&content_type, &body)?.validate()
}

fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
