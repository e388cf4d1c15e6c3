//! Authenticated API requests

use reqwest::header::{AUTHORIZATION, HeaderValue};
use token_store::TokenSource;
use tracing::{debug, instrument, warn};

use crate::error::CliError;

/// Send a GET to `url` with the source's current token and return the body.
///
/// Non-2xx responses are errors carrying the status and body.
#[instrument(skip(client, source))]
pub async fn get(
    client: &reqwest::Client,
    source: &dyn TokenSource,
    url: &str,
    verbose: bool,
) -> Result<String, CliError> {
    let token = source.token().await.map_err(|source| CliError::Store {
        step: "refreshing token",
        source,
    })?;

    let mut auth = HeaderValue::from_str(&token.authorization_value())
        .map_err(|e| CliError::Api(format!("token is not a valid header value: {e}")))?;
    auth.set_sensitive(true);

    let request = client
        .get(url)
        .header(AUTHORIZATION, auth)
        .build()
        .map_err(|e| CliError::Api(format!("invalid request for {url}: {e}")))?;

    if verbose {
        print!("{}", describe_request(&request));
    }

    let response = client
        .execute(request)
        .await
        .map_err(|e| CliError::Api(format!("GET {url}: {e}")))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| CliError::Api(format!("reading response from {url}: {e}")))?;

    if !status.is_success() {
        warn!(%status, "API request rejected");
        return Err(CliError::Api(format!("GET {url} returned {status}: {body}")));
    }
    debug!(%status, bytes = body.len(), "API request succeeded");
    Ok(body)
}

/// Method, URL and headers of a request, one per line, with credentials hidden.
pub fn describe_request(request: &reqwest::Request) -> String {
    let mut out = format!("{} {}\n", request.method(), request.url());
    for (name, value) in request.headers() {
        let shown = if name == AUTHORIZATION || value.is_sensitive() {
            "[redacted]"
        } else {
            value.to_str().unwrap_or("[binary]")
        };
        out.push_str(&format!("{name}: {shown}\n"));
    }
    out
}
