//! OAuth client configuration
//!
//! Supplied by the caller at authorization time, and rebuilt from the
//! persisted configuration on later runs.

use common::Secret;
use serde::{Deserialize, Serialize};

/// Authorization server endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub auth_url: String,
    pub token_url: String,
}

/// Client credentials plus everything needed to build an authorization request.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub endpoints: Endpoints,
    /// Set once the redirect listener is up; sent on both legs of the flow
    pub redirect_url: Option<String>,
    pub scopes: Vec<String>,
}

impl OAuthClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<Secret<String>>,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            endpoints,
            redirect_url: None,
            scopes: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    /// Scopes as sent in the authorization URL.
    pub fn joined_scopes(&self) -> String {
        self.scopes.join(",")
    }
}
