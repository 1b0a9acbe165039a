//! OAuth2 client-credentials authentication for the OpsRamp API.
//!
//! Exchanges the client key and secret for a bearer token at the tenancy
//! token endpoint (`/tenancy/auth/oauth/token`) using a form-encoded
//! `client_credentials` grant. The resulting [`Session`] is cached in
//! [`TokenProvider`] and replaced wholesale on every refresh; a failed
//! refresh leaves no session behind, so callers never continue with a stale
//! or empty token.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{OpsRampError, Result};

/// Token endpoint. `{subdomain}` is replaced at runtime.
const TOKEN_URL: &str = "https://{subdomain}.api.opsramp.com/tenancy/auth/oauth/token";

/// Refresh this long before the server-declared expiry.
const EXPIRY_BUFFER_SECS: u64 = 60;

/// Token requests are small; fail fast.
const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Client key and secret issued by OpsRamp for an integration.
#[derive(Clone)]
pub struct Credentials {
    /// OAuth client id ("key" in the OpsRamp UI).
    pub client_key: String,
    /// OAuth client secret.
    pub client_secret: String,
}

impl Credentials {
    /// Builds credentials from a key and secret.
    pub fn new(client_key: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Credentials {
            client_key: client_key.into(),
            client_secret: client_secret.into(),
        }
    }
}

// The secret must never reach logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_key", &self.client_key)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Form body sent to the token endpoint.
#[derive(Serialize)]
pub struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Subset of the token response we read. `access_token` is optional so a
/// 200 without a token surfaces as `OpsRampError::Auth` instead of a parse
/// error.
#[derive(Deserialize)]
pub struct TokenResponse {
    /// Bearer token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Usually `"bearer"`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// A bearer token and when it was issued.
///
/// Invariant: a `Session` is immutable once built. Refreshing produces a new
/// value that replaces the old one.
#[derive(Clone)]
pub struct Session {
    access_token: String,
    issued_at: Instant,
    expires_in: Option<u64>,
}

impl Session {
    fn new(access_token: String, expires_in: Option<u64>) -> Self {
        Session {
            access_token,
            issued_at: Instant::now(),
            expires_in,
        }
    }

    /// The bearer token.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// When the token was issued.
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// `true` once the token has outlived its declared lifetime minus the
    /// safety buffer. Tokens without `expires_in` never expire locally; the
    /// API's `invalid_token` reply covers them.
    pub fn is_expired(&self) -> bool {
        match self.expires_in {
            Some(expires_in) => {
                let lifetime = expires_in.saturating_sub(EXPIRY_BUFFER_SECS);
                self.issued_at.elapsed().as_secs() >= lifetime
            }
            None => false,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Obtains and caches the OpsRamp bearer token.
///
/// Invariants:
/// - `session` is `None` until the first successful [`authenticate`](Self::authenticate).
/// - A failed `authenticate` clears the session.
pub struct TokenProvider {
    client: reqwest::Client,
    token_url: String,
    credentials: Credentials,
    session: Option<Session>,
}

impl TokenProvider {
    /// Provider for the token endpoint of `subdomain`.
    pub fn new(subdomain: &str, credentials: Credentials) -> Self {
        Self::with_token_url(&TOKEN_URL.replace("{subdomain}", subdomain), credentials)
    }

    /// Provider against an explicit token URL. Used by tests to point at a
    /// mock server.
    pub fn with_token_url(token_url: &str, credentials: Credentials) -> Self {
        TokenProvider {
            client: build_token_client(),
            token_url: token_url.to_string(),
            credentials,
            session: None,
        }
    }

    /// Provider with a pre-set session and no usable credentials, bypassing
    /// the token endpoint.
    pub fn with_token(token: &str) -> Self {
        let mut provider = Self::with_token_url("http://127.0.0.1:9/", Credentials::new("", ""));
        provider.session = Some(Session::new(token.to_string(), None));
        provider
    }

    /// Exchanges the client credentials for a new session and installs it.
    ///
    /// The body is read as text before the status check so the server's
    /// error description ends up in the error.
    pub async fn authenticate(&mut self) -> Result<&Session> {
        self.session = None;

        let form = TokenRequest {
            grant_type: "client_credentials",
            client_id: &self.credentials.client_key,
            client_secret: &self.credentials.client_secret,
        };

        let response = self
            .client
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| OpsRampError::Auth {
                message: format!("token request to {} failed", self.token_url),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(OpsRampError::Auth {
                message: format!("token request failed ({status}): {body}"),
                source: None,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| OpsRampError::Auth {
            message: "failed to parse token response".to_string(),
            source: Some(Box::new(e)),
        })?;

        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OpsRampError::Auth {
                message: "token response carried no access_token".to_string(),
                source: None,
            })?;

        log::info!("Access Token fetched successfully");
        Ok(self.session.insert(Session::new(token, parsed.expires_in)))
    }

    /// The current session, or `None` if absent or expired.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref().filter(|s| !s.is_expired())
    }

    /// Drops the cached session so the next request re-authenticates.
    pub fn invalidate(&mut self) {
        self.session = None;
    }
}

fn build_token_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(TOKEN_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
