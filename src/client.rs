//! Authenticated HTTP client for the OpsRamp REST API.
//!
//! Every outbound call funnels through [`OpsRampClient::execute`], the single
//! response interpreter shared by all endpoint modules:
//!
//! 1. The body is decoded as JSON; a decode failure is an empty body.
//! 2. A 429, or a reply whose `error`/`message`/`code` fields carry the
//!    throttle marker, is waited out (per the [`RetryPolicy`]) and the
//!    identical request is sent again. Only throttled replies count against
//!    the retry budget.
//! 3. A 401, or a reply whose signal fields carry the invalid-token marker,
//!    re-runs the authenticator and re-sends the identical request once.
//! 4. A 2xx status yields a successful [`Reply`].
//! 5. Anything else yields a failed [`Reply`] with the decoded body.
//!
//! Retries are an explicit bounded loop, not recursion. The token lives in a
//! `Mutex<TokenProvider>`; the lock is held for the token check/refresh only,
//! never across the API round-trip.

use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::auth::TokenProvider;
use crate::error::{OpsRampError, Result};
use crate::page::Page;
use crate::retry::RetryPolicy;

const BASE_URL: &str = "https://{subdomain}.api.opsramp.com/";

/// Marker the API embeds in bodies of rate-limited responses.
pub const THROTTLE_MARKER: &str = "throttled";

/// Marker the API embeds when the bearer token is invalid or expired.
pub const INVALID_TOKEN_MARKER: &str = "invalid_token";

/// Transport settings for [`OpsRampClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// TCP + TLS handshake limit.
    pub connect_timeout: Duration,
    /// Whole round-trip limit for a single request.
    pub request_timeout: Duration,
    /// Throttle/re-auth retry policy.
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

fn build_api_client(options: &ClientOptions) -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(options.connect_timeout)
        .timeout(options.request_timeout)
        .build()?)
}

/// Outcome of one logical API call after throttle and re-auth handling.
///
/// This is the uniform success/failure signal: callers either inspect it
/// (`is_success`, `error_code`) or convert it with [`Reply::into_result`].
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    body: Option<Value>,
    label: String,
}

impl Reply {
    /// Builds a reply by hand; mostly useful in tests.
    pub fn new(status: StatusCode, body: Option<Value>, label: impl Into<String>) -> Self {
        Reply {
            status,
            body,
            label: label.into(),
        }
    }

    /// HTTP status of the final response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Decoded body, `None` when empty or not JSON.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Descriptive label of the call.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// `true` for a 2xx status, whether or not a body came back.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The API error `code` carried by an object body, if any.
    pub fn error_code(&self) -> Option<String> {
        match self.body.as_ref()?.get("code")? {
            Value::String(code) if !code.trim().is_empty() => Some(code.clone()),
            Value::Number(code) => Some(code.to_string()),
            _ => None,
        }
    }

    fn body_text(&self) -> String {
        self.body
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default()
    }

    /// Success yields the body (`None` when empty); failures map to
    /// `NotFound` (404), `Conflict` (409) or `Remote`.
    pub fn into_result(self) -> Result<Option<Value>> {
        if self.is_success() {
            return Ok(self.body);
        }
        Err(match self.status {
            StatusCode::NOT_FOUND => OpsRampError::NotFound {
                what: format!("{} ({})", self.label, self.body_text()),
            },
            StatusCode::CONFLICT => OpsRampError::Conflict {
                message: format!("{}: {}", self.label, self.body_text()),
            },
            status => OpsRampError::Remote {
                status,
                body: self.body_text(),
            },
        })
    }

    /// Converts a successful reply into `T`. An empty success body is read
    /// as JSON `null`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        let body = self.into_result()?.unwrap_or(Value::Null);
        Ok(serde_json::from_value(body)?)
    }
}

/// Decodes a response body; anything that is not JSON is an empty body.
pub fn decode_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    serde_json::from_str(text).ok()
}

// Top-level fields the API reports throttling and token errors in.
const SIGNAL_FIELDS: [&str; 4] = ["error", "error_description", "message", "code"];

/// Whether a reply carries `marker`. A JSON object is inspected through its
/// top-level signal fields only, so entity data that happens to contain the
/// word does not count. Any other JSON shape never signals; a body that is
/// not JSON is searched whole.
fn signals(decoded: Option<&Value>, text: &str, marker: &str) -> bool {
    match decoded {
        Some(Value::Object(map)) => SIGNAL_FIELDS.iter().any(|field| {
            map.get(*field)
                .and_then(Value::as_str)
                .is_some_and(|value| value.contains(marker))
        }),
        Some(_) => false,
        None => text.contains(marker),
    }
}

/// Authenticated HTTP client for the OpsRamp REST API.
///
/// `base_url` is a `String` so tests can point it at a wiremock server.
pub struct OpsRampClient {
    client: Client,
    base_url: String,
    auth: Mutex<TokenProvider>,
    retry: RetryPolicy,
}

impl OpsRampClient {
    /// Client for `https://{subdomain}.api.opsramp.com/`.
    pub fn new(subdomain: &str, auth: TokenProvider, options: ClientOptions) -> Result<Self> {
        let base_url = BASE_URL.replace("{subdomain}", subdomain);
        Self::with_options(auth, &base_url, options)
    }

    /// Client against a custom base URL with default options.
    pub fn with_base_url(auth: TokenProvider, base_url: &str) -> Result<Self> {
        Self::with_options(auth, base_url, ClientOptions::default())
    }

    /// Client against a custom base URL.
    pub fn with_options(
        auth: TokenProvider,
        base_url: &str,
        options: ClientOptions,
    ) -> Result<Self> {
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(OpsRampClient {
            client: build_api_client(&options)?,
            base_url,
            auth: Mutex::new(auth),
            retry: options.retry,
        })
    }

    /// Replaces the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The active retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Authenticates eagerly, so bad credentials fail before any batch work.
    pub async fn authenticate(&self) -> Result<()> {
        let mut auth = self.auth.lock().await;
        auth.authenticate().await?;
        Ok(())
    }

    /// Returns a valid bearer token, authenticating first if none is cached
    /// or the cached one expired.
    async fn bearer_token(&self) -> Result<String> {
        let mut auth = self.auth.lock().await;
        if let Some(session) = auth.session() {
            return Ok(session.access_token().to_owned());
        }
        Ok(auth.authenticate().await?.access_token().to_owned())
    }

    /// Drops the cached session and authenticates again.
    async fn force_refresh(&self) -> Result<()> {
        let mut auth = self.auth.lock().await;
        auth.invalidate();
        auth.authenticate().await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    fn build_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&B>,
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(payload) = body {
            req = req.json(payload);
        }
        req
    }

    /// Sends one logical request and interprets the response.
    ///
    /// Returns `Err` only for transport failures, exhausted throttle retries,
    /// and authentication failures; every other outcome is a [`Reply`].
    pub async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        label: &str,
    ) -> Result<Reply> {
        let url = self.url(path);
        let mut attempts = 0u32;
        let mut throttled = 0u32;
        let mut reauthenticated = false;

        loop {
            attempts += 1;
            let token = self.bearer_token().await?;
            log::debug!("{method} {url} ({label}, attempt {attempts})");

            let response = self
                .build_request(method.clone(), &url, &token, body)
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let decoded = decode_body(&text);

            if status == StatusCode::TOO_MANY_REQUESTS
                || signals(decoded.as_ref(), &text, THROTTLE_MARKER)
            {
                throttled += 1;
                if !self.retry.allows_another(throttled) {
                    return Err(OpsRampError::Throttled {
                        label: label.to_string(),
                        attempts: throttled,
                    });
                }
                let wait = self.retry.delay_for(throttled);
                log::warn!("Server throttled '{label}', trying again in {wait:?}");
                tokio::time::sleep(wait).await;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED
                || signals(decoded.as_ref(), &text, INVALID_TOKEN_MARKER)
            {
                if reauthenticated {
                    return Err(OpsRampError::Auth {
                        message: format!(
                            "token rejected for '{label}' after re-authentication ({status}): {text}"
                        ),
                        source: None,
                    });
                }
                log::warn!("Token rejected for '{label}', re-authenticating");
                self.force_refresh().await?;
                reauthenticated = true;
                continue;
            }

            let reply = Reply::new(status, decoded, label);
            if reply.is_success() {
                log::info!("{label} fetched successfully");
            } else {
                log::warn!("{label} failed ({status}): {text}");
            }
            return Ok(reply);
        }
    }

    /// GET returning the raw [`Reply`].
    pub async fn get(&self, path: &str, label: &str) -> Result<Reply> {
        self.execute::<()>(Method::GET, path, None, label).await
    }

    /// POST with a JSON body returning the raw [`Reply`].
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        label: &str,
    ) -> Result<Reply> {
        self.execute(Method::POST, path, Some(body), label).await
    }

    /// POST without a body returning the raw [`Reply`].
    pub async fn post_empty(&self, path: &str, label: &str) -> Result<Reply> {
        self.execute::<()>(Method::POST, path, None, label).await
    }

    /// GET and deserialize a successful body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, label: &str) -> Result<T> {
        self.get(path, label).await?.json()
    }

    /// POST and deserialize a successful body.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        label: &str,
    ) -> Result<T> {
        self.post(path, body, label).await?.json()
    }

    /// GET one page of a list endpoint. Owned arguments keep the future
    /// independent of the caller's temporaries, which `collect_pages`
    /// closures rely on.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        path: String,
        label: String,
    ) -> Result<Page<T>> {
        let reply = self.get(&path, &label).await?;
        Page::from_reply(reply)
    }

    /// POST a query and read one page of results.
    pub async fn post_page<T: DeserializeOwned>(
        &self,
        path: String,
        body: Value,
        label: String,
    ) -> Result<Page<T>> {
        let reply = self.post(&path, &body, &label).await?;
        Page::from_reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_body_treats_garbage_as_empty() {
        assert!(decode_body("").is_none());
        assert!(decode_body("   ").is_none());
        assert!(decode_body("<html>502</html>").is_none());
        assert_eq!(decode_body(r#"{"a":1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn markers_are_read_from_signal_fields_only() {
        let envelope = json!({"error": "invalid_token", "error_description": "expired"});
        assert!(signals(Some(&envelope), "", INVALID_TOKEN_MARKER));

        let entity = json!({"results": [{"description": "throttled nightly"}]});
        assert!(!signals(Some(&entity), "", THROTTLE_MARKER));
        assert!(!signals(Some(&json!(["throttled"])), "", THROTTLE_MARKER));

        assert!(signals(None, "request throttled", THROTTLE_MARKER));
    }

    #[test]
    fn empty_success_is_still_success() {
        let reply = Reply::new(StatusCode::OK, None, "manage");
        assert!(reply.is_success());
        assert_eq!(reply.into_result().unwrap(), None);
    }

    #[test]
    fn failure_maps_to_typed_errors() {
        let not_found = Reply::new(StatusCode::NOT_FOUND, None, "job 7");
        assert!(matches!(
            not_found.into_result(),
            Err(OpsRampError::NotFound { .. })
        ));

        let conflict = Reply::new(StatusCode::CONFLICT, Some(json!({"code": "409"})), "assign");
        assert!(matches!(
            conflict.into_result(),
            Err(OpsRampError::Conflict { .. })
        ));

        let remote = Reply::new(
            StatusCode::BAD_REQUEST,
            Some(json!({"message": "bad"})),
            "create",
        );
        match remote.into_result() {
            Err(OpsRampError::Remote { status, body }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert!(body.contains("bad"));
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[test]
    fn error_code_reads_string_and_number_codes() {
        let s = Reply::new(StatusCode::BAD_REQUEST, Some(json!({"code": "0041"})), "x");
        assert_eq!(s.error_code().as_deref(), Some("0041"));

        let n = Reply::new(StatusCode::BAD_REQUEST, Some(json!({"code": 41})), "x");
        assert_eq!(n.error_code().as_deref(), Some("41"));

        let blank = Reply::new(StatusCode::OK, Some(json!({"code": ""})), "x");
        assert!(blank.error_code().is_none());

        let list = Reply::new(StatusCode::OK, Some(json!([{"code": "1"}])), "x");
        assert!(list.error_code().is_none());
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = OpsRampClient::with_base_url(
            TokenProvider::with_token("t"),
            "http://localhost:1234",
        )
        .unwrap();
        assert_eq!(client.url("/api/v2/x"), "http://localhost:1234/api/v2/x");
        assert_eq!(client.url("api/v2/x"), "http://localhost:1234/api/v2/x");
    }
}
