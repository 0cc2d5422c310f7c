//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so tests can run
//! against an in-process server. [`ReqwestClient`] is the production client.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;
use waybill_sync_protocol::{ApiEnvelope, HttpMethod, PullData, Route};

/// A request as handed to an [`HttpClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Verb.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Sent as `Authorization: Bearer <token>`.
    pub bearer_token: String,
    /// JSON body.
    pub body: Option<Vec<u8>>,
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Builds a response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string().into_bytes(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations return `Err` only when no response was received
/// (connection failure, timeout). Any status code is an `Ok` response.
pub trait HttpClient: Send + Sync {
    /// Sends one request.
    fn send(&self, request: &HttpRequest) -> SyncResult<HttpResponse>;

    /// Whether the device currently has connectivity.
    fn is_online(&self) -> bool {
        true
    }
}

/// Blocking `reqwest` client.
///
/// Must be built and dropped outside an async context; the engine only
/// calls it from blocking threads.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl ReqwestClient {
    /// Creates a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("waybill/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, request: &HttpRequest) -> SyncResult<HttpResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        }
        .bearer_auth(&request.bearer_token)
        .header(reqwest::header::ACCEPT, "application/json");

        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(transport_error)?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Network(err.to_string())
    }
}

/// HTTP-based sync transport speaking the JSON envelope protocol.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    connected: AtomicBool,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            connected: AtomicBool::new(true),
        }
    }

    /// Creates a transport against `config.server_url`.
    pub fn with_config(config: &SyncConfig, client: C) -> Self {
        Self::new(config.server_url.clone(), client)
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn call(&self, route: &Route, body: Option<&Value>, token: &str) -> SyncResult<Option<Value>> {
        let request = HttpRequest {
            method: route.method,
            url: format!("{}{}", self.base_url, route.path),
            bearer_token: token.to_string(),
            body: body.map(|b| b.to_string().into_bytes()),
        };
        let response = self.client.send(&request)?;
        debug!(route = %route, status = response.status, "server responded");
        interpret(&response)
    }
}

impl HttpTransport<ReqwestClient> {
    /// Creates the production transport for `config`, honouring its server
    /// URL and request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the server URL is empty or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        if config.server_url.trim().is_empty() {
            return Err(SyncError::Network("no server URL configured".into()));
        }
        Ok(Self::with_config(config, ReqwestClient::new(config.timeout)?))
    }
}

/// Turns a response into its envelope `data`, or the failure it describes.
fn interpret(response: &HttpResponse) -> SyncResult<Option<Value>> {
    if !response.is_success() {
        let message = match ApiEnvelope::from_body(&response.body) {
            Ok(envelope) if envelope.error.is_some() => envelope.failure_message(),
            _ => body_excerpt(&response.body),
        };
        return Err(SyncError::from_status(response.status, message));
    }

    let envelope = ApiEnvelope::from_body(&response.body)?;
    if !envelope.success {
        return Err(SyncError::Rejected {
            status: response.status,
            message: envelope.failure_message(),
        });
    }
    Ok(envelope.data)
}

fn body_excerpt(body: &[u8]) -> String {
    const LIMIT: usize = 200;
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() > LIMIT {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn send_entry(&self, route: &Route, body: Option<&Value>, token: &str) -> SyncResult<Option<Value>> {
        self.call(route, body, token)
    }

    fn pull(&self, last_sync_at: i64, token: &str) -> SyncResult<PullData> {
        let data = self.call(&Route::pull(last_sync_at), None, token)?;
        Ok(PullData::from_data(data)?)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_online()
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use parking_lot::Mutex;
    use serde_json::json;
    use waybill_sync_protocol::{EntityType, Operation};

    struct Canned {
        response: SyncResult<HttpResponse>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Canned {
        fn new(response: SyncResult<HttpResponse>) -> Self {
            Self {
                response,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpClient for Canned {
        fn send(&self, request: &HttpRequest) -> SyncResult<HttpResponse> {
            self.seen.lock().push(request.clone());
            match &self.response {
                Ok(r) => Ok(r.clone()),
                Err(_) => Err(SyncError::Timeout),
            }
        }
    }

    fn transport(response: SyncResult<HttpResponse>) -> HttpTransport<Canned> {
        HttpTransport::new("https://erp.example.com/api/", Canned::new(response))
    }

    fn create_route() -> Route {
        Route::for_entry(EntityType::Item, Operation::Create, "it-1")
    }

    #[test]
    fn builds_absolute_url_with_bearer_and_body() {
        let t = transport(Ok(HttpResponse::json(201, &json!({ "success": true }))));
        t.send_entry(&create_route(), Some(&json!({ "id": "it-1" })), "tok")
            .unwrap();

        let seen = t.client().seen.lock();
        assert_eq!(seen[0].url, "https://erp.example.com/api/items");
        assert_eq!(seen[0].method, HttpMethod::Post);
        assert_eq!(seen[0].bearer_token, "tok");
        assert_eq!(seen[0].body.as_deref(), Some(br#"{"id":"it-1"}"#.as_slice()));
    }

    #[test]
    fn success_returns_data() {
        let t = transport(Ok(HttpResponse::json(
            200,
            &json!({ "success": true, "data": { "id": "it-1" } }),
        )));
        let data = t.send_entry(&create_route(), None, "tok").unwrap();
        assert_eq!(data, Some(json!({ "id": "it-1" })));
    }

    #[test]
    fn success_false_is_rejected() {
        let t = transport(Ok(HttpResponse::json(
            200,
            &json!({ "success": false, "error": { "code": "DUPLICATE", "message": "exists" } }),
        )));
        let err = t.send_entry(&create_route(), None, "tok").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Rejected);
        assert!(err.to_string().contains("DUPLICATE: exists"));
    }

    #[test]
    fn error_statuses_are_classified() {
        let t = transport(Ok(HttpResponse {
            status: 502,
            body: b"<html>Bad Gateway</html>".to_vec(),
        }));
        let err = t.send_entry(&create_route(), None, "tok").unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transient);
        assert!(err.to_string().contains("Bad Gateway"));

        let t = transport(Ok(HttpResponse::json(
            422,
            &json!({ "success": false, "error": { "code": "VALIDATION_ERROR", "message": "weight" } }),
        )));
        let err = t.send_entry(&create_route(), None, "tok").unwrap_err();
        assert!(matches!(err, SyncError::Rejected { status: 422, .. }));
    }

    #[test]
    fn no_response_is_transient() {
        let t = transport(Err(SyncError::Timeout));
        let err = t.pull(0, "tok").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn pull_parses_data() {
        let t = transport(Ok(HttpResponse::json(
            200,
            &json!({ "success": true, "data": { "item": [], "serverTime": 9 } }),
        )));
        let data = t.pull(5, "tok").unwrap();
        assert_eq!(data.server_time, Some(9));
        assert_eq!(
            t.client().seen.lock()[0].url,
            "https://erp.example.com/api/sync/pull?lastSyncAt=5"
        );
    }

    #[test]
    fn connectivity_flag() {
        let t = transport(Err(SyncError::Timeout));
        assert!(t.is_connected());
        t.set_connected(false);
        assert!(!t.is_connected());
    }

    #[test]
    fn config_supplies_url_and_timeout() {
        let config = SyncConfig::new("https://erp.example.com/api/")
            .with_timeout(Duration::from_secs(7));
        let t = HttpTransport::from_config(&config).unwrap();
        assert_eq!(t.base_url(), "https://erp.example.com/api");
        assert_eq!(t.client().timeout(), Duration::from_secs(7));

        assert!(HttpTransport::from_config(&SyncConfig::default()).is_err());
    }

    #[test]
    fn long_bodies_are_cut() {
        let excerpt = body_excerpt("x".repeat(500).as_bytes());
        assert_eq!(excerpt.len(), 203);
    }
}
