//! REST client for the OVH API.
//!
//! The client is split along a [`Transport`] seam: resources and the
//! poller talk to [`OvhClient`], which serializes typed bodies and
//! decodes typed responses; the production [`RestTransport`] signs and
//! issues the HTTP calls, and tests substitute the scripted transport
//! from [`crate::testing`].

use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha1::{Digest, Sha1};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{ApiError, ProviderError};

/// HTTP method of an API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
    /// HTTP PUT.
    Put,
    /// HTTP DELETE.
    Delete,
}

impl Method {
    /// The method as an uppercase string, as used in request signing.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Raw request issuance, the seam between the typed client and HTTP.
///
/// Implementations return the decoded JSON response body, `Value::Null`
/// for empty bodies, and [`ApiError::Api`] for vendor error statuses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one call against the vendor API.
    async fn send(&self, method: Method, path: &str, body: Option<&Value>)
        -> Result<Value, ApiError>;
}

/// Typed client used by every resource handler.
///
/// Cloning is cheap; clones share the underlying transport. The client
/// is safe for concurrent use across resource operations.
#[derive(Clone)]
pub struct OvhClient {
    transport: Arc<dyn Transport>,
}

impl OvhClient {
    /// Create a client over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// `GET path`, decoding the response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(Method::Get, path, None).await
    }

    /// `POST path` with a JSON body, decoding the response.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = encode_body(path, body)?;
        self.call(Method::Post, path, Some(body)).await
    }

    /// `POST path` without a body, decoding the response.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(Method::Post, path, None).await
    }

    /// `PUT path` with a JSON body. The response body is discarded.
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let body = encode_body(path, body)?;
        self.transport.send(Method::Put, path, Some(&body)).await?;
        Ok(())
    }

    /// `DELETE path`. The response body is discarded.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.transport.send(Method::Delete, path, None).await?;
        Ok(())
    }

    /// `DELETE path`, decoding the response (some teardown endpoints
    /// return the async task handling the removal).
    pub async fn delete_into<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(Method::Delete, path, None).await
    }

    /// `DELETE path` with a JSON body. The response body is discarded.
    pub async fn delete_with_body<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ApiError> {
        let body = encode_body(path, body)?;
        self.transport
            .send(Method::Delete, path, Some(&body))
            .await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let raw = self.transport.send(method, path, body.as_ref()).await?;
        serde_json::from_value(raw).map_err(|e| ApiError::Json {
            path: path.to_string(),
            source: e,
        })
    }
}

fn encode_body<B: Serialize + ?Sized>(path: &str, body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Json {
        path: path.to_string(),
        source: e,
    })
}

/// Application credentials for signed API access.
#[derive(Clone)]
pub struct Credentials {
    /// Application key, sent with every signed request.
    pub application_key: String,
    /// Application secret, used only to sign.
    pub application_secret: String,
    /// Consumer key identifying the granted authorization.
    pub consumer_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("application_key", &self.application_key)
            .field("application_secret", &"<redacted>")
            .field("consumer_key", &"<redacted>")
            .finish()
    }
}

/// HTTPS transport signing requests the way the OVH API requires.
///
/// With credentials, every request carries `X-Ovh-Application`,
/// `X-Ovh-Consumer`, `X-Ovh-Timestamp` and an `X-Ovh-Signature` over the
/// secret, consumer key, method, full URL, body and timestamp.
/// Timestamps are corrected by the drift between the vendor clock
/// (`GET /auth/time`) and the local clock, fetched once per transport.
/// Without credentials the transport issues plain requests, enough for
/// the read-only endpoints.
pub struct RestTransport {
    http: reqwest::Client,
    endpoint: String,
    credentials: Option<Credentials>,
    time_drift: OnceCell<i64>,
}

impl RestTransport {
    /// Create an unauthenticated transport against `endpoint`
    /// (e.g. `https://eu.api.ovh.com/1.0`).
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ProviderError> {
        Self::build(endpoint.into(), None)
    }

    /// Create a signing transport against `endpoint`.
    pub fn with_credentials(
        endpoint: impl Into<String>,
        credentials: Credentials,
    ) -> Result<Self, ProviderError> {
        Self::build(endpoint.into(), Some(credentials))
    }

    fn build(endpoint: String, credentials: Option<Credentials>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().build().map_err(|e| {
            ProviderError::Configuration(format!("cannot build HTTP client: {e}"))
        })?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
            time_drift: OnceCell::new(),
        })
    }

    /// Difference between the vendor clock and the local clock, fetched
    /// once and cached.
    async fn drift(&self) -> Result<i64, ApiError> {
        self.time_drift
            .get_or_try_init(|| async {
                let path = "/auth/time";
                let url = format!("{}{}", self.endpoint, path);
                let response = self.http.get(&url).send().await.map_err(|e| {
                    ApiError::Transport {
                        method: "GET".to_string(),
                        path: path.to_string(),
                        source: e,
                    }
                })?;
                let status = response.status();
                let text = response.text().await.map_err(|e| ApiError::Transport {
                    method: "GET".to_string(),
                    path: path.to_string(),
                    source: e,
                })?;
                if !status.is_success() {
                    return Err(ApiError::Api {
                        method: "GET".to_string(),
                        path: path.to_string(),
                        status: status.as_u16(),
                        message: vendor_message(&text),
                    });
                }
                let server: i64 = text.trim().parse().map_err(|_| ApiError::Api {
                    method: "GET".to_string(),
                    path: path.to_string(),
                    status: status.as_u16(),
                    message: format!("unexpected /auth/time body: {text:?}"),
                })?;
                Ok(server - unix_now())
            })
            .await
            .copied()
    }
}

#[async_trait]
impl Transport for RestTransport {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.endpoint, path);
        let body_text = match body {
            Some(v) => serde_json::to_string(v).map_err(|e| ApiError::Json {
                path: path.to_string(),
                source: e,
            })?,
            None => String::new(),
        };

        let mut request = self.http.request(method.into(), &url);
        if body.is_some() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body_text.clone());
        }

        if let Some(creds) = &self.credentials {
            let timestamp = unix_now() + self.drift().await?;
            request = request
                .header("X-Ovh-Application", &creds.application_key)
                .header("X-Ovh-Timestamp", timestamp.to_string())
                .header(
                    "X-Ovh-Signature",
                    signature(
                        &creds.application_secret,
                        &creds.consumer_key,
                        method.as_str(),
                        &url,
                        &body_text,
                        timestamp,
                    ),
                );
            if !creds.consumer_key.is_empty() {
                request = request.header("X-Ovh-Consumer", &creds.consumer_key);
            }
        }

        debug!(%method, path, "issuing OVH API call");
        let response = request.send().await.map_err(|e| ApiError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            source: e,
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            source: e,
        })?;

        if !status.is_success() {
            return Err(ApiError::Api {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                message: vendor_message(&text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Json {
            path: path.to_string(),
            source: e,
        })
    }
}

/// The `$1$`-prefixed hex SHA-1 the OVH API expects in `X-Ovh-Signature`.
fn signature(
    application_secret: &str,
    consumer_key: &str,
    method: &str,
    url: &str,
    body: &str,
    timestamp: i64,
) -> String {
    let digest = Sha1::digest(
        format!("{application_secret}+{consumer_key}+{method}+{url}+{body}+{timestamp}").as_bytes(),
    );
    let mut out = String::with_capacity(3 + digest.len() * 2);
    out.push_str("$1$");
    for byte in digest {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Extract the vendor's error message from a response body, falling back
/// to the raw text.
fn vendor_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct VendorError {
        message: String,
    }

    match serde_json::from_str::<VendorError>(body) {
        Ok(e) => e.message,
        Err(_) => body.trim().to_string(),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
