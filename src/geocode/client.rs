//! CEP Aberto HTTP transport
//!
//! Wraps a `reqwest::Client` configured once with the API token and request
//! timeout. The fetcher talks to the network only through the [`Transport`]
//! trait so the retry loop can be exercised without a live server.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

/// Base URL for the CEP Aberto v3 lookup endpoint
pub const CEP_ABERTO_BASE_URL: &str = "https://www.cepaberto.com/api/v3/cep";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Status code and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Network-level failures (no HTTP status was received)
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established or was reset
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other failure raised by the HTTP client
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Errors raised while building the HTTP client
#[derive(Debug, Error)]
pub enum ClientError {
    /// The token cannot be placed in an HTTP header
    #[error("API token contains characters not allowed in an HTTP header")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),

    /// reqwest refused the client configuration
    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Something that can issue a geocoding GET for a postal code
pub trait Transport: Send + Sync {
    fn get<'a>(&'a self, cep: &'a str) -> BoxFuture<'a, Result<HttpReply, TransportError>>;
}

/// Settings for the CEP Aberto client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint receiving `?cep=<code>`
    pub base_url: String,
    /// CEP Aberto API token
    pub token: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a config for the public endpoint with the default timeout
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: CEP_ABERTO_BASE_URL.to_string(),
            token: token.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the endpoint (self-hosted mirrors, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// reqwest-backed transport for the CEP Aberto API
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Builds the HTTP client with the authorization header and timeout preset
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut auth = HeaderValue::from_str(&format!("Token token={}", config.token))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    /// The endpoint this transport queries
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, cep: &str) -> Result<HttpReply, TransportError> {
        debug!(cep, url = %self.base_url, "GET");
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("cep", cep)])
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        Ok(HttpReply { status, body })
    }
}

impl Transport for HttpTransport {
    fn get<'a>(&'a self, cep: &'a str) -> BoxFuture<'a, Result<HttpReply, TransportError>> {
        Box::pin(self.send(cep))
    }
}

/// Maps reqwest failures onto the transport error kinds the retry loop sees
fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err)
    }
}
