//! Origin fetch boundary.
//!
//! The controller never interprets payload semantics; it only needs the
//! status, headers, and body of an exchange to make caching decisions.
//! [`Fetch`] is the seam between the dispatcher and the network, so tests
//! can substitute a scripted fetcher for the real HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Join a local resource path onto an origin base URL.
pub fn join_origin(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// A request headed for the origin (or a third-party host).
#[derive(Debug, Clone)]
pub struct OriginRequest {
    /// HTTP method, uppercase.
    pub method: String,

    /// Absolute request URL, query included.
    pub url: String,

    /// Request headers to forward.
    pub headers: Vec<(String, String)>,

    /// Request body (empty for GET).
    pub body: Bytes,
}

impl OriginRequest {
    /// Build a bare GET request for a URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }
}

/// A response as observed at the fetch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response headers.
    pub headers: Vec<(String, String)>,

    /// Complete response body.
    pub body: Bytes,
}

impl OriginResponse {
    /// Whether this response counts as a success for caching decisions.
    /// Anything outside 2xx is treated as a fetch failure where a strategy
    /// defines a fallback.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// The network boundary the strategies fetch through.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Perform one request/response exchange.
    ///
    /// Returns `Ok` for any exchange that completed at the transport level,
    /// non-success statuses included; `Err` only for transport failures.
    async fn fetch(&self, request: &OriginRequest) -> Result<OriginResponse, FetchError>;
}

/// Real HTTP fetcher backed by reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &OriginRequest) -> Result<OriginResponse, FetchError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FetchError::InvalidMethod(request.method.clone()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|source| FetchError::Transport {
            url: request.url.clone(),
            source: Box::new(source),
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(|source| FetchError::Transport {
            url: request.url.clone(),
            source: Box::new(source),
        })?;

        Ok(OriginResponse {
            status,
            headers,
            body,
        })
    }
}
