//! Network fetch primitive
//!
//! Models the host's `fetch` as an async trait so the worker can be driven
//! against a real HTTP client or a scripted stub. Follows fetch semantics:
//! only transport failures are errors, HTTP error statuses are responses.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur when fetching from the network
#[derive(Debug, Error)]
pub enum NetworkError {
    /// HTTP request failed before a response was produced
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Host unreachable (used by offline hosts and test stubs)
    #[error("network unreachable: {0}")]
    Unreachable(String),
}

/// An intercepted GET request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request {
    /// Absolute request URL, also the cache key
    pub url: Url,
}

impl Request {
    /// Creates a GET request for the given URL
    pub fn get(url: Url) -> Self {
        Self { url }
    }

    /// Cache key for this request
    pub fn key(&self) -> &str {
        self.url.as_str()
    }
}

/// A response as produced by the network or stored in a cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Raw response body
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a 200 response with the given body
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Creates a response with an arbitrary status and body
    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// The host's network fetch primitive
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request, failing only when no response was produced
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

#[async_trait]
impl<T: Network + ?Sized> Network for Arc<T> {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        (**self).fetch(request).await
    }
}

/// Network backed by a reqwest HTTP client
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl Default for HttpNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpNetwork {
    /// Create a new HttpNetwork with default client settings
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a new HttpNetwork with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let response = self.client.get(request.url.clone()).send().await?;

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
        let body = response.bytes().await?.to_vec();

        tracing::debug!(url = %request.url, status, bytes = body.len(), "network response");

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
