//! Injectable HTTP transport
//!
//! The routing core never talks to `reqwest` directly. Everything goes
//! through [`HttpTransport`] so dispatch, probing and fallback can be tested
//! with scripted transports or mock servers.

use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use std::time::Duration;

/// Incremental body chunks of a streamed response, in transport order
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Minimal HTTP client contract used by the router
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET a JSON document
    async fn get_json(&self, url: &str) -> Result<Value, TransportError>;

    /// POST a JSON body and read a single JSON response
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, TransportError>;

    /// POST a JSON body and return the response body as a chunk stream
    ///
    /// Non-2xx statuses fail before any chunk is produced.
    async fn post_stream(&self, url: &str, body: &Value) -> Result<ChunkStream, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the given connect timeout
    ///
    /// Request timeouts are applied per call by the dispatcher and the probe,
    /// because they differ by tier.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    async fn check_status(
        url: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read error body>".to_string());
        tracing::debug!(url = %url, status = %status, "Non-success HTTP status");
        Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    fn request_error(url: &str, e: reqwest::Error) -> TransportError {
        TransportError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }

    async fn read_json(url: &str, response: reqwest::Response) -> Result<Value, TransportError> {
        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::request_error(url, e))?;
        let response = Self::check_status(url, response).await?;
        Self::read_json(url, response).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Self::request_error(url, e))?;
        let response = Self::check_status(url, response).await?;
        Self::read_json(url, response).await
    }

    async fn post_stream(&self, url: &str, body: &Value) -> Result<ChunkStream, TransportError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(|e| Self::request_error(url, e))?;
        let response = Self::check_status(url, response).await?;

        let url = url.to_string();
        Ok(response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map(|bytes| bytes.to_vec()).map_err(|e| TransportError::Stream {
                    url: url.clone(),
                    reason: e.to_string(),
                })
            })
            .boxed())
    }
}
