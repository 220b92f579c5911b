//! HTTP client for the relay endpoints
//!
//! One reqwest client is built per process and reused for connection
//! pooling. Every request is bounded by the configured timeout.

use crate::domain::record::MetricRecord;
use crate::services::poller::MetricsSource;
use crate::services::simulator::MetricsSink;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Why a round trip to the relay failed
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(timeout)
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_decode() || err.is_body() {
            TransportError::Malformed(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Body of a successful `POST /metrics`
#[derive(Debug, Deserialize)]
struct IngestReply {
    status: String,
    metrics: serde_json::Value,
}

/// Longest error body kept in `TransportError::Status`
const MAX_ERROR_BODY: usize = 256;

pub struct HttpMetricsClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpMetricsClient {
    /// `url` is the full `/metrics` endpoint URL
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .http1_only()
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client, url: url.into(), timeout })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<bytes::Bytes, TransportError> {
        let status = response.status();
        let body = response.bytes().await.map_err(|e| TransportError::from_reqwest(e, self.timeout))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            let text: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(TransportError::Status { code: status.as_u16(), body: text });
        }
        Ok(body)
    }

    /// `GET /metrics`
    pub async fn get_metrics(&self) -> Result<MetricRecord, TransportError> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, self.timeout))?;

        let body = self.read_body(response).await?;
        MetricRecord::from_slice(&body).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// `POST /metrics`, returning the full stored record from the ack
    pub async fn post_metrics(&self, record: &MetricRecord) -> Result<MetricRecord, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, self.timeout))?;

        let body = self.read_body(response).await?;
        let reply: IngestReply =
            serde_json::from_slice(&body).map_err(|e| TransportError::Malformed(e.to_string()))?;
        if reply.status != "updated" {
            return Err(TransportError::Malformed(format!("unexpected ack status '{}'", reply.status)));
        }
        MetricRecord::from_json_value(reply.metrics)
            .map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsClient {
    async fn fetch(&self) -> Result<MetricRecord, TransportError> {
        self.get_metrics().await
    }
}

#[async_trait]
impl MetricsSink for HttpMetricsClient {
    async fn push(&self, record: &MetricRecord) -> Result<MetricRecord, TransportError> {
        self.post_metrics(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            HttpMetricsClient::new(format!("http://{addr}/metrics"), Duration::from_millis(500))
                .unwrap();
        let err = client.get_metrics().await.unwrap_err();
        assert!(
            matches!(err, TransportError::Connect(_) | TransportError::Request(_)),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let client =
            HttpMetricsClient::new(format!("http://{addr}/metrics"), Duration::from_millis(100))
                .unwrap();
        let err = client.get_metrics().await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)), "unexpected error: {err}");

        hold.abort();
    }
}
