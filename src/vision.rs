//! Image vectorize client with bounded retry.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use crate::error::VectorizeError;
use crate::models::ImageEmbedding;

const VECTORIZE_ROUTE: &str = "computervision/retrieval:vectorizeImage";
const API_VERSION: &str = "2023-02-01-preview";
const SUBSCRIPTION_KEY_HEADER: HeaderName =
    HeaderName::from_static("ocp-apim-subscription-key");

/// Turns an image URL into an embedding vector. Seam for pipeline tests.
#[async_trait]
pub trait ImageVectorizer: Send + Sync {
    /// Produces the embedding for one image, retrying transient failures.
    async fn vectorize(&self, image_url: &str) -> Result<ImageEmbedding, VectorizeError>;
}

/// HTTP client for the remote vision service's vectorize endpoint.
///
/// Stateless across calls; one underlying [`Client`] is reused for connection
/// pooling only.
#[derive(Clone)]
pub struct VisionClient {
    client: Client,
    url: String,
    max_attempts: usize,
    retry_base: Duration,
}

impl VisionClient {
    /// Builds a new vectorize client.
    ///
    /// `max_attempts` is the total attempt budget per call (first try
    /// included); `retry_base` scales the exponential backoff (delay after
    /// failed attempt `n` is `retry_base * 2^(n-1)`: 2s, 4s, 8s... with the
    /// default 2s base).
    pub fn new(
        api_key: String,
        endpoint: String,
        timeout: Duration,
        max_attempts: usize,
        retry_base: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing vision API key");
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "vision endpoint must be an http(s) URL"
        );
        let mut headers = HeaderMap::new();
        headers.insert(
            SUBSCRIPTION_KEY_HEADER,
            HeaderValue::from_str(api_key.trim()).context("invalid vision API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build vision HTTP client")?;
        let url = format!(
            "{}/{}?api-version={}&modelVersion=latest",
            endpoint.trim_end_matches('/'),
            VECTORIZE_ROUTE,
            API_VERSION
        );
        Ok(Self {
            client,
            url,
            max_attempts: max_attempts.max(1),
            retry_base,
        })
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.clamp(1, 6) as u32;
        self.retry_base * (1 << (capped - 1))
    }
}

#[async_trait]
impl ImageVectorizer for VisionClient {
    async fn vectorize(&self, image_url: &str) -> Result<ImageEmbedding, VectorizeError> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let request = VectorizeRequest { url: image_url };
            let response = self.client.post(&self.url).json(&request).send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: VectorizeResponse =
                            resp.json().await.map_err(VectorizeError::Malformed)?;
                        return Ok(ImageEmbedding {
                            vector: parsed.vector,
                            model_version: parsed.model_version,
                        });
                    }
                    if should_retry(status) && attempt < self.max_attempts {
                        warn!(%status, attempt, "vectorize attempt failed; backing off");
                        sleep(self.backoff(attempt)).await;
                        continue;
                    }
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    return Err(VectorizeError::Status {
                        status,
                        attempts: attempt,
                        body,
                    });
                }
                Err(err) => {
                    if is_retryable_transport(&err) && attempt < self.max_attempts {
                        warn!(error = %err, attempt, "vectorize transport error; backing off");
                        sleep(self.backoff(attempt)).await;
                        continue;
                    }
                    return Err(VectorizeError::Transport {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}

// 404 is retried: the service may transiently 404 while warming.
fn should_retry(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::NOT_FOUND
}

fn is_retryable_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

#[derive(Serialize)]
struct VectorizeRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct VectorizeResponse {
    #[serde(rename = "modelVersion")]
    model_version: String,
    vector: Vec<f32>,
}
