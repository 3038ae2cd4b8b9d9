//! Embedding client for OpenAI-compatible embedding APIs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::utils::{RetryOutcome, RetryPolicy, with_retry};

/// Anything that turns prompts into fixed-size vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name recorded in each point's payload.
    fn model(&self) -> &str;

    /// Length every returned vector must have.
    fn dimension(&self) -> usize;

    /// Embed `prompts`, returning one vector per prompt in the same order.
    async fn embed(&self, prompts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Check every vector against the expected dimensionality.
pub fn check_dimensions(vectors: &[Vec<f32>], expected: usize) -> Result<(), EmbeddingError> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(bad) => Err(EmbeddingError::UnexpectedDimension {
            expected,
            actual: bad.len(),
        }),
        None => Ok(()),
    }
}

/// Request body for the /embeddings endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

/// Response from the /embeddings endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    index: usize,
}

/// Client for the remote embedding service.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| EmbeddingError::Auth("no API key configured".to_string()))?
            .to_string();

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EmbeddingError::TransientNetwork(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn embed_single_batch(&self, prompts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbedRequest {
            model: &self.model,
            input: prompts,
            encoding_format: "float",
        };

        debug!(inputs = prompts.len(), model = %self.model, "embedding request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, retry_after));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        into_vectors(parsed, prompts.len(), self.dimension)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, prompts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(prompts.len());
        for chunk in prompts.chunks(self.batch_size) {
            vectors.extend(self.embed_single_batch(chunk).await?);
        }
        Ok(vectors)
    }
}

fn request_error(err: reqwest::Error) -> EmbeddingError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        EmbeddingError::TransientNetwork(err.to_string())
    } else {
        EmbeddingError::InvalidResponse(err.to_string())
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn status_error(status: StatusCode, body: &str, retry_after: Option<Duration>) -> EmbeddingError {
    let message = format!("status {status}: {body}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EmbeddingError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => EmbeddingError::RateLimit {
            message,
            retry_after,
        },
        StatusCode::REQUEST_TIMEOUT => EmbeddingError::TransientNetwork(message),
        s if s.is_server_error() => EmbeddingError::TransientServer(message),
        _ => EmbeddingError::Rejected(message),
    }
}

fn into_vectors(
    mut response: EmbedResponse,
    expected_count: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.data.len() != expected_count {
        return Err(EmbeddingError::InvalidResponse(format!(
            "received {} embeddings for {} inputs",
            response.data.len(),
            expected_count
        )));
    }

    response.data.sort_by_key(|entry| entry.index);
    let vectors: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
    check_dimensions(&vectors, dimension)?;
    Ok(vectors)
}

/// Embedder wrapped in a retry policy.
///
/// Transient failures of a whole request are retried; fatal errors and
/// exhausted attempts are returned to the caller.
pub struct RetryingEmbedder<E> {
    inner: E,
    policy: RetryPolicy,
    retries: AtomicU64,
}

impl<E: Embedder> RetryingEmbedder<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            retries: AtomicU64::new(0),
        }
    }

    /// Number of extra attempts made so far.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: Embedder> Embedder for RetryingEmbedder<E> {
    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, prompts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let outcome = with_retry(&self.policy, || self.inner.embed(prompts)).await;
        self.retries
            .fetch_add(u64::from(outcome.attempts().saturating_sub(1)), Ordering::Relaxed);
        match outcome {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Failed { last_error, .. } => Err(last_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Retryable;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_client_requires_api_key() {
        let config = EmbeddingConfig::default();
        assert!(matches!(
            EmbeddingClient::new(&config),
            Err(EmbeddingError::Auth(_))
        ));
    }

    #[test]
    fn test_endpoint_trimming() {
        let config = EmbeddingConfig {
            url: "https://api.openai.com/v1/".to_string(),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let client = EmbeddingClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/embeddings");
        assert_eq!(client.dimension(), 1536);
        assert_eq!(client.model(), "text-embedding-3-small");
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "bad key", None),
            EmbeddingError::Auth(_)
        ));
        let rate = status_error(
            StatusCode::TOO_MANY_REQUESTS,
            "slow down",
            Some(Duration::from_secs(3)),
        );
        assert!(rate.is_retryable());
        assert_eq!(rate.retry_after(), Some(Duration::from_secs(3)));
        assert!(status_error(StatusCode::BAD_GATEWAY, "", None).is_retryable());
        assert!(!status_error(StatusCode::BAD_REQUEST, "too long", None).is_retryable());
    }

    #[test]
    fn test_response_reordered_by_index() {
        let response = EmbedResponse {
            data: vec![
                EmbedData {
                    embedding: vec![2.0, 2.0],
                    index: 1,
                },
                EmbedData {
                    embedding: vec![1.0, 1.0],
                    index: 0,
                },
            ],
        };
        let vectors = into_vectors(response, 2, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![2.0, 2.0]]);
    }

    #[test]
    fn test_response_dimension_mismatch() {
        let response = EmbedResponse {
            data: vec![EmbedData {
                embedding: vec![0.0; 3072],
                index: 0,
            }],
        };
        assert!(matches!(
            into_vectors(response, 1, 1536),
            Err(EmbeddingError::UnexpectedDimension {
                expected: 1536,
                actual: 3072
            })
        ));
    }

    #[test]
    fn test_response_count_mismatch() {
        let response = EmbedResponse { data: vec![] };
        assert!(matches!(
            into_vectors(response, 2, 4),
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }

    struct FlakyEmbedder {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn embed(&self, prompts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(EmbeddingError::TransientServer("503".to_string()));
            }
            Ok(prompts.iter().map(|_| vec![0.0, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_retrying_embedder_counts_retries() {
        let embedder = RetryingEmbedder::new(
            FlakyEmbedder {
                calls: AtomicU32::new(0),
                failures: 2,
            },
            RetryPolicy::new(3).with_initial_delay(Duration::from_millis(1)),
        );

        let vectors = embedder.embed(&["a".to_string()]).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(embedder.retries(), 2);
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retrying_embedder_gives_up() {
        let embedder = RetryingEmbedder::new(
            FlakyEmbedder {
                calls: AtomicU32::new(0),
                failures: 10,
            },
            RetryPolicy::new(2).with_initial_delay(Duration::from_millis(1)),
        );

        let err = embedder.embed(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::TransientServer(_)));
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 2);
    }
}
