//! Commentary service HTTP client with rate limiting

use crate::types::{ApiError, GenerateResponse, GeneratedCommentary, GenerationRequest};
use crate::CommentaryGenerator;
use async_trait::async_trait;
use lectio_core::{GenerationError, GeneratorConfig};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Generative commentary client.
///
/// POSTs a [`GenerationRequest`] as JSON to a single endpoint and normalizes
/// the reply. Concurrency is capped at `requests_per_minute` in-flight calls
/// and consecutive calls are spaced by at least `60s / rpm`.
pub struct HttpCommentaryGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    rate_limiter: Arc<Semaphore>,
    last_request: Arc<AtomicU64>,
    min_request_interval_ms: u64,
    start_time: Instant,
}

impl HttpCommentaryGenerator {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `endpoint` - Full URL of the generation endpoint
    /// * `requests_per_minute` - Maximum requests per minute
    pub fn new(endpoint: impl Into<String>, requests_per_minute: u32) -> Self {
        Self::with_client(Client::new(), endpoint, requests_per_minute)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>, requests_per_minute: u32) -> Self {
        let rpm = requests_per_minute.max(1);
        let min_interval_ms = (60_000 / rpm as u64).max(10);

        Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
            rate_limiter: Arc::new(Semaphore::new(rpm as usize)),
            last_request: Arc::new(AtomicU64::new(0)),
            min_request_interval_ms: min_interval_ms,
            start_time: Instant::now(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the minimum spacing between requests.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Build from configuration, applying the configured request timeout.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Transport {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        let generator = Self::with_client(client, config.endpoint.clone(), config.requests_per_minute);
        Ok(match &config.api_key {
            Some(key) => generator.with_api_key(key.clone()),
            None => generator,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn pace(&self) {
        let now_ms = self.start_time.elapsed().as_millis() as u64;
        let last_ms = self.last_request.load(Ordering::Relaxed);
        let elapsed = now_ms.saturating_sub(last_ms);

        // First call goes straight through
        if last_ms != 0 && elapsed < self.min_request_interval_ms {
            let wait_ms = self.min_request_interval_ms - elapsed;
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }

        self.last_request
            .store(self.start_time.elapsed().as_millis().max(1) as u64, Ordering::Relaxed);
    }
}

#[async_trait]
impl CommentaryGenerator for HttpCommentaryGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedCommentary, GenerationError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| GenerationError::Transport {
                reason: format!("Rate limiter error: {}", e),
            })?;
        self.pace().await;

        tracing::debug!(
            book = request.book(),
            chapter = request.chapter(),
            anchor_verse = ?request.anchor_verse(),
            "Requesting commentary generation"
        );

        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| GenerationError::Transport {
            reason: format!("HTTP request failed: {}", e),
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ApiError>(&error_text)
                .ok()
                .and_then(ApiError::into_message)
                .unwrap_or(error_text);
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| GenerationError::InvalidResponse {
                    reason: format!("Failed to parse response: {}", e),
                })?;

        body.normalize(request)
    }
}

impl std::fmt::Debug for HttpCommentaryGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCommentaryGenerator")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("min_request_interval_ms", &self.min_request_interval_ms)
            .finish()
    }
}
