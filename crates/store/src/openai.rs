use crate::embedder::Embedder;
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-ada-002";

const MAX_ATTEMPTS: usize = 4;

/// Client for OpenAI-compatible `POST /embeddings` endpoints.
///
/// Rate limits (429) and server errors are retried with capped exponential
/// backoff; everything else surfaces as [`StoreError::EmbeddingError`].
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(StoreError::EmbeddingError("missing API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(StoreError::EmbeddingError("missing model id".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|err| StoreError::EmbeddingError(format!("invalid API key: {err}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| {
                StoreError::EmbeddingError(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
        })
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: text,
            };
            match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse =
                            response.json().await.map_err(|err| {
                                StoreError::EmbeddingError(format!(
                                    "failed to parse embeddings response: {err}"
                                ))
                            })?;
                        if parsed.data.len() > 1 {
                            return Err(StoreError::EmbeddingError(format!(
                                "embeddings endpoint returned {} vectors for one input",
                                parsed.data.len()
                            )));
                        }
                        return parsed
                            .data
                            .into_iter()
                            .next()
                            .map(|entry| entry.embedding)
                            .ok_or_else(|| {
                                StoreError::EmbeddingError(
                                    "embeddings endpoint returned no vectors".to_string(),
                                )
                            });
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < MAX_ATTEMPTS {
                        attempt += 1;
                        log::warn!("Embeddings request returned {status}, retry {attempt}");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(StoreError::EmbeddingError(format!(
                        "embeddings request failed ({status}): {body}"
                    )));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < MAX_ATTEMPTS {
                        attempt += 1;
                        log::warn!("Embeddings request failed ({err}), retry {attempt}");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(StoreError::EmbeddingError(format!(
                        "embeddings request failed: {err}"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request_embedding(text).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request() || err.is_decode()
}

fn retry_backoff(attempt: usize) -> Duration {
    Duration::from_millis(500 * (1 << attempt.min(5) as u32))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn retries_cover_rate_limits_and_server_errors() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
        assert!(!should_retry(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(retry_backoff(2), Duration::from_millis(2000));
        assert_eq!(retry_backoff(5), Duration::from_millis(16_000));
        assert_eq!(retry_backoff(50), Duration::from_millis(16_000));
    }

    #[test]
    fn rejects_blank_api_key_and_model() {
        let blank_key = OpenAiEmbedder::new(
            "   ",
            DEFAULT_OPENAI_BASE_URL,
            DEFAULT_OPENAI_MODEL,
            1536,
            Duration::from_secs(5),
        );
        assert!(blank_key.is_err());

        let blank_model =
            OpenAiEmbedder::new("key", DEFAULT_OPENAI_BASE_URL, "", 1536, Duration::from_secs(5));
        assert!(blank_model.is_err());
    }

    #[test]
    fn endpoint_joins_base_url_without_double_slash() {
        let embedder = OpenAiEmbedder::new(
            "key",
            "https://example.test/v1/",
            DEFAULT_OPENAI_MODEL,
            8,
            Duration::from_secs(5),
        )
        .expect("build embedder");
        assert_eq!(embedder.endpoint, "https://example.test/v1/embeddings");
        assert_eq!(embedder.dimension(), 8);
    }
}
