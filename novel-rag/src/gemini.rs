//! Gemini embedding provider using the Generative Language REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// The Generative Language API base URL.
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default embedding model.
const DEFAULT_MODEL: &str = "text-embedding-004";

/// The dimensionality of `text-embedding-004`.
const DEFAULT_DIMENSIONS: usize = 768;

/// Largest number of requests the API accepts in one `batchEmbedContents` call.
const MAX_BATCH_SIZE: usize = 100;

const PROVIDER: &str = "Gemini";

/// How the embedding will be used, which lets the model optimise the vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Text that will be stored and searched over.
    RetrievalDocument,
    /// A search query.
    RetrievalQuery,
    /// Symmetric semantic similarity.
    SemanticSimilarity,
}

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// Uses `reqwest` to call `:embedContent` and `:batchEmbedContents` directly.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-004` (768 dimensions).
/// - `task_type` – used for stored text, defaults to [`TaskType::RetrievalDocument`].
/// - `query_task_type` – used by [`embed_query`](EmbeddingProvider::embed_query),
///   defaults to [`TaskType::RetrievalQuery`].
/// - `output_dimensionality` – optional truncation of the output vector.
/// - `api_key` – from the constructor, or `GOOGLE_GENERATIVE_AI_API_KEY` /
///   `GOOGLE_API_KEY` via [`from_env`](GeminiEmbeddingProvider::from_env).
///
/// # Example
///
/// ```rust,ignore
/// use novel_rag::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::from_env()?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    task_type: TaskType,
    query_task_type: TaskType,
    output_dimensionality: Option<usize>,
    dimensions: usize,
}

impl GeminiEmbeddingProvider {
    /// Create a new provider with the given API key and the default
    /// request timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_key, RagConfig::default().request_timeout())
    }

    /// Create a new provider whose requests fail after `timeout`.
    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: "API key must not be empty".into(),
            });
        }

        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("failed to build HTTP client: {e}"),
            }
        })?;

        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            task_type: TaskType::RetrievalDocument,
            query_task_type: TaskType::RetrievalQuery,
            output_dimensionality: None,
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Create a new provider from the environment.
    ///
    /// Reads the key from `GOOGLE_GENERATIVE_AI_API_KEY`, falling back to
    /// `GOOGLE_API_KEY`, and the timeout from [`RagConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_GENERATIVE_AI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: "GOOGLE_GENERATIVE_AI_API_KEY or GOOGLE_API_KEY must be set".into(),
            })?;
        Self::with_timeout(api_key, RagConfig::from_env()?.request_timeout())
    }

    /// Set the model name (e.g. `gemini-embedding-001`).
    ///
    /// Call [`with_dimensions`](Self::with_dimensions) too if the model's
    /// output size differs from 768.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Declare the dimensionality the configured model returns.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Set the task type used when embedding stored text.
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Set the task type used when embedding search queries.
    pub fn with_query_task_type(mut self, task_type: TaskType) -> Self {
        self.query_task_type = task_type;
        self
    }

    /// Ask the API to truncate the output vector. Also updates
    /// [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_output_dimensionality(mut self, dims: usize) -> Self {
        self.output_dimensionality = Some(dims);
        self.dimensions = dims;
        self
    }

    /// Point the client at a different API root, e.g. a proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    fn request<'a>(
        &self,
        model: &'a str,
        text: &'a str,
        task_type: TaskType,
    ) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model,
            content: Content { parts: vec![Part { text }] },
            task_type,
            output_dimensionality: self.output_dimensionality,
        }
    }

    /// Split `texts` into request bodies of at most [`MAX_BATCH_SIZE`] entries,
    /// preserving order.
    fn batch_requests<'a>(
        &self,
        model: &'a str,
        texts: &[&'a str],
    ) -> Vec<BatchEmbedContentsRequest<'a>> {
        texts
            .chunks(MAX_BATCH_SIZE)
            .map(|batch| BatchEmbedContentsRequest {
                requests: batch
                    .iter()
                    .map(|text| self.request(model, *text, self.task_type))
                    .collect(),
            })
            .collect()
    }

    async fn embed_with(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), ?task_type, "embedding single text");

        let model = self.model_path();
        let response: EmbedContentResponse =
            self.post("embedContent", &self.request(&model, text, task_type)).await?;
        Ok(response.embedding.values)
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}/{}:{method}", self.base_url, self.model_path());

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, method, error = %e, "request failed");
                if e.is_timeout() {
                    RagError::Timeout { operation: format!("Gemini {method}") }
                } else {
                    RagError::EmbeddingError {
                        provider: PROVIDER.into(),
                        message: format!("request failed: {e}"),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, method, %status, "API error");
            return Err(RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        response.json::<R>().await.map_err(|e| {
            error!(provider = PROVIDER, method, error = %e, "failed to parse response");
            RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("failed to parse response: {e}"),
            }
        })
    }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct BatchEmbedContentsRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedContentsResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with(text, self.task_type).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_with(query, self.query_task_type).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let model = self.model_path();
        let mut embeddings = Vec::with_capacity(texts.len());
        for body in self.batch_requests(&model, texts) {
            let expected = body.requests.len();
            let response: BatchEmbedContentsResponse =
                self.post("batchEmbedContents", &body).await?;

            if response.embeddings.len() != expected {
                error!(
                    provider = PROVIDER,
                    expected,
                    actual = response.embeddings.len(),
                    "batch size mismatch"
                );
                return Err(RagError::EmbeddingError {
                    provider: PROVIDER.into(),
                    message: format!(
                        "requested {expected} embeddings, API returned {}",
                        response.embeddings.len()
                    ),
                });
            }
            embeddings.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_empty_key() {
        assert!(GeminiEmbeddingProvider::new("").is_err());
    }

    #[test]
    fn test_defaults() {
        let provider = GeminiEmbeddingProvider::new("key").unwrap();
        assert_eq!(provider.dimensions(), 768);
        assert_eq!(provider.model_path(), "models/text-embedding-004");

        let provider = provider.with_model("models/custom").with_output_dimensionality(256);
        assert_eq!(provider.model_path(), "models/custom");
        assert_eq!(provider.dimensions(), 256);
    }

    #[test]
    fn test_request_body_shape() {
        let provider = GeminiEmbeddingProvider::new("key").unwrap();
        let model = provider.model_path();
        let body = serde_json::to_value(provider.request(&model, "hello", provider.task_type))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "model": "models/text-embedding-004",
                "content": {"parts": [{"text": "hello"}]},
                "taskType": "RETRIEVAL_DOCUMENT"
            })
        );
    }

    #[test]
    fn test_queries_use_query_task_type() {
        let provider = GeminiEmbeddingProvider::new("key").unwrap();
        assert_eq!(provider.task_type, TaskType::RetrievalDocument);
        assert_eq!(provider.query_task_type, TaskType::RetrievalQuery);

        let model = provider.model_path();
        let body =
            serde_json::to_value(provider.request(&model, "who?", provider.query_task_type))
                .unwrap();
        assert_eq!(body["taskType"], "RETRIEVAL_QUERY");

        let provider = provider.with_query_task_type(TaskType::SemanticSimilarity);
        assert_eq!(provider.query_task_type, TaskType::SemanticSimilarity);
    }

    #[test]
    fn test_large_batches_are_split_in_order() {
        let provider = GeminiEmbeddingProvider::new("key").unwrap();
        let model = provider.model_path();
        let owned: Vec<String> = (0..250).map(|i| format!("chunk {i}")).collect();
        let texts: Vec<&str> = owned.iter().map(String::as_str).collect();

        let batches = provider.batch_requests(&model, &texts);
        let sizes: Vec<usize> = batches.iter().map(|b| b.requests.len()).collect();
        assert_eq!(sizes, [100, 100, 50]);

        let flattened: Vec<&str> = batches
            .iter()
            .flat_map(|b| b.requests.iter().map(|r| r.content.parts[0].text))
            .collect();
        assert_eq!(flattened, texts);

        assert_eq!(provider.batch_requests(&model, &texts[..100]).len(), 1);
        assert!(provider.batch_requests(&model, &[]).is_empty());
    }

    #[test]
    fn test_batch_response_parses() {
        let raw = r#"{"embeddings": [{"values": [0.1, 0.2]}, {"values": [0.3, 0.4]}]}"#;
        let parsed: BatchEmbedContentsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[1].values, vec![0.3, 0.4]);
    }
}
