//! Ollama-backed embedding client.
//!
//! Mirrors the other HTTP adapters by issuing requests directly to the runtime's REST API.

use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Default local Ollama address.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Embedding client calling `POST {base_url}/api/embed`.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl OllamaEmbeddingClient {
    /// Build a client for `model` served at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("docsift/embed")
            .timeout(timeout)
            .build()
            .map_err(|error| EmbeddingClientError::Unavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            dimension,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        let expected = texts.len();

        tracing::debug!(model = %self.model, texts = expected, "Requesting Ollama embeddings");

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({
                "model": self.model,
                "input": texts,
            }))
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    EmbeddingClientError::Timeout(self.timeout)
                } else {
                    EmbeddingClientError::Unavailable(format!(
                        "failed to reach Ollama at {}: {error}",
                        self.base_url
                    ))
                }
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EmbeddingClientError::Unavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: EmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if body.embeddings.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                body.embeddings.len()
            )));
        }

        Ok(body.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer, dimension: usize) -> OllamaEmbeddingClient {
        OllamaEmbeddingClient::new(
            server.base_url(),
            "nomic-embed-text",
            dimension,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .json_body_partial(r#"{"model":"nomic-embed-text"}"#);
                then.status(200).json_body(json!({
                    "model": "nomic-embed-text",
                    "embeddings": [[0.1, 0.2, 0.3]]
                }));
            })
            .await;

        let vector = client_for(&server, 3)
            .embed("refund policy")
            .await
            .expect("vector");

        mock.assert();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn ollama_client_flags_dimension_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .json_body(json!({ "embeddings": [[0.1, 0.2]] }));
            })
            .await;

        let error = client_for(&server, 3)
            .embed("refund policy")
            .await
            .expect_err("mismatch");
        assert!(matches!(
            error,
            EmbeddingClientError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(500).body("boom");
            })
            .await;

        let error = client_for(&server, 3)
            .embed("refund policy")
            .await
            .expect_err("error response");
        assert!(
            matches!(error, EmbeddingClientError::GenerationFailed(ref message) if message.contains("500"))
        );
    }

    #[tokio::test]
    async fn ollama_client_reports_missing_endpoint() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(404);
            })
            .await;

        let error = client_for(&server, 3)
            .embed("refund policy")
            .await
            .expect_err("404");
        assert!(matches!(error, EmbeddingClientError::Unavailable(_)));
    }
}
