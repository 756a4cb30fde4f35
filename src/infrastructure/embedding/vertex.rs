use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};
use crate::infrastructure::config::{Credentials, EmbeddingConfig};
use crate::infrastructure::http::{self, API_KEY_HEADER};

/// Text embeddings from the Vertex AI `predict` endpoint.
pub struct VertexEmbedding {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    project: String,
    location: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<Instance<'a>>,
}

#[derive(Serialize)]
struct Instance<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct Prediction {
    embeddings: Values,
}

#[derive(Deserialize)]
struct Values {
    values: Vec<f32>,
}

impl VertexEmbedding {
    pub fn new(
        config: &EmbeddingConfig,
        api_key: impl Into<String>,
        project: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            client: http::build_client(Duration::from_secs(config.timeout_seconds))?,
            base_url: config.endpoint_base(),
            api_key: api_key.into(),
            project: project.into(),
            location: config.location.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Needs both `API_KEY` and `PROJECT_ID`.
    pub fn from_credentials(
        config: &EmbeddingConfig,
        credentials: &Credentials,
    ) -> Result<Self, DomainError> {
        let api_key = credentials.require_api_key()?;
        let project = credentials.require_project_id()?;
        Self::new(config, api_key, project)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:predict",
            self.base_url, self.project, self.location, self.model
        )
    }

    async fn predict(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        let body = PredictRequest {
            instances: texts.iter().map(|content| Instance { content }).collect(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(http::transport_error)?;

        let parsed: PredictResponse = http::read_json(response).await?;
        into_embeddings(parsed, texts.len())
    }
}

fn into_embeddings(
    response: PredictResponse,
    expected: usize,
) -> Result<Vec<Embedding>, DomainError> {
    if response.predictions.len() != expected {
        return Err(DomainError::malformed(format!(
            "expected {expected} embeddings, got {}",
            response.predictions.len()
        )));
    }
    Ok(response
        .predictions
        .into_iter()
        .map(|p| Embedding::new(p.embeddings.values))
        .collect())
}

#[async_trait]
impl EmbeddingService for VertexEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.predict(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::malformed("No embedding returned"))
    }

    #[instrument(skip(self, texts), fields(model = %self.model, count = texts.len()))]
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.predict(batch).await?);
        }
        tracing::debug!(embedded = embeddings.len(), "embedding batch complete");
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
