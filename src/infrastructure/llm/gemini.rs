use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

use crate::domain::{
    ports::{GenerationRequest, GenerationService},
    DomainError,
};
use crate::infrastructure::config::{Credentials, LlmConfig};
use crate::infrastructure::http::{self, API_KEY_HEADER};

const USER: &str = "user";
const MODEL: &str = "model";

/// Chat completions from the Gemini `generateContent` endpoint.
pub struct GeminiGeneration {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    native_system_instruction: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn new(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiGeneration {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, DomainError> {
        Ok(Self {
            client: http::build_client(Duration::from_secs(config.timeout_seconds))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            native_system_instruction: config.native_system_instruction,
        })
    }

    pub fn from_credentials(config: &LlmConfig, credentials: &Credentials) -> Result<Self, DomainError> {
        Self::new(config, credentials.require_api_key()?)
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    fn build_body(&self, request: &GenerationRequest) -> GenerateContentRequest {
        let mut contents = Vec::with_capacity(request.history.len() * 2 + 3);
        let mut system_instruction = None;

        if !request.instruction.is_empty() {
            if self.native_system_instruction {
                system_instruction = Some(Content::new(None, &request.instruction));
            } else {
                contents.push(Content::new(Some(USER), &request.instruction));
                if !request.acknowledgement.is_empty() {
                    contents.push(Content::new(Some(MODEL), &request.acknowledgement));
                }
            }
        }

        for turn in &request.history {
            contents.push(Content::new(Some(USER), &turn.user));
            contents.push(Content::new(Some(MODEL), &turn.assistant));
        }
        contents.push(Content::new(Some(USER), &request.query));

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature.clamp(0.0, 1.0),
                top_p: request.top_p,
                top_k: (request.top_k > 0).then_some(request.top_k),
            },
        }
    }
}

fn answer_text(response: GenerateContentResponse) -> Result<String, DomainError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "unknown".to_string());
        return Err(DomainError::malformed(format!(
            "no candidates returned (block reason: {reason})"
        )));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(DomainError::malformed(format!(
            "empty candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

#[async_trait]
impl GenerationService for GeminiGeneration {
    #[instrument(skip(self, request), fields(model = %request.model, history = request.history.len()))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DomainError> {
        let body = self.build_body(request);

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(http::transport_error)?;

        let parsed: GenerateContentResponse = http::read_json(response).await?;
        let text = answer_text(parsed)?;
        tracing::debug!(chars = text.len(), "generation complete");
        Ok(text)
    }
}
