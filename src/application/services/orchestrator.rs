use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

use crate::application::services::RagService;
use crate::domain::{
    ports::{GenerationRequest, GenerationService},
    ChatTurn, DomainError,
};
use crate::infrastructure::config::{Credentials, LlmConfig, PromptsConfig};

pub const MISSING_API_KEY_ANSWER: &str = "Error: API Key not found in credentials.yaml";

/// Sampling knobs that stay fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub top_p: f32,
    pub top_k: u32,
}

impl From<&LlmConfig> for Sampling {
    fn from(config: &LlmConfig) -> Self {
        Self {
            top_p: config.top_p,
            top_k: config.top_k,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: BTreeSet<String>,
}

impl Answer {
    fn degraded(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: BTreeSet::new(),
        }
    }
}

/// Answers one query, with retrieval when an index is attached.
///
/// Never fails: every error becomes an answer text with no sources.
#[derive(Clone)]
pub struct ConversationOrchestrator {
    credentials: Arc<Credentials>,
    generation: Arc<dyn GenerationService>,
    prompts: Arc<PromptsConfig>,
    sampling: Sampling,
    rag: Option<Arc<RagService>>,
}

impl ConversationOrchestrator {
    pub fn new(
        credentials: Arc<Credentials>,
        generation: Arc<dyn GenerationService>,
        prompts: Arc<PromptsConfig>,
        sampling: Sampling,
    ) -> Self {
        Self {
            credentials,
            generation,
            prompts,
            sampling,
            rag: None,
        }
    }

    pub fn with_rag(mut self, rag: Option<Arc<RagService>>) -> Self {
        self.rag = rag;
        self
    }

    pub fn set_rag(&mut self, rag: Option<Arc<RagService>>) {
        self.rag = rag;
    }

    pub fn rag(&self) -> Option<&Arc<RagService>> {
        self.rag.as_ref()
    }

    #[instrument(
        skip(self, query, history),
        fields(model = model_name, history = history.len(), rag = self.rag.is_some())
    )]
    pub async fn answer(
        &self,
        query: &str,
        history: &[ChatTurn],
        model_name: &str,
        temperature: f32,
    ) -> Answer {
        if self.credentials.api_key().is_none() {
            tracing::warn!("API key missing, skipping generation");
            return Answer::degraded(MISSING_API_KEY_ANSWER);
        }

        match self.try_answer(query, history, model_name, temperature).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, remote = e.is_remote(), "failed to generate answer");
                Answer::degraded(degraded_text(&e))
            }
        }
    }

    async fn try_answer(
        &self,
        query: &str,
        history: &[ChatTurn],
        model_name: &str,
        temperature: f32,
    ) -> Result<Answer, DomainError> {
        let request = GenerationRequest::new(model_name, query)
            .with_history(history)
            .with_temperature(temperature)
            .with_sampling(self.sampling.top_p, self.sampling.top_k);

        let (request, sources) = match &self.rag {
            Some(rag) => {
                let results = rag.retrieve(query).await?;
                let context: Vec<&str> = results.iter().map(|r| r.chunk.content.as_str()).collect();
                let sources: BTreeSet<String> =
                    results.iter().map(|r| r.chunk.source.clone()).collect();
                tracing::debug!(chunks = results.len(), sources = sources.len(), "context retrieved");

                let request = request.with_instruction(
                    self.prompts.rag.render(&context),
                    &self.prompts.rag.acknowledgement,
                );
                (request, sources)
            }
            None => {
                let request = request.with_instruction(
                    &self.prompts.agent.system,
                    &self.prompts.agent.acknowledgement,
                );
                (request, BTreeSet::new())
            }
        };

        let text = self.generation.generate(&request).await?;
        Ok(Answer { text, sources })
    }
}

fn degraded_text(error: &DomainError) -> String {
    let hint = match error {
        DomainError::Authentication(_) => " Check that API_KEY is valid for this model.",
        DomainError::QuotaExceeded(_) => " The request quota is exhausted, try again later.",
        DomainError::Timeout(_) => " The request timed out, try again.",
        DomainError::Network(_) => " The service could not be reached.",
        DomainError::Configuration(_) => " Check credentials.yaml.",
        _ => "",
    };
    format!("Error generating response: {error}.{hint}")
}
