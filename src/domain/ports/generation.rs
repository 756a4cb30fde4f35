use crate::domain::{errors::DomainError, ChatTurn};
use async_trait::async_trait;
use serde::Serialize;

/// Everything the generation backend needs for one completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub instruction: String,
    pub acknowledgement: String,
    pub history: Vec<ChatTurn>,
    pub query: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instruction: String::new(),
            acknowledgement: String::new(),
            history: Vec::new(),
            query: query.into(),
            temperature: 0.7,
            top_p: 0.95,
            top_k: 0,
        }
    }

    pub fn with_instruction(
        mut self,
        instruction: impl Into<String>,
        acknowledgement: impl Into<String>,
    ) -> Self {
        self.instruction = instruction.into();
        self.acknowledgement = acknowledgement.into();
        self
    }

    pub fn with_history(mut self, history: &[ChatTurn]) -> Self {
        self.history = history.to_vec();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    pub fn with_sampling(mut self, top_p: f32, top_k: u32) -> Self {
        self.top_p = top_p;
        self.top_k = top_k;
        self
    }
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DomainError>;
}
