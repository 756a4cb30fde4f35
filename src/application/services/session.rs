use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::application::services::{
    Answer, ConversationOrchestrator, DocumentService, IngestReport, RagService, Sampling,
};
use crate::domain::{
    ports::{EmbeddingService, GenerationService},
    Conversation, Document, DomainError, Message, MessageRole,
};
use crate::infrastructure::config::{Credentials, PromptsConfig};

/// Builds the embedding client for an indexing run.
pub type EmbeddingFactory =
    Arc<dyn Fn(&Credentials) -> Result<Arc<dyn EmbeddingService>, DomainError> + Send + Sync>;

/// Process-wide collaborators shared by every session.
#[derive(Clone)]
pub struct SessionPipeline {
    pub credentials: Arc<Credentials>,
    pub prompts: Arc<PromptsConfig>,
    pub documents: Arc<DocumentService>,
    pub generation: Arc<dyn GenerationService>,
    pub embeddings: EmbeddingFactory,
    pub sampling: Sampling,
    pub default_temperature: f32,
    pub top_k: usize,
}

impl SessionPipeline {
    fn orchestrator(&self) -> ConversationOrchestrator {
        ConversationOrchestrator::new(
            self.credentials.clone(),
            self.generation.clone(),
            self.prompts.clone(),
            self.sampling,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub answer: String,
    pub sources: BTreeSet<String>,
    pub answer_index: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: Uuid,
    pub messages: usize,
    pub rag_enabled: bool,
    pub indexed_chunks: usize,
    pub documents: Vec<String>,
    pub model: String,
    pub api_key_configured: bool,
}

/// One user's conversation, documents and answer sources.
pub struct ChatSession {
    pipeline: Arc<SessionPipeline>,
    conversation: Conversation,
    orchestrator: ConversationOrchestrator,
    documents: Vec<String>,
    sources: BTreeMap<usize, BTreeSet<String>>,
}

impl ChatSession {
    pub fn new(pipeline: Arc<SessionPipeline>) -> Self {
        Self {
            orchestrator: pipeline.orchestrator(),
            pipeline,
            conversation: Conversation::new(),
            documents: Vec::new(),
            sources: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.conversation.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn rag_enabled(&self) -> bool {
        self.orchestrator.rag().is_some()
    }

    /// Extracts, chunks and indexes a batch, replacing the current index.
    /// On failure the previous index stays in place.
    #[instrument(skip(self, documents), fields(session = %self.id(), documents = documents.len()))]
    pub async fn process_documents(
        &mut self,
        documents: Vec<Document>,
    ) -> Result<IngestReport, DomainError> {
        if documents.is_empty() {
            return Err(DomainError::validation("No files uploaded"));
        }

        let credentials = &self.pipeline.credentials;
        credentials.require_api_key()?;
        credentials.require_project_id()?;

        let (chunks, report) = self.pipeline.documents.ingest(&documents)?;
        let embedding = (self.pipeline.embeddings)(credentials.as_ref())?;
        let rag = RagService::index(embedding, chunks, self.pipeline.top_k).await?;

        self.orchestrator.set_rag(Some(Arc::new(rag)));
        self.documents = report.processed.clone();
        tracing::info!(documents = ?self.documents, "documents indexed");

        Ok(report)
    }

    /// Appends the query and its answer to the log.
    #[instrument(skip(self, query), fields(session = %self.id()))]
    pub async fn ask(&mut self, query: &str, temperature: Option<f32>) -> Result<Reply, DomainError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::validation("message must not be empty"));
        }
        let temperature = match temperature {
            Some(t) if !(0.0..=1.0).contains(&t) => {
                return Err(DomainError::validation(format!(
                    "temperature must be between 0.0 and 1.0, got {t}"
                )))
            }
            Some(t) => t,
            None => self.pipeline.default_temperature,
        };

        let history = self.conversation.history_turns();
        self.conversation.add_message(MessageRole::User, query);
        let answer_index = self.conversation.len() / 2;

        let Answer { text, sources } = self
            .orchestrator
            .answer(query, &history, self.pipeline.credentials.model_name(), temperature)
            .await;

        self.sources.insert(answer_index, sources.clone());
        self.conversation.add_message(MessageRole::Assistant, text.as_str());

        Ok(Reply {
            answer: text,
            sources,
            answer_index,
        })
    }

    pub fn sources_for(&self, answer_index: usize) -> Option<&BTreeSet<String>> {
        self.sources.get(&answer_index)
    }

    /// Answer indices restart once the log is empty, so the audit map goes too.
    pub fn clear_chat(&mut self) {
        self.conversation.clear();
        self.sources.clear();
    }

    pub fn clear_documents(&mut self) {
        self.orchestrator.set_rag(None);
        self.documents.clear();
    }

    pub fn reset_all(&mut self) {
        self.clear_chat();
        self.clear_documents();
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            id: self.id(),
            messages: self.conversation.len(),
            rag_enabled: self.rag_enabled(),
            indexed_chunks: self.orchestrator.rag().map_or(0, |rag| rag.len()),
            documents: self.documents.clone(),
            model: self.pipeline.credentials.model_name().to_string(),
            api_key_configured: self.pipeline.credentials.api_key().is_some(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::domain::{ports::GenerationRequest, Embedding, TextSplitter};
    use crate::infrastructure::loaders::LoaderRegistry;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Hashes lowercase words into a small bag-of-words vector.
    pub struct WordEmbedding;

    pub fn bag_of_words(text: &str) -> Embedding {
        let mut v = vec![0.0f32; 64];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
                % v.len();
            v[bucket] += 1.0;
        }
        Embedding::new(v)
    }

    #[async_trait]
    impl EmbeddingService for WordEmbedding {
        async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
            Ok(bag_of_words(text))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
            Ok(texts.iter().map(|t| bag_of_words(t)).collect())
        }

        fn dimension(&self) -> usize {
            64
        }
    }

    /// Answers with the instruction's context and the query.
    #[derive(Default)]
    pub struct EchoGeneration {
        pub requests: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl GenerationService for EchoGeneration {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, DomainError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(format!("{} | {}", request.query, request.instruction))
        }
    }

    pub fn pipeline(credentials: Credentials, generation: Arc<EchoGeneration>) -> SessionPipeline {
        let embeddings: EmbeddingFactory = Arc::new(
            |_: &Credentials| -> Result<Arc<dyn EmbeddingService>, DomainError> {
                Ok(Arc::new(WordEmbedding))
            },
        );
        SessionPipeline {
            credentials: Arc::new(credentials),
            prompts: Arc::new(PromptsConfig::default()),
            documents: Arc::new(DocumentService::new(
                Arc::new(LoaderRegistry::new()),
                TextSplitter::default(),
            )),
            generation,
            embeddings,
            sampling: Sampling {
                top_p: 0.95,
                top_k: 0,
            },
            default_temperature: 0.7,
            top_k: 5,
        }
    }

    pub fn full_credentials() -> Credentials {
        Credentials::from_pairs([("API_KEY", "key"), ("PROJECT_ID", "demo")])
    }
}
