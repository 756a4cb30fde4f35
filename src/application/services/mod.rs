mod document;
mod orchestrator;
mod rag;
mod session;

pub use document::{DocumentService, FailedDocument, IngestReport};
pub use orchestrator::{Answer, ConversationOrchestrator, Sampling, MISSING_API_KEY_ANSWER};
pub use rag::RagService;
pub use session::{ChatSession, EmbeddingFactory, Reply, SessionPipeline, SessionStatus};

#[cfg(test)]
pub(crate) use session::fakes;
