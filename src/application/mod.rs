//! Application layer - Use cases and orchestration.
//!
//! Services coordinate extraction, indexing and generation through the
//! domain ports. A [`ChatSession`] owns the state of one conversation.

pub mod services;

pub use services::{
    Answer, ChatSession, ConversationOrchestrator, DocumentService, EmbeddingFactory,
    IngestReport, RagService, Reply, SessionPipeline, SessionStatus,
};
