mod conversation;
mod document;
mod embedding;

pub use conversation::{ChatTurn, Conversation, Message, MessageRole};
pub use document::{ChunkMetadata, Document, DocumentChunk, DocumentType, SearchResult, TextSegment};
pub use embedding::Embedding;
