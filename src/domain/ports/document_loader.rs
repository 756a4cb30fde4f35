use crate::domain::{errors::DomainError, Document, TextSegment};

/// Extracts text segments from the raw bytes of one uploaded file.
pub trait DocumentLoader: Send + Sync {
    fn name(&self) -> &'static str;
    fn load(&self, source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, DomainError>;
}

/// Picks the right loader for a document and runs it.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, document: &Document) -> Result<Vec<TextSegment>, DomainError>;
}
