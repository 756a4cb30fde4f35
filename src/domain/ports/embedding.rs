use crate::domain::{errors::DomainError, Embedding};
use async_trait::async_trait;

/// Turns text into vectors for similarity search.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embeds a single retrieval query.
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError>;

    /// One vector per input, in input order. Implementations may split the
    /// work into several remote calls.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError>;

    /// Length of every vector this service returns.
    fn dimension(&self) -> usize;
}
