use std::sync::Arc;
use tracing::instrument;

use crate::domain::{
    ports::{EmbeddingService, VectorStore},
    DocumentChunk, DomainError, SearchResult,
};
use crate::infrastructure::vector_store::InMemoryVectorStore;

pub struct RagService {
    embedding: Arc<dyn EmbeddingService>,
    vector_store: Arc<dyn VectorStore>,
    default_top_k: usize,
}

impl RagService {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        vector_store: Arc<dyn VectorStore>,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedding,
            vector_store,
            default_top_k,
        }
    }

    /// Embeds every chunk in one batch and builds a fresh index over them.
    #[instrument(skip(embedding, chunks), fields(chunks = chunks.len()))]
    pub async fn index(
        embedding: Arc<dyn EmbeddingService>,
        chunks: Vec<DocumentChunk>,
        default_top_k: usize,
    ) -> Result<Self, DomainError> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = embedding.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(DomainError::malformed(format!(
                "embedded {} of {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let store = InMemoryVectorStore::build(chunks.into_iter().zip(embeddings).collect())?;
        if store.dimension() != embedding.dimension() {
            tracing::warn!(
                expected = embedding.dimension(),
                actual = store.dimension(),
                "embedding dimension differs from configuration"
            );
        }
        tracing::info!(entries = store.len(), dimension = store.dimension(), "index built");

        Ok(Self::new(embedding, Arc::new(store), default_top_k))
    }

    #[instrument(skip(self, query), fields(top_k = self.default_top_k))]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>, DomainError> {
        self.retrieve_top_k(query, self.default_top_k).await
    }

    #[instrument(skip(self, query))]
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let embedding = self.embedding.embed(query).await?;
        let results = self.vector_store.search(&embedding, top_k).await?;
        tracing::debug!(results = results.len(), "retrieved chunks");
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.vector_store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector_store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Embedding;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts letters a-z, enough for texts with distinct vocabularies to separate.
    struct LetterEmbedding {
        calls: AtomicUsize,
    }

    fn letters(text: &str) -> Embedding {
        let mut v = vec![0.0f32; 26];
        for c in text.to_ascii_lowercase().chars() {
            if c.is_ascii_lowercase() {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
        }
        Embedding::new(v)
    }

    #[async_trait]
    impl EmbeddingService for LetterEmbedding {
        async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(letters(text))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| letters(t)).collect())
        }

        fn dimension(&self) -> usize {
            26
        }
    }

    struct ShortEmbedding;

    #[async_trait]
    impl EmbeddingService for ShortEmbedding {
        async fn embed(&self, _text: &str) -> Result<Embedding, DomainError> {
            Ok(Embedding::new(vec![1.0]))
        }

        async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
            Ok(vec![Embedding::new(vec![1.0])])
        }

        fn dimension(&self) -> usize {
            1
        }
    }

    fn chunks() -> Vec<DocumentChunk> {
        vec![
            DocumentChunk::new("zoo.txt", "zebra zebu zzz", 0),
            DocumentChunk::new("fruit.txt", "apple banana papaya", 0),
            DocumentChunk::new("fruit.txt", "cherry berry", 1),
        ]
    }

    #[tokio::test]
    async fn test_index_embeds_in_one_batch() {
        let embedding = Arc::new(LetterEmbedding {
            calls: AtomicUsize::new(0),
        });
        let rag = RagService::index(embedding.clone(), chunks(), 5).await.unwrap();

        assert_eq!(rag.len(), 3);
        assert_eq!(embedding.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_identity_retrieval() {
        let embedding = Arc::new(LetterEmbedding {
            calls: AtomicUsize::new(0),
        });
        let rag = RagService::index(embedding, chunks(), 5).await.unwrap();

        for chunk in chunks() {
            let results = rag.retrieve_top_k(&chunk.content, 1).await.unwrap();
            assert_eq!(results[0].chunk.content, chunk.content);
        }
    }

    #[tokio::test]
    async fn test_retrieve_uses_default_top_k() {
        let embedding = Arc::new(LetterEmbedding {
            calls: AtomicUsize::new(0),
        });
        let rag = RagService::index(embedding, chunks(), 2).await.unwrap();
        assert_eq!(rag.retrieve("banana").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_embeddings_rejected() {
        let err = RagService::index(Arc::new(ShortEmbedding), chunks(), 5)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DomainError::MalformedResponse(_)));
    }
}
