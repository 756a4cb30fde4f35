use async_trait::async_trait;

use crate::domain::{ports::VectorStore, DocumentChunk, DomainError, Embedding, SearchResult};

/// Exhaustive cosine-similarity index, built once per document batch.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: Vec<(DocumentChunk, Embedding)>,
    dimension: usize,
}

impl InMemoryVectorStore {
    /// All embeddings must share one dimension. Entry order is the tie-break order.
    pub fn build(entries: Vec<(DocumentChunk, Embedding)>) -> Result<Self, DomainError> {
        let dimension = entries.first().map(|(_, e)| e.dimension()).unwrap_or(0);

        if let Some((chunk, embedding)) = entries
            .iter()
            .find(|(_, e)| e.dimension() != dimension || e.is_empty())
        {
            return Err(DomainError::validation(format!(
                "embedding for chunk {} of {} has dimension {}, expected {}",
                chunk.chunk_index,
                chunk.source,
                embedding.dimension(),
                dimension
            )));
        }

        Ok(Self { entries, dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        if top_k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query.dimension() != self.dimension {
            return Err(DomainError::validation(format!(
                "query dimension {} does not match index dimension {}",
                query.dimension(),
                self.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, embedding))| (i, query.cosine_similarity(embedding)))
            .collect();

        // Stable sort: equal scores stay in insertion order, NaN sinks to the end.
        scored.sort_by(|a, b| match (a.1.is_nan(), b.1.is_nan()) {
            (false, false) => b.1.total_cmp(&a.1),
            (a_nan, b_nan) => a_nan.cmp(&b_nan),
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| SearchResult {
                chunk: self.entries[i].0.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, index: usize) -> DocumentChunk {
        DocumentChunk::new(source, format!("{source} #{index}"), index)
    }

    #[tokio::test]
    async fn test_build_and_search() {
        let store = InMemoryVectorStore::build(vec![
            (chunk("a.txt", 0), Embedding::new(vec![1.0, 0.0, 0.0])),
            (chunk("b.txt", 0), Embedding::new(vec![0.0, 1.0, 0.0])),
            (chunk("c.txt", 0), Embedding::new(vec![0.7, 0.7, 0.0])),
        ])
        .unwrap();

        let results = store
            .search(&Embedding::new(vec![1.0, 0.0, 0.0]), 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.source, "a.txt");
        assert!((results[0].score - 1.0).abs() < 0.001);
        assert_eq!(results[1].chunk.source, "c.txt");
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let same = Embedding::new(vec![0.5, 0.5]);
        let store = InMemoryVectorStore::build(vec![
            (chunk("first.txt", 0), same.clone()),
            (chunk("second.txt", 0), same.clone()),
            (chunk("third.txt", 0), same.clone()),
        ])
        .unwrap();

        let results = store.search(&same, 3).await.unwrap();
        let order: Vec<&str> = results.iter().map(|r| r.chunk.source.as_str()).collect();
        assert_eq!(order, vec!["first.txt", "second.txt", "third.txt"]);
    }

    #[tokio::test]
    async fn test_zero_k_and_empty_index() {
        let empty = InMemoryVectorStore::build(Vec::new()).unwrap();
        assert!(empty.is_empty());
        assert!(empty
            .search(&Embedding::new(vec![1.0]), 5)
            .await
            .unwrap()
            .is_empty());

        let store =
            InMemoryVectorStore::build(vec![(chunk("a.txt", 0), Embedding::new(vec![1.0]))])
                .unwrap();
        assert!(store.search(&Embedding::new(vec![1.0]), 0).await.unwrap().is_empty());
    }

    #[test]
    fn test_build_rejects_mixed_dimensions() {
        let err = InMemoryVectorStore::build(vec![
            (chunk("a.txt", 0), Embedding::new(vec![1.0, 0.0])),
            (chunk("a.txt", 1), Embedding::new(vec![1.0])),
        ])
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let store =
            InMemoryVectorStore::build(vec![(chunk("a.txt", 0), Embedding::new(vec![1.0, 0.0]))])
                .unwrap();
        let err = store.search(&Embedding::new(vec![1.0]), 1).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
