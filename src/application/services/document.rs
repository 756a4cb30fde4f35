use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use crate::domain::{
    ports::DocumentExtractor, Document, DocumentChunk, DomainError, TextSegment, TextSplitter,
};

/// Outcome of one processing batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub processed: Vec<String>,
    pub failed: Vec<FailedDocument>,
    pub chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDocument {
    pub name: String,
    pub reason: String,
}

pub struct DocumentService {
    extractor: Arc<dyn DocumentExtractor>,
    splitter: TextSplitter,
}

impl DocumentService {
    pub fn new(extractor: Arc<dyn DocumentExtractor>, splitter: TextSplitter) -> Self {
        Self {
            extractor,
            splitter,
        }
    }

    /// Extracts every document in order. A failing document is recorded in
    /// the report and the rest of the batch carries on.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub fn extract_all(&self, documents: &[Document]) -> (Vec<TextSegment>, IngestReport) {
        let mut segments = Vec::new();
        let mut report = IngestReport::default();

        for document in documents {
            let reason = match self.extractor.extract(document) {
                Ok(extracted) if extracted.iter().any(|s| !s.text.trim().is_empty()) => {
                    report.processed.push(document.name.clone());
                    segments.extend(extracted);
                    continue;
                }
                Ok(_) => "no extractable text".to_string(),
                Err(e) => e.to_string(),
            };

            tracing::warn!(document = %document.name, reason = %reason, "skipping document");
            report.failed.push(FailedDocument {
                name: document.name.clone(),
                reason,
            });
        }

        (segments, report)
    }

    /// Splits each segment on its own. Chunk numbers run from 0 per document,
    /// across all of that document's segments. Whitespace-only windows are
    /// dropped.
    pub fn chunk_segments(&self, segments: &[TextSegment]) -> Vec<DocumentChunk> {
        let mut next_index: HashMap<&str, usize> = HashMap::new();
        let mut chunks = Vec::new();

        for segment in segments {
            let index = next_index.entry(segment.source.as_str()).or_insert(0);
            for piece in self.splitter.split(&segment.text) {
                if piece.trim().is_empty() {
                    continue;
                }
                chunks.push(
                    DocumentChunk::new(&segment.source, piece, *index)
                        .with_metadata(segment.metadata.clone()),
                );
                *index += 1;
            }
        }

        chunks
    }

    #[instrument(skip_all, fields(documents = documents.len()))]
    pub fn ingest(
        &self,
        documents: &[Document],
    ) -> Result<(Vec<DocumentChunk>, IngestReport), DomainError> {
        let (segments, mut report) = self.extract_all(documents);
        let chunks = self.chunk_segments(&segments);

        if chunks.is_empty() {
            let reasons: Vec<String> = report
                .failed
                .iter()
                .map(|f| format!("{}: {}", f.name, f.reason))
                .collect();
            return Err(DomainError::validation(format!(
                "No documents were successfully processed. {}",
                reasons.join("; ")
            )));
        }

        report.chunks = chunks.len();
        tracing::info!(
            processed = report.processed.len(),
            failed = report.failed.len(),
            chunks = report.chunks,
            "documents ingested"
        );
        Ok((chunks, report))
    }
}
