use std::panic::{self, AssertUnwindSafe};

use super::ExtractError;
use crate::domain::{ports::DocumentLoader, DomainError, TextSegment};

/// One segment per page, pages numbered from 1.
pub struct PdfLoader;

impl PdfLoader {
    fn extract(source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, ExtractError> {
        // pdf-extract panics on some malformed inputs.
        let pages = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(bytes)
        }))
        .map_err(|_| ExtractError::Pdf("parser panicked on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| TextSegment::new(source, text).with_page(i + 1))
            .collect())
    }
}

impl DocumentLoader for PdfLoader {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn load(&self, source: &str, bytes: &[u8]) -> Result<Vec<TextSegment>, DomainError> {
        Self::extract(source, bytes).map_err(|e| e.into_domain(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pdf_is_extraction_error() {
        let err = PdfLoader.load("fake.pdf", b"not a pdf").unwrap_err();
        match err {
            DomainError::Extraction { document, reason } => {
                assert_eq!(document, "fake.pdf");
                assert!(reason.starts_with("PDF extraction failed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
