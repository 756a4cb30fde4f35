//! Text extraction for uploaded files.
//!
//! [`LoaderRegistry`] maps every [`DocumentType`] to exactly one loader;
//! `DocumentType::Other` goes to the best-effort [`FallbackLoader`].

mod csv;
mod fallback;
mod ooxml;
mod pdf;
mod text;

use std::sync::Arc;
use tracing::instrument;

use crate::domain::{
    ports::{DocumentExtractor, DocumentLoader},
    Document, DocumentType, DomainError, TextSegment,
};

pub use self::csv::CsvLoader;
pub use fallback::FallbackLoader;
pub use ooxml::{PresentationLoader, SpreadsheetLoader, WordLoader};
pub use pdf::PdfLoader;
pub use text::TextLoader;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("invalid office document: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed CSV: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not valid UTF-8 text: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("Excel workbook extraction failed: {0}")]
    Xls(String),
    #[error("entry {name} exceeds size limit ({limit} bytes)")]
    TooLarge { name: String, limit: u64 },
    #[error("no extractable text")]
    NoText,
}

impl ExtractError {
    pub fn into_domain(self, source: &str) -> DomainError {
        DomainError::extraction(source, self.to_string())
    }
}

pub struct LoaderRegistry {
    pdf: Arc<dyn DocumentLoader>,
    word: Arc<dyn DocumentLoader>,
    spreadsheet: Arc<dyn DocumentLoader>,
    presentation: Arc<dyn DocumentLoader>,
    text: Arc<dyn DocumentLoader>,
    markdown: Arc<dyn DocumentLoader>,
    csv: Arc<dyn DocumentLoader>,
    fallback: Arc<dyn DocumentLoader>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        let text: Arc<dyn DocumentLoader> = Arc::new(TextLoader);
        Self {
            pdf: Arc::new(PdfLoader),
            word: Arc::new(WordLoader),
            spreadsheet: Arc::new(SpreadsheetLoader),
            presentation: Arc::new(PresentationLoader),
            markdown: text.clone(),
            text,
            csv: Arc::new(CsvLoader),
            fallback: Arc::new(FallbackLoader),
        }
    }

    /// Replaces the loader used for `kind`.
    pub fn with_loader(mut self, kind: DocumentType, loader: Arc<dyn DocumentLoader>) -> Self {
        *self.slot_mut(kind) = loader;
        self
    }

    fn slot_mut(&mut self, kind: DocumentType) -> &mut Arc<dyn DocumentLoader> {
        match kind {
            DocumentType::Pdf => &mut self.pdf,
            DocumentType::Word => &mut self.word,
            DocumentType::Spreadsheet => &mut self.spreadsheet,
            DocumentType::Presentation => &mut self.presentation,
            DocumentType::Text => &mut self.text,
            DocumentType::Markdown => &mut self.markdown,
            DocumentType::Csv => &mut self.csv,
            DocumentType::Other => &mut self.fallback,
        }
    }

    pub fn loader_for(&self, kind: DocumentType) -> &dyn DocumentLoader {
        let loader = match kind {
            DocumentType::Pdf => &self.pdf,
            DocumentType::Word => &self.word,
            DocumentType::Spreadsheet => &self.spreadsheet,
            DocumentType::Presentation => &self.presentation,
            DocumentType::Text => &self.text,
            DocumentType::Markdown => &self.markdown,
            DocumentType::Csv => &self.csv,
            DocumentType::Other => &self.fallback,
        };
        loader.as_ref()
    }

    #[instrument(skip(self, document), fields(document = %document.name, kind = document.kind.as_str()))]
    pub fn load(&self, document: &Document) -> Result<Vec<TextSegment>, DomainError> {
        let loader = self.loader_for(document.kind);
        let segments = loader.load(&document.name, &document.content)?;
        tracing::debug!(loader = loader.name(), segments = segments.len(), "document loaded");
        Ok(segments)
    }
}

impl DocumentExtractor for LoaderRegistry {
    fn extract(&self, document: &Document) -> Result<Vec<TextSegment>, DomainError> {
        self.load(document)
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
