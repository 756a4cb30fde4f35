mod document_loader;
mod embedding;
mod generation;
mod vector_store;

pub use document_loader::{DocumentExtractor, DocumentLoader};
pub use embedding::EmbeddingService;
pub use generation::{GenerationRequest, GenerationService};
pub use vector_store::VectorStore;
