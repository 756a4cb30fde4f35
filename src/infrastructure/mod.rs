pub mod config;
pub mod embedding;
pub mod http;
pub mod llm;
pub mod loaders;
pub mod vector_store;

pub use config::{AppConfig, Config, Credentials, PromptsConfig};
pub use embedding::VertexEmbedding;
pub use llm::GeminiGeneration;
pub use loaders::LoaderRegistry;
pub use vector_store::InMemoryVectorStore;
