mod vertex;

pub use vertex::VertexEmbedding;
