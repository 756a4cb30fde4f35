mod gemini;

pub use gemini::GeminiGeneration;
