//! Document-grounded chat over Gemini.
//!
//! Uploaded files are extracted, chunked and embedded into a per-session
//! index; questions are answered with the retrieved chunks as context and
//! the contributing documents reported as sources.

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
