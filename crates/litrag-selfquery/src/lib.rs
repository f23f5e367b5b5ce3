//! litrag-selfquery
//!
//! Metadata filter extraction: a prompt built from the field schema, one
//! structured completion, and a translation of the model's conditions into a
//! [`Filter`](litrag_core::Filter). `ollama` provides the language model.

pub mod extractor;
pub mod ollama;
pub mod prompt;
pub mod translate;

pub use extractor::FilterExtractor;
pub use ollama::OllamaClient;
