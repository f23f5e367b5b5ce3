//! litrag-local
//!
//! Embedded [`SearchIndex`](litrag_core::traits::SearchIndex): tantivy holds
//! fragment text and whole documents, LanceDB holds fragment vectors, and
//! hybrid pipelines are registered in-process by weight.

pub mod tantivy_utils;
pub mod text;
pub mod vector;
pub mod pipeline;
pub mod index;
pub mod loader;

pub use index::{LocalIndex, BACKEND};
pub use loader::{load, LoadReport};
pub use text::TextIndex;
pub use vector::VectorStore;
