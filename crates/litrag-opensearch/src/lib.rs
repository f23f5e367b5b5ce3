//! litrag-opensearch
//!
//! [`SearchIndex`](litrag_core::traits::SearchIndex) over the OpenSearch REST
//! API. Query bodies are built in `dsl`, responses decoded in `response`.

pub mod client;
pub mod dsl;
pub mod response;

pub use client::{classify_failure, OpenSearchIndex, BACKEND};
