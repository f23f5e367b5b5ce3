//! litrag-hybrid
//!
//! The retrieval core: query formulation, fusion (server-side weighted
//! hybrid or client-side RRF), deduplication to documents and confidence
//! calibration, tied together by [`Retriever`].

pub mod confidence;
pub mod dedup;
pub mod formulator;
pub mod fusion;
pub mod retriever;

pub use confidence::{Confidence, ConfidenceLevel, ConfidenceScorer};
pub use dedup::dedupe;
pub use formulator::QueryFormulator;
pub use fusion::{FusionEngine, FusionOutcome, SearchStrategy};
pub use retriever::{RetrievalOutcome, RetrievalRequest, RetrievedDocument, Retriever};
