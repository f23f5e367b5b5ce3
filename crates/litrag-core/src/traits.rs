use async_trait::async_trait;

use crate::error::Result;
use crate::filter::Filter;
use crate::types::{Document, HybridQuery, LexicalQuery, RankedHit, VectorQuery};

/// Deterministic text → fixed-length vector. Implementations are blocking;
/// async callers go through [`crate::embedding::embed_texts`].
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Client for the fragment and document collections.
///
/// Hits come back ranked `1..=N`. An empty list is a valid answer. Filters are
/// applied before truncation to `size`/`k`.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Backend label used in errors and logs.
    fn name(&self) -> &str;

    async fn lexical(&self, query: &LexicalQuery, filter: Option<&Filter>, size: usize) -> Result<Vec<RankedHit>>;

    async fn vector(&self, query: &VectorQuery, filter: Option<&Filter>) -> Result<Vec<RankedHit>>;

    /// Executes both halves in one round-trip and combines them with the
    /// named pipeline. Fails with `PipelineNotFound` if the id is unknown.
    async fn hybrid(
        &self,
        query: &HybridQuery,
        pipeline_id: &str,
        filter: Option<&Filter>,
        size: usize,
    ) -> Result<Vec<RankedHit>>;

    /// Fetch whole documents. Ids that are missing or rejected by `filter`
    /// are absent from the answer; order is unspecified.
    async fn documents(&self, parent_ids: &[String], filter: Option<&Filter>) -> Result<Vec<Document>>;
}

/// Structured completion: the answer must conform to `output_schema`
/// (a JSON schema).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, output_schema: &serde_json::Value) -> Result<serde_json::Value>;
}
