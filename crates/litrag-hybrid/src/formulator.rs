use std::sync::Arc;

use tracing::debug;

use litrag_core::embedding::embed_texts;
use litrag_core::traits::Embedder;
use litrag_core::types::{HybridQuery, LexicalQuery, VectorQuery};
use litrag_core::{CallContext, Error, Result};

/// Builds index queries from question text. Only the vector half touches an
/// external service (one embedding call, never retried).
#[derive(Clone)]
pub struct QueryFormulator {
    embedder: Arc<dyn Embedder>,
}

impl QueryFormulator {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// One field gives a single-field match, several a multi-field match.
    pub fn build_lexical_query(&self, text: &str, fields: &[String]) -> Result<LexicalQuery> {
        check_text(text)?;
        if fields.is_empty() || fields.iter().any(|f| f.trim().is_empty()) {
            return Err(Error::InvalidQuery("lexical query needs at least one field name".into()));
        }
        Ok(LexicalQuery { text: text.to_string(), fields: fields.to_vec() })
    }

    pub async fn build_vector_query(&self, text: &str, k: usize, ctx: &CallContext) -> Result<VectorQuery> {
        check_text(text)?;
        let mut vectors = ctx.run("embedding", embed_texts(&self.embedder, vec![text.to_string()])).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("no vector returned for the question".into()))?;
        debug!(dim = vector.len(), k, "vector query");
        Ok(VectorQuery { vector, k })
    }

    pub async fn build_hybrid_query(&self, text: &str, fields: &[String], k: usize, ctx: &CallContext) -> Result<HybridQuery> {
        let lexical = self.build_lexical_query(text, fields)?;
        let vector = self.build_vector_query(text, k, ctx).await?;
        Ok(HybridQuery { lexical, vector })
    }
}

fn check_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::InvalidQuery("question text is empty".into()));
    }
    Ok(())
}
