//! Async bridge to the blocking [`Embedder`] trait.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::traits::Embedder;

/// Embed `texts` on tokio's blocking pool. Any failure, including a panic in
/// the model or a malformed answer, is reported as `EmbeddingUnavailable`.
pub async fn embed_texts(embedder: &Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let expected = texts.len();
    let dim = embedder.dim();
    let worker = Arc::clone(embedder);
    let vectors = tokio::task::spawn_blocking(move || worker.embed_batch(&texts))
        .await
        .map_err(|e| Error::EmbeddingUnavailable(format!("embedding task failed: {e}")))?
        .map_err(|e| Error::EmbeddingUnavailable(format!("{e:#}")))?;

    if vectors.len() != expected {
        return Err(Error::EmbeddingUnavailable(format!(
            "expected {expected} vectors, got {}",
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(Error::EmbeddingUnavailable(format!(
            "expected dimension {dim}, got {}",
            bad.len()
        )));
    }
    Ok(vectors)
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut na, mut nb) = (0f64, 0f64, 0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
