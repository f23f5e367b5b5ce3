use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use litrag_core::config::Settings;
use litrag_core::traits::{Embedder, SearchIndex};
use litrag_core::types::{Document, FusionSide};
use litrag_core::{CallContext, Error, Filter, Result};
use litrag_selfquery::FilterExtractor;

use crate::confidence::{Confidence, ConfidenceScorer};
use crate::dedup::dedupe;
use crate::fusion::{FusionEngine, SearchStrategy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub question: String,
    pub amount: usize,
    pub strategy: SearchStrategy,
    #[serde(default)]
    pub self_query: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub document: Document,
    pub confidence: Confidence,
    pub fused_score: f64,
    /// 1-based position among the returned documents.
    pub rank: usize,
    /// The filter that was applied; `None` when self-querying was off.
    pub filter: Option<Filter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub documents: Vec<RetrievedDocument>,
    pub filter: Option<Filter>,
    /// Side dropped by a degraded RRF fusion.
    pub degraded: Option<FusionSide>,
}

impl RetrievalOutcome {
    fn empty(filter: Option<Filter>) -> Self {
        Self { documents: Vec::new(), filter, degraded: None }
    }
}

/// Question → ranked, confidence-annotated documents.
///
/// Holds the long-lived service handles; one instance serves any number of
/// concurrent retrievals.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn SearchIndex>,
    fusion: FusionEngine,
    scorer: ConfidenceScorer,
    extractor: Option<FilterExtractor>,
    max_fragments_per_document: usize,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        embedder: Arc<dyn Embedder>,
        extractor: Option<FilterExtractor>,
        settings: &Settings,
    ) -> Self {
        Self {
            fusion: FusionEngine::new(Arc::clone(&index), Arc::clone(&embedder), settings.retrieval.clone()),
            scorer: ConfidenceScorer::new(embedder, settings.confidence.clone()),
            index,
            extractor,
            max_fragments_per_document: settings.retrieval.max_fragments_per_document.max(1),
        }
    }

    #[instrument(skip(self, request, ctx), fields(amount = request.amount, strategy = ?request.strategy, self_query = request.self_query))]
    pub async fn retrieve(&self, request: &RetrievalRequest, ctx: &CallContext) -> Result<RetrievalOutcome> {
        if request.amount == 0 {
            return Ok(RetrievalOutcome::empty(None));
        }
        request.strategy.validate()?;
        let extractor = match (request.self_query, &self.extractor) {
            (true, None) => return Err(Error::InvalidConfig("self-querying requested but no filter extractor is configured".into())),
            (true, Some(e)) => Some(e),
            (false, _) => None,
        };
        if ctx.is_cancelled() {
            return Err(Error::Cancelled("retrieve"));
        }

        let filter = match extractor {
            Some(e) => Some(e.extract(&request.question, ctx).await?),
            None => None,
        };
        let active = filter.as_ref().filter(|f| !f.is_empty());

        let size = request.amount.saturating_mul(self.max_fragments_per_document);
        let fused = self.fusion.search(request.strategy, &request.question, active, size, ctx).await?;
        let unique = dedupe(&fused.results, request.amount);
        if unique.is_empty() {
            info!("no matching fragments");
            return Ok(RetrievalOutcome { degraded: fused.degraded, ..RetrievalOutcome::empty(filter) });
        }

        let parent_ids: Vec<String> = unique.iter().map(|r| r.fragment.parent_id.clone()).collect();
        let fetched = ctx.run("documents", self.index.documents(&parent_ids, active)).await?;
        let mut by_parent: HashMap<String, Document> = fetched.into_iter().map(|d| (d.parent_id.clone(), d)).collect();

        let mut kept = Vec::with_capacity(unique.len());
        for r in unique {
            match by_parent.remove(&r.fragment.parent_id) {
                Some(document) => kept.push((r, document)),
                None => warn!(parent_id = %r.fragment.parent_id, "document missing from index, skipping"),
            }
        }

        let candidates: Vec<String> = kept.iter().map(|(r, _)| r.fragment.text.clone()).collect();
        let confidences = match &fused.question_vector {
            Some(q) => self.scorer.score_against(q, &candidates, ctx).await?,
            None => self.scorer.score(&request.question, &candidates, ctx).await?,
        };

        let documents: Vec<RetrievedDocument> = kept
            .into_iter()
            .zip(confidences)
            .enumerate()
            .map(|(i, ((r, document), confidence))| RetrievedDocument {
                document,
                confidence,
                fused_score: r.score,
                rank: i + 1,
                filter: filter.clone(),
            })
            .collect();
        info!(documents = documents.len(), degraded = ?fused.degraded, "retrieval complete");
        Ok(RetrievalOutcome { documents, filter, degraded: fused.degraded })
    }
}
