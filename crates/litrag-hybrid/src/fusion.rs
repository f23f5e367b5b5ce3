//! Multi-signal ranking.
//!
//! `weight` is the vector share in every strategy. The weighted hybrid
//! strategy delegates combination to a named index pipeline in one
//! round-trip; RRF issues both sub-queries concurrently and fuses client-side
//! with `1 / (rank + offset)` per list.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use litrag_core::config::{PartialFailurePolicy, RetrievalSettings, TieScan};
use litrag_core::traits::{Embedder, SearchIndex};
use litrag_core::types::{pipeline_id, FusedResult, FusionSide, RankedHit};
use litrag_core::{CallContext, Error, Filter, Result};

use crate::formulator::QueryFormulator;

/// Closed set of retrieval strategies behind one search contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchStrategy {
    Lexical,
    Vector,
    WeightedHybrid { weight: f64 },
    ReciprocalRankFusion { weight: f64 },
}

impl SearchStrategy {
    pub fn weight(&self) -> Option<f64> {
        match self {
            SearchStrategy::WeightedHybrid { weight } | SearchStrategy::ReciprocalRankFusion { weight } => Some(*weight),
            SearchStrategy::Lexical | SearchStrategy::Vector => None,
        }
    }

    /// `InvalidWeight` for NaN, infinities and values outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        match self.weight() {
            Some(w) if !(w.is_finite() && (0.0..=1.0).contains(&w)) => Err(Error::InvalidWeight(w)),
            _ => Ok(()),
        }
    }
}

/// Fused ranking plus the side that was dropped, if fusion degraded.
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    pub results: Vec<FusedResult>,
    pub degraded: Option<FusionSide>,
    /// Embedding of the question, when the strategy needed one.
    pub question_vector: Option<Vec<f32>>,
}

impl FusionOutcome {
    fn complete(results: Vec<FusedResult>, question_vector: Option<Vec<f32>>) -> Self {
        Self { results, degraded: None, question_vector }
    }
}

#[derive(Clone)]
pub struct FusionEngine {
    index: Arc<dyn SearchIndex>,
    formulator: QueryFormulator,
    settings: RetrievalSettings,
}

impl FusionEngine {
    pub fn new(index: Arc<dyn SearchIndex>, embedder: Arc<dyn Embedder>, settings: RetrievalSettings) -> Self {
        Self { index, formulator: QueryFormulator::new(embedder), settings }
    }

    pub async fn search(
        &self,
        strategy: SearchStrategy,
        question: &str,
        filter: Option<&Filter>,
        size: usize,
        ctx: &CallContext,
    ) -> Result<FusionOutcome> {
        strategy.validate()?;
        let fields = &self.settings.lexical_fields;
        match strategy {
            SearchStrategy::Lexical => {
                let query = self.formulator.build_lexical_query(question, fields)?;
                let hits = ctx.run("lexical", self.index.lexical(&query, filter, size)).await?;
                Ok(FusionOutcome::complete(single_list(hits, FusionSide::Lexical, None), None))
            }
            SearchStrategy::Vector => {
                let query = self.formulator.build_vector_query(question, size, ctx).await?;
                let hits = ctx.run("vector", self.index.vector(&query, filter)).await?;
                Ok(FusionOutcome::complete(single_list(hits, FusionSide::Vector, None), Some(query.vector)))
            }
            SearchStrategy::WeightedHybrid { weight } => {
                let query = self.formulator.build_hybrid_query(question, fields, size, ctx).await?;
                let pipeline = pipeline_id(&self.settings.pipeline_prefix, weight);
                debug!(%pipeline, size, "weighted hybrid search");
                let hits = ctx.run("hybrid", self.index.hybrid(&query, &pipeline, filter, size)).await?;
                Ok(FusionOutcome::complete(server_ranked(hits), Some(query.vector.vector)))
            }
            SearchStrategy::ReciprocalRankFusion { weight } => self.rrf(question, filter, size, weight, ctx).await,
        }
    }

    /// The question is embedded before either sub-query is sent, so an
    /// embedding failure fails the call as `EmbeddingUnavailable` and never
    /// counts as a partial failure.
    async fn rrf(&self, question: &str, filter: Option<&Filter>, size: usize, weight: f64, ctx: &CallContext) -> Result<FusionOutcome> {
        let lexical_query = self.formulator.build_lexical_query(question, &self.settings.lexical_fields)?;
        let vector_query = self.formulator.build_vector_query(question, size, ctx).await?;
        let lexical = ctx.run("lexical", self.index.lexical(&lexical_query, filter, size));
        let vector = ctx.run("vector", self.index.vector(&vector_query, filter));
        let (lexical, vector) = tokio::join!(lexical, vector);

        let offset = self.settings.rrf_offset;
        let outcome = match (lexical, vector) {
            (Ok(l), Ok(v)) => {
                debug!(lexical = l.len(), vector = v.len(), weight, "rrf fusion");
                FusionOutcome::complete(reciprocal_rank_fusion(&l, &v, weight, offset, self.settings.rrf_tie_scan), None)
            }
            // Both failed: report the lexical error.
            (Err(e), Err(_)) => return Err(e),
            (Err(e), Ok(v)) => self.partial(FusionSide::Lexical, e, v)?,
            (Ok(l), Err(e)) => self.partial(FusionSide::Vector, e, l)?,
        };
        Ok(FusionOutcome { question_vector: Some(vector_query.vector), ..outcome })
    }

    fn partial(&self, failed: FusionSide, error: Error, survivor: Vec<RankedHit>) -> Result<FusionOutcome> {
        if matches!(error, Error::Cancelled(_)) {
            return Err(error);
        }
        match self.settings.on_partial_failure {
            PartialFailurePolicy::Abort => Err(Error::PartialFusionFailure { side: failed, source: Box::new(error) }),
            PartialFailurePolicy::Degrade => {
                warn!(side = %failed, error = %error, "rrf sub-query failed, ranking the surviving list alone");
                let side = match failed {
                    FusionSide::Lexical => FusionSide::Vector,
                    FusionSide::Vector => FusionSide::Lexical,
                };
                Ok(FusionOutcome {
                    results: single_list(survivor, side, Some(self.settings.rrf_offset)),
                    degraded: Some(failed),
                    question_vector: None,
                })
            }
        }
    }
}

/// Score contributed by a 1-based `rank`.
pub fn rrf_score(rank: usize, offset: f64) -> f64 {
    1.0 / (rank as f64 + offset)
}

/// Weighted RRF over two ranked lists. Entities absent from a list score 0
/// there. Equal fused scores keep first-appearance order, scanning the lists
/// in `tie_scan` order.
pub fn reciprocal_rank_fusion(lexical: &[RankedHit], vector: &[RankedHit], weight: f64, offset: f64, tie_scan: TieScan) -> Vec<FusedResult> {
    struct Entry<'a> {
        hit: &'a RankedHit,
        lexical_rank: Option<usize>,
        vector_rank: Option<usize>,
    }

    let (first, second) = match tie_scan {
        TieScan::VectorFirst => ((vector, FusionSide::Vector), (lexical, FusionSide::Lexical)),
        TieScan::LexicalFirst => ((lexical, FusionSide::Lexical), (vector, FusionSide::Vector)),
    };

    let mut order: Vec<Entry<'_>> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();
    for (list, side) in [first, second] {
        for hit in list {
            let i = *position.entry(hit.fragment.id.as_str()).or_insert_with(|| {
                order.push(Entry { hit, lexical_rank: None, vector_rank: None });
                order.len() - 1
            });
            let slot = match side {
                FusionSide::Lexical => &mut order[i].lexical_rank,
                FusionSide::Vector => &mut order[i].vector_rank,
            };
            // A repeated id within one list keeps its best rank.
            if slot.map_or(true, |r| hit.rank < r) {
                *slot = Some(hit.rank);
            }
        }
    }

    let mut scored: Vec<(f64, Entry<'_>)> = order
        .into_iter()
        .map(|e| {
            let lex = e.lexical_rank.map_or(0.0, |r| rrf_score(r, offset));
            let vec = e.vector_rank.map_or(0.0, |r| rrf_score(r, offset));
            (weight * vec + (1.0 - weight) * lex, e)
        })
        .collect();
    // Stable: ties keep scan order.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (score, e))| FusedResult {
            fragment: e.hit.fragment.clone(),
            score,
            rank: i + 1,
            lexical_rank: e.lexical_rank,
            vector_rank: e.vector_rank,
        })
        .collect()
}

/// One list, in its own order. With `offset`, scores are RRF scores (used when
/// fusion degraded); otherwise the backend score is kept.
fn single_list(hits: Vec<RankedHit>, side: FusionSide, offset: Option<f64>) -> Vec<FusedResult> {
    let mut hits = hits;
    hits.sort_by_key(|h| h.rank);
    hits.into_iter()
        .enumerate()
        .map(|(i, h)| {
            let score = offset.map_or(f64::from(h.score), |o| rrf_score(h.rank, o));
            let (lexical_rank, vector_rank) = match side {
                FusionSide::Lexical => (Some(h.rank), None),
                FusionSide::Vector => (None, Some(h.rank)),
            };
            FusedResult { fragment: h.fragment, score, rank: i + 1, lexical_rank, vector_rank }
        })
        .collect()
}

fn server_ranked(hits: Vec<RankedHit>) -> Vec<FusedResult> {
    let mut hits = hits;
    hits.sort_by_key(|h| h.rank);
    hits.into_iter()
        .enumerate()
        .map(|(i, h)| FusedResult { fragment: h.fragment, score: f64::from(h.score), rank: i + 1, lexical_rank: None, vector_rank: None })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use litrag_core::types::{Fragment, SourceKind};
    use proptest::prelude::*;

    fn hits(ids: &[&str], source: SourceKind) -> Vec<RankedHit> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| RankedHit { fragment: Fragment::new(*id, 0, 1, *id), rank: i + 1, score: 1.0, source })
            .collect()
    }

    fn parents(results: &[FusedResult]) -> Vec<&str> {
        results.iter().map(|r| r.fragment.parent_id.as_str()).collect()
    }

    #[test]
    fn strategy_weights_are_validated() {
        assert!(SearchStrategy::WeightedHybrid { weight: 0.0 }.validate().is_ok());
        assert!(SearchStrategy::ReciprocalRankFusion { weight: 1.0 }.validate().is_ok());
        for bad in [-0.01, 1.01, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(SearchStrategy::WeightedHybrid { weight: bad }.validate(), Err(Error::InvalidWeight(_))));
            assert!(matches!(SearchStrategy::ReciprocalRankFusion { weight: bad }.validate(), Err(Error::InvalidWeight(_))));
        }
        assert!(SearchStrategy::Lexical.validate().is_ok());
    }

    #[test]
    fn rrf_tie_order_follows_scan_order() {
        let lexical = hits(&["A", "B", "C"], SourceKind::Lexical);
        let vector = hits(&["B", "A", "D"], SourceKind::Vector);

        let vector_first = reciprocal_rank_fusion(&lexical, &vector, 0.5, 1.0, TieScan::VectorFirst);
        assert_eq!(parents(&vector_first), vec!["B", "A", "D", "C"]);
        let lexical_first = reciprocal_rank_fusion(&lexical, &vector, 0.5, 1.0, TieScan::LexicalFirst);
        assert_eq!(parents(&lexical_first), vec!["A", "B", "C", "D"]);

        let a = &lexical_first[0];
        assert_eq!((a.lexical_rank, a.vector_rank), (Some(1), Some(2)));
        assert!((a.score - (0.5 / 2.0 + 0.5 / 3.0)).abs() < 1e-12);
        assert_eq!(lexical_first.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn rrf_extreme_weights_follow_one_list() {
        let lexical = hits(&["A", "B", "C"], SourceKind::Lexical);
        let vector = hits(&["C", "B", "A"], SourceKind::Vector);
        assert_eq!(parents(&reciprocal_rank_fusion(&lexical, &vector, 0.0, 1.0, TieScan::VectorFirst)), vec!["A", "B", "C"]);
        assert_eq!(parents(&reciprocal_rank_fusion(&lexical, &vector, 1.0, 1.0, TieScan::LexicalFirst)), vec!["C", "B", "A"]);
    }

    #[test]
    fn degraded_single_list_uses_rrf_scores() {
        let out = single_list(hits(&["X", "Y"], SourceKind::Vector), FusionSide::Vector, Some(1.0));
        assert_eq!(parents(&out), vec!["X", "Y"]);
        assert!((out[0].score - 0.5).abs() < 1e-12);
        assert_eq!(out[1].vector_rank, Some(2));
        assert_eq!(out[1].lexical_rank, None);
    }

    proptest! {
        #[test]
        fn rrf_score_non_increasing_in_rank(rank in 1usize..10_000, offset in 0.0f64..100.0) {
            prop_assert!(rrf_score(rank, offset) >= rrf_score(rank + 1, offset));
        }

        #[test]
        fn fused_scores_are_sorted_and_ids_unique(
            lex in proptest::collection::vec(0u8..20, 0..15),
            vec in proptest::collection::vec(0u8..20, 0..15),
            weight in 0.0f64..=1.0,
        ) {
            let lex_ids: Vec<String> = lex.iter().map(|i| format!("p{i}")).collect();
            let vec_ids: Vec<String> = vec.iter().map(|i| format!("p{i}")).collect();
            let l = hits(&lex_ids.iter().map(String::as_str).collect::<Vec<_>>(), SourceKind::Lexical);
            let v = hits(&vec_ids.iter().map(String::as_str).collect::<Vec<_>>(), SourceKind::Vector);
            let out = reciprocal_rank_fusion(&l, &v, weight, 1.0, TieScan::VectorFirst);
            prop_assert!(out.windows(2).all(|w| w[0].score >= w[1].score));
            let mut ids: Vec<&str> = out.iter().map(|r| r.fragment.id.as_str()).collect();
            let n = ids.len();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), n);
        }
    }
}
