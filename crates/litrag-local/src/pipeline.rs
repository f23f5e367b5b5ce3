//! Hybrid search pipelines.
//!
//! A pipeline normalises each sub-query's scores with min-max over its own
//! result list, then combines them with a weighted arithmetic mean where the
//! vector list carries `weight` and the lexical list `1 - weight`. A fragment
//! missing from a list contributes 0 from that list.

use std::collections::HashMap;
use std::sync::RwLock;

use litrag_core::types::pipeline_id;

/// Named pipelines known to the embedded backend.
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    weights: RwLock<HashMap<String, f64>>,
}

impl PipelineRegistry {
    /// Register the pipeline for `weight` under `prefix` and return its id.
    pub fn register(&self, prefix: &str, weight: f64) -> String {
        let id = pipeline_id(prefix, weight);
        if let Ok(mut w) = self.weights.write() {
            w.insert(id.clone(), weight);
        }
        id
    }

    pub fn weight(&self, id: &str) -> Option<f64> {
        self.weights.read().ok().and_then(|w| w.get(id).copied())
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.weights.read().map(|w| w.keys().cloned().collect()).unwrap_or_default();
        ids.sort();
        ids
    }
}

/// Min-max normalisation; a list whose scores are all equal maps to 1.0.
pub fn min_max(scores: &[f32]) -> Vec<f64> {
    let (lo, hi) = scores.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        let s = f64::from(*s);
        (lo.min(s), hi.max(s))
    });
    scores
        .iter()
        .map(|s| if hi > lo { (f64::from(*s) - lo) / (hi - lo) } else { 1.0 })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combined {
    pub id: String,
    pub score: f64,
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,
}

/// Combine two ranked `(id, score)` lists. Ties are broken by rank in the
/// heavier list (vector at 0.5), then the other list, then id. Fragments seen
/// only in a zero-weighted list are dropped, so weight 0 reproduces the
/// lexical order and weight 1 the vector order exactly.
pub fn combine(lexical: &[(String, f32)], vector: &[(String, f32)], weight: f64) -> Vec<Combined> {
    let mut by_id: HashMap<&str, Combined> = HashMap::new();
    let lexical_weight = 1.0 - weight;

    let sides = [(lexical, lexical_weight, true), (vector, weight, false)];
    for (list, w, is_lexical) in sides {
        let scores: Vec<f32> = list.iter().map(|(_, s)| *s).collect();
        for (pos, ((id, _), norm)) in list.iter().zip(min_max(&scores)).enumerate() {
            let c = by_id
                .entry(id.as_str())
                .or_insert_with(|| Combined { id: id.clone(), score: 0.0, lexical_rank: None, vector_rank: None });
            // Duplicate ids within one list keep their first rank.
            let slot = if is_lexical { &mut c.lexical_rank } else { &mut c.vector_rank };
            if slot.is_none() {
                *slot = Some(pos + 1);
                c.score += w * norm;
            }
        }
    }
    let mut out: Vec<Combined> = by_id
        .into_values()
        .filter(|c| (lexical_weight > 0.0 && c.lexical_rank.is_some()) || (weight > 0.0 && c.vector_rank.is_some()))
        .collect();

    let vector_heavier = weight >= lexical_weight;
    out.sort_by(|a, b| {
        let (first_a, first_b, second_a, second_b) = if vector_heavier {
            (a.vector_rank, b.vector_rank, a.lexical_rank, b.lexical_rank)
        } else {
            (a.lexical_rank, b.lexical_rank, a.vector_rank, b.vector_rank)
        };
        b.score
            .total_cmp(&a.score)
            .then_with(|| rank_key(first_a).cmp(&rank_key(first_b)))
            .then_with(|| rank_key(second_a).cmp(&rank_key(second_b)))
            .then_with(|| a.id.cmp(&b.id))
    });
    out
}

fn rank_key(rank: Option<usize>) -> usize {
    rank.unwrap_or(usize::MAX)
}
