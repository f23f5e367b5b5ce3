//! Similarity → confidence calibration.
//!
//! Unrelated texts still land around 0.80 cosine similarity in the embedding
//! space, so raw similarity is mapped onto an angular percentage
//! `p = (π − arccos(sim))·100/π`, shifted by `floor`, stretched by `stretch`,
//! rescaled so that `p = 100` maps to 100, clipped to `[0, 100]` and rounded.

use std::f64::consts::PI;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use litrag_core::config::ConfidenceSettings;
use litrag_core::embedding::{cosine_similarity, embed_texts};
use litrag_core::traits::Embedder;
use litrag_core::{CallContext, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    /// Calibrated value in `[0, 100]`.
    pub value: u8,
    pub level: ConfidenceLevel,
    pub similarity: f64,
}

pub fn angular_percentage(similarity: f64) -> f64 {
    (PI - similarity.clamp(-1.0, 1.0).acos()) * 100.0 / PI
}

pub fn calibrate(similarity: f64, floor: f64, stretch: f64) -> u8 {
    let p = angular_percentage(similarity);
    let c = (p - floor) * stretch * 100.0 / (100.0 - floor);
    // NaN similarity clamps to 0.
    let c = if c.is_nan() { 0.0 } else { c.clamp(0.0, 100.0) };
    c.round() as u8
}

pub fn level(similarity: f64, settings: &ConfidenceSettings) -> ConfidenceLevel {
    if similarity > settings.high_similarity {
        ConfidenceLevel::High
    } else if similarity > settings.medium_similarity {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

#[derive(Clone)]
pub struct ConfidenceScorer {
    embedder: Arc<dyn Embedder>,
    settings: ConfidenceSettings,
}

impl ConfidenceScorer {
    pub fn new(embedder: Arc<dyn Embedder>, settings: ConfidenceSettings) -> Self {
        Self { embedder, settings }
    }

    pub fn rate(&self, similarity: f64) -> Confidence {
        Confidence {
            value: calibrate(similarity, self.settings.floor, self.settings.stretch),
            level: level(similarity, &self.settings),
            similarity,
        }
    }

    /// One confidence per candidate, in candidate order. The question and all
    /// candidates are embedded in a single batch.
    pub async fn score(&self, question: &str, candidates: &[String], ctx: &CallContext) -> Result<Vec<Confidence>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let mut texts = Vec::with_capacity(candidates.len() + 1);
        texts.push(question.to_string());
        texts.extend(candidates.iter().cloned());
        let vectors = ctx.run("embedding", embed_texts(&self.embedder, texts)).await?;
        let (q, rest) = vectors
            .split_first()
            .ok_or_else(|| Error::EmbeddingUnavailable("no vector returned for the question".into()))?;
        Ok(self.rate_all(q, rest))
    }

    /// Like [`score`](Self::score) for a question that is already embedded;
    /// only the candidates go to the embedder.
    pub async fn score_against(&self, question_vector: &[f32], candidates: &[String], ctx: &CallContext) -> Result<Vec<Confidence>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = ctx.run("embedding", embed_texts(&self.embedder, candidates.to_vec())).await?;
        Ok(self.rate_all(question_vector, &vectors))
    }

    fn rate_all(&self, question: &[f32], candidates: &[Vec<f32>]) -> Vec<Confidence> {
        candidates.iter().map(|v| self.rate(cosine_similarity(question, v))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const W: f64 = 80.0;
    const F: f64 = 1.5;

    #[test]
    fn anchor_points() {
        // p = 80 ⇔ arccos(sim) = 0.2π
        let at_floor = (0.2 * PI).cos();
        assert_eq!(calibrate(at_floor, W, F), 0);
        assert_eq!(calibrate(1.0, W, F), 100);
        assert_eq!(calibrate(0.0, W, F), 0);
        assert_eq!(calibrate(-1.0, W, F), 0);
        assert_eq!(calibrate(1.2, W, F), 100);
        assert_eq!(calibrate(f64::NAN, W, F), 0);
    }

    #[test]
    fn mid_range_value() {
        // sim = cos(0.1π): p = 90, c = 10 * 1.5 * 5 = 75
        assert_eq!(calibrate((0.1 * PI).cos(), W, F), 75);
    }

    #[test]
    fn levels_use_similarity_thresholds() {
        let s = ConfidenceSettings::default();
        assert_eq!(level(0.90, &s), ConfidenceLevel::High);
        assert_eq!(level(0.85, &s), ConfidenceLevel::Medium);
        assert_eq!(level(0.81, &s), ConfidenceLevel::Medium);
        assert_eq!(level(0.80, &s), ConfidenceLevel::Low);
    }

    proptest! {
        #[test]
        fn monotone_and_bounded(a in -1.0f64..=1.0, b in -1.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(calibrate(lo, W, F) <= calibrate(hi, W, F));
            prop_assert!(calibrate(hi, W, F) <= 100);
        }
    }
}
