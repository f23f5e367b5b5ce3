//! Domain types shared by the search backends and the retrieval core.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub type ParentId = String;
pub type FragmentId = String;

/// A contiguous slice of an abstract that is independently indexed.
///
/// - `id`: `"{parent_id}_{index}"`, see [`fragment_id`]
/// - `parent_id`: identity of the owning [`Document`]
/// - `index`/`count`: position within the parent, `index < count`
/// - `embedding`: only present when the backend was asked to return vectors
/// - `publication_date`: stored form, `yyyy-MM-dd HH:mm:ss` or `yyyy-MM-dd`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub parent_id: ParentId,
    pub index: usize,
    pub count: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub publication_date: Option<String>,
}

impl Fragment {
    /// Minimal fragment with empty metadata; the id is derived from the parent.
    pub fn new(parent_id: impl Into<String>, index: usize, count: usize, text: impl Into<String>) -> Self {
        let parent_id = parent_id.into();
        Self {
            id: fragment_id(&parent_id, index),
            parent_id,
            index,
            count,
            text: text.into(),
            embedding: None,
            title: String::new(),
            authors: Vec::new(),
            keywords: Vec::new(),
            doi: None,
            publication_date: None,
        }
    }

    pub fn publication_year(&self) -> Option<i32> {
        self.publication_date.as_deref().and_then(parse_year)
    }
}

/// A whole abstract with its bibliographic metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub parent_id: ParentId,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub publication_date: Option<String>,
}

impl Document {
    pub fn publication_year(&self) -> Option<i32> {
        self.publication_date.as_deref().and_then(parse_year)
    }
}

/// Build the fragment identifier for the `index`-th fragment of `parent_id`.
pub fn fragment_id(parent_id: &str, index: usize) -> FragmentId {
    format!("{parent_id}_{index}")
}

/// Inverse of [`fragment_id`]. Splits on the last underscore so parent ids
/// containing underscores survive.
pub fn split_fragment_id(id: &str) -> Option<(&str, usize)> {
    let (parent, index) = id.rsplit_once('_')?;
    if parent.is_empty() {
        return None;
    }
    index.parse().ok().map(|i| (parent, i))
}

/// Name of the server-side pipeline that combines hybrid sub-queries with
/// vector share `weight`, rendered with two decimals
/// (`hybrid_search_pipeline_weight_0.50`).
pub fn pipeline_id(prefix: &str, weight: f64) -> String {
    format!("{prefix}{weight:.2}")
}

fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.year());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.year());
    }
    raw.get(..4).and_then(|y| y.parse().ok())
}

/// Which query produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Lexical,
    Vector,
    Hybrid,
}

/// One side of a two-list fusion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FusionSide {
    Lexical,
    Vector,
}

impl fmt::Display for FusionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionSide::Lexical => f.write_str("lexical"),
            FusionSide::Vector => f.write_str("vector"),
        }
    }
}

/// A hit as returned by a single query. `rank` is 1-based and query-local;
/// `score` is backend-specific but higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedHit {
    pub fragment: Fragment,
    pub rank: usize,
    pub score: f32,
    pub source: SourceKind,
}

/// A hit after fusion. `rank` is reassigned `1..=N` in fused order.
/// `lexical_rank`/`vector_rank` record where the fragment sat in each input
/// list when the strategy had two lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedResult {
    pub fragment: Fragment,
    pub score: f64,
    pub rank: usize,
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,
}

/// Full-text match over one or several fields. Field names are logical
/// (`text`, `title`, `keywords`, `authors`); backends map them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalQuery {
    pub text: String,
    pub fields: Vec<String>,
}

impl LexicalQuery {
    pub fn is_multi_field(&self) -> bool {
        self.fields.len() > 1
    }
}

/// k-nearest-neighbour query over fragment embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub k: usize,
}

/// Both halves of a hybrid request, executed by a named server pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridQuery {
    pub lexical: LexicalQuery,
    pub vector: VectorQuery,
}
