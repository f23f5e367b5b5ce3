//! Structured metadata filters.
//!
//! A retrieval reports its filter as `Option<Filter>`: `None` when extraction
//! was not requested, `Some(Filter::default())` when it ran and found nothing,
//! and a non-empty filter otherwise. Filters apply to fragments and documents
//! alike and are always evaluated before result truncation.
//!
//! Field names are logical: `title`, `authors`, `keywords`, `doi`,
//! `publication_date`, `parent_id`. Backends translate them.

use serde::{Deserialize, Serialize};

use crate::types::{Document, Fragment};

pub const FIELD_TITLE: &str = "title";
pub const FIELD_AUTHORS: &str = "authors";
pub const FIELD_KEYWORDS: &str = "keywords";
pub const FIELD_DOI: &str = "doi";
pub const FIELD_PUBLICATION_DATE: &str = "publication_date";
pub const FIELD_PARENT_ID: &str = "parent_id";

/// Fields stored as exact values rather than analyzed text.
pub fn is_keyword_field(field: &str) -> bool {
    matches!(field, FIELD_AUTHORS | FIELD_KEYWORDS | FIELD_DOI)
}

/// Type of a filterable metadata field, as presented to the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Keyword,
    Integer,
    Float,
    Year,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float | FieldType::Year)
    }
}

/// One entry of the metadata schema handed to the filter extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), description: description.into(), field_type }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeUnit {
    #[default]
    Number,
    /// Bounds are calendar years compared against the year of a date field.
    Year,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RangePredicate {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
    #[serde(default)]
    pub unit: RangeUnit,
}

impl RangePredicate {
    pub fn new(field: impl Into<String>, unit: RangeUnit) -> Self {
        Self { field: field.into(), unit, ..Self::default() }
    }

    /// Closed interval `[lo, hi]`.
    pub fn between(field: impl Into<String>, lo: f64, hi: f64, unit: RangeUnit) -> Self {
        Self { gte: Some(lo), lte: Some(hi), ..Self::new(field, unit) }
    }

    pub fn has_bounds(&self) -> bool {
        self.gt.is_some() || self.gte.is_some() || self.lt.is_some() || self.lte.is_some()
    }

    pub fn contains(&self, value: f64) -> bool {
        self.gt.map_or(true, |b| value > b)
            && self.gte.map_or(true, |b| value >= b)
            && self.lt.map_or(true, |b| value < b)
            && self.lte.map_or(true, |b| value <= b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermMode {
    /// Whole-value equality.
    #[default]
    Exact,
    /// Case-insensitive: every token for text fields, substring for keyword fields.
    Match,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermPredicate {
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub mode: TermMode,
}

impl TermPredicate {
    pub fn exact(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self { field: field.into(), value: value.into(), mode: TermMode::Exact }
    }

    pub fn matching(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self { field: field.into(), value: value.into(), mode: TermMode::Match }
    }

    fn accepts(&self, candidates: &[&str]) -> bool {
        match self.mode {
            TermMode::Exact => candidates.iter().any(|c| *c == self.value),
            TermMode::Match if is_keyword_field(&self.field) => {
                let needle = self.value.to_lowercase();
                candidates.iter().any(|c| c.to_lowercase().contains(&needle))
            }
            TermMode::Match => {
                let wanted = tokens(&self.value);
                if wanted.is_empty() {
                    return false;
                }
                candidates.iter().any(|c| {
                    let have = tokens(c);
                    wanted.iter().all(|w| have.contains(w))
                })
            }
        }
    }
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Conjunction of range and term predicates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub ranges: Vec<RangePredicate>,
    #[serde(default)]
    pub terms: Vec<TermPredicate>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() && self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len() + self.terms.len()
    }

    pub fn with_range(mut self, range: RangePredicate) -> Self {
        self.ranges.push(range);
        self
    }

    pub fn with_term(mut self, term: TermPredicate) -> Self {
        self.terms.push(term);
        self
    }

    pub fn matches(&self, fragment: &Fragment) -> bool {
        self.evaluate(fragment)
    }

    pub fn matches_document(&self, document: &Document) -> bool {
        self.evaluate(document)
    }

    fn evaluate<R: Record>(&self, record: &R) -> bool {
        let ranges_ok = self.ranges.iter().all(|r| {
            record
                .numeric(&r.field)
                .is_some_and(|v| r.contains(v))
        });
        ranges_ok && self.terms.iter().all(|t| t.accepts(&record.values(&t.field)))
    }
}

/// Uniform field access over fragments and documents.
trait Record {
    fn parent_id(&self) -> &str;
    fn title(&self) -> &str;
    fn authors(&self) -> &[String];
    fn keywords(&self) -> &[String];
    fn doi(&self) -> Option<&str>;
    fn year(&self) -> Option<i32>;

    fn values(&self, field: &str) -> Vec<&str> {
        match field {
            FIELD_TITLE => vec![self.title()],
            FIELD_AUTHORS => self.authors().iter().map(String::as_str).collect(),
            FIELD_KEYWORDS => self.keywords().iter().map(String::as_str).collect(),
            FIELD_DOI => self.doi().into_iter().collect(),
            FIELD_PARENT_ID => vec![self.parent_id()],
            _ => Vec::new(),
        }
    }

    fn numeric(&self, field: &str) -> Option<f64> {
        match field {
            FIELD_PUBLICATION_DATE => self.year().map(f64::from),
            FIELD_PARENT_ID => self.parent_id().parse().ok(),
            _ => None,
        }
    }
}

impl Record for Fragment {
    fn parent_id(&self) -> &str {
        &self.parent_id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn authors(&self) -> &[String] {
        &self.authors
    }
    fn keywords(&self) -> &[String] {
        &self.keywords
    }
    fn doi(&self) -> Option<&str> {
        self.doi.as_deref()
    }
    fn year(&self) -> Option<i32> {
        self.publication_year()
    }
}

impl Record for Document {
    fn parent_id(&self) -> &str {
        &self.parent_id
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn authors(&self) -> &[String] {
        &self.authors
    }
    fn keywords(&self) -> &[String] {
        &self.keywords
    }
    fn doi(&self) -> Option<&str> {
        self.doi.as_deref()
    }
    fn year(&self) -> Option<i32> {
        self.publication_year()
    }
}
