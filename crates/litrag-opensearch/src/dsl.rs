//! Query DSL builders.
//!
//! Logical field names map onto the physical mapping of the `abstracts` and
//! `abstract_fragments` indices. `author_list`, `keyword_list` and `doi` are
//! keyword fields, `publication_date` is a date, `pmid` an integer.

use serde_json::{json, Value};

use litrag_core::filter::{is_keyword_field, Filter, RangeUnit, TermMode};
use litrag_core::types::{HybridQuery, LexicalQuery, VectorQuery};

pub const EMBEDDING_FIELD: &str = "abstract_fragment_embedding";
pub const FRAGMENT_TEXT_FIELD: &str = "abstract_fragment";
pub const DOCUMENT_TEXT_FIELD: &str = "abstract";
pub const PARENT_FIELD: &str = "pmid";

/// Which index a query targets; only the `text` field differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Fragments,
    Documents,
}

pub fn physical_field(logical: &str, collection: Collection) -> &str {
    match (logical, collection) {
        ("text", Collection::Fragments) => FRAGMENT_TEXT_FIELD,
        ("text", Collection::Documents) => DOCUMENT_TEXT_FIELD,
        ("keywords", _) => "keyword_list",
        ("authors", _) => "author_list",
        ("parent_id", _) => PARENT_FIELD,
        (other, _) => other,
    }
}

/// `match` for one field, `multi_match` for several.
pub fn lexical_clause(query: &LexicalQuery) -> Value {
    let fields: Vec<&str> = query.fields.iter().map(|f| physical_field(f, Collection::Fragments)).collect();
    match fields.as_slice() {
        [single] => json!({ "match": { *single: { "query": query.text } } }),
        _ => json!({ "multi_match": { "query": query.text, "fields": fields } }),
    }
}

pub fn filter_clauses(filter: &Filter, collection: Collection) -> Vec<Value> {
    let mut clauses = Vec::with_capacity(filter.len());
    for range in &filter.ranges {
        let field = physical_field(&range.field, collection);
        let mut bounds = serde_json::Map::new();
        let bound = |v: f64| match range.unit {
            RangeUnit::Year => json!(format!("{:04}", v.round() as i64)),
            RangeUnit::Number => json!(v),
        };
        for (key, value) in [("gt", range.gt), ("gte", range.gte), ("lt", range.lt), ("lte", range.lte)] {
            if let Some(v) = value {
                bounds.insert(key.to_string(), bound(v));
            }
        }
        if range.unit == RangeUnit::Year {
            bounds.insert("format".to_string(), json!("yyyy"));
        }
        clauses.push(json!({ "range": { field: bounds } }));
    }
    for term in &filter.terms {
        let field = physical_field(&term.field, collection);
        let clause = match term.mode {
            TermMode::Exact => json!({ "term": { field: term.value } }),
            TermMode::Match if is_keyword_field(&term.field) => json!({
                "wildcard": { field: { "value": format!("*{}*", escape_wildcard(&term.value)), "case_insensitive": true } }
            }),
            TermMode::Match => json!({ "match": { field: { "query": term.value, "operator": "and" } } }),
        };
        clauses.push(clause);
    }
    clauses
}

fn escape_wildcard(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn with_filter(query: Value, filter: Option<&Filter>) -> Value {
    match filter {
        Some(f) if !f.is_empty() => json!({
            "bool": { "must": [query], "filter": filter_clauses(f, Collection::Fragments) }
        }),
        _ => query,
    }
}

pub fn knn_clause(query: &VectorQuery, filter: Option<&Filter>) -> Value {
    let mut knn = json!({ "vector": query.vector, "k": query.k });
    if let Some(f) = filter.filter(|f| !f.is_empty()) {
        knn["filter"] = json!({ "bool": { "filter": filter_clauses(f, Collection::Fragments) } });
    }
    json!({ "knn": { EMBEDDING_FIELD: knn } })
}

fn source_without_vectors() -> Value {
    json!({ "excludes": [EMBEDDING_FIELD] })
}

pub fn lexical_body(query: &LexicalQuery, filter: Option<&Filter>, size: usize) -> Value {
    json!({
        "size": size,
        "query": with_filter(lexical_clause(query), filter),
        "_source": source_without_vectors(),
    })
}

pub fn vector_body(query: &VectorQuery, filter: Option<&Filter>) -> Value {
    json!({
        "size": query.k,
        "query": knn_clause(query, filter),
        "_source": source_without_vectors(),
    })
}

/// Vector sub-query first: pipeline weights are declared `[vector, lexical]`.
pub fn hybrid_body(query: &HybridQuery, filter: Option<&Filter>, size: usize) -> Value {
    json!({
        "size": size,
        "query": {
            "hybrid": {
                "queries": [
                    knn_clause(&query.vector, filter),
                    with_filter(lexical_clause(&query.lexical), filter),
                ]
            }
        },
        "_source": source_without_vectors(),
    })
}

pub fn documents_body(parent_ids: &[String], filter: Option<&Filter>) -> Value {
    let mut clauses = vec![json!({ "terms": { PARENT_FIELD: parent_ids } })];
    if let Some(f) = filter {
        clauses.extend(filter_clauses(f, Collection::Documents));
    }
    json!({
        "size": parent_ids.len(),
        "query": { "bool": { "filter": clauses } },
    })
}
