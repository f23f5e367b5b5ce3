use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use litrag_core::types::{split_fragment_id, Document, Fragment, RankedHit, SourceKind};

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Option<HitsEnvelope>,
}

#[derive(Debug, Deserialize)]
pub struct HitsEnvelope {
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f32>,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

impl SearchResponse {
    /// A response without a `hits` object means "no hits".
    pub fn into_hits(self) -> Vec<Hit> {
        self.hits.map(|h| h.hits).unwrap_or_default()
    }
}

/// `pmid` is mapped as an integer but older ingests stored strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Int(i64),
    Str(String),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            IdValue::Int(i) => i.to_string(),
            IdValue::Str(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FragmentSource {
    pmid: Option<IdValue>,
    #[serde(default)]
    abstract_fragment: String,
    fragment_id: Option<usize>,
    number_of_fragments: Option<usize>,
    title: Option<String>,
    author_list: Option<Vec<String>>,
    keyword_list: Option<Vec<String>>,
    doi: Option<String>,
    publication_date: Option<String>,
    abstract_fragment_embedding: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct DocumentSource {
    pmid: Option<IdValue>,
    title: Option<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: String,
    author_list: Option<Vec<String>>,
    keyword_list: Option<Vec<String>>,
    doi: Option<String>,
    publication_date: Option<String>,
}

fn decode_fragment(hit: Hit) -> Option<Fragment> {
    let src: FragmentSource = match serde_json::from_value(hit.source) {
        Ok(src) => src,
        Err(e) => {
            warn!(id = %hit.id, error = %e, "skipping fragment hit with malformed _source");
            return None;
        }
    };
    let from_id = split_fragment_id(&hit.id);
    let parent_id = src
        .pmid
        .map(IdValue::into_string)
        .or_else(|| from_id.map(|(p, _)| p.to_string()))?;
    let index = src.fragment_id.or(from_id.map(|(_, i)| i)).unwrap_or(0);
    let count = src.number_of_fragments.unwrap_or(index + 1).max(index + 1);
    Some(Fragment {
        id: hit.id,
        parent_id,
        index,
        count,
        text: src.abstract_fragment,
        embedding: src.abstract_fragment_embedding,
        title: src.title.unwrap_or_default(),
        authors: src.author_list.unwrap_or_default(),
        keywords: src.keyword_list.unwrap_or_default(),
        doi: src.doi,
        publication_date: src.publication_date,
    })
}

/// Decode hits into ranked fragments. Ranks are contiguous over the hits that
/// could be decoded.
pub fn ranked_fragments(response: SearchResponse, source: SourceKind) -> Vec<RankedHit> {
    response
        .into_hits()
        .into_iter()
        .filter_map(|hit| {
            let score = hit.score.unwrap_or(0.0);
            decode_fragment(hit).map(|f| (f, score))
        })
        .enumerate()
        .map(|(i, (fragment, score))| RankedHit { fragment, rank: i + 1, score, source })
        .collect()
}

pub fn documents(response: SearchResponse) -> Vec<Document> {
    response
        .into_hits()
        .into_iter()
        .filter_map(|hit| {
            let src: DocumentSource = match serde_json::from_value(hit.source) {
                Ok(src) => src,
                Err(e) => {
                    warn!(id = %hit.id, error = %e, "skipping document with malformed _source");
                    return None;
                }
            };
            let parent_id = src.pmid.map(IdValue::into_string).unwrap_or(hit.id);
            Some(Document {
                parent_id,
                title: src.title.unwrap_or_default(),
                abstract_text: src.abstract_text,
                authors: src.author_list.unwrap_or_default(),
                keywords: src.keyword_list.unwrap_or_default(),
                doi: src.doi,
                publication_date: src.publication_date,
            })
        })
        .collect()
}
