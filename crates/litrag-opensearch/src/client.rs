use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use litrag_core::config::OpenSearchSettings;
use litrag_core::error::{Error, Result};
use litrag_core::filter::Filter;
use litrag_core::traits::SearchIndex;
use litrag_core::types::{Document, HybridQuery, LexicalQuery, RankedHit, SourceKind, VectorQuery};

use crate::dsl;
use crate::response::{self, SearchResponse};

pub const BACKEND: &str = "opensearch";

pub struct OpenSearchIndex {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    fragments_index: String,
    documents_index: String,
}

impl OpenSearchIndex {
    pub fn new(settings: &OpenSearchSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("opensearch client: {e}")))?;
        Ok(Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            fragments_index: settings.fragments_index.clone(),
            documents_index: settings.documents_index.clone(),
        })
    }

    async fn search(
        &self,
        index: &str,
        operation: &'static str,
        body: &Value,
        pipeline: Option<&str>,
    ) -> Result<SearchResponse> {
        let url = format!("{}/{}/_search", self.base_url, index);
        debug!(%url, operation, pipeline, "opensearch request");
        let mut req = self.http.post(&url).json(body);
        if let Some(p) = pipeline {
            req = req.query(&[("search_pipeline", p)]);
        }
        if let Some(user) = &self.username {
            req = req.basic_auth(user, self.password.as_deref());
        }
        let res = req
            .send()
            .await
            .map_err(|e| Error::index_unavailable(BACKEND, operation, e))?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| Error::index_unavailable(BACKEND, operation, e))?;
        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text, operation, pipeline));
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::index_rejected(BACKEND, operation, format!("unparseable response: {e}")))
    }
}

/// Map a non-2xx answer onto the error taxonomy. A 400/404 that mentions the
/// pipeline when one was requested is `PipelineNotFound`; 408, 429 and 5xx
/// are transient; everything else is a rejection.
pub fn classify_failure(status: u16, body: &str, operation: &'static str, pipeline: Option<&str>) -> Error {
    if let Some(p) = pipeline {
        if matches!(status, 400 | 404) && body.to_lowercase().contains("pipeline") {
            return Error::PipelineNotFound(p.to_string());
        }
    }
    let snippet: String = body.chars().take(300).collect();
    let message = format!("HTTP {status}: {snippet}");
    match status {
        408 | 429 | 500..=599 => Error::index_unavailable(BACKEND, operation, message),
        _ => Error::index_rejected(BACKEND, operation, message),
    }
}

#[async_trait]
impl SearchIndex for OpenSearchIndex {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn lexical(&self, query: &LexicalQuery, filter: Option<&Filter>, size: usize) -> Result<Vec<RankedHit>> {
        let body = dsl::lexical_body(query, filter, size);
        let resp = self.search(&self.fragments_index, "lexical", &body, None).await?;
        Ok(response::ranked_fragments(resp, SourceKind::Lexical))
    }

    async fn vector(&self, query: &VectorQuery, filter: Option<&Filter>) -> Result<Vec<RankedHit>> {
        let body = dsl::vector_body(query, filter);
        let resp = self.search(&self.fragments_index, "vector", &body, None).await?;
        Ok(response::ranked_fragments(resp, SourceKind::Vector))
    }

    async fn hybrid(
        &self,
        query: &HybridQuery,
        pipeline_id: &str,
        filter: Option<&Filter>,
        size: usize,
    ) -> Result<Vec<RankedHit>> {
        let body = dsl::hybrid_body(query, filter, size);
        let resp = self
            .search(&self.fragments_index, "hybrid", &body, Some(pipeline_id))
            .await?;
        Ok(response::ranked_fragments(resp, SourceKind::Hybrid))
    }

    async fn documents(&self, parent_ids: &[String], filter: Option<&Filter>) -> Result<Vec<Document>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = dsl::documents_body(parent_ids, filter);
        let resp = self.search(&self.documents_index, "documents", &body, None).await?;
        let docs = response::documents(resp);
        if docs.len() < parent_ids.len() {
            warn!(requested = parent_ids.len(), found = docs.len(), "some documents were not returned");
        }
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_are_recognised() {
        let body = r#"{"error":{"type":"illegal_argument_exception","reason":"Pipeline hybrid_search_pipeline_weight_0.30 is not defined"},"status":400}"#;
        let err = classify_failure(400, body, "hybrid", Some("hybrid_search_pipeline_weight_0.30"));
        assert!(matches!(err, Error::PipelineNotFound(ref id) if id == "hybrid_search_pipeline_weight_0.30"));
    }

    #[test]
    fn pipeline_wording_without_pipeline_request_is_a_rejection() {
        let err = classify_failure(400, "pipeline", "lexical", None);
        assert!(matches!(err, Error::IndexRejected { operation: "lexical", .. }));
    }

    #[test]
    fn server_side_failures_are_transient() {
        for status in [408u16, 429, 500, 503] {
            assert!(classify_failure(status, "", "vector", None).is_transient(), "status {status}");
        }
        assert!(!classify_failure(403, "", "vector", None).is_transient());
    }
}
