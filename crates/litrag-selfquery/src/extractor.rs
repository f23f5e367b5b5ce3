use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use litrag_core::config::SelfQuerySettings;
use litrag_core::filter::FieldSpec;
use litrag_core::traits::LanguageModel;
use litrag_core::{CallContext, Error, Filter, Result};

use crate::prompt::{build_prompt, output_schema};
use crate::translate::{translate, ModelAnswer};

/// Turns a natural-language question into a metadata [`Filter`] with one
/// structured completion.
#[derive(Clone)]
pub struct FilterExtractor {
    model: Arc<dyn LanguageModel>,
    document_description: String,
    fields: Vec<FieldSpec>,
    schema: Value,
}

impl FilterExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, settings: &SelfQuerySettings) -> Self {
        Self {
            model,
            document_description: settings.document_description.clone(),
            fields: settings.fields.clone(),
            schema: output_schema(),
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Like [`extract`](Self::extract) but reports why extraction failed.
    /// Cancellation is passed through unchanged; every other failure becomes
    /// `FilterExtraction`.
    pub async fn try_extract(&self, question: &str, ctx: &CallContext) -> Result<Filter> {
        let prompt = build_prompt(question, &self.document_description, &self.fields);
        let raw = ctx
            .run("filter_extraction", self.model.complete(&prompt, &self.schema))
            .await
            .map_err(|e| match e {
                Error::Cancelled(_) => e,
                other => Error::FilterExtraction(other.to_string()),
            })?;
        let answer: ModelAnswer = serde_json::from_value(raw)
            .map_err(|e| Error::FilterExtraction(format!("malformed model answer: {e}")))?;
        let filter = translate(&answer, &self.fields);
        debug!(conditions = answer.filters.len(), predicates = filter.len(), "extracted filter");
        Ok(filter)
    }

    /// Extract a filter, degrading to an empty one when the model fails,
    /// times out or answers malformed output.
    #[instrument(skip(self, ctx), fields(question_len = question.len()))]
    pub async fn extract(&self, question: &str, ctx: &CallContext) -> Result<Filter> {
        match self.try_extract(question, ctx).await {
            Ok(filter) => Ok(filter),
            Err(Error::Cancelled(op)) => Err(Error::Cancelled(op)),
            Err(e) => {
                warn!(error = %e, "filter extraction failed, continuing without filter");
                Ok(Filter::default())
            }
        }
    }
}
