use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use litrag_core::config::LanguageModelSettings;
use litrag_core::traits::LanguageModel;
use litrag_core::{Error, Result};

/// [`LanguageModel`] backed by an Ollama server's `/api/generate`.
pub struct OllamaClient {
    http: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    format: &'a Value,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(settings: &LanguageModelSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::InvalidConfig(format!("ollama client: {e}")))?;
        Ok(Self {
            http,
            url: settings.url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &str, output_schema: &Value) -> Result<Value> {
        let url = format!("{}/api/generate", self.url);
        debug!(%url, model = %self.model, prompt_len = prompt.len(), "ollama request");
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            format: output_schema,
            stream: false,
            options: GenerateOptions { temperature: self.temperature },
        };
        let res = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::LanguageModel(format!("request failed: {e}")))?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(300).collect();
            return Err(Error::LanguageModel(format!("HTTP {}: {snippet}", status.as_u16())));
        }
        let generated: GenerateResponse = res
            .json()
            .await
            .map_err(|e| Error::LanguageModel(format!("unexpected response body: {e}")))?;
        serde_json::from_str(&generated.response)
            .map_err(|e| Error::LanguageModel(format!("model output is not JSON: {e}")))
    }
}
