//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml`, `config.<env>.toml` and `APP_*` env
//! vars (`__` separates nested keys, e.g.
//! `APP_RETRIEVAL__DEFAULT_WEIGHT=0.3`). Provides helpers to expand `~` and
//! `${VAR}` and to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::filter::{FieldSpec, FieldType};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// All typed sections, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let settings = self.settings()?;
        if matches!(env, "prod" | "production") && settings.opensearch.accept_invalid_certs {
            anyhow::bail!("opensearch.accept_invalid_certs must be false in production");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub confidence: ConfidenceSettings,
    pub opensearch: OpenSearchSettings,
    pub local: LocalSettings,
    pub embedding: EmbeddingSettings,
    pub language_model: LanguageModelSettings,
    pub self_query: SelfQuerySettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if !(r.default_weight.is_finite() && (0.0..=1.0).contains(&r.default_weight)) {
            return Err(Error::InvalidConfig(format!(
                "retrieval.default_weight must be in [0, 1], got {}",
                r.default_weight
            )));
        }
        if r.max_fragments_per_document == 0 {
            return Err(Error::InvalidConfig("retrieval.max_fragments_per_document must be >= 1".into()));
        }
        if !(r.rrf_offset.is_finite() && r.rrf_offset >= 0.0) {
            return Err(Error::InvalidConfig(format!("retrieval.rrf_offset must be >= 0, got {}", r.rrf_offset)));
        }
        if r.lexical_fields.is_empty() {
            return Err(Error::InvalidConfig("retrieval.lexical_fields must not be empty".into()));
        }

        let c = &self.confidence;
        if !(c.floor.is_finite() && c.floor < 100.0) {
            return Err(Error::InvalidConfig(format!("confidence.floor must be < 100, got {}", c.floor)));
        }
        if !(c.stretch.is_finite() && c.stretch > 0.0) {
            return Err(Error::InvalidConfig(format!("confidence.stretch must be > 0, got {}", c.stretch)));
        }
        if c.medium_similarity > c.high_similarity {
            return Err(Error::InvalidConfig(
                "confidence.medium_similarity must not exceed confidence.high_similarity".into(),
            ));
        }
        Ok(())
    }
}

/// Order in which the two RRF input lists are scanned to break score ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieScan {
    #[default]
    VectorFirst,
    LexicalFirst,
}

/// What client-side fusion does when exactly one sub-query fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialFailurePolicy {
    #[default]
    Abort,
    Degrade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Vector share in both hybrid strategies.
    pub default_weight: f64,
    pub max_fragments_per_document: usize,
    pub pipeline_prefix: String,
    pub rrf_offset: f64,
    pub rrf_tie_scan: TieScan,
    pub on_partial_failure: PartialFailurePolicy,
    /// Logical field names searched by the lexical query.
    pub lexical_fields: Vec<String>,
    pub request_timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_weight: 0.5,
            max_fragments_per_document: 8,
            pipeline_prefix: "hybrid_search_pipeline_weight_".into(),
            rrf_offset: 1.0,
            rrf_tie_scan: TieScan::default(),
            on_partial_failure: PartialFailurePolicy::default(),
            lexical_fields: vec!["text".into(), "title".into(), "keywords".into()],
            request_timeout_ms: 30_000,
        }
    }
}

impl RetrievalSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Similarity → confidence calibration. `floor` is the angular score that
/// maps to 0, `stretch` widens the band above it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceSettings {
    pub floor: f64,
    pub stretch: f64,
    pub high_similarity: f64,
    pub medium_similarity: f64,
}

impl Default for ConfidenceSettings {
    fn default() -> Self {
        Self { floor: 80.0, stretch: 1.5, high_similarity: 0.85, medium_similarity: 0.80 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenSearchSettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub fragments_index: String,
    pub documents_index: String,
    pub accept_invalid_certs: bool,
}

impl Default for OpenSearchSettings {
    fn default() -> Self {
        Self {
            url: "https://localhost:9200".into(),
            username: None,
            password: None,
            fragments_index: "abstract_fragments".into(),
            documents_index: "abstracts".into(),
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    pub index_dir: String,
    pub vector_table: String,
    /// Upper bound on candidates scanned before a filter is applied.
    pub candidate_pool: usize,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self { index_dir: "~/.litrag/index".into(), vector_table: "fragment_vectors".into(), candidate_pool: 1000 }
    }
}

impl LocalSettings {
    pub fn index_path(&self) -> PathBuf {
        expand_path(&self.index_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: Option<String>,
    pub dim: usize,
    pub max_len: usize,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, dim: 768, max_len: 512, use_fake: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageModelSettings {
    pub url: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for LanguageModelSettings {
    fn default() -> Self {
        Self { url: "http://localhost:11434".into(), model: "mistral".into(), temperature: 0.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfQuerySettings {
    pub document_description: String,
    pub fields: Vec<FieldSpec>,
}

impl Default for SelfQuerySettings {
    fn default() -> Self {
        Self {
            document_description: "Abstract of a scientific article from the biomedical literature".into(),
            fields: vec![
                FieldSpec::new("title", "Title of the article", FieldType::Text),
                FieldSpec::new("keywords", "Keywords assigned to the article", FieldType::Keyword),
                FieldSpec::new("authors", "Author names, formatted as 'Lastname Initials'", FieldType::Keyword),
                FieldSpec::new("publication_date", "Year the article was published", FieldType::Year),
            ],
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
