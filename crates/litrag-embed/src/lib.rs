use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{Device, DType, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use litrag_core::config::{expand_path, EmbeddingSettings};
use litrag_core::traits::Embedder;

mod device;
mod pool;
mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_on_device;

pub const DEFAULT_MODEL_DIR: &str = "models/S-PubMedBert-MS-MARCO";

/// Sentence embedder over a local BERT checkpoint (`config.json`,
/// `tokenizer.json`, `pytorch_model.bin`), mean-pooled and L2-normalised.
pub struct BertEmbedder { model: BertModel, tokenizer: Tokenizer, device: Device, dim: usize, max_len: usize }

impl BertEmbedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(model_dir = %model_dir.display(), "loading embedding model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)?;
        let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        let dim = config.hidden_size;
        let max_len = max_len.min(config.max_position_embeddings);
        info!(dim, max_len, "embedding model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if emb.len() != self.dim { return Err(anyhow!("model produced dimension {}, expected {}", emb.len(), self.dim)); }
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 { debug!(elapsed_ms = elapsed.as_millis(), "slow embedding"); }
        Ok(emb)
    }
}

impl Embedder for BertEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }
}

/// Deterministic token-hashing embedder for tests and development. Texts
/// sharing tokens get similar vectors; identical texts get identical vectors.
pub struct HashEmbedder { dim: usize }

impl HashEmbedder { pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } } }

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        Ok(texts.iter().map(|text| {
            let mut v = vec![0f32; self.dim];
            let tokens = text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty());
            for token in tokens {
                let mut hasher = XxHash64::with_seed(0); token.to_lowercase().hash(&mut hasher); let h = hasher.finish();
                let idx = (h % self.dim as u64) as usize; let val = 0.5 + ((h >> 32) as u32 as f32) / (u32::MAX as f32);
                v[idx] += val;
            }
            let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6); for x in &mut v { *x /= norm; } v
        }).collect())
    }
}

pub fn use_fake_embeddings(settings: &EmbeddingSettings) -> bool {
    settings.use_fake || std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if use_fake_embeddings(settings) { info!(dim = settings.dim, "using hash embedder"); return Ok(Arc::new(HashEmbedder::new(settings.dim))); }
    let model_dir = resolve_model_dir(settings.model_dir.as_deref())?;
    let embedder = BertEmbedder::load(&model_dir, settings.max_len)?;
    if embedder.dim() != settings.dim { warn!(configured = settings.dim, actual = embedder.dim(), "embedding.dim differs from model hidden size"); }
    Ok(Arc::new(embedder))
}

pub fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured { let p = expand_path(dir); if p.exists() { return Ok(p); } warn!(path = %p.display(), "configured embedding.model_dir does not exist"); }
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") { let p = expand_path(&dir); if p.exists() { return Ok(p); } }
    if let Ok(dir) = std::env::var("MODEL_DIR") { let p = expand_path(&dir); if p.exists() { return Ok(p); } }
    let default = Path::new(DEFAULT_MODEL_DIR); if default.exists() { return Ok(default.to_path_buf()); }
    Err(anyhow!("Could not locate embedding model directory (set embedding.model_dir or APP_MODEL_DIR)"))
}
