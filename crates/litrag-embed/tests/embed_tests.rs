use std::sync::Arc;

use candle_core::{Device, Tensor, DType};
use litrag_core::config::EmbeddingSettings;
use litrag_core::embedding::{cosine_similarity, embed_texts};
use litrag_core::traits::Embedder;
use litrag_embed::{get_default_embedder, masked_mean_l2, HashEmbedder};

#[test]
fn fake_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { use_fake: true, dim: 384, ..EmbeddingSettings::default() };
    let embedder = get_default_embedder(&settings).expect("embedder");
    let texts = vec!["caffeine and sleep".to_string(), "caffeine and sleep".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 384);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn fake_embedder_rewards_shared_tokens() {
    let e = HashEmbedder::new(256);
    let embs = e.embed_batch(&[
        "Caffeine intake and sleep".to_string(),
        "sleep quality after caffeine".to_string(),
        "protein folding kinetics".to_string(),
    ]).expect("embed");
    assert!(cosine_similarity(&embs[0], &embs[1]) > cosine_similarity(&embs[0], &embs[2]));
}

#[tokio::test]
async fn async_bridge_runs_on_blocking_pool() {
    let e: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));
    let out = embed_texts(&e, vec!["a b".into(), "c".into()]).await.expect("embed");
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|v| v.len() == 64));
}

#[test]
fn masked_mean_l2_basic() {
    let dev = Device::Cpu;
    // Two tokens with hidden dim 4; second token is masked out.
    let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0,  // token 0
                                 5.0, 6.0, 7.0, 8.0],    // token 1
                               (1, 2, 4), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 0u32], (1, 2), &dev).unwrap()
        .to_dtype(DType::F32).unwrap();
    let out = masked_mean_l2(&h, &mask).unwrap();
    let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
    let v = &v[0];
    let norm: f32 = (1.0f32*1.0 + 2.0*2.0 + 3.0*3.0 + 4.0*4.0).sqrt();
    let expected = [1.0/norm, 2.0/norm, 3.0/norm, 4.0/norm];
    for (a,b) in v.iter().cloned().zip(expected) {
        assert!((a - b).abs() < 1e-5, "a={} b={}", a, b);
    }
}

#[test]
fn missing_model_dir_is_an_error() {
    std::env::remove_var("APP_MODEL_DIR");
    std::env::remove_var("MODEL_DIR");
    assert!(litrag_embed::resolve_model_dir(Some("/nonexistent/litrag-model")).is_err());
}
