use figment::Jail;
use proptest::prelude::*;

use litrag_core::config::{expand_path, resolve_with_base, Config, PartialFailurePolicy, TieScan};
use litrag_core::types::{fragment_id, split_fragment_id};

fn load_in_jail(jail: &mut Jail) -> figment::error::Result<litrag_core::config::Settings> {
    jail.set_env("RUST_ENV", "test");
    let config = Config::load().map_err(|e| figment::Error::from(e.to_string()))?;
    config.settings().map_err(|e| figment::Error::from(e.to_string()))
}

#[test]
fn defaults_without_any_file() {
    Jail::expect_with(|jail| {
        let s = load_in_jail(jail)?;
        assert_eq!(s.retrieval.default_weight, 0.5);
        assert_eq!(s.retrieval.max_fragments_per_document, 8);
        assert_eq!(s.retrieval.pipeline_prefix, "hybrid_search_pipeline_weight_");
        assert_eq!(s.retrieval.rrf_tie_scan, TieScan::VectorFirst);
        assert_eq!(s.retrieval.on_partial_failure, PartialFailurePolicy::Abort);
        assert_eq!(s.confidence.floor, 80.0);
        assert_eq!(s.confidence.stretch, 1.5);
        assert_eq!(s.opensearch.fragments_index, "abstract_fragments");
        assert_eq!(s.self_query.fields.len(), 4);
        Ok(())
    });
}

#[test]
fn env_file_and_variables_layer_in_order() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            [retrieval]
            default_weight = 0.7
            on_partial_failure = "degrade"

            [confidence]
            floor = 75.0
            "#,
        )?;
        jail.create_file("config.test.toml", "[retrieval]\nrrf_tie_scan = \"lexical_first\"\n")?;
        jail.set_env("APP_CONFIDENCE__STRETCH", "2.0");

        let s = load_in_jail(jail)?;
        assert_eq!(s.retrieval.default_weight, 0.7);
        assert_eq!(s.retrieval.on_partial_failure, PartialFailurePolicy::Degrade);
        assert_eq!(s.retrieval.rrf_tie_scan, TieScan::LexicalFirst);
        assert_eq!(s.confidence.floor, 75.0);
        assert_eq!(s.confidence.stretch, 2.0);
        Ok(())
    });
}

#[test]
fn invalid_calibration_is_rejected_at_load() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[confidence]\nfloor = 100.0\n")?;
        jail.set_env("RUST_ENV", "test");
        assert!(Config::load().is_err());
        Ok(())
    });
}

#[test]
fn get_reads_single_keys() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[opensearch]\nurl = \"https://search:9200\"\n")?;
        jail.set_env("RUST_ENV", "test");
        let config = Config::load().map_err(|e| figment::Error::from(e.to_string()))?;
        let url: String = config.get("opensearch.url").map_err(|e| figment::Error::from(e.to_string()))?;
        assert_eq!(url, "https://search:9200");
        assert!(config.get::<String>("opensearch.missing").is_err());
        Ok(())
    });
}

#[test]
fn path_helpers_expand_and_resolve() {
    std::env::set_var("LITRAG_TEST_DIR", "/data/litrag");
    assert_eq!(expand_path("${LITRAG_TEST_DIR}/index"), std::path::PathBuf::from("/data/litrag/index"));
    let base = std::path::Path::new("/srv");
    assert_eq!(resolve_with_base(base, "idx"), std::path::PathBuf::from("/srv/idx"));
    assert_eq!(resolve_with_base(base, "/abs/idx"), std::path::PathBuf::from("/abs/idx"));
}

proptest! {
    #[test]
    fn fragment_ids_are_reversible(parent in "[A-Za-z0-9_]{1,16}", index in 0usize..10_000) {
        let id = fragment_id(&parent, index);
        prop_assert_eq!(split_fragment_id(&id), Some((parent.as_str(), index)));
    }
}
