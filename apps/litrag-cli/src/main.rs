mod cli;

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use litrag_core::config::{Config, Settings};
use litrag_core::traits::SearchIndex;
use litrag_core::CallContext;
use litrag_embed::get_default_embedder;
use litrag_hybrid::{RetrievalOutcome, RetrievalRequest, Retriever, SearchStrategy};
use litrag_local::loader::{documents_from_fragments, read_abstracts, read_fragments};
use litrag_local::LocalIndex;
use litrag_opensearch::OpenSearchIndex;
use litrag_selfquery::{FilterExtractor, OllamaClient};

use crate::cli::{Backend, Cli, Command, Strategy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {e:#}"); e })?;
    let settings = config.settings()?;
    let ctx = CallContext::new(settings.retrieval.request_timeout());

    match cli.command {
        Command::Query { question, amount, strategy, weight, self_query, json } => {
            let embedder = get_default_embedder(&settings.embedding)?;
            let index = open_backend(cli.backend, &settings, embedder.dim()).await?;
            let extractor = if self_query { Some(extractor(&settings)?) } else { None };
            let retriever = Retriever::new(index, embedder, extractor, &settings);
            let weight = weight.unwrap_or(settings.retrieval.default_weight);
            let strategy = match strategy {
                Strategy::Hybrid => SearchStrategy::WeightedHybrid { weight },
                Strategy::Rrf => SearchStrategy::ReciprocalRankFusion { weight },
                Strategy::Lexical => SearchStrategy::Lexical,
                Strategy::Vector => SearchStrategy::Vector,
            };
            let request = RetrievalRequest { question, amount, strategy, self_query };
            let outcome = retriever.retrieve(&request, &ctx).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
        }
        Command::Filters { question } => {
            let filter = extractor(&settings)?.try_extract(&question, &ctx).await?;
            println!("{}", serde_json::to_string_pretty(&filter)?);
        }
        Command::Load { fragments, abstracts, batch_size } => {
            if cli.backend != Backend::Local {
                info!("load always targets the local index");
            }
            let embedder = get_default_embedder(&settings.embedding)?;
            let index = LocalIndex::open(&settings.local, &settings.retrieval.pipeline_prefix, embedder.dim()).await?;
            let fragment_rows = read_fragments(&fragments)?;
            let documents = match abstracts {
                Some(path) => read_abstracts(&path)?,
                None => documents_from_fragments(&fragment_rows),
            };
            println!("Loading {} fragments and {} documents into {}", fragment_rows.len(), documents.len(), settings.local.index_path().display());
            let report = litrag_local::load(&index, &embedder, fragment_rows, documents, batch_size).await?;
            println!("Loaded {} fragments, {} documents", report.fragments, report.documents);
            println!("Hybrid pipelines: {}", index.pipeline_ids().join(", "));
        }
    }
    Ok(())
}

async fn open_backend(backend: Backend, settings: &Settings, dim: usize) -> anyhow::Result<Arc<dyn SearchIndex>> {
    let index: Arc<dyn SearchIndex> = match backend {
        Backend::Opensearch => Arc::new(OpenSearchIndex::new(&settings.opensearch)?),
        Backend::Local => {
            let path = settings.local.index_path();
            if !path.exists() {
                bail!("no local index at {}; run `litrag load` first", path.display());
            }
            let index = LocalIndex::open(&settings.local, &settings.retrieval.pipeline_prefix, dim)
                .await
                .with_context(|| format!("opening local index at {}", path.display()))?;
            Arc::new(index)
        }
    };
    Ok(index)
}

fn extractor(settings: &Settings) -> anyhow::Result<FilterExtractor> {
    let model = OllamaClient::new(&settings.language_model)?;
    Ok(FilterExtractor::new(Arc::new(model), &settings.self_query))
}

fn print_outcome(outcome: &RetrievalOutcome) {
    if let Some(filter) = &outcome.filter {
        let shown = serde_json::to_string(filter).unwrap_or_default();
        println!("Filter: {}", if filter.is_empty() { "(none extracted)".to_string() } else { shown });
    }
    if let Some(side) = outcome.degraded {
        println!("Warning: {side} search failed, results come from the other list only");
    }
    if outcome.documents.is_empty() {
        println!("No results.");
        return;
    }
    for d in &outcome.documents {
        println!(
            "{:>2}. [{:>3} {:?}] {} (pmid {}, score {:.4})",
            d.rank, d.confidence.value, d.confidence.level, d.document.title, d.document.parent_id, d.fused_score
        );
    }
}
