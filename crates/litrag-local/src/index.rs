use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use litrag_core::config::LocalSettings;
use litrag_core::traits::SearchIndex;
use litrag_core::types::{Document, Fragment, HybridQuery, LexicalQuery, RankedHit, SourceKind, VectorQuery};
use litrag_core::{Error, Filter, Result};

use crate::pipeline::{combine, PipelineRegistry};
use crate::text::TextIndex;
use crate::vector::VectorStore;

pub const BACKEND: &str = "local";

/// Embedded search index: tantivy for text and documents, LanceDB for
/// fragment vectors, and an in-process pipeline registry for hybrid queries.
pub struct LocalIndex {
	text: TextIndex,
	vectors: VectorStore,
	pipelines: PipelineRegistry,
	pipeline_prefix: String,
	candidate_pool: usize,
}

impl LocalIndex {
	pub fn new(text: TextIndex, vectors: VectorStore, pipeline_prefix: &str, candidate_pool: usize) -> Self {
		let index = Self { text, vectors, pipelines: PipelineRegistry::default(), pipeline_prefix: pipeline_prefix.to_string(), candidate_pool };
		// 0.00, 0.05, ..., 1.00
		for step in 0..=20u32 {
			index.pipelines.register(&index.pipeline_prefix, f64::from(step) / 20.0);
		}
		index
	}

	/// Open (or create) the on-disk index under `settings.index_dir`.
	pub async fn open(settings: &LocalSettings, pipeline_prefix: &str, dim: usize) -> anyhow::Result<Self> {
		let root = settings.index_path();
		let text = TextIndex::open_or_create(&root.join("text"))?;
		let vectors = VectorStore::open(&path_uri(&root.join("vectors")), &settings.vector_table, dim).await?;
		Ok(Self::new(text, vectors, pipeline_prefix, settings.candidate_pool))
	}

	/// Make the pipeline for `weight` available and return its id.
	pub fn register_pipeline(&self, weight: f64) -> Result<String> {
		if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
			return Err(Error::InvalidWeight(weight));
		}
		Ok(self.pipelines.register(&self.pipeline_prefix, weight))
	}

	pub fn pipeline_ids(&self) -> Vec<String> { self.pipelines.ids() }

	pub fn text(&self) -> &TextIndex { &self.text }

	pub fn vectors(&self) -> &VectorStore { &self.vectors }

	fn fetch_size(&self, wanted: usize, filter: Option<&Filter>) -> usize {
		match filter {
			Some(f) if !f.is_empty() => wanted.max(self.candidate_pool),
			_ => wanted,
		}
	}

	async fn with_text<T, F>(&self, operation: &'static str, f: F) -> Result<T>
	where
		F: FnOnce(TextIndex) -> anyhow::Result<T> + Send + 'static,
		T: Send + 'static,
	{
		let text = self.text.clone();
		tokio::task::spawn_blocking(move || f(text))
			.await
			.map_err(|e| Error::index_unavailable(BACKEND, operation, e))?
			.map_err(|e| Error::index_unavailable(BACKEND, operation, format!("{e:#}")))
	}

	async fn lexical_candidates(&self, query: &LexicalQuery, fetch: usize) -> Result<(Vec<Candidate>, usize)> {
		if let Some(bad) = query.fields.iter().find(|f| !self.text.is_searchable(f)) {
			return Err(Error::InvalidQuery(format!("unknown lexical field '{bad}'")));
		}
		let (text, fields) = (query.text.clone(), query.fields.clone());
		let hits = self.with_text("lexical", move |t| t.search(&text, &fields, fetch)).await?;
		let returned = hits.len();
		Ok((hits.into_iter().map(|(score, f)| (f.id.clone(), score, f)).collect(), returned))
	}

	async fn vector_candidates(&self, query: &VectorQuery, fetch: usize) -> Result<(Vec<Candidate>, usize)> {
		if query.vector.len() != self.vectors.dim() {
			return Err(Error::InvalidQuery(format!(
				"query vector has dimension {}, index expects {}",
				query.vector.len(),
				self.vectors.dim()
			)));
		}
		let nearest = self
			.vectors
			.search(&query.vector, fetch)
			.await
			.map_err(|e| Error::index_unavailable(BACKEND, "vector", format!("{e:#}")))?;
		let returned = nearest.len();
		let ids: Vec<String> = nearest.iter().map(|(id, _)| id.clone()).collect();
		let fragments = self.with_text("vector", move |t| t.fragments_by_id(&ids)).await?;
		let mut by_id: HashMap<String, Fragment> = fragments.into_iter().map(|f| (f.id.clone(), f)).collect();
		let found = nearest
			.into_iter()
			.filter_map(|(id, score)| match by_id.remove(&id) {
				Some(f) => Some((id, score, f)),
				None => {
					debug!(%id, "vector row has no stored fragment");
					None
				}
			})
			.collect();
		Ok((found, returned))
	}

	/// Best `wanted` candidates of `source` that pass `filter`. The fetch
	/// window doubles until enough candidates pass or the collection is
	/// exhausted, so a filter never loses matches ranked behind rejected ones.
	async fn filtered(&self, source: Source<'_>, filter: Option<&Filter>, wanted: usize) -> Result<Vec<Candidate>> {
		let mut fetch = self.fetch_size(wanted, filter);
		let mut corpus: Option<usize> = None;
		loop {
			let (found, returned) = match source {
				Source::Lexical(q) => self.lexical_candidates(q, fetch).await?,
				Source::Vector(q) => self.vector_candidates(q, fetch).await?,
			};
			let kept = keep(found, filter, wanted);
			if kept.len() >= wanted || returned < fetch {
				return Ok(kept);
			}
			let total = match corpus {
				Some(n) => n,
				None => self.corpus_size(source).await?,
			};
			corpus = Some(total);
			if fetch >= total {
				return Ok(kept);
			}
			fetch = fetch.saturating_mul(2).min(total);
			debug!(fetch, kept = kept.len(), wanted, "filter rejected too many candidates, widening");
		}
	}

	async fn corpus_size(&self, source: Source<'_>) -> Result<usize> {
		match source {
			Source::Lexical(_) => self.with_text("lexical", |t| t.fragment_count()).await,
			Source::Vector(_) => self
				.vectors
				.count()
				.await
				.map_err(|e| Error::index_unavailable(BACKEND, "vector", format!("{e:#}"))),
		}
	}
}

type Candidate = (String, f32, Fragment);

#[derive(Clone, Copy)]
enum Source<'a> {
	Lexical(&'a LexicalQuery),
	Vector(&'a VectorQuery),
}

fn path_uri(path: &Path) -> String { path.to_string_lossy().to_string() }

fn keep(candidates: Vec<Candidate>, filter: Option<&Filter>, limit: usize) -> Vec<Candidate> {
	candidates
		.into_iter()
		.filter(|(_, _, f)| filter.map_or(true, |flt| flt.matches(f)))
		.take(limit)
		.collect()
}

fn ranked(candidates: Vec<Candidate>, source: SourceKind) -> Vec<RankedHit> {
	candidates
		.into_iter()
		.enumerate()
		.map(|(i, (_, score, fragment))| RankedHit { fragment, rank: i + 1, score, source })
		.collect()
}

#[async_trait]
impl SearchIndex for LocalIndex {
	fn name(&self) -> &str { BACKEND }

	async fn lexical(&self, query: &LexicalQuery, filter: Option<&Filter>, size: usize) -> Result<Vec<RankedHit>> {
		if size == 0 { return Ok(Vec::new()); }
		let candidates = self.filtered(Source::Lexical(query), filter, size).await?;
		Ok(ranked(candidates, SourceKind::Lexical))
	}

	async fn vector(&self, query: &VectorQuery, filter: Option<&Filter>) -> Result<Vec<RankedHit>> {
		if query.k == 0 { return Ok(Vec::new()); }
		let candidates = self.filtered(Source::Vector(query), filter, query.k).await?;
		Ok(ranked(candidates, SourceKind::Vector))
	}

	async fn hybrid(&self, query: &HybridQuery, pipeline_id: &str, filter: Option<&Filter>, size: usize) -> Result<Vec<RankedHit>> {
		let weight = self.pipelines.weight(pipeline_id).ok_or_else(|| Error::PipelineNotFound(pipeline_id.to_string()))?;
		if size == 0 { return Ok(Vec::new()); }
		let lexical = self.filtered(Source::Lexical(&query.lexical), filter, size).await?;
		let vector = self.filtered(Source::Vector(&query.vector), filter, query.vector.k).await?;

		let lexical_scores: Vec<(String, f32)> = lexical.iter().map(|(id, s, _)| (id.clone(), *s)).collect();
		let vector_scores: Vec<(String, f32)> = vector.iter().map(|(id, s, _)| (id.clone(), *s)).collect();
		let mut fragments: HashMap<String, Fragment> = HashMap::new();
		for (id, _, f) in lexical.into_iter().chain(vector) {
			fragments.entry(id).or_insert(f);
		}

		let combined = combine(&lexical_scores, &vector_scores, weight);
		debug!(pipeline = pipeline_id, weight, candidates = combined.len(), "hybrid combination");
		Ok(combined
			.into_iter()
			.filter_map(|c| fragments.remove(&c.id).map(|f| (c.id, c.score as f32, f)))
			.take(size)
			.enumerate()
			.map(|(i, (_, score, fragment))| RankedHit { fragment, rank: i + 1, score, source: SourceKind::Hybrid })
			.collect())
	}

	async fn documents(&self, parent_ids: &[String], filter: Option<&Filter>) -> Result<Vec<Document>> {
		if parent_ids.is_empty() { return Ok(Vec::new()); }
		let ids = parent_ids.to_vec();
		let docs = self.with_text("documents", move |t| t.documents_by_parent(&ids)).await?;
		Ok(docs.into_iter().filter(|d| filter.map_or(true, |f| f.matches_document(d))).collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use litrag_core::filter::{RangePredicate, RangeUnit};
	use crate::vector::VectorRow;

	async fn index(tmp: &Path) -> anyhow::Result<LocalIndex> {
		let text = TextIndex::in_ram()?;
		let vectors = VectorStore::open(&path_uri(tmp), "vectors", 2).await?;
		Ok(LocalIndex::new(text, vectors, "p_", 10))
	}

	#[tokio::test]
	async fn default_pipelines_cover_the_grid() -> anyhow::Result<()> {
		let tmp = tempfile::tempdir()?;
		let idx = index(tmp.path()).await?;
		let ids = idx.pipeline_ids();
		assert_eq!(ids.len(), 21);
		assert_eq!(ids.first().map(String::as_str), Some("p_0.00"));
		assert_eq!(ids.last().map(String::as_str), Some("p_1.00"));
		assert!(ids.contains(&"p_0.35".to_string()));
		Ok(())
	}

	#[tokio::test]
	async fn register_rejects_out_of_range_weights() -> anyhow::Result<()> {
		let tmp = tempfile::tempdir()?;
		let idx = index(tmp.path()).await?;
		assert!(matches!(idx.register_pipeline(1.5), Err(Error::InvalidWeight(_))));
		assert!(matches!(idx.register_pipeline(f64::NAN), Err(Error::InvalidWeight(_))));
		assert_eq!(idx.register_pipeline(0.33)?, "p_0.33");
		Ok(())
	}

	#[tokio::test]
	async fn unknown_pipeline_and_field_are_reported() -> anyhow::Result<()> {
		let tmp = tempfile::tempdir()?;
		let idx = index(tmp.path()).await?;
		let q = HybridQuery {
			lexical: LexicalQuery { text: "x".into(), fields: vec!["text".into()] },
			vector: VectorQuery { vector: vec![1.0, 0.0], k: 3 },
		};
		assert!(matches!(idx.hybrid(&q, "p_0.33", None, 3).await, Err(Error::PipelineNotFound(_))));
		let bad = LexicalQuery { text: "x".into(), fields: vec!["abstract".into()] };
		assert!(matches!(idx.lexical(&bad, None, 3).await, Err(Error::InvalidQuery(_))));
		let wrong_dim = VectorQuery { vector: vec![1.0], k: 3 };
		assert!(matches!(idx.vector(&wrong_dim, None).await, Err(Error::InvalidQuery(_))));
		Ok(())
	}

	#[tokio::test]
	async fn filters_apply_before_truncation() -> anyhow::Result<()> {
		let tmp = tempfile::tempdir()?;
		let idx = index(tmp.path()).await?;
		let mut fragments = Vec::new();
		for (parent, year) in [("1", "2001"), ("2", "2002"), ("3", "2015")] {
			let mut f = Fragment::new(parent, 0, 1, "aspirin dosage");
			f.publication_date = Some(format!("{year}-01-01"));
			fragments.push(f);
		}
		idx.text().add_fragments(&fragments)?;
		let q = LexicalQuery { text: "aspirin".into(), fields: vec!["text".into()] };
		let recent = Filter::default().with_range(RangePredicate { gte: Some(2010.0), ..RangePredicate::new("publication_date", RangeUnit::Year) });
		let hits = idx.lexical(&q, Some(&recent), 1).await?;
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].fragment.parent_id, "3");
		assert_eq!(hits[0].rank, 1);
		Ok(())
	}

	#[tokio::test]
	async fn filtered_matches_survive_a_full_pool_of_rejections() -> anyhow::Result<()> {
		let tmp = tempfile::tempdir()?;
		let idx = index(tmp.path()).await?;
		let mut fragments = Vec::new();
		let mut rows = Vec::new();
		for i in 0..12 {
			let parent = format!("old{i}");
			let mut f = Fragment::new(&parent, 0, 1, "aspirin aspirin aspirin");
			f.publication_date = Some("2001-01-01".into());
			rows.push(VectorRow { id: f.id.clone(), parent_id: parent, vector: vec![1.0, 0.0] });
			fragments.push(f);
		}
		let mut new = Fragment::new("new", 0, 1, "aspirin was compared with placebo in a cohort of older adults");
		new.publication_date = Some("2015-01-01".into());
		rows.push(VectorRow { id: new.id.clone(), parent_id: "new".into(), vector: vec![0.6, 0.8] });
		fragments.push(new);
		idx.text().add_fragments(&fragments)?;
		idx.vectors().add(&rows).await?;

		let recent = Filter::default().with_range(RangePredicate { gte: Some(2010.0), ..RangePredicate::new("publication_date", RangeUnit::Year) });
		let lexical = LexicalQuery { text: "aspirin".into(), fields: vec!["text".into()] };
		let vector = VectorQuery { vector: vec![1.0, 0.0], k: 1 };

		let hits = idx.lexical(&lexical, Some(&recent), 1).await?;
		assert_eq!(hits.iter().map(|h| h.fragment.id.as_str()).collect::<Vec<_>>(), vec!["new_0"]);
		let hits = idx.vector(&vector, Some(&recent)).await?;
		assert_eq!(hits.iter().map(|h| h.fragment.id.as_str()).collect::<Vec<_>>(), vec!["new_0"]);
		let hits = idx.hybrid(&HybridQuery { lexical, vector }, "p_0.50", Some(&recent), 1).await?;
		assert_eq!(hits.iter().map(|h| h.fragment.id.as_str()).collect::<Vec<_>>(), vec!["new_0"]);

		// Unfiltered, the heavier 2001 fragments still come first.
		let q = LexicalQuery { text: "aspirin".into(), fields: vec!["text".into()] };
		let hits = idx.lexical(&q, None, 1).await?;
		assert!(hits[0].fragment.parent_id.starts_with("old"));
		Ok(())
	}
}
