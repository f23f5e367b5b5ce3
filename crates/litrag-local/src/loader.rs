//! Bulk loading of pre-fragmented abstract datasets into a [`LocalIndex`].
//!
//! The fragments file is `{"documents": [...]}` with one record per
//! fragment (`pmid`, `fragment_id`, `number_of_fragments`,
//! `abstract_fragment` plus document metadata). The optional abstracts file
//! has the same envelope with one record per document and an `abstract`
//! field. Without it, documents are rebuilt by joining their fragments.
use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use litrag_core::embedding::embed_texts;
use litrag_core::traits::Embedder;
use litrag_core::types::{Document, Fragment};

use crate::index::LocalIndex;
use crate::vector::VectorRow;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
	documents: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Pmid {
	Int(i64),
	Str(String),
}

impl Pmid {
	fn into_string(self) -> String {
		match self { Pmid::Int(i) => i.to_string(), Pmid::Str(s) => s }
	}
}

#[derive(Debug, Deserialize)]
struct FragmentRecord {
	pmid: Pmid,
	#[serde(default)]
	title: String,
	#[serde(default)]
	author_list: Vec<String>,
	#[serde(default)]
	keyword_list: Vec<String>,
	#[serde(default)]
	doi: Option<String>,
	#[serde(default)]
	publication_date: Option<String>,
	fragment_id: usize,
	number_of_fragments: usize,
	abstract_fragment: String,
}

#[derive(Debug, Deserialize)]
struct AbstractRecord {
	pmid: Pmid,
	#[serde(default)]
	title: String,
	#[serde(rename = "abstract")]
	abstract_text: String,
	#[serde(default)]
	author_list: Vec<String>,
	#[serde(default)]
	keyword_list: Vec<String>,
	#[serde(default)]
	doi: Option<String>,
	#[serde(default)]
	publication_date: Option<String>,
}

impl From<FragmentRecord> for Fragment {
	fn from(r: FragmentRecord) -> Self {
		let mut f = Fragment::new(r.pmid.into_string(), r.fragment_id, r.number_of_fragments, r.abstract_fragment);
		f.title = r.title;
		f.authors = r.author_list;
		f.keywords = r.keyword_list;
		f.doi = r.doi;
		f.publication_date = r.publication_date;
		f
	}
}

impl From<AbstractRecord> for Document {
	fn from(r: AbstractRecord) -> Self {
		Document {
			parent_id: r.pmid.into_string(),
			title: r.title,
			abstract_text: r.abstract_text,
			authors: r.author_list,
			keywords: r.keyword_list,
			doi: r.doi,
			publication_date: r.publication_date,
		}
	}
}

pub fn read_fragments(path: &Path) -> Result<Vec<Fragment>> {
	let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
	let env: Envelope<FragmentRecord> = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
	let fragments: Vec<Fragment> = env.documents.into_iter().map(Fragment::from).collect();
	if let Some(bad) = fragments.iter().find(|f| f.index >= f.count) {
		return Err(anyhow!("fragment {} has index {} but its document has {} fragments", bad.id, bad.index, bad.count));
	}
	Ok(fragments)
}

pub fn read_abstracts(path: &Path) -> Result<Vec<Document>> {
	let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
	let env: Envelope<AbstractRecord> = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
	Ok(env.documents.into_iter().map(Document::from).collect())
}

/// Rebuild whole documents from their fragments, joined in index order.
pub fn documents_from_fragments(fragments: &[Fragment]) -> Vec<Document> {
	let mut by_parent: BTreeMap<&str, Vec<&Fragment>> = BTreeMap::new();
	for f in fragments {
		by_parent.entry(f.parent_id.as_str()).or_default().push(f);
	}
	by_parent
		.into_values()
		.filter_map(|mut parts| {
			parts.sort_by_key(|f| f.index);
			let first = *parts.first()?;
			Some(Document {
				parent_id: first.parent_id.clone(),
				title: first.title.clone(),
				abstract_text: parts.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join(" "),
				authors: first.authors.clone(),
				keywords: first.keywords.clone(),
				doi: first.doi.clone(),
				publication_date: first.publication_date.clone(),
			})
		})
		.collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
	pub fragments: usize,
	pub documents: usize,
}

/// Index `fragments` (text and vectors) and `documents`, embedding fragment
/// text in batches of `batch_size`.
pub async fn load(index: &LocalIndex, embedder: &Arc<dyn Embedder>, fragments: Vec<Fragment>, documents: Vec<Document>, batch_size: usize) -> Result<LoadReport> {
	if fragments.is_empty() {
		warn!("no fragments to load");
		return Ok(LoadReport::default());
	}
	let batch_size = batch_size.max(1);
	info!(fragments = fragments.len(), documents = documents.len(), "loading dataset");

	let pb = ProgressBar::new(fragments.len() as u64);
	pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} fragments ({percent}%) {msg}")?.progress_chars("#>-"));
	for batch in fragments.chunks(batch_size) {
		let texts: Vec<String> = batch.iter().map(|f| f.text.clone()).collect();
		let vectors = embed_texts(embedder, texts).await?;
		let rows: Vec<VectorRow> = batch
			.iter()
			.zip(vectors)
			.map(|(f, vector)| VectorRow { id: f.id.clone(), parent_id: f.parent_id.clone(), vector })
			.collect();
		index.vectors().add(&rows).await?;
		pb.inc(batch.len() as u64);
	}
	pb.finish_with_message("embedded");

	let text = index.text().clone();
	let (n_fragments, n_documents) = (fragments.len(), documents.len());
	tokio::task::spawn_blocking(move || -> Result<()> {
		text.add_fragments(&fragments)?;
		text.add_documents(&documents)
	})
	.await??;
	info!(fragments = n_fragments, documents = n_documents, "dataset loaded");
	Ok(LoadReport { fragments: n_fragments, documents: n_documents })
}
