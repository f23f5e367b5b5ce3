use anyhow::{anyhow, Result};
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, ReloadPolicy, TantivyDocument, Term};

use litrag_core::types::{Document, Fragment};

use crate::tantivy_utils::{build_schema, register_tokenizer, Fields, KIND_DOCUMENT, KIND_FRAGMENT};

const WRITER_HEAP: usize = 50_000_000;

/// Tantivy store for fragment text and whole documents.
#[derive(Clone)]
pub struct TextIndex {
	index: Index,
	reader: IndexReader,
	fields: Fields,
}

impl TextIndex {
	pub fn in_ram() -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()))
	}

	/// Open the index in `dir`, creating it when the directory holds none.
	pub fn open_or_create(dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(dir)?;
		let index = if Index::exists(&tantivy::directory::MmapDirectory::open(dir)?)? {
			Index::open_in_dir(dir)?
		} else {
			Index::create_in_dir(dir, build_schema())?
		};
		Self::from_index(index)
	}

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let fields = Fields::from_schema(&index.schema())?;
		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { index, reader, fields })
	}

	pub fn add_fragments(&self, fragments: &[Fragment]) -> Result<()> {
		let mut index_writer = self.index.writer(WRITER_HEAP)?;
		let f = self.fields;
		for fragment in fragments {
			index_writer.add_document(doc!(
				f.kind => KIND_FRAGMENT.to_string(),
				f.id => fragment.id.clone(),
				f.parent_id => fragment.parent_id.clone(),
				f.text => fragment.text.clone(),
				f.title => fragment.title.clone(),
				f.keywords => fragment.keywords.join(" ; "),
				f.authors => fragment.authors.join(" ; "),
				f.payload => serde_json::to_string(&Fragment { embedding: None, ..fragment.clone() })?,
			))?;
		}
		index_writer.commit()?;
		self.reader.reload()?;
		Ok(())
	}

	pub fn add_documents(&self, documents: &[Document]) -> Result<()> {
		let mut index_writer = self.index.writer(WRITER_HEAP)?;
		let f = self.fields;
		for document in documents {
			index_writer.add_document(doc!(
				f.kind => KIND_DOCUMENT.to_string(),
				f.id => document.parent_id.clone(),
				f.parent_id => document.parent_id.clone(),
				f.text => document.abstract_text.clone(),
				f.title => document.title.clone(),
				f.payload => serde_json::to_string(document)?,
			))?;
		}
		index_writer.commit()?;
		self.reader.reload()?;
		Ok(())
	}

	fn kind_clause(&self, kind: &str) -> Box<dyn Query> {
		Box::new(TermQuery::new(Term::from_field_text(self.fields.kind, kind), IndexRecordOption::Basic))
	}

	fn any_of(&self, field: tantivy::schema::Field, values: &[String]) -> Box<dyn Query> {
		let clauses: Vec<(Occur, Box<dyn Query>)> = values
			.iter()
			.map(|v| {
				let q: Box<dyn Query> = Box::new(TermQuery::new(Term::from_field_text(field, v), IndexRecordOption::Basic));
				(Occur::Should, q)
			})
			.collect();
		Box::new(BooleanQuery::new(clauses))
	}

	pub fn is_searchable(&self, field: &str) -> bool {
		self.fields.searchable(field).is_some()
	}

	/// BM25 search over `fields` (logical names). Returns `(score, fragment)`
	/// in descending score order.
	pub fn search(&self, text: &str, fields: &[String], limit: usize) -> Result<Vec<(f32, Fragment)>> {
		if limit == 0 { return Ok(Vec::new()); }
		let searchable = fields
			.iter()
			.map(|name| self.fields.searchable(name).ok_or_else(|| anyhow!("unknown lexical field '{name}'")))
			.collect::<Result<Vec<_>>>()?;
		let qp = QueryParser::for_index(&self.index, searchable);
		let (parsed, _errors) = qp.parse_query_lenient(text);
		let query = BooleanQuery::new(vec![(Occur::Must, self.kind_clause(KIND_FRAGMENT)), (Occur::Must, parsed)]);
		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			hits.push((score, self.decode(&doc)?));
		}
		Ok(hits)
	}

	/// Fragments by id, in the order of `ids`. Unknown ids are skipped.
	pub fn fragments_by_id(&self, ids: &[String]) -> Result<Vec<Fragment>> {
		let mut found: Vec<Fragment> = self.lookup(KIND_FRAGMENT, self.fields.id, ids)?;
		let position = |id: &str| ids.iter().position(|x| x == id).unwrap_or(usize::MAX);
		found.sort_by_key(|f| position(&f.id));
		Ok(found)
	}

	pub fn documents_by_parent(&self, parent_ids: &[String]) -> Result<Vec<Document>> {
		self.lookup(KIND_DOCUMENT, self.fields.parent_id, parent_ids)
	}

	pub fn fragment_count(&self) -> Result<usize> {
		Ok(self.reader.searcher().search(&*self.kind_clause(KIND_FRAGMENT), &tantivy::collector::Count)?)
	}

	fn lookup<T: serde::de::DeserializeOwned>(&self, kind: &str, field: tantivy::schema::Field, values: &[String]) -> Result<Vec<T>> {
		if values.is_empty() { return Ok(Vec::new()); }
		let query = BooleanQuery::new(vec![(Occur::Must, self.kind_clause(kind)), (Occur::Must, self.any_of(field, values))]);
		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&query, &TopDocs::with_limit(values.len()))?;
		let mut out = Vec::with_capacity(top_docs.len());
		for (_score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			out.push(self.decode(&doc)?);
		}
		Ok(out)
	}

	fn decode<T: serde::de::DeserializeOwned>(&self, doc: &TantivyDocument) -> Result<T> {
		let raw = doc.get_first(self.fields.payload).and_then(|v| v.as_str()).ok_or_else(|| anyhow!("stored payload missing"))?;
		Ok(serde_json::from_str(raw)?)
	}
}
