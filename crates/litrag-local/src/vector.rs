//! LanceDB store for fragment embeddings.
//!
//! One row per fragment: `id`, `parent_id` and a fixed-size `vector` column.
//! Search uses cosine distance; the reported score is `1 - distance`.
use anyhow::{anyhow, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};
use std::sync::Arc;

pub fn build_arrow_schema(dim: usize) -> Result<Arc<Schema>> {
	let dim = i32::try_from(dim).map_err(|_| anyhow!("embedding dimension {dim} too large"))?;
	Ok(Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("parent_id", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	])))
}

/// Row written to the vector table.
#[derive(Debug, Clone)]
pub struct VectorRow {
	pub id: String,
	pub parent_id: String,
	pub vector: Vec<f32>,
}

pub struct VectorStore { db: Connection, table_name: String, dim: usize }

impl VectorStore {
	pub async fn open(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let db = connect(uri).execute().await?;
		let store = Self { db, table_name: table_name.to_string(), dim };
		store.ensure_table().await?;
		Ok(store)
	}

	pub fn dim(&self) -> usize { self.dim }

	async fn ensure_table(&self) -> Result<()> {
		let names = self.db.table_names().execute().await?;
		if names.contains(&self.table_name) {
			return Ok(());
		}
		let schema = build_arrow_schema(self.dim)?;
		let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
		self.db.create_table(&self.table_name, Box::new(iter)).execute().await?;
		Ok(())
	}

	pub async fn add(&self, rows: &[VectorRow]) -> Result<()> {
		if rows.is_empty() { return Ok(()); }
		if let Some(bad) = rows.iter().find(|r| r.vector.len() != self.dim) {
			return Err(anyhow!("vector for {} has dimension {}, table expects {}", bad.id, bad.vector.len(), self.dim));
		}
		let record_batch = self.rows_to_record_batch(rows)?; let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		self.db.open_table(&self.table_name).execute().await?.add(reader).execute().await?;
		Ok(())
	}

	fn rows_to_record_batch(&self, rows: &[VectorRow]) -> Result<RecordBatch> {
		let schema = build_arrow_schema(self.dim)?;
		let dim = i32::try_from(self.dim)?;
		let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
		let parent_ids: Vec<&str> = rows.iter().map(|r| r.parent_id.as_str()).collect();
		let vectors = rows.iter().map(|r| Some(r.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
		let record_batch = RecordBatch::try_new(schema, vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(parent_ids)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim)),
		])?;
		Ok(record_batch)
	}

	/// Nearest fragments as `(id, score)`, best first.
	pub async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>> {
		if limit == 0 { return Ok(Vec::new()); }
		if query.len() != self.dim {
			return Err(anyhow!("query vector has dimension {}, table expects {}", query.len(), self.dim));
		}
		let table = self.db.open_table(&self.table_name).execute().await?;
		let mut results = table
			.vector_search(query.to_vec())?
			.distance_type(DistanceType::Cosine)
			.limit(limit)
			.execute()
			.await?;
		let mut hits = Vec::new();
		while let Some(batch) = results.try_next().await? {
			let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("id column missing"))?;
			let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>()).ok_or_else(|| anyhow!("_distance column missing"))?;
			for i in 0..batch.num_rows() {
				if distances.is_null(i) { continue; }
				hits.push((ids.value(i).to_string(), 1.0 - distances.value(i)));
			}
		}
		hits.sort_by(|a, b| b.1.total_cmp(&a.1));
		Ok(hits)
	}

	pub async fn count(&self) -> Result<usize> {
		Ok(self.db.open_table(&self.table_name).execute().await?.count_rows(None).await?)
	}
}
