use arrow_array::cast::AsArray;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, StringArray, UInt64Array};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use tracing::{debug, warn};

use swatch_core::traits::SimilarityIndex;
use swatch_core::types::{CatalogId, CatalogItem, ColorDescriptor, FeatureVector, Meta, SearchHit};
use swatch_core::{Error, Result};

use crate::schema::vector_dim;
use crate::table::{open_db, open_table};

/// Read-only client for a LanceDB catalog table. The table handle is opened
/// once and shared by all requests.
pub struct LanceCatalogIndex { table: Table, table_name: String, dim: usize }

impl LanceCatalogIndex {
	pub async fn connect(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let db = open_db(uri).await?;
		let table = open_table(&db, table_name).await?;
		let schema = table.schema().await.map_err(Error::unavailable)?;
		match vector_dim(&schema) {
			Some(d) if d == dim => {}
			Some(d) => return Err(Error::Configuration(format!("catalog table '{table_name}' stores {d}-dim vectors, configured for {dim}"))),
			None => return Err(Error::Configuration(format!("catalog table '{table_name}' has no vector column"))),
		}
		Ok(Self { table, table_name: table_name.to_string(), dim })
	}

	fn check_dim(&self, vector: &FeatureVector) -> Result<()> {
		if vector.dim() != self.dim {
			return Err(Error::Configuration(format!("query vector has {} dims, index '{}' has {}", vector.dim(), self.table_name, self.dim)));
		}
		Ok(())
	}
}

#[async_trait]
impl SimilarityIndex for LanceCatalogIndex {
	fn dim(&self) -> usize { self.dim }

	async fn query(&self, vector: &FeatureVector, limit: usize) -> Result<Vec<SearchHit>> {
		self.check_dim(vector)?;
		if limit == 0 { return Ok(Vec::new()); }
		let mut stream = self.table
			.vector_search(vector.as_slice().to_vec())
			.map_err(Error::unavailable)?
			.distance_type(DistanceType::Cosine)
			.limit(limit)
			.execute()
			.await
			.map_err(|e| { warn!(table = %self.table_name, error = %e, "vector search failed"); Error::unavailable(e) })?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(Error::unavailable)? {
			hits.extend(batch_to_hits(&batch)?);
		}
		// Lance returns nearest first; keep that order stable across batches.
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(limit);
		debug!(table = %self.table_name, hits = hits.len(), "vector search");
		Ok(hits)
	}

	async fn fetch(&self, id: CatalogId) -> Result<CatalogItem> {
		let mut stream = self.table
			.query()
			.only_if(format!("id = {id}"))
			.limit(1)
			.execute()
			.await
			.map_err(|e| { warn!(table = %self.table_name, error = %e, "fetch failed"); Error::unavailable(e) })?;
		while let Some(batch) = stream.try_next().await.map_err(Error::unavailable)? {
			if let Some(item) = batch_to_items(&batch)?.into_iter().next() { return Ok(item); }
		}
		Err(Error::NotFound(id))
	}
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| Error::Unavailable(format!("catalog batch missing or mistyped column '{name}'")))
}

fn colors(batch: &RecordBatch) -> Result<impl Fn(usize) -> ColorDescriptor + '_> {
	let r = column::<Float32Array>(batch, "r")?;
	let g = column::<Float32Array>(batch, "g")?;
	let b = column::<Float32Array>(batch, "b")?;
	Ok(move |i| ColorDescriptor::new(r.value(i), g.value(i), b.value(i)))
}

fn parse_meta(raw: &str) -> Result<Meta> {
	serde_json::from_str(raw).map_err(|e| Error::Unavailable(format!("corrupt catalog metadata: {e}")))
}

fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
	let ids = column::<UInt64Array>(batch, "id")?;
	let metas = column::<StringArray>(batch, "metadata")?;
	let distances = column::<Float32Array>(batch, "_distance")?;
	let color_at = colors(batch)?;
	(0..batch.num_rows())
		.map(|i| Ok(SearchHit { id: ids.value(i), score: 1.0 - distances.value(i), color: color_at(i), metadata: parse_meta(metas.value(i))? }))
		.collect()
}

pub(crate) fn batch_to_items(batch: &RecordBatch) -> Result<Vec<CatalogItem>> {
	let ids = column::<UInt64Array>(batch, "id")?;
	let metas = column::<StringArray>(batch, "metadata")?;
	let vectors = column::<FixedSizeListArray>(batch, "vector")?;
	let color_at = colors(batch)?;
	(0..batch.num_rows())
		.map(|i| {
			if vectors.is_null(i) { return Err(Error::Unavailable(format!("catalog item {} has no vector", ids.value(i)))); }
			let values = vectors.value(i).as_primitive::<arrow_array::types::Float32Type>().values().to_vec();
			Ok(CatalogItem { id: ids.value(i), vector: FeatureVector::from_stored(values), color: color_at(i), metadata: parse_meta(metas.value(i))? })
		})
		.collect()
}
