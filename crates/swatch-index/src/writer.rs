use arrow_array::{FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray, UInt64Array};
use lancedb::Connection;
use std::sync::Arc;
use tracing::info;

use swatch_core::types::CatalogItem;
use swatch_core::{Error, Result};

use crate::schema::build_catalog_schema;
use crate::table::{open_db, table_exists};

const BATCH_SIZE: usize = 1000;

/// Writes catalog rows. Rows with an existing id are replaced.
pub struct CatalogWriter { db: Connection, table_name: String, dim: usize }

impl CatalogWriter {
	pub async fn new(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let db = open_db(uri).await?;
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	pub async fn upsert(&self, items: &[CatalogItem]) -> Result<usize> {
		if items.is_empty() { return Ok(0); }
		if let Some(bad) = items.iter().find(|i| i.vector.dim() != self.dim) {
			return Err(Error::Configuration(format!("item {} has {} dims, table '{}' expects {}", bad.id, bad.vector.dim(), self.table_name, self.dim)));
		}
		for item in items { item.validate()?; }
		for batch in items.chunks(BATCH_SIZE) {
			self.write_batch(batch).await?;
		}
		info!(table = %self.table_name, rows = items.len(), "catalog upsert complete");
		Ok(items.len())
	}

	async fn write_batch(&self, items: &[CatalogItem]) -> Result<()> {
		let record_batch = self.items_to_record_batch(items)?; let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		if table_exists(&self.db, &self.table_name).await? {
			let table = self.db.open_table(&self.table_name).execute().await.map_err(Error::unavailable)?;
			let mut merge = table.merge_insert(&["id"]);
			merge.when_matched_update_all(None).when_not_matched_insert_all();
			merge.execute(reader).await.map_err(Error::unavailable)?;
		} else {
			self.db.create_table(&self.table_name, reader).execute().await.map_err(Error::unavailable)?;
		}
		Ok(())
	}

	fn items_to_record_batch(&self, items: &[CatalogItem]) -> Result<RecordBatch> {
		let dim = i32::try_from(self.dim).map_err(|_| Error::Configuration(format!("dimension {} too large", self.dim)))?;
		let schema = build_catalog_schema(dim);
		let mut ids = Vec::new(); let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
		let mut rs = Vec::new(); let mut gs = Vec::new(); let mut bs = Vec::new(); let mut metas = Vec::new();
		for item in items {
			ids.push(item.id);
			vectors.push(Some(item.vector.as_slice().iter().map(|&x| Some(x)).collect()));
			rs.push(item.color.r); gs.push(item.color.g); bs.push(item.color.b);
			metas.push(serde_json::to_string(&item.metadata).map_err(|e| Error::Configuration(e.to_string()))?);
		}
		RecordBatch::try_new(schema, vec![
			Arc::new(UInt64Array::from(ids)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
			Arc::new(Float32Array::from(rs)),
			Arc::new(Float32Array::from(gs)),
			Arc::new(Float32Array::from(bs)),
			Arc::new(StringArray::from(metas)),
		]).map_err(|e| Error::Configuration(format!("building catalog batch: {e}")))
	}
}
