use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const DEFAULT_EMBEDDING_DIM: i32 = 768;

/// One row per catalog item. `metadata` is a JSON object of display fields.
pub fn build_catalog_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::UInt64, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
		Field::new("r", DataType::Float32, false),
		Field::new("g", DataType::Float32, false),
		Field::new("b", DataType::Float32, false),
		Field::new("metadata", DataType::Utf8, false),
	]))
}

/// Vector width declared by a catalog table schema, if it has a vector column.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name("vector").ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}
