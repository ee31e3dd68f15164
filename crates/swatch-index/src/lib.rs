//! Catalog index clients: LanceDB for deployments, in-memory for tests and
//! local runs. Both implement `swatch_core::traits::SimilarityIndex`.
pub mod memory;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use memory::MemoryIndex;
pub use search::LanceCatalogIndex;
pub use writer::CatalogWriter;
