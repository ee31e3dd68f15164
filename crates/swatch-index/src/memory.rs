use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::Path;

use swatch_core::traits::SimilarityIndex;
use swatch_core::types::{CatalogId, CatalogItem, FeatureVector, SearchHit};
use swatch_core::{Error, Result};

/// Brute-force cosine index held in process memory.
pub struct MemoryIndex {
    items: RwLock<Vec<CatalogItem>>,
    dim: usize,
}

impl MemoryIndex {
    pub fn new(dim: usize) -> Self { Self { items: RwLock::new(Vec::new()), dim } }

    pub fn from_items(dim: usize, items: Vec<CatalogItem>) -> Result<Self> {
        let index = Self::new(dim);
        for item in items { index.insert(item)?; }
        Ok(index)
    }

    /// Load a JSON array of catalog items.
    pub fn from_json_file(path: &Path, dim: usize) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Unavailable(format!("cannot read catalog seed {}: {e}", path.display())))?;
        let items: Vec<CatalogItem> = serde_json::from_str(&raw)
            .map_err(|e| Error::Configuration(format!("invalid catalog seed {}: {e}", path.display())))?;
        Self::from_items(dim, items)
    }

    /// Insert or replace by id.
    pub fn insert(&self, item: CatalogItem) -> Result<()> {
        if item.vector.dim() != self.dim {
            return Err(Error::Configuration(format!("item {} has {} dims, index has {}", item.id, item.vector.dim(), self.dim)));
        }
        item.validate()?;
        let mut items = self.items.write();
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(slot) => *slot = item,
            None => items.push(item),
        }
        Ok(())
    }

    pub fn len(&self) -> usize { self.items.read().len() }
    pub fn is_empty(&self) -> bool { self.items.read().is_empty() }
}

#[async_trait]
impl SimilarityIndex for MemoryIndex {
    fn dim(&self) -> usize { self.dim }

    async fn query(&self, vector: &FeatureVector, limit: usize) -> Result<Vec<SearchHit>> {
        if vector.dim() != self.dim {
            return Err(Error::Configuration(format!("query vector has {} dims, index has {}", vector.dim(), self.dim)));
        }
        let items = self.items.read();
        let mut hits: Vec<SearchHit> = items
            .iter()
            .map(|i| SearchHit { id: i.id, score: vector.cosine(&i.vector), color: i.color, metadata: i.metadata.clone() })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn fetch(&self, id: CatalogId) -> Result<CatalogItem> {
        self.items.read().iter().find(|i| i.id == id).cloned().ok_or(Error::NotFound(id))
    }
}
