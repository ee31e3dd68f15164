use async_trait::async_trait;
use image::DynamicImage;

use crate::error::Result;
use crate::types::{CatalogId, CatalogItem, ColorDescriptor, FeatureVector, SearchHit};

/// Turns a decoded image into an embedding plus its global color signature.
///
/// Implementations must be pure: the same image and weights always give the
/// same output. Calls are blocking compute; callers off the async runtime go
/// through `swatch_embed::InferencePool`.
pub trait FeatureExtractor: Send + Sync {
    fn dim(&self) -> usize;
    fn extract(&self, image: &DynamicImage) -> Result<(FeatureVector, ColorDescriptor)>;
}

/// Read-only client for the catalog's vector store.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Dimensionality of the indexed vectors.
    fn dim(&self) -> usize;
    /// Up to `limit` nearest neighbours by cosine similarity, best first.
    async fn query(&self, vector: &FeatureVector, limit: usize) -> Result<Vec<SearchHit>>;
    /// Exact lookup; `Error::NotFound` when the id is unknown.
    async fn fetch(&self, id: CatalogId) -> Result<CatalogItem>;
}
