use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

use swatch_core::config::QuerySettings;
use swatch_core::traits::SimilarityIndex;
use swatch_core::types::{CatalogId, ColorDescriptor, SearchHit, SearchOutcome, SimilarProduct};
use swatch_core::{Error, Result};
use swatch_embed::InferencePool;

use crate::rerank::{HybridReranker, DEFAULT_ALPHA};

/// How many candidates to retrieve, how to weight color, and an optional
/// floor on the raw semantic score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub limit: usize,
    pub alpha: f32,
    pub score_threshold: Option<f32>,
}

impl Default for QueryOptions {
    fn default() -> Self { Self { limit: 10, alpha: DEFAULT_ALPHA, score_threshold: None } }
}

impl From<&QuerySettings> for QueryOptions {
    fn from(q: &QuerySettings) -> Self { Self { limit: q.limit, alpha: q.alpha, score_threshold: q.score_threshold } }
}

impl QueryOptions {
    fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(Error::Configuration("result limit must be positive".into()));
        }
        if let Some(t) = self.score_threshold {
            if !t.is_finite() { return Err(Error::Configuration(format!("score threshold must be finite, got {t}"))); }
        }
        Ok(())
    }
}

/// Runs the by-image and by-id retrieval flows. Holds only shared read-only
/// handles, so one instance serves concurrent requests.
pub struct QueryOrchestrator {
    extractor: InferencePool,
    index: Arc<dyn SimilarityIndex>,
    reranker: HybridReranker,
    options: QueryOptions,
}

impl QueryOrchestrator {
    pub fn new(extractor: InferencePool, index: Arc<dyn SimilarityIndex>, options: QueryOptions) -> Result<Self> {
        options.validate()?;
        let reranker = HybridReranker::new(options.alpha)?;
        if extractor.dim() != index.dim() {
            return Err(Error::Configuration(format!(
                "extractor produces {}-dim vectors but the index stores {}-dim vectors",
                extractor.dim(),
                index.dim()
            )));
        }
        info!(limit = options.limit, alpha = options.alpha, threshold = ?options.score_threshold, "query orchestrator ready");
        Ok(Self { extractor, index, reranker, options })
    }

    pub fn options(&self) -> &QueryOptions { &self.options }

    /// Products similar to an uploaded photo.
    pub async fn search_by_image(&self, image: Bytes) -> Result<SearchOutcome> {
        let (vector, color) = self.extractor.extract_bytes(image).await?;
        debug!(norm = vector.norm(), ?color, "query image embedded");
        let hits = self.index.query(&vector, self.options.limit).await?;
        debug!(top_scores = ?top_scores(&hits), "by-image candidates");
        Ok(self.finish(hits, &color))
    }

    /// Products similar to an existing catalog item, never including the item itself.
    pub async fn search_by_id(&self, id: CatalogId) -> Result<SearchOutcome> {
        let item = self.index.fetch(id).await?;
        let hits: Vec<SearchHit> = self
            .index
            .query(&item.vector, self.options.limit)
            .await?
            .into_iter()
            .filter(|hit| hit.id != id)
            .collect();
        debug!(query_id = id, top_scores = ?top_scores(&hits), "by-id candidates");
        Ok(self.finish(hits, &item.color))
    }

    fn finish(&self, mut hits: Vec<SearchHit>, query_color: &ColorDescriptor) -> SearchOutcome {
        if let Some(threshold) = self.options.score_threshold {
            hits.retain(|h| h.score >= threshold);
        }
        if hits.is_empty() {
            return SearchOutcome::NoResults;
        }
        let ranked = self.reranker.rerank(hits, query_color);
        SearchOutcome::Found(ranked.iter().map(SimilarProduct::from).collect())
    }
}

fn top_scores(hits: &[SearchHit]) -> Vec<f32> { hits.iter().take(3).map(|h| h.score).collect() }
