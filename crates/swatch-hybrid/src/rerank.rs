//! Color-aware reranking of nearest-neighbour candidates.
//!
//! The embedding is dominated by texture, so two swatches with the same weave
//! but very different colors score close together. Blending in a cheap mean
//! color similarity pushes color matches up without overriding the semantic
//! order by much.
use swatch_core::types::{ColorDescriptor, RankedResult, SearchHit};
use swatch_core::{Error, Result};

pub const DEFAULT_ALPHA: f32 = 0.85;

/// Upper bound of an 8-bit channel; scales distance into the same range as one channel.
const CHANNEL_MAX: f32 = 255.0;

/// `1 / (1 + d / 255)`: 1.0 for identical colors, falling monotonically with distance.
pub fn color_similarity(query: &ColorDescriptor, candidate: &ColorDescriptor) -> f32 {
    1.0 / (1.0 + query.distance(candidate) / CHANNEL_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridReranker {
    alpha: f32,
}

impl Default for HybridReranker {
    fn default() -> Self { Self { alpha: DEFAULT_ALPHA } }
}

impl HybridReranker {
    /// `alpha` weights the semantic score; `1 - alpha` weights color. Values
    /// outside [0, 1] are rejected, never clamped.
    pub fn new(alpha: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::Configuration(format!("rerank alpha must be within [0, 1], got {alpha}")));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f32 { self.alpha }

    pub fn blend(&self, semantic: f32, color_sim: f32) -> f32 {
        self.alpha * semantic + (1.0 - self.alpha) * color_sim
    }

    /// Score every hit and stable-sort by blended score, best first. Same
    /// cardinality in and out; equal scores keep their input order.
    pub fn rerank(&self, hits: Vec<SearchHit>, query_color: &ColorDescriptor) -> Vec<RankedResult> {
        let mut ranked: Vec<RankedResult> = hits
            .into_iter()
            .map(|hit| {
                let color_similarity = color_similarity(query_color, &hit.color);
                let final_score = self.blend(hit.score, color_similarity);
                RankedResult { hit, color_similarity, final_score }
            })
            .collect();
        ranked.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_color_has_similarity_one() {
        let c = ColorDescriptor::new(12.0, 34.0, 56.0);
        assert_eq!(color_similarity(&c, &c), 1.0);
    }

    #[test]
    fn max_distance_similarity() {
        let black = ColorDescriptor::new(0.0, 0.0, 0.0);
        let white = ColorDescriptor::new(255.0, 255.0, 255.0);
        let expected = 1.0 / (1.0 + 3f32.sqrt());
        assert!((color_similarity(&black, &white) - expected).abs() < 1e-6);
    }

    #[test]
    fn alpha_bounds() {
        assert!(HybridReranker::new(0.0).is_ok());
        assert!(HybridReranker::new(1.0).is_ok());
        assert!(matches!(HybridReranker::new(-0.01), Err(Error::Configuration(_))));
        assert!(matches!(HybridReranker::new(1.01), Err(Error::Configuration(_))));
        assert!(matches!(HybridReranker::new(f32::NAN), Err(Error::Configuration(_))));
    }
}
