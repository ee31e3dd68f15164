//! Domain types shared by the extractor, the index clients and the reranker.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

pub type CatalogId = u64;
pub type Meta = HashMap<String, String>;

pub const META_IMAGE_PATH: &str = "image path";
pub const META_COLOR_LABEL: &str = "color label";
pub const META_MATERIAL: &str = "material";

/// Tolerance used when checking that a vector has unit norm.
pub const NORM_TOLERANCE: f32 = 1e-5;

/// Dense, L2-normalized image embedding.
///
/// Dimensionality is fixed by the encoder and must match the dimension of the
/// catalog index it is queried against.
///
/// Deserialized vectors are renormalized to unit length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Normalize `values` to unit length. Zero, empty or non-finite input is
    /// rejected because it has no direction to compare by.
    pub fn normalized(mut values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::InvalidImage("embedding is empty".into()));
        }
        if values.iter().any(|x| !x.is_finite()) {
            return Err(Error::InvalidImage("embedding has non-finite components".into()));
        }
        let norm = l2_norm(&values);
        if norm <= f32::EPSILON {
            return Err(Error::InvalidImage("embedding is the zero vector".into()));
        }
        for x in &mut values { *x /= norm; }
        Ok(Self(values))
    }

    /// Wrap a vector read back from the catalog store. Stored vectors were
    /// normalized when they were written, so no rescaling happens here.
    pub fn from_stored(values: Vec<f32>) -> Self { Self(values) }

    pub fn dim(&self) -> usize { self.0.len() }
    pub fn as_slice(&self) -> &[f32] { &self.0 }
    pub fn into_inner(self) -> Vec<f32> { self.0 }
    pub fn norm(&self) -> f32 { l2_norm(&self.0) }

    pub fn is_unit(&self) -> bool { (self.norm() - 1.0).abs() <= NORM_TOLERANCE }

    /// Cosine similarity. Both sides are unit length so this is a dot product.
    pub fn cosine(&self, other: &FeatureVector) -> f32 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = Error;

    fn try_from(values: Vec<f32>) -> Result<Self> { Self::normalized(values) }
}

impl From<FeatureVector> for Vec<f32> {
    fn from(v: FeatureVector) -> Self { v.0 }
}

fn l2_norm(values: &[f32]) -> f32 { values.iter().map(|x| x * x).sum::<f32>().sqrt() }

/// Mean red/green/blue intensity of an image, each channel in [0, 255].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorDescriptor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl ColorDescriptor {
    pub fn new(r: f32, g: f32, b: f32) -> Self { Self { r, g, b } }

    /// Euclidean distance over the three channels.
    pub fn distance(&self, other: &ColorDescriptor) -> f32 {
        let dr = self.r - other.r;
        let dg = self.g - other.g;
        let db = self.b - other.b;
        (dr * dr + dg * dg + db * db).sqrt()
    }

    pub fn in_range(&self) -> bool {
        [self.r, self.g, self.b].iter().all(|c| (0.0..=255.0).contains(c))
    }
}

/// A product or sample as stored in the catalog index. Read-only for this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: CatalogId,
    pub vector: FeatureVector,
    pub color: ColorDescriptor,
    #[serde(default)]
    pub metadata: Meta,
}

impl CatalogItem {
    /// Reject items that would break scoring: non-unit vectors or colors
    /// outside [0, 255].
    pub fn validate(&self) -> Result<()> {
        if !self.vector.is_unit() {
            return Err(Error::Configuration(format!("catalog item {} has a vector of norm {}, expected 1", self.id, self.vector.norm())));
        }
        if !self.color.in_range() {
            return Err(Error::Configuration(format!("catalog item {} has color {:?} outside [0, 255]", self.id, self.color)));
        }
        Ok(())
    }
}

/// One nearest-neighbour candidate returned by an index.
///
/// `score` is the semantic (cosine) similarity; higher is closer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: CatalogId,
    pub score: f32,
    pub color: ColorDescriptor,
    pub metadata: Meta,
}

/// A hit after color reranking. Ordering of these is the public contract.
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub hit: SearchHit,
    pub color_similarity: f32,
    pub final_score: f32,
}

/// Response row: id, blended score and display metadata, never raw vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarProduct {
    pub id: CatalogId,
    pub score: f32,
    #[serde(rename = "image path")]
    pub image_path: String,
    pub color: String,
    pub material: String,
}

impl From<&RankedResult> for SimilarProduct {
    fn from(r: &RankedResult) -> Self {
        let field = |key: &str| r.hit.metadata.get(key).cloned().unwrap_or_default();
        Self {
            id: r.hit.id,
            score: r.final_score,
            image_path: field(META_IMAGE_PATH),
            color: field(META_COLOR_LABEL),
            material: field(META_MATERIAL),
        }
    }
}

/// Terminal state of a query that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Vec<SimilarProduct>),
    NoResults,
}

impl SearchOutcome {
    pub fn products(&self) -> &[SimilarProduct] {
        match self {
            Self::Found(p) => p,
            Self::NoResults => &[],
        }
    }
}
