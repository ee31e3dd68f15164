use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbImage};
use pretty_assertions::assert_eq;

use swatch_core::traits::{FeatureExtractor, SimilarityIndex};
use swatch_core::types::{
    CatalogId, CatalogItem, ColorDescriptor, FeatureVector, Meta, SearchHit, SearchOutcome, META_COLOR_LABEL, META_IMAGE_PATH,
    META_MATERIAL,
};
use swatch_core::{Error, Result};
use swatch_embed::InferencePool;
use swatch_hybrid::{QueryOptions, QueryOrchestrator};
use swatch_index::MemoryIndex;

const DIM: usize = 4;

/// Returns a fixed vector and color regardless of the image.
struct StubExtractor { vector: FeatureVector, color: ColorDescriptor }

impl FeatureExtractor for StubExtractor {
    fn dim(&self) -> usize { self.vector.dim() }
    fn extract(&self, _image: &DynamicImage) -> Result<(FeatureVector, ColorDescriptor)> { Ok((self.vector.clone(), self.color)) }
}

struct DownIndex;

#[async_trait]
impl SimilarityIndex for DownIndex {
    fn dim(&self) -> usize { DIM }
    async fn query(&self, _vector: &FeatureVector, _limit: usize) -> Result<Vec<SearchHit>> { Err(Error::Unavailable("connection refused".into())) }
    async fn fetch(&self, _id: CatalogId) -> Result<CatalogItem> { Err(Error::Unavailable("connection refused".into())) }
}

fn unit(v: [f32; 4]) -> FeatureVector { FeatureVector::normalized(v.to_vec()).unwrap() }

fn item(id: u64, v: [f32; 4], rgb: (f32, f32, f32)) -> CatalogItem {
    let mut metadata = Meta::new();
    metadata.insert(META_IMAGE_PATH.into(), format!("sample_images/sample_{id}.jpg"));
    metadata.insert(META_COLOR_LABEL.into(), format!("color-{id}"));
    metadata.insert(META_MATERIAL.into(), "cotton".into());
    CatalogItem { id, vector: unit(v), color: ColorDescriptor::new(rgb.0, rgb.1, rgb.2), metadata }
}

fn catalog() -> Vec<CatalogItem> {
    vec![
        item(1, [1.0, 0.0, 0.0, 0.0], (0.0, 0.0, 0.0)),
        item(2, [0.95, 0.31, 0.0, 0.0], (255.0, 255.0, 255.0)),
        item(3, [0.0, 1.0, 0.0, 0.0], (255.0, 255.0, 255.0)),
        item(4, [0.0, 0.0, 0.0, 1.0], (128.0, 128.0, 128.0)),
    ]
}

fn png() -> Bytes {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(8, 8)).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    Bytes::from(buf)
}

fn pool(v: [f32; 4], rgb: (f32, f32, f32)) -> InferencePool {
    InferencePool::new(Arc::new(StubExtractor { vector: unit(v), color: ColorDescriptor::new(rgb.0, rgb.1, rgb.2) }), 1).unwrap()
}

fn orchestrator(index: Arc<dyn SimilarityIndex>, options: QueryOptions) -> QueryOrchestrator {
    QueryOrchestrator::new(pool([1.0, 0.0, 0.0, 0.0], (255.0, 255.0, 255.0)), index, options).unwrap()
}

fn memory() -> Arc<dyn SimilarityIndex> { Arc::new(MemoryIndex::from_items(DIM, catalog()).unwrap()) }

fn ids(outcome: &SearchOutcome) -> Vec<u64> { outcome.products().iter().map(|p| p.id).collect() }

#[tokio::test]
async fn by_image_reranks_color_matches_up() {
    let orch = orchestrator(memory(), QueryOptions { limit: 3, ..Default::default() });
    let outcome = orch.search_by_image(png()).await.expect("search");
    // Item 1 is the exact semantic match but black; item 2 is close and white like the query.
    assert_eq!(ids(&outcome), vec![2, 1, 3]);
    let top = &outcome.products()[0];
    assert_eq!(top.image_path, "sample_images/sample_2.jpg");
    assert_eq!(top.color, "color-2");
    assert_eq!(top.material, "cotton");
    let semantic = unit([1.0, 0.0, 0.0, 0.0]).cosine(&unit([0.95, 0.31, 0.0, 0.0]));
    assert!((top.score - (0.85 * semantic + 0.15)).abs() < 1e-5, "score is the blended score");
}

#[tokio::test]
async fn by_id_never_returns_the_queried_item() {
    let orch = orchestrator(memory(), QueryOptions::default());
    for id in 1..=4 {
        let outcome = orch.search_by_id(id).await.expect("search");
        assert!(!ids(&outcome).contains(&id), "id {id} returned itself");
        assert_eq!(outcome.products().len(), 3);
    }
}

#[tokio::test]
async fn by_id_uses_stored_color() {
    let orch = orchestrator(memory(), QueryOptions::default());
    // Item 3 is white; item 2 (white, cos 0.31) should beat item 1 (black, cos 0).
    let outcome = orch.search_by_id(3).await.unwrap();
    assert_eq!(ids(&outcome)[0], 2);
}

#[tokio::test]
async fn by_id_unknown_is_not_found_not_empty() {
    let orch = orchestrator(memory(), QueryOptions::default());
    assert!(matches!(orch.search_by_id(77).await, Err(Error::NotFound(77))));
}

#[tokio::test]
async fn empty_index_gives_no_results() {
    let orch = orchestrator(Arc::new(MemoryIndex::new(DIM)), QueryOptions::default());
    assert_eq!(orch.search_by_image(png()).await.unwrap(), SearchOutcome::NoResults);
}

#[tokio::test]
async fn only_self_match_gives_no_results() {
    let index = Arc::new(MemoryIndex::from_items(DIM, vec![item(5, [0.0, 0.0, 1.0, 0.0], (1.0, 1.0, 1.0))]).unwrap());
    let orch = orchestrator(index, QueryOptions::default());
    assert_eq!(orch.search_by_id(5).await.unwrap(), SearchOutcome::NoResults);
}

#[tokio::test]
async fn unavailable_index_is_an_error_not_an_empty_list() {
    let orch = orchestrator(Arc::new(DownIndex), QueryOptions::default());
    assert!(matches!(orch.search_by_image(png()).await, Err(Error::Unavailable(_))));
    assert!(matches!(orch.search_by_id(1).await, Err(Error::Unavailable(_))));
}

#[tokio::test]
async fn undecodable_upload_is_invalid_image() {
    let orch = orchestrator(memory(), QueryOptions::default());
    let res = orch.search_by_image(Bytes::from_static(b"\x89PNG but not really")).await;
    assert!(matches!(res, Err(Error::InvalidImage(_))));
}

#[tokio::test]
async fn score_threshold_drops_weak_candidates() {
    let orch = orchestrator(memory(), QueryOptions { score_threshold: Some(0.7), ..Default::default() });
    assert_eq!(ids(&orch.search_by_image(png()).await.unwrap()), vec![2, 1]);

    let strict = orchestrator(memory(), QueryOptions { score_threshold: Some(1.5), ..Default::default() });
    assert_eq!(strict.search_by_image(png()).await.unwrap(), SearchOutcome::NoResults);
}

#[test]
fn construction_validates_options_and_dimensions() {
    let bad_alpha = QueryOrchestrator::new(pool([1.0, 0.0, 0.0, 0.0], (0.0, 0.0, 0.0)), memory(), QueryOptions { alpha: 1.2, ..Default::default() });
    assert!(matches!(bad_alpha, Err(Error::Configuration(_))));

    let zero_limit = QueryOrchestrator::new(pool([1.0, 0.0, 0.0, 0.0], (0.0, 0.0, 0.0)), memory(), QueryOptions { limit: 0, ..Default::default() });
    assert!(matches!(zero_limit, Err(Error::Configuration(_))));

    let wide = Arc::new(MemoryIndex::new(DIM + 4));
    let mismatch = QueryOrchestrator::new(pool([1.0, 0.0, 0.0, 0.0], (0.0, 0.0, 0.0)), wide, QueryOptions::default());
    assert!(matches!(mismatch, Err(Error::Configuration(_))));
}
