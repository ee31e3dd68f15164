mod common;

use common::{catalog, item, unit, DIM};
use pretty_assertions::assert_eq;
use swatch_core::traits::SimilarityIndex;
use swatch_core::types::{CatalogItem, ColorDescriptor, FeatureVector, META_MATERIAL};
use swatch_core::Error;
use swatch_index::{CatalogWriter, LanceCatalogIndex};

async fn seeded(uri: &str) -> LanceCatalogIndex {
    let writer = CatalogWriter::new(uri, "catalog", DIM).await.expect("writer");
    assert_eq!(writer.upsert(&catalog()).await.expect("upsert"), 4);
    LanceCatalogIndex::connect(uri, "catalog", DIM).await.expect("connect")
}

#[tokio::test]
async fn query_returns_nearest_first_with_cosine_scores() {
    let tmp = tempfile::tempdir().unwrap();
    let index = seeded(&tmp.path().to_string_lossy()).await;
    let hits = index.query(&unit([1.0, 0.0, 0.0, 0.0]), 3).await.expect("query");
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, 1);
    assert_eq!(hits[1].id, 2);
    assert!((hits[0].score - 1.0).abs() < 1e-4, "score={}", hits[0].score);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(hits[0].metadata.get(META_MATERIAL).map(String::as_str), Some("cotton"));
    assert_eq!((hits[0].color.r, hits[0].color.g, hits[0].color.b), (200.0, 150.0, 100.0));
}

#[tokio::test]
async fn fetch_returns_stored_vector_and_color() {
    let tmp = tempfile::tempdir().unwrap();
    let index = seeded(&tmp.path().to_string_lossy()).await;
    let got = index.fetch(3).await.expect("fetch");
    assert_eq!(got.id, 3);
    assert_eq!(got.vector, unit([0.0, 1.0, 0.0, 0.0]));
    assert_eq!(got.metadata.get(META_MATERIAL).map(String::as_str), Some("wool"));
}

#[tokio::test]
async fn fetch_unknown_id_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let index = seeded(&tmp.path().to_string_lossy()).await;
    assert!(matches!(index.fetch(999).await, Err(Error::NotFound(999))));
}

#[tokio::test]
async fn upsert_replaces_existing_ids() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let _ = seeded(&uri).await;
    let writer = CatalogWriter::new(&uri, "catalog", DIM).await.unwrap();
    writer.upsert(&[item(4, [0.0, 0.0, 0.0, 1.0], (1.0, 2.0, 3.0), "velvet")]).await.unwrap();
    let index = LanceCatalogIndex::connect(&uri, "catalog", DIM).await.unwrap();
    let hits = index.query(&unit([0.0, 0.0, 0.0, 1.0]), 10).await.unwrap();
    assert_eq!(hits.len(), 4, "no duplicate rows");
    assert_eq!(hits[0].id, 4);
    assert_eq!(hits[0].metadata.get(META_MATERIAL).map(String::as_str), Some("velvet"));
}

#[tokio::test]
async fn missing_table_is_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    let res = LanceCatalogIndex::connect(&tmp.path().to_string_lossy(), "nope", DIM).await;
    assert!(matches!(res, Err(Error::Unavailable(_))));
}

#[tokio::test]
async fn dimension_mismatch_is_configuration_error() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let _ = seeded(&uri).await;
    let res = LanceCatalogIndex::connect(&uri, "catalog", DIM + 1).await;
    assert!(matches!(res, Err(Error::Configuration(_))));

    let writer = CatalogWriter::new(&uri, "catalog", DIM + 1).await.unwrap();
    assert!(matches!(writer.upsert(&catalog()).await, Err(Error::Configuration(_))));
}

#[tokio::test]
async fn upsert_rejects_unnormalized_rows_before_writing() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let writer = CatalogWriter::new(&uri, "catalog", DIM).await.unwrap();
    let long = CatalogItem { vector: FeatureVector::from_stored(vec![0.0, 3.0, 0.0, 0.0]), ..item(5, [0.0, 1.0, 0.0, 0.0], (1.0, 1.0, 1.0), "felt") };
    assert!(matches!(writer.upsert(&[item(1, [1.0, 0.0, 0.0, 0.0], (0.0, 0.0, 0.0), "cotton"), long]).await, Err(Error::Configuration(_))));
    let dark = CatalogItem { color: ColorDescriptor::new(-1.0, 0.0, 0.0), ..item(6, [1.0, 0.0, 0.0, 0.0], (0.0, 0.0, 0.0), "felt") };
    assert!(matches!(writer.upsert(&[dark]).await, Err(Error::Configuration(_))));
    assert!(matches!(LanceCatalogIndex::connect(&uri, "catalog", DIM).await, Err(Error::Unavailable(_))));
}
