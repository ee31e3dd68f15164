use swatch_core::types::{CatalogItem, ColorDescriptor, FeatureVector, Meta, META_COLOR_LABEL, META_IMAGE_PATH, META_MATERIAL};

pub const DIM: usize = 4;

pub fn item(id: u64, v: [f32; 4], rgb: (f32, f32, f32), material: &str) -> CatalogItem {
    let mut metadata = Meta::new();
    metadata.insert(META_IMAGE_PATH.into(), format!("samples/sample_{id}.jpg"));
    metadata.insert(META_COLOR_LABEL.into(), "beige".into());
    metadata.insert(META_MATERIAL.into(), material.into());
    CatalogItem { id, vector: FeatureVector::normalized(v.to_vec()).unwrap(), color: ColorDescriptor::new(rgb.0, rgb.1, rgb.2), metadata }
}

pub fn catalog() -> Vec<CatalogItem> {
    vec![
        item(1, [1.0, 0.0, 0.0, 0.0], (200.0, 150.0, 100.0), "cotton"),
        item(2, [0.9, 0.1, 0.0, 0.0], (10.0, 20.0, 30.0), "linen"),
        item(3, [0.0, 1.0, 0.0, 0.0], (200.0, 150.0, 100.0), "wool"),
        item(4, [0.0, 0.0, 1.0, 0.0], (0.0, 0.0, 0.0), "silk"),
    ]
}

pub fn unit(v: [f32; 4]) -> FeatureVector { FeatureVector::normalized(v.to_vec()).unwrap() }
