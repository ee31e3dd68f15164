//! Image feature extraction: preprocessing, the DINOv2 patch encoder,
//! patch-mean pooling and the global color descriptor.
use anyhow::Result;
use candle_core::{Device, Tensor};
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use swatch_core::config::{expand_path, ModelSettings};
use swatch_core::traits::FeatureExtractor;
use swatch_core::types::{ColorDescriptor, FeatureVector};
use swatch_core::Error;

pub mod device;
pub mod dinov2;
pub mod fake;
pub mod pool;
pub mod preprocess;
pub mod worker;

pub use dinov2::{Dinov2Config, Dinov2Encoder};
pub use fake::FakePatchEncoder;
pub use pool::patch_mean_l2;
pub use preprocess::{decode_image, PreprocessConfig};
pub use worker::InferencePool;

/// Patch size used by the fake encoder, matching DINOv2's 14px patches.
pub const FAKE_PATCH_SIZE: usize = 14;

/// A vision backbone that returns per-token hidden states.
pub trait PatchEncoder: Send + Sync {
    fn hidden_size(&self) -> usize;
    fn device(&self) -> &Device;
    /// `[1, 3, H, W]` normalized pixels -> `[1, 1 + P, D]`, class token first.
    fn encode(&self, pixels: &Tensor) -> candle_core::Result<Tensor>;
}

pub struct ImageFeatureExtractor<E: PatchEncoder> {
    encoder: E,
    preprocess: PreprocessConfig,
}

impl<E: PatchEncoder> ImageFeatureExtractor<E> {
    pub fn new(encoder: E, preprocess: PreprocessConfig) -> Self { Self { encoder, preprocess } }

    fn embed(&self, thumb: &image::RgbImage) -> Result<Vec<f32>> {
        let pixels = preprocess::to_model_input(thumb, &self.preprocess, self.encoder.device())?;
        let hidden = self.encoder.encode(&pixels)?;
        let pooled = patch_mean_l2(&hidden)?;
        Ok(pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?)
    }
}

impl<E: PatchEncoder> FeatureExtractor for ImageFeatureExtractor<E> {
    fn dim(&self) -> usize { self.encoder.hidden_size() }

    fn extract(&self, image: &DynamicImage) -> swatch_core::Result<(FeatureVector, ColorDescriptor)> {
        preprocess::ensure_area(image)?;
        let start = Instant::now();
        let thumb = preprocess::thumbnail(image, self.preprocess.max_image_size);
        let color = preprocess::average_color(&thumb);
        let values = self.embed(&thumb).map_err(|e| Error::Unavailable(format!("feature encoder failed: {e:#}")))?;
        if values.len() != self.dim() {
            return Err(Error::Configuration(format!("encoder returned {} dims, expected {}", values.len(), self.dim())));
        }
        // Pooling already normalized; renormalize in f32 to drop the epsilon bias.
        let vector = FeatureVector::normalized(values)?;
        let elapsed = start.elapsed().as_millis();
        if elapsed > 1000 { warn!(elapsed_ms = elapsed as u64, "slow feature extraction"); }
        debug!(elapsed_ms = elapsed as u64, ?color, "extracted features");
        Ok((vector, color))
    }
}

fn fake_requested(settings: &ModelSettings) -> bool {
    settings.fake
        || std::env::var("APP_USE_FAKE_FEATURES").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Build the process-wide extractor: DINOv2 from `settings.dir`, or the fake
/// encoder when `model.fake` or `APP_USE_FAKE_FEATURES=1` is set. `dim` sizes
/// the fake encoder so it matches the index it will be queried against.
pub fn load_extractor(settings: &ModelSettings, dim: usize) -> Result<Arc<dyn FeatureExtractor>> {
    let preprocess = PreprocessConfig::from(settings);
    if fake_requested(settings) {
        info!(dim, "using FakePatchEncoder");
        return Ok(Arc::new(ImageFeatureExtractor::new(FakePatchEncoder::new(dim, FAKE_PATCH_SIZE)?, preprocess)));
    }
    let device = device::select_device();
    let dir = expand_path(&settings.dir);
    let encoder = Dinov2Encoder::load(Path::new(&dir), preprocess.crop_size as usize, &device)?;
    Ok(Arc::new(ImageFeatureExtractor::new(encoder, preprocess)))
}
