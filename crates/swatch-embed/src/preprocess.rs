//! Decode, downscale and normalize images the same way the catalog vectors
//! were produced: thumbnail to at most 224px, then shortest-edge resize to 256,
//! center crop 224, ImageNet mean/std normalization.
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbImage};

use swatch_core::config::ModelSettings;
use swatch_core::types::ColorDescriptor;
use swatch_core::Error;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessConfig {
    pub max_image_size: u32,
    pub resize_shortest_edge: u32,
    pub crop_size: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self { Self { max_image_size: 224, resize_shortest_edge: 256, crop_size: 224 } }
}

impl From<&ModelSettings> for PreprocessConfig {
    fn from(m: &ModelSettings) -> Self {
        Self { max_image_size: m.max_image_size, resize_shortest_edge: m.resize_shortest_edge, crop_size: m.crop_size }
    }
}

/// Decode raw upload bytes. Undecodable or zero-area input is `InvalidImage`.
pub fn decode_image(bytes: &[u8]) -> swatch_core::Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(Error::InvalidImage("empty image payload".into()));
    }
    let image = image::load_from_memory(bytes).map_err(Error::invalid_image)?;
    ensure_area(&image)?;
    Ok(image)
}

pub fn ensure_area(image: &DynamicImage) -> swatch_core::Result<()> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(Error::InvalidImage(format!("image has zero area ({w}x{h})")));
    }
    Ok(())
}

/// Convert to RGB and shrink to fit within `max_size` x `max_size`, keeping the
/// aspect ratio. Images already inside the box are left at their size.
pub fn thumbnail(image: &DynamicImage, max_size: u32) -> RgbImage {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    if w <= max_size && h <= max_size { return rgb; }
    let scale = (f64::from(max_size) / f64::from(w)).min(f64::from(max_size) / f64::from(h));
    let nw = ((f64::from(w) * scale).round() as u32).clamp(1, max_size);
    let nh = ((f64::from(h) * scale).round() as u32).clamp(1, max_size);
    imageops::resize(&rgb, nw, nh, FilterType::CatmullRom)
}

/// Per-channel mean intensity, truncated to whole values like the stored
/// catalog colors.
pub fn average_color(image: &RgbImage) -> ColorDescriptor {
    let mut sums = [0u64; 3];
    for px in image.pixels() {
        for (s, c) in sums.iter_mut().zip(px.0) { *s += u64::from(c); }
    }
    let n = (u64::from(image.width()) * u64::from(image.height())).max(1) as f64;
    let mean = |s: u64| (s as f64 / n).trunc() as f32;
    ColorDescriptor::new(mean(sums[0]), mean(sums[1]), mean(sums[2]))
}

/// Resize the shortest edge, center crop and normalize into a `[1, 3, S, S]` tensor.
pub fn to_model_input(image: &RgbImage, cfg: &PreprocessConfig, device: &Device) -> Result<Tensor> {
    let (w, h) = image.dimensions();
    let short = w.min(h).max(1);
    let long_scaled = |long: u32| ((u64::from(cfg.resize_shortest_edge) * u64::from(long)) / u64::from(short)) as u32;
    let (nw, nh) = if w <= h {
        (cfg.resize_shortest_edge, long_scaled(h).max(cfg.resize_shortest_edge))
    } else {
        (long_scaled(w).max(cfg.resize_shortest_edge), cfg.resize_shortest_edge)
    };
    let resized = imageops::resize(image, nw, nh, FilterType::CatmullRom);

    let crop = cfg.crop_size.min(nw).min(nh);
    let left = (nw - crop) / 2;
    let top = (nh - crop) / 2;
    let cropped = imageops::crop_imm(&resized, left, top, crop, crop).to_image();

    let side = crop as usize;
    let pixels = Tensor::from_vec(cropped.into_raw(), (side, side, 3), &Device::Cpu)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?;
    let pixels = (pixels / 255.0)?;
    let mean = Tensor::new(&IMAGENET_MEAN, &Device::Cpu)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGENET_STD, &Device::Cpu)?.reshape((3, 1, 1))?;
    let pixels = pixels.broadcast_sub(&mean)?.broadcast_div(&std)?;
    Ok(pixels.unsqueeze(0)?.to_device(device)?)
}
