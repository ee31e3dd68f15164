use candle_core::{Device, Tensor};
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::PatchEncoder;

/// Deterministic stand-in for the vision model.
///
/// Each patch is average-pooled to an RGB triple and projected to `dim` with a
/// fixed xxhash-seeded matrix plus bias. Similar colors and layouts give
/// similar vectors, which is enough for pipeline tests and offline runs.
pub struct FakePatchEncoder {
    dim: usize,
    patch_size: usize,
    projection: Tensor,
    bias: Tensor,
    device: Device,
}

impl FakePatchEncoder {
    pub fn new(dim: usize, patch_size: usize) -> candle_core::Result<Self> {
        let device = Device::Cpu;
        let projection = Tensor::from_vec(seeded_values(0, 3 * dim), (3, dim), &device)?;
        let bias = Tensor::from_vec(seeded_values(1, dim), dim, &device)?;
        Ok(Self { dim, patch_size, projection, bias, device })
    }
}

fn seeded_values(stream: u64, n: usize) -> Vec<f32> {
    (0..n as u64)
        .map(|i| {
            let mut hasher = XxHash64::with_seed(stream);
            hasher.write_u64(i);
            let h = hasher.finish();
            ((h >> 32) as u32) as f32 / u32::MAX as f32 * 2.0 - 1.0
        })
        .collect()
}

impl PatchEncoder for FakePatchEncoder {
    fn hidden_size(&self) -> usize { self.dim }
    fn device(&self) -> &Device { &self.device }

    fn encode(&self, pixels: &Tensor) -> candle_core::Result<Tensor> {
        let pooled = pixels.avg_pool2d(self.patch_size)?;
        let (b, c, _, _) = pooled.dims4()?;
        let tokens = pooled.flatten_from(2)?.transpose(1, 2)?.contiguous()?;
        let projection = self.projection.broadcast_as((b, c, self.dim))?.contiguous()?;
        let patches = tokens.matmul(&projection)?.broadcast_add(&self.bias)?;
        let cls = Tensor::zeros((b, 1, self.dim), patches.dtype(), patches.device())?;
        Tensor::cat(&[&cls, &patches], 1)
    }
}
