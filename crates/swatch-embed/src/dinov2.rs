//! DINOv2 vision transformer reading Hugging Face `Dinov2Model` checkpoints
//! (`facebook/dinov2-*`). Only the forward pass to the final layer-normed
//! hidden states is implemented; there is no pooler or classification head.
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{conv2d, layer_norm, linear, Conv2d, Conv2dConfig, LayerNorm, Linear, VarBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::PatchEncoder;

fn default_mlp_ratio() -> f64 { 4.0 }
fn default_layer_norm_eps() -> f64 { 1e-6 }
fn default_num_channels() -> usize { 3 }

#[derive(Debug, Clone, Deserialize)]
pub struct Dinov2Config {
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    #[serde(default = "default_mlp_ratio")]
    pub mlp_ratio: f64,
    pub patch_size: usize,
    pub image_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    #[serde(default = "default_num_channels")]
    pub num_channels: usize,
}

impl Dinov2Config {
    fn intermediate_size(&self) -> usize { (self.hidden_size as f64 * self.mlp_ratio) as usize }
    fn checkpoint_grid(&self) -> usize { self.image_size / self.patch_size }
}

struct PatchEmbeddings { projection: Conv2d }

impl PatchEmbeddings {
    fn new(cfg: &Dinov2Config, vb: VarBuilder) -> candle_core::Result<Self> {
        let conv_cfg = Conv2dConfig { stride: cfg.patch_size, ..Default::default() };
        let projection = conv2d(cfg.num_channels, cfg.hidden_size, cfg.patch_size, conv_cfg, vb.pp("projection"))?;
        Ok(Self { projection })
    }

    /// `[B, C, H, W]` -> `[B, P, D]`
    fn forward(&self, pixels: &Tensor) -> candle_core::Result<Tensor> {
        self.projection.forward(pixels)?.flatten_from(2)?.transpose(1, 2)?.contiguous()
    }
}

struct Embeddings {
    cls_token: Tensor,
    position_embeddings: Tensor,
    patch_embeddings: PatchEmbeddings,
}

impl Embeddings {
    fn new(cfg: &Dinov2Config, input_grid: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let d = cfg.hidden_size;
        let ckpt_grid = cfg.checkpoint_grid();
        let cls_token = vb.get((1, 1, d), "cls_token")?;
        let pos = vb.get((1, 1 + ckpt_grid * ckpt_grid, d), "position_embeddings")?;
        let position_embeddings = if ckpt_grid == input_grid {
            pos
        } else {
            let cls_pos = pos.narrow(1, 0, 1)?;
            let grid: Vec<f32> = pos.narrow(1, 1, ckpt_grid * ckpt_grid)?.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
            let resampled = resample_grid_bicubic(&grid, (ckpt_grid, ckpt_grid), d, (input_grid, input_grid));
            let patch_pos = Tensor::from_vec(resampled, (1, input_grid * input_grid, d), pos.device())?.to_dtype(pos.dtype())?;
            Tensor::cat(&[&cls_pos, &patch_pos], 1)?
        };
        let patch_embeddings = PatchEmbeddings::new(cfg, vb.pp("patch_embeddings"))?;
        Ok(Self { cls_token, position_embeddings, patch_embeddings })
    }

    fn forward(&self, pixels: &Tensor) -> candle_core::Result<Tensor> {
        let patches = self.patch_embeddings.forward(pixels)?;
        let (b, p, d) = patches.dims3()?;
        let expected = self.position_embeddings.dim(1)? - 1;
        if p != expected {
            return Err(candle_core::Error::Msg(format!("input yields {p} patches, encoder was built for {expected}")));
        }
        let cls = self.cls_token.broadcast_as((b, 1, d))?.contiguous()?;
        Tensor::cat(&[&cls, &patches], 1)?.broadcast_add(&self.position_embeddings)
    }
}

struct Attention {
    query: Linear,
    key: Linear,
    value: Linear,
    dense: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl Attention {
    fn new(cfg: &Dinov2Config, vb: VarBuilder) -> candle_core::Result<Self> {
        let d = cfg.hidden_size;
        let head_dim = d / cfg.num_attention_heads;
        let inner = vb.pp("attention");
        Ok(Self {
            query: linear(d, d, inner.pp("query"))?,
            key: linear(d, d, inner.pp("key"))?,
            value: linear(d, d, inner.pp("value"))?,
            dense: linear(d, d, vb.pp("output").pp("dense"))?,
            num_heads: cfg.num_attention_heads,
            head_dim,
            scale: 1.0 / (head_dim as f64).sqrt(),
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (b, t, d) = xs.dims3()?;
        let heads = |l: &Linear| -> candle_core::Result<Tensor> {
            l.forward(xs)?.reshape((b, t, self.num_heads, self.head_dim))?.transpose(1, 2)?.contiguous()
        };
        let (q, k, v) = (heads(&self.query)?, heads(&self.key)?, heads(&self.value)?);
        let attn = (q.matmul(&k.t()?)? * self.scale)?;
        let attn = candle_nn::ops::softmax_last_dim(&attn)?;
        let out = attn.matmul(&v)?.transpose(1, 2)?.reshape((b, t, d))?;
        self.dense.forward(&out)
    }
}

struct Mlp { fc1: Linear, fc2: Linear }

impl Mlp {
    fn new(cfg: &Dinov2Config, vb: VarBuilder) -> candle_core::Result<Self> {
        let hidden = cfg.intermediate_size();
        Ok(Self { fc1: linear(cfg.hidden_size, hidden, vb.pp("fc1"))?, fc2: linear(hidden, cfg.hidden_size, vb.pp("fc2"))? })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.fc2.forward(&self.fc1.forward(xs)?.gelu_erf()?)
    }
}

struct Layer {
    norm1: LayerNorm,
    attention: Attention,
    layer_scale1: Tensor,
    norm2: LayerNorm,
    mlp: Mlp,
    layer_scale2: Tensor,
}

impl Layer {
    fn new(cfg: &Dinov2Config, vb: VarBuilder) -> candle_core::Result<Self> {
        let d = cfg.hidden_size;
        Ok(Self {
            norm1: layer_norm(d, cfg.layer_norm_eps, vb.pp("norm1"))?,
            attention: Attention::new(cfg, vb.pp("attention"))?,
            layer_scale1: vb.pp("layer_scale1").get(d, "lambda1")?,
            norm2: layer_norm(d, cfg.layer_norm_eps, vb.pp("norm2"))?,
            mlp: Mlp::new(cfg, vb.pp("mlp"))?,
            layer_scale2: vb.pp("layer_scale2").get(d, "lambda1")?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let attn = self.attention.forward(&self.norm1.forward(xs)?)?.broadcast_mul(&self.layer_scale1)?;
        let xs = (xs + attn)?;
        let mlp = self.mlp.forward(&self.norm2.forward(&xs)?)?.broadcast_mul(&self.layer_scale2)?;
        xs + mlp
    }
}

pub struct Dinov2Encoder {
    embeddings: Embeddings,
    layers: Vec<Layer>,
    layernorm: LayerNorm,
    hidden_size: usize,
    device: Device,
}

impl Dinov2Encoder {
    /// Build the encoder for square inputs of `input_size` pixels.
    pub fn new(cfg: &Dinov2Config, input_size: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let input_grid = input_size / cfg.patch_size;
        let embeddings = Embeddings::new(cfg, input_grid, vb.pp("embeddings"))?;
        let layers = (0..cfg.num_hidden_layers)
            .map(|i| Layer::new(cfg, vb.pp("encoder").pp("layer").pp(i.to_string())))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let layernorm = layer_norm(cfg.hidden_size, cfg.layer_norm_eps, vb.pp("layernorm"))?;
        Ok(Self { embeddings, layers, layernorm, hidden_size: cfg.hidden_size, device: vb.device().clone() })
    }

    /// Load `config.json` plus `model.safetensors` (or `pytorch_model.bin`) from `model_dir`.
    pub fn load(model_dir: &Path, input_size: usize, device: &Device) -> Result<Self> {
        info!(dir = %model_dir.display(), "loading DINOv2 checkpoint");
        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?;
        let cfg: Dinov2Config = serde_json::from_str(&raw).with_context(|| format!("parsing {}", config_path.display()))?;

        let safetensors = model_dir.join("model.safetensors");
        let pickle = model_dir.join("pytorch_model.bin");
        let vb = if safetensors.exists() {
            let bytes = std::fs::read(&safetensors).with_context(|| format!("reading {}", safetensors.display()))?;
            VarBuilder::from_buffered_safetensors(bytes, DType::F32, device)?
        } else if pickle.exists() {
            let weights = candle_core::pickle::read_all(&pickle)?;
            let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
            VarBuilder::from_tensors(weights_map, DType::F32, device)
        } else {
            return Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()));
        };
        let encoder = Self::new(&cfg, input_size, vb)?;
        info!(hidden_size = cfg.hidden_size, layers = cfg.num_hidden_layers, "DINOv2 loaded");
        Ok(encoder)
    }
}

impl PatchEncoder for Dinov2Encoder {
    fn hidden_size(&self) -> usize { self.hidden_size }
    fn device(&self) -> &Device { &self.device }

    fn encode(&self, pixels: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = self.embeddings.forward(pixels)?;
        for layer in &self.layers { xs = layer.forward(&xs)?; }
        self.layernorm.forward(&xs)
    }
}

const CUBIC_A: f32 = -0.75;

fn cubic_near(x: f32) -> f32 { ((CUBIC_A + 2.0) * x - (CUBIC_A + 3.0)) * x * x + 1.0 }
fn cubic_far(x: f32) -> f32 { ((CUBIC_A * x - 5.0 * CUBIC_A) * x + 8.0 * CUBIC_A) * x - 4.0 * CUBIC_A }

fn cubic_taps(dst: usize, in_len: usize, out_len: usize) -> [(usize, f32); 4] {
    let scale = in_len as f32 / out_len as f32;
    let src = (dst as f32 + 0.5) * scale - 0.5;
    let base = src.floor();
    let t = src - base;
    let weights = [cubic_far(t + 1.0), cubic_near(t), cubic_near(1.0 - t), cubic_far(2.0 - t)];
    let mut taps = [(0usize, 0f32); 4];
    for (k, w) in weights.into_iter().enumerate() {
        let idx = (base as isize - 1 + k as isize).clamp(0, in_len as isize - 1) as usize;
        taps[k] = (idx, w);
    }
    taps
}

/// Bicubic resize of a row-major `[h, w, d]` grid (align-corners off, A = -0.75).
pub(crate) fn resample_grid_bicubic(src: &[f32], (h_in, w_in): (usize, usize), d: usize, (h_out, w_out): (usize, usize)) -> Vec<f32> {
    let mut out = vec![0f32; h_out * w_out * d];
    for oy in 0..h_out {
        let ytaps = cubic_taps(oy, h_in, h_out);
        for ox in 0..w_out {
            let xtaps = cubic_taps(ox, w_in, w_out);
            let dst = &mut out[(oy * w_out + ox) * d..(oy * w_out + ox + 1) * d];
            for &(iy, wy) in &ytaps {
                for &(ix, wx) in &xtaps {
                    let w = wy * wx;
                    let cell = &src[(iy * w_in + ix) * d..(iy * w_in + ix + 1) * d];
                    for (o, s) in dst.iter_mut().zip(cell) { *o += w * s; }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    #[test]
    fn resample_same_size_is_identity() {
        let grid: Vec<f32> = (0..3 * 3 * 2).map(|x| x as f32).collect();
        let out = resample_grid_bicubic(&grid, (3, 3), 2, (3, 3));
        for (a, b) in grid.iter().zip(&out) { assert!((a - b).abs() < 1e-5, "{a} vs {b}"); }
    }

    #[test]
    fn resample_constant_grid_stays_constant() {
        let grid = vec![0.25f32; 4 * 4];
        let out = resample_grid_bicubic(&grid, (4, 4), 1, (2, 2));
        assert_eq!(out.len(), 4);
        for v in out { assert!((v - 0.25).abs() < 1e-6); }
    }

    #[test]
    fn tiny_encoder_emits_class_plus_patch_tokens() {
        let cfg = Dinov2Config {
            hidden_size: 8,
            num_hidden_layers: 2,
            num_attention_heads: 2,
            mlp_ratio: 4.0,
            patch_size: 4,
            image_size: 16,
            layer_norm_eps: 1e-6,
            num_channels: 3,
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        // Input grid (8/4 = 2) differs from the checkpoint grid (16/4 = 4) to exercise resampling.
        let encoder = Dinov2Encoder::new(&cfg, 8, vb).unwrap();
        let pixels = Tensor::zeros((1, 3, 8, 8), DType::F32, &Device::Cpu).unwrap();
        let hidden = encoder.encode(&pixels).unwrap();
        assert_eq!(hidden.dims(), &[1, 1 + 4, 8]);
    }
}
