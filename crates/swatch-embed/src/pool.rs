use anyhow::{bail, Result};
use candle_core::{DType, Tensor};

/// Average the patch tokens of `[B, 1 + P, H]` hidden states, skipping the
/// leading class token, then L2-normalize each row. Returns `[B, H]`.
pub fn patch_mean_l2(hidden: &Tensor) -> Result<Tensor> {
    let (batch, tokens, hidden_dim) = hidden.dims3()?;
    if tokens < 2 { bail!("expected a class token plus at least one patch token, got {tokens} tokens"); }

    let patches = hidden.narrow(1, 1, tokens - 1)?;
    let mut mean = patches.mean(1)?;
    let eps_val = match hidden.dtype() { DType::F16 | DType::BF16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(0)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.broadcast_add(&eps)?;
    mean = mean.broadcast_div(&norm)?;
    debug_assert_eq!(mean.dims(), &[batch, hidden_dim]);
    Ok(mean)
}
