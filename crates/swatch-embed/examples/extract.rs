use swatch_core::config::Config;
use swatch_embed::{decode_image, load_extractor};

fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).ok_or_else(|| anyhow::anyhow!("usage: extract <image>"))?;
    let settings = Config::load()?.settings()?;
    let extractor = load_extractor(&settings.model, settings.index.dim)?;
    let image = decode_image(&std::fs::read(&path)?)?;
    let (vector, color) = extractor.extract(&image)?;
    println!("dim={} norm={:.6} color=({}, {}, {})", vector.dim(), vector.norm(), color.r, color.g, color.b);
    Ok(())
}
