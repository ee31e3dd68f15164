use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use swatch_core::config::{expand_path, Config, Settings};
use swatch_core::types::CatalogItem;
use swatch_index::CatalogWriter;
use swatch_server::{build_orchestrator, init_tracing, SimilarResponse};

/// Run one similarity query against the configured catalog and print the JSON response.
#[derive(Parser, Debug)]
#[command(name = "swatch-query")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Products similar to an existing catalog item
    Id { id: u64 },
    /// Products similar to an image on disk
    Image { path: PathBuf },
    /// Upsert a JSON array of catalog items into the configured Lance table
    Import { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Config::load()?.settings()?;

    let outcome = match cli.command {
        Command::Import { path } => return import(&settings, &path).await,
        Command::Id { id } => build_orchestrator(&settings).await?.search_by_id(id).await?,
        Command::Image { path } => build_orchestrator(&settings).await?.search_by_image(std::fs::read(&path)?.into()).await?,
    };
    println!("{}", serde_json::to_string_pretty(&SimilarResponse::from(outcome))?);
    Ok(())
}

async fn import(settings: &Settings, path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)?;
    let items: Vec<CatalogItem> = serde_json::from_str(&raw)?;
    let uri = expand_path(&settings.index.uri);
    let writer = CatalogWriter::new(&uri.to_string_lossy(), &settings.index.table, settings.index.dim).await?;
    let written = writer.upsert(&items).await?;
    println!("{}", serde_json::json!({ "imported": written, "table": settings.index.table }));
    Ok(())
}
