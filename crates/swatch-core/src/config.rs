//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Nested keys use a double underscore in the environment, e.g.
//! `APP_QUERY__ALPHA=0.9` overrides `[query] alpha`.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate every section. Missing sections fall back to defaults.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(self.figment.clone())
            .extract()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub index: IndexSettings,
    pub query: QuerySettings,
    pub inference: InferenceSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.server.max_upload_bytes == 0 {
            return Err(Error::Configuration("server.max_upload_bytes must be positive".into()));
        }
        if self.model.max_image_size == 0 || self.model.crop_size == 0 || self.model.resize_shortest_edge < self.model.crop_size {
            return Err(Error::Configuration(format!(
                "model sizes invalid: max_image_size={} resize_shortest_edge={} crop_size={}",
                self.model.max_image_size, self.model.resize_shortest_edge, self.model.crop_size
            )));
        }
        if self.index.dim == 0 {
            return Err(Error::Configuration("index.dim must be positive".into()));
        }
        if self.inference.workers == 0 {
            return Err(Error::Configuration("inference.workers must be positive".into()));
        }
        if self.query.limit == 0 {
            return Err(Error::Configuration("query.limit must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.query.alpha) {
            return Err(Error::Configuration(format!("query.alpha must be within [0, 1], got {}", self.query.alpha)));
        }
        if let Some(t) = self.query.score_threshold {
            if !t.is_finite() {
                return Err(Error::Configuration("query.score_threshold must be finite".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self { Self { host: "127.0.0.1".into(), port: 5000, max_upload_bytes: 10 * 1024 * 1024 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub dir: String,
    pub fake: bool,
    pub max_image_size: u32,
    pub resize_shortest_edge: u32,
    pub crop_size: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { dir: "models/dinov2-base".into(), fake: false, max_image_size: 224, resize_shortest_edge: 256, crop_size: 224 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Lance,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    pub uri: String,
    pub table: String,
    pub dim: usize,
    pub seed_file: Option<String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { backend: IndexBackend::Lance, uri: "data/catalog.lance".into(), table: "catalog".into(), dim: 768, seed_file: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub limit: usize,
    pub alpha: f32,
    pub score_threshold: Option<f32>,
}

impl Default for QuerySettings {
    fn default() -> Self { Self { limit: 10, alpha: 0.85, score_threshold: None } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub workers: usize,
}

impl Default for InferenceSettings {
    fn default() -> Self { Self { workers: 2 } }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
