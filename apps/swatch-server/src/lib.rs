//! HTTP surface and startup wiring for catalog similarity search.
use actix_multipart::{Field, Multipart};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use bytes::BytesMut;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use swatch_core::config::{expand_path, IndexBackend, IndexSettings, Settings};
use swatch_core::traits::SimilarityIndex;
use swatch_core::types::{CatalogId, SearchOutcome, SimilarProduct};
use swatch_core::Error;
use swatch_embed::{load_extractor, InferencePool};
use swatch_hybrid::{QueryOptions, QueryOrchestrator};
use swatch_index::{LanceCatalogIndex, MemoryIndex};

pub const NO_RESULTS_MESSAGE: &str = "No similar products found";

pub struct AppState {
    pub orchestrator: QueryOrchestrator,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(orchestrator: QueryOrchestrator, max_upload_bytes: usize) -> Self { Self { orchestrator, max_upload_bytes } }
}

/// Body of every successful search response.
#[derive(Debug, Serialize)]
pub struct SimilarResponse {
    pub similar_products: Vec<SimilarProduct>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl From<SearchOutcome> for SimilarResponse {
    fn from(outcome: SearchOutcome) -> Self {
        match outcome {
            SearchOutcome::Found(similar_products) => Self { similar_products, message: None },
            SearchOutcome::NoResults => Self { similar_products: Vec::new(), message: Some(NO_RESULTS_MESSAGE) },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No file part in the request")]
    MissingFile,
    #[error("Empty file uploaded")]
    EmptyFile,
    #[error("Upload exceeds {0} bytes")]
    TooLarge(usize),
    #[error("Malformed upload: {0}")]
    Multipart(String),
    #[error(transparent)]
    Search(#[from] Error),
}

#[derive(Serialize)]
struct MessageBody { message: String }

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::EmptyFile | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Search(Error::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            ApiError::Search(Error::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Search(Error::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Search(Error::Configuration(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Search(Error::NotFound(_)) => "Product not found".to_string(),
            ApiError::Search(Error::InvalidImage(e)) => format!("Invalid image: {e}"),
            // Backend detail stays in the log.
            ApiError::Search(e @ Error::Unavailable(_)) => {
                warn!(error = %e, "search backend unavailable");
                "Similarity search is temporarily unavailable".to_string()
            }
            ApiError::Search(e @ Error::Configuration(_)) => {
                warn!(error = %e, "search misconfigured");
                "Server misconfigured".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(MessageBody { message })
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/upload", web::post().to(upload))
        .route("/get_similar/{id}", web::get().to(get_similar));
}

async fn index() -> HttpResponse { HttpResponse::Ok().content_type("text/plain").body("swatch-server") }

async fn upload(state: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let image = read_file_field(payload, state.max_upload_bytes).await?;
    let outcome = state.orchestrator.search_by_image(image).await?;
    Ok(HttpResponse::Ok().json(SimilarResponse::from(outcome)))
}

async fn get_similar(state: web::Data<AppState>, id: web::Path<CatalogId>) -> Result<HttpResponse, ApiError> {
    let outcome = state.orchestrator.search_by_id(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SimilarResponse::from(outcome)))
}

/// Pull the `file` field out of a multipart form, enforcing the size cap.
async fn read_file_field(mut payload: Multipart, max_bytes: usize) -> Result<bytes::Bytes, ApiError> {
    while let Some(field) = payload.next().await {
        let field = field.map_err(|e| ApiError::Multipart(e.to_string()))?;
        if field.name() != Some("file") {
            drain(field).await?;
            continue;
        }
        let named = field.content_disposition().and_then(|cd| cd.get_filename()).is_some_and(|name| !name.is_empty());
        let data = collect(field, max_bytes).await?;
        if !named || data.is_empty() {
            return Err(ApiError::EmptyFile);
        }
        return Ok(data);
    }
    Err(ApiError::MissingFile)
}

async fn collect(mut field: Field, max_bytes: usize) -> Result<bytes::Bytes, ApiError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| ApiError::Multipart(e.to_string()))?;
        if buf.len() + chunk.len() > max_bytes {
            return Err(ApiError::TooLarge(max_bytes));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

async fn drain(mut field: Field) -> Result<(), ApiError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| ApiError::Multipart(e.to_string()))?;
    }
    Ok(())
}

/// Open the configured catalog index.
pub async fn open_index(settings: &IndexSettings) -> swatch_core::Result<Arc<dyn SimilarityIndex>> {
    match settings.backend {
        IndexBackend::Lance => {
            let uri = expand_path(&settings.uri);
            let index = LanceCatalogIndex::connect(&uri.to_string_lossy(), &settings.table, settings.dim).await?;
            info!(uri = %uri.display(), table = %settings.table, dim = settings.dim, "lance catalog index opened");
            Ok(Arc::new(index))
        }
        IndexBackend::Memory => {
            let index = match &settings.seed_file {
                Some(path) => MemoryIndex::from_json_file(&expand_path(path), settings.dim)?,
                None => MemoryIndex::new(settings.dim),
            };
            info!(items = index.len(), dim = settings.dim, "in-memory catalog index ready");
            Ok(Arc::new(index))
        }
    }
}

/// Build the process-wide orchestrator: index, extractor and inference pool.
pub async fn build_orchestrator(settings: &Settings) -> anyhow::Result<QueryOrchestrator> {
    let index = open_index(&settings.index).await?;
    let extractor = load_extractor(&settings.model, settings.index.dim)?;
    let pool = InferencePool::new(extractor, settings.inference.workers)?;
    Ok(QueryOrchestrator::new(pool, index, QueryOptions::from(&settings.query))?)
}

/// Install the `tracing` subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
