use thiserror::Error;

use crate::types::CatalogId;

/// Failure taxonomy shared by every stage of the retrieval pipeline.
///
/// None of these collapse into an empty result: "no results" is reserved for
/// a pipeline that ran to completion and got zero candidates back.
#[derive(Debug, Error)]
pub enum Error {
    /// Upload could not be decoded or has zero area.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Unknown catalog identifier.
    #[error("Catalog item {0} not found")]
    NotFound(CatalogId),

    /// Model or index backend could not serve the request.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Operator or programmer error, e.g. a rerank weight outside [0, 1].
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl Error {
    pub fn unavailable(e: impl std::fmt::Display) -> Self { Self::Unavailable(e.to_string()) }
    pub fn invalid_image(e: impl std::fmt::Display) -> Self { Self::InvalidImage(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, Error>;
