use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::Semaphore;

use swatch_core::traits::FeatureExtractor;
use swatch_core::types::{ColorDescriptor, FeatureVector};
use swatch_core::{Error, Result};

use crate::preprocess::decode_image;

/// Runs decode + extraction on the blocking thread pool, with at most
/// `workers` inferences in flight. Cheap to clone; clones share the permits.
#[derive(Clone)]
pub struct InferencePool {
    extractor: Arc<dyn FeatureExtractor>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl InferencePool {
    pub fn new(extractor: Arc<dyn FeatureExtractor>, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Configuration("inference pool needs at least one worker".into()));
        }
        Ok(Self { extractor, permits: Arc::new(Semaphore::new(workers)), workers })
    }

    pub fn dim(&self) -> usize { self.extractor.dim() }
    pub fn workers(&self) -> usize { self.workers }

    /// The permit travels with the blocking task, so a dropped caller does not
    /// free a slot while its inference is still running.
    pub async fn extract_bytes(&self, bytes: Bytes) -> Result<(FeatureVector, ColorDescriptor)> {
        let permit = Arc::clone(&self.permits).acquire_owned().await.map_err(Error::unavailable)?;
        let extractor = Arc::clone(&self.extractor);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let image = decode_image(&bytes)?;
            extractor.extract(&image)
        })
        .await
        .map_err(|e| Error::Unavailable(format!("inference task failed: {e}")))?
    }
}
