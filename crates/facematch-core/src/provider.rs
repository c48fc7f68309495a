//! Seams to the external face-analysis providers.

use crate::types::{FaceAnalysis, ImageInput, Judgment};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Default minimum detection confidence for the embedded model.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("image could not be decoded: {0}")]
    Decode(String),
    #[error("model inference failed: {0}")]
    Inference(String),
    #[error("analysis engine unavailable")]
    Unavailable,
}

#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response could not be parsed: {0}")]
    Parse(String),
    #[error("provider response had no content")]
    EmptyResponse,
}

/// Provider A: an embedded face model analysed one image at a time.
#[async_trait]
pub trait FaceAnalyzer: Send + Sync {
    /// Detect the most prominent face and compute its descriptor.
    ///
    /// Returns `Ok(None)` when no face scores at least `min_confidence`.
    async fn analyze(
        &self,
        image: &ImageInput,
        min_confidence: f32,
    ) -> Result<Option<FaceAnalysis>, AnalyzerError>;
}

/// Provider B: a remote model that judges a pair of images directly.
#[async_trait]
pub trait FaceJudge: Send + Sync {
    async fn judge(&self, first: &ImageInput, second: &ImageInput) -> Result<Judgment, JudgeError>;
}

/// The provider a comparison pass runs against. One pass never mixes both.
#[derive(Clone)]
pub enum Provider {
    Embedded(Arc<dyn FaceAnalyzer>),
    Remote(Arc<dyn FaceJudge>),
}

impl Provider {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Embedded(_) => "embedded",
            Self::Remote(_) => "remote",
        }
    }
}
