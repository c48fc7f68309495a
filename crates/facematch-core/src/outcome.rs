use serde::{Deserialize, Serialize};

/// Inline message shown for a pair with only one image.
pub const MSG_IMAGE_MISSING: &str = "Image Missing";
/// Inline message shown when a provider finds no face.
pub const MSG_FACE_NOT_DETECTED: &str = "Face not detected";

/// Scores for a compared pair. Only exists inside [`ComparisonOutcome::Scored`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    /// Similarity percentage, always within [0, 100].
    pub similarity: f64,
    #[serde(rename = "match")]
    pub is_match: bool,
    /// Confidence percentage. The remote provider may omit it.
    pub confidence: Option<f64>,
    /// Raw descriptor distance (embedded-model path only).
    pub distance: Option<f64>,
    /// Free-text explanation (remote path only).
    pub reasoning: Option<String>,
}

/// Where a pair stands in the comparison lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    /// No result yet.
    #[default]
    Pending,
    /// Only one image present.
    Incomplete,
    /// No face found in one or both images.
    DetectionFailed,
    Scored(ScoredResult),
    ProviderError { message: String },
}

impl ComparisonOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn scored(&self) -> Option<&ScoredResult> {
        match self {
            Self::Scored(result) => Some(result),
            _ => None,
        }
    }

    /// Inline error message for the three recoverable failure states.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Incomplete => Some(MSG_IMAGE_MISSING),
            Self::DetectionFailed => Some(MSG_FACE_NOT_DETECTED),
            Self::ProviderError { message } => Some(message),
            Self::Pending | Self::Scored(_) => None,
        }
    }
}
