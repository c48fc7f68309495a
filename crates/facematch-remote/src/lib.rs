//! facematch-remote — remote face-comparison provider.
//!
//! Sends both images to a hosted generative model and reads back a JSON
//! judgment (`match`, `similarityPercentage`, `reasoning`, optional
//! `confidence`). No local thresholding happens on this path.

pub mod gemini;
pub mod wire;

pub use gemini::{GeminiConfig, GeminiJudge, DEFAULT_ENDPOINT, DEFAULT_MODEL};
