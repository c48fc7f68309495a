//! facematch-vision — embedded face-analysis provider.
//!
//! Runs pretrained SCRFD (detection) and ArcFace (recognition) models via
//! ONNX Runtime on a dedicated thread and exposes them as a
//! [`facematch_core::FaceAnalyzer`].

pub mod detector;
pub mod engine;
pub mod recognizer;

pub use engine::{spawn_engine, spawn_onnx_engine, EngineError, EngineHandle, FacePipeline};

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL: &str = "w600k_r50.onnx";
