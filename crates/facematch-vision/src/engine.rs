//! Dedicated inference thread for the embedded provider.
//!
//! ONNX sessions need `&mut` access, so the models live on one OS thread
//! and async callers talk to it through a channel.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use async_trait::async_trait;
use facematch_core::provider::{AnalyzerError, FaceAnalyzer};
use facematch_core::{FaceAnalysis, ImageInput};
use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("failed to start engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl From<EngineError> for AnalyzerError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Decode(e) => AnalyzerError::Decode(e.to_string()),
            EngineError::ChannelClosed | EngineError::Spawn(_) => AnalyzerError::Unavailable,
            other => AnalyzerError::Inference(other.to_string()),
        }
    }
}

/// Detection + description of a single decoded image.
pub trait FacePipeline: Send + 'static {
    /// Analyse the most confident face, or `None` when nothing reaches
    /// `min_confidence`.
    fn analyze(
        &mut self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Option<FaceAnalysis>, EngineError>;
}

/// SCRFD + ArcFace.
pub struct OnnxPipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxPipeline {
    pub fn load(detector_path: &str, recognizer_path: &str) -> Result<Self, EngineError> {
        let detector = FaceDetector::load(detector_path)?;
        let recognizer = FaceRecognizer::load(recognizer_path)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FacePipeline for OnnxPipeline {
    fn analyze(
        &mut self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Option<FaceAnalysis>, EngineError> {
        let faces = self.detector.detect(image, min_confidence)?;
        let Some(face) = faces.first() else {
            return Ok(None);
        };
        tracing::debug!(
            faces = faces.len(),
            confidence = face.confidence,
            "face selected"
        );
        let descriptor = self.recognizer.extract(image, face)?;
        Ok(Some(FaceAnalysis {
            descriptor,
            confidence: face.confidence,
        }))
    }
}

struct AnalyzeRequest {
    bytes: Vec<u8>,
    min_confidence: f32,
    reply: oneshot::Sender<Result<Option<FaceAnalysis>, EngineError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<AnalyzeRequest>,
}

impl EngineHandle {
    pub async fn analyze_bytes(
        &self,
        bytes: Vec<u8>,
        min_confidence: f32,
    ) -> Result<Option<FaceAnalysis>, EngineError> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(AnalyzeRequest {
                bytes,
                min_confidence,
                reply,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

#[async_trait]
impl FaceAnalyzer for EngineHandle {
    async fn analyze(
        &self,
        image: &ImageInput,
        min_confidence: f32,
    ) -> Result<Option<FaceAnalysis>, AnalyzerError> {
        Ok(self.analyze_bytes(image.bytes.clone(), min_confidence).await?)
    }
}

/// Load the ONNX models (fail-fast) and start the engine thread.
pub fn spawn_onnx_engine(
    detector_path: &str,
    recognizer_path: &str,
) -> Result<EngineHandle, EngineError> {
    let pipeline = OnnxPipeline::load(detector_path, recognizer_path)?;
    tracing::info!(
        detector = detector_path,
        recognizer = recognizer_path,
        "embedded models loaded"
    );
    spawn_engine(pipeline)
}

/// Move `pipeline` onto a named OS thread and serve requests until every
/// handle is dropped.
pub fn spawn_engine<P: FacePipeline>(mut pipeline: P) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<AnalyzeRequest>(4);

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                let result = image::load_from_memory(&req.bytes)
                    .map_err(EngineError::from)
                    .and_then(|img| pipeline.analyze(&img.to_rgb8(), req.min_confidence));
                let _ = req.reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::Descriptor;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    /// Reports a face only for images wider than they are tall.
    struct WideOnly;

    impl FacePipeline for WideOnly {
        fn analyze(
            &mut self,
            image: &RgbImage,
            min_confidence: f32,
        ) -> Result<Option<FaceAnalysis>, EngineError> {
            if image.width() <= image.height() || min_confidence > 0.95 {
                return Ok(None);
            }
            Ok(Some(FaceAnalysis {
                descriptor: Descriptor::new(vec![image.width() as f32, 0.0]),
                confidence: 0.95,
            }))
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([1, 2, 3]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn input(bytes: Vec<u8>) -> ImageInput {
        ImageInput {
            bytes,
            mime_type: "image/png",
        }
    }

    #[tokio::test]
    async fn test_engine_round_trip() {
        let handle = spawn_engine(WideOnly).unwrap();

        let found = handle.analyze(&input(png(8, 4)), 0.5).await.unwrap();
        assert_eq!(found.unwrap().descriptor.values, vec![8.0, 0.0]);

        let none = handle.analyze(&input(png(4, 8)), 0.5).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_engine_honours_min_confidence() {
        let handle = spawn_engine(WideOnly).unwrap();
        let none = handle.analyze(&input(png(8, 4)), 0.99).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_engine_decode_error() {
        let handle = spawn_engine(WideOnly).unwrap();
        let err = handle
            .analyze(&input(b"not an image".to_vec()), 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Decode(_)));
    }

    #[test]
    fn test_missing_models_fail_fast() {
        let err = spawn_onnx_engine("/nonexistent/det.onnx", "/nonexistent/rec.onnx")
            .err()
            .unwrap();
        assert!(matches!(
            err,
            EngineError::Detector(DetectorError::ModelNotFound(_))
        ));
    }
}
