//! Image pairs and their upload slots.

use crate::outcome::ComparisonOutcome;
use crate::types::ImageInput;
use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("unknown pair: {0}")]
    UnknownPair(String),
    #[error("not a readable image: {0}")]
    InvalidImage(#[from] image::ImageError),
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Which side of a pair an image goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPosition {
    First,
    Second,
}

/// Metadata of a successfully loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageHandle {
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

impl ImageHandle {
    /// Sniff the format and read the dimensions without decoding pixels.
    pub fn probe(bytes: &[u8]) -> Result<Self, SessionError> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let format = reader.format().ok_or(SessionError::UnsupportedFormat)?;
        let mime_type = mime_for(format).ok_or(SessionError::UnsupportedFormat)?;
        let (width, height) = reader.into_dimensions()?;
        Ok(Self {
            mime_type,
            width,
            height,
        })
    }
}

/// MIME types accepted for upload.
fn mime_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        _ => None,
    }
}

/// One upload slot of a pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub label: String,
    pub image: Option<ImageHandle>,
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,
    pub filename: Option<String>,
}

impl Slot {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            image: None,
            payload: None,
            filename: None,
        }
    }

    pub fn is_populated(&self) -> bool {
        self.image.is_some() && self.payload.is_some()
    }

    /// Validate and store an encoded image. The slot is left untouched on error.
    pub fn load(&mut self, bytes: Vec<u8>, filename: Option<String>) -> Result<(), SessionError> {
        let handle = ImageHandle::probe(&bytes)?;
        self.image = Some(handle);
        self.payload = Some(bytes);
        self.filename = filename;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.image = None;
        self.payload = None;
        self.filename = None;
    }

    /// The encoded image in the form providers consume.
    pub fn input(&self) -> Option<ImageInput> {
        match (&self.image, &self.payload) {
            (Some(handle), Some(bytes)) => Some(ImageInput {
                bytes: bytes.clone(),
                mime_type: handle.mime_type,
            }),
            _ => None,
        }
    }
}

/// Two slots compared against each other, plus the latest outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagePair {
    pub id: String,
    pub title: String,
    pub first: Slot,
    pub second: Slot,
    pub outcome: ComparisonOutcome,
}

impl ImagePair {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        first_label: impl Into<String>,
        second_label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            first: Slot::new(first_label),
            second: Slot::new(second_label),
            outcome: ComparisonOutcome::Pending,
        }
    }

    pub fn slot(&self, position: SlotPosition) -> &Slot {
        match position {
            SlotPosition::First => &self.first,
            SlotPosition::Second => &self.second,
        }
    }

    pub fn slot_mut(&mut self, position: SlotPosition) -> &mut Slot {
        match position {
            SlotPosition::First => &mut self.first,
            SlotPosition::Second => &mut self.second,
        }
    }

    /// Put an image into a slot. Any previous outcome is discarded.
    pub fn upload(
        &mut self,
        position: SlotPosition,
        bytes: Vec<u8>,
        filename: Option<String>,
    ) -> Result<(), SessionError> {
        self.slot_mut(position).load(bytes, filename)?;
        self.outcome = ComparisonOutcome::Pending;
        Ok(())
    }

    /// Clear both slots and the outcome.
    pub fn reset(&mut self) {
        self.first.clear();
        self.second.clear();
        self.outcome = ComparisonOutcome::Pending;
    }

    pub fn populated_slots(&self) -> usize {
        usize::from(self.first.is_populated()) + usize::from(self.second.is_populated())
    }

    pub fn is_complete(&self) -> bool {
        self.populated_slots() == 2
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// A small solid-colour PNG.
    pub fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 90, 60]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::test_images::png;
    use super::*;
    use crate::outcome::ScoredResult;

    fn scored() -> ComparisonOutcome {
        ComparisonOutcome::Scored(ScoredResult {
            similarity: 70.0,
            is_match: true,
            confidence: Some(90.0),
            distance: Some(0.3),
            reasoning: None,
        })
    }

    #[test]
    fn test_probe_png() {
        let handle = ImageHandle::probe(&png(4, 3)).unwrap();
        assert_eq!(handle.mime_type, "image/png");
        assert_eq!((handle.width, handle.height), (4, 3));
    }

    #[test]
    fn test_probe_rejects_garbage() {
        assert!(ImageHandle::probe(b"definitely not an image").is_err());
    }

    #[test]
    fn test_failed_load_leaves_slot_untouched() {
        let mut slot = Slot::new("Upload KYC");
        slot.load(png(2, 2), Some("a.png".into())).unwrap();
        assert!(slot.load(b"nope".to_vec(), Some("b.txt".into())).is_err());
        assert_eq!(slot.filename.as_deref(), Some("a.png"));
        assert!(slot.is_populated());
    }

    #[test]
    fn test_upload_resets_scored_outcome() {
        let mut pair = ImagePair::new("kyc-kyc", "KYC vs KYC", "Upload KYC", "Upload KYC");
        pair.upload(SlotPosition::First, png(2, 2), None).unwrap();
        pair.upload(SlotPosition::Second, png(2, 2), None).unwrap();
        pair.outcome = scored();

        pair.upload(SlotPosition::Second, png(3, 3), Some("new.png".into()))
            .unwrap();
        assert_eq!(pair.outcome, ComparisonOutcome::Pending);
        assert!(pair.is_complete());
    }

    #[test]
    fn test_failed_upload_keeps_outcome() {
        let mut pair = ImagePair::new("kyc-kyc", "KYC vs KYC", "Upload KYC", "Upload KYC");
        pair.outcome = scored();
        assert!(pair.upload(SlotPosition::First, vec![0, 1, 2], None).is_err());
        assert_eq!(pair.outcome, scored());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut pair = ImagePair::new("kyc-rtp", "KYC vs RTP", "Upload KYC", "Upload RTP");
        pair.upload(SlotPosition::First, png(2, 2), Some("kyc.png".into()))
            .unwrap();
        pair.upload(SlotPosition::Second, png(2, 2), None).unwrap();
        pair.outcome = scored();

        pair.reset();
        assert_eq!(pair.populated_slots(), 0);
        assert_eq!(pair.first.filename, None);
        assert_eq!(pair.outcome, ComparisonOutcome::Pending);
        // labels survive a reset
        assert_eq!(pair.second.label, "Upload RTP");
    }

    #[test]
    fn test_slot_input_carries_mime() {
        let mut slot = Slot::new("Upload RTP");
        assert!(slot.input().is_none());
        slot.load(png(2, 2), None).unwrap();
        let input = slot.input().unwrap();
        assert_eq!(input.mime_type, "image/png");
        assert!(!input.bytes.is_empty());
    }
}
