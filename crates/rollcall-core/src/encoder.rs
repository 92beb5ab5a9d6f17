//! Face encoding seam: locate faces in an image and embed each of them.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("encoder backend: {0}")]
    Backend(String),
}

/// A face found in an image together with its embedding.
#[derive(Debug, Clone)]
pub struct FaceEncoding {
    pub face: BoundingBox,
    pub embedding: Embedding,
}

/// Detection plus embedding, as one unit the rest of the tool depends on.
pub trait FaceEncoder {
    /// Face regions in `image`, highest confidence first.
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError>;

    /// Embedding for one region returned by [`locate`](Self::locate).
    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EncoderError>;

    /// Locate every face and embed each one.
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<FaceEncoding>, EncoderError> {
        let faces = self.locate(image)?;
        faces
            .into_iter()
            .map(|face| {
                let embedding = self.embed(image, &face)?;
                Ok(FaceEncoding { face, embedding })
            })
            .collect()
    }
}

/// SCRFD + ArcFace running on ONNX Runtime.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path, detection_threshold: f32) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?
            .with_score_threshold(detection_threshold);
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        tracing::info!(dir = %model_dir.display(), detection_threshold, "face encoder ready");
        Ok(Self { detector, recognizer })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
        Ok(self.detector.detect(image)?)
    }

    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EncoderError> {
        Ok(self.recognizer.extract(image, face)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// One face per bright pixel column band; embedding is the pixel colour.
    struct StripeEncoder;

    impl FaceEncoder for StripeEncoder {
        fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
            Ok((0..image.width())
                .filter(|&x| image.get_pixel(x, 0)[0] > 0)
                .map(|x| BoundingBox {
                    x: x as f32, y: 0.0, width: 1.0, height: 1.0,
                    confidence: 1.0, landmarks: None,
                })
                .collect())
        }

        fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EncoderError> {
            let px = image.get_pixel(face.x as u32, 0);
            Ok(Embedding::new(px.0.iter().map(|&c| c as f32).collect()))
        }
    }

    #[test]
    fn test_encode_pairs_each_face_with_embedding() {
        let mut image = RgbImage::new(4, 1);
        image.put_pixel(1, 0, Rgb([10, 20, 30]));
        image.put_pixel(3, 0, Rgb([40, 50, 60]));

        let encodings = StripeEncoder.encode(&image).unwrap();
        assert_eq!(encodings.len(), 2);
        assert_eq!(encodings[0].face.x, 1.0);
        assert_eq!(encodings[0].embedding.values, vec![10.0, 20.0, 30.0]);
        assert_eq!(encodings[1].embedding.values, vec![40.0, 50.0, 60.0]);
    }

    #[test]
    fn test_encode_no_faces() {
        let image = RgbImage::new(4, 1);
        assert!(StripeEncoder.encode(&image).unwrap().is_empty());
    }

    #[test]
    fn test_onnx_encoder_missing_models() {
        let dir = std::env::temp_dir().join("rollcall-no-models-here");
        let err = OnnxFaceEncoder::load(&dir, 0.5).err().unwrap();
        assert!(matches!(err, EncoderError::Detector(DetectorError::ModelNotFound(_))));
    }
}
