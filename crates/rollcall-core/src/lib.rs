//! rollcall-core: face detection, embedding and gallery matching.
//!
//! SCRFD finds faces and ArcFace embeds them, both on ONNX Runtime. Matching
//! is nearest-neighbour over Euclidean distance with a tolerance.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod gallery;
pub mod recognizer;
pub mod types;

pub use detector::{DetectorError, FaceDetector};
pub use encoder::{EncoderError, FaceEncoder, FaceEncoding, OnnxFaceEncoder};
pub use gallery::{Gallery, GalleryError};
pub use recognizer::{FaceRecognizer, RecognizerError};
pub use types::{BoundingBox, Embedding, MatchResult, Matcher, NearestMatcher, UNKNOWN_LABEL};
