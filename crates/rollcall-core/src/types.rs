use serde::{Deserialize, Serialize};

use crate::gallery::Gallery;

/// Label rendered for a face that matched nobody in the gallery.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Bounding box for a detected face, with optional facial landmarks.
///
/// Coordinates are pixels in the image the face was detected in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, 0.0 when disjoint.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;

        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Map this box (and its landmarks) into an image `factor` times larger.
    ///
    /// Used to draw detections made on a downsampled frame onto the full frame.
    pub fn scaled(&self, factor: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * factor, ly * factor))),
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to a raw stored vector.
    ///
    /// Returns `None` when the dimensions differ; such vectors are not comparable.
    pub fn distance_to(&self, other: &[f32]) -> Option<f32> {
        if self.values.len() != other.len() {
            return None;
        }
        Some(
            self.values
                .iter()
                .zip(other)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f32>()
                .sqrt(),
        )
    }
}

/// Result of matching a query embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Name of the closest entry within tolerance, if any.
    pub name: Option<String>,
    /// Gallery index of the matched entry.
    pub index: Option<usize>,
    /// Distance to the closest comparable entry (`f32::INFINITY` if none).
    pub distance: f32,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self {
            name: None,
            index: None,
            distance,
        }
    }

    pub fn is_match(&self) -> bool {
        self.name.is_some()
    }

    /// Display label: the matched name or [`UNKNOWN_LABEL`].
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_LABEL)
    }
}

/// Strategy for comparing a query embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(&self, query: &Embedding, gallery: &Gallery, tolerance: f32) -> MatchResult;
}

/// Nearest-neighbour matcher over Euclidean distance.
///
/// Every gallery entry within `tolerance` is a candidate; the candidate with the
/// smallest distance wins. Entries of a different dimension are ignored.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn compare(&self, query: &Embedding, gallery: &Gallery, tolerance: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, (_, stored)) in gallery.iter().enumerate() {
            let Some(distance) = query.distance_to(stored) else {
                tracing::debug!(
                    index = i,
                    query_dim = query.dim(),
                    stored_dim = stored.len(),
                    "skipping gallery entry with mismatched dimension"
                );
                continue;
            };
            // Strict `<` keeps the earliest entry on exact ties.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }

        match best {
            Some((idx, distance)) if distance <= tolerance => MatchResult {
                name: gallery.names().get(idx).cloned(),
                index: Some(idx),
                distance,
            },
            Some((_, distance)) => MatchResult::unknown(distance),
            None => MatchResult::unknown(f32::INFINITY),
        }
    }
}
