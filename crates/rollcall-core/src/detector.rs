//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes an RGB frame onto the 640×640 model input, decodes the three
//! anchor-free stride heads, and suppresses overlapping boxes with NMS.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download det_10g.onnx from insightface and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Mapping from letterboxed model space back to frame space.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (target as f32 - new_w) / 2.0,
            pad_y: (target as f32 - new_h) / 2.0,
        }
    }

    fn unmap(&self, (x, y): (f32, f32)) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions for one stride head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeadOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Raw tensors of one stride head.
struct HeadTensors<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    heads: [HeadOutputs; 3],
    score_threshold: f32,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let heads = head_outputs(&output_names);
        tracing::debug!(?heads, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            heads,
            score_threshold: SCRFD_CONFIDENCE_THRESHOLD,
        })
    }

    /// Override the minimum detection score (default 0.5).
    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Detect faces in an RGB frame, sorted by descending confidence.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(image);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (head, &stride) in self.heads.iter().zip(SCRFD_STRIDES.iter()) {
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| {
                        DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}"))
                    })
            };
            let tensors = HeadTensors {
                scores: extract(head.score, "scores")?,
                bboxes: extract(head.bbox, "bboxes")?,
                kps: extract(head.kps, "kps")?,
            };
            candidates.extend(decode_head(&tensors, stride, &letterbox, self.score_threshold));
        }

        Ok(nms(candidates, SCRFD_NMS_THRESHOLD))
    }
}

/// Letterbox an RGB frame into a normalized NCHW tensor.
///
/// Padding uses the mean value so it normalizes to 0.0.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), SCRFD_INPUT_SIZE);
    let new_w = ((image.width() as f32 * letterbox.scale).round() as u32).max(1);
    let new_h = ((image.height() as f32 * letterbox.scale).round() as u32).max(1);

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let pad = SCRFD_MEAN as u8;
    let mut canvas = RgbImage::from_pixel(SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE, Rgb([pad, pad, pad]));
    imageops::overlay(
        &mut canvas,
        &resized,
        letterbox.pad_x.floor() as i64,
        letterbox.pad_y.floor() as i64,
    );

    let size = SCRFD_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, px) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (px[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Work out which output tensor carries which head.
///
/// Exports either name tensors "score_8", "bbox_16", "kps_32", ... or use
/// opaque numeric names, in which case the standard order is
/// [scores 8/16/32, bboxes 8/16/32, kps 8/16/32].
fn head_outputs(names: &[String]) -> [HeadOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<HeadOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some(HeadOutputs {
                score: find("score", stride)?,
                bbox: find("bbox", stride)?,
                kps: find("kps", stride)?,
            })
        })
        .collect();

    match named {
        Some(heads) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [heads[0], heads[1], heads[2]]
        }
        None => {
            tracing::info!(?names, "SCRFD: output names not recognized, using positional mapping");
            std::array::from_fn(|i| HeadOutputs { score: i, bbox: i + 3, kps: i + 6 })
        }
    }
}

/// Decode one stride head into frame-space boxes above `threshold`.
fn decode_head(
    tensors: &HeadTensors<'_>,
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid_w = SCRFD_INPUT_SIZE as usize / stride;
    let grid_h = SCRFD_INPUT_SIZE as usize / stride;
    let anchors = grid_w * grid_h * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = *tensors.scores.get(idx)?;
            if score <= threshold {
                return None;
            }

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let cx = (cell % grid_w) as f32 * step;
            let cy = (cell / grid_w) as f32 * step;

            let d = tensors.bboxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.unmap((cx - d[0] * step, cy - d[1] * step));
            let (x2, y2) = letterbox.unmap((cx + d[2] * step, cy + d[3] * step));

            let landmarks = tensors.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| {
                    letterbox.unmap((cx + k[i * 2] * step, cy + k[i * 2 + 1] * step))
                })
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Non-Maximum Suppression. Output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| k.iou(&det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}
