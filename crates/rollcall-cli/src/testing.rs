//! Hardware-free stand-ins for the camera, the face models and the keyboard.

use crate::capture::{Controls, Key};
use image::{Rgb, RgbImage};
use rollcall_core::{BoundingBox, Embedding, EncoderError, FaceEncoder};
use rollcall_hw::{CameraError, Frame, FrameSource};
use std::collections::VecDeque;

pub const ALICE: [u8; 3] = [200, 40, 40];
pub const BOB: [u8; 3] = [40, 40, 200];
pub const STRANGER: [u8; 3] = [40, 200, 40];
pub const NOBODY: [u8; 3] = [0, 0, 0];

/// A "photo" of one person: a solid colour.
pub fn portrait(color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(64, 48, Rgb(color))
}

/// Two people: left half `left`, right half `right`.
pub fn group(left: [u8; 3], right: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(64, 48, |x, _| if x < 32 { Rgb(left) } else { Rgb(right) })
}

/// Faces are coloured regions. A black left edge means no face; differing
/// left and right edges mean two faces. The embedding is the colour at the
/// region centre, divided by 255.
pub struct ColorEncoder;

impl FaceEncoder for ColorEncoder {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, EncoderError> {
        let (w, h) = image.dimensions();
        let left = image.get_pixel(0, 0);
        let right = image.get_pixel(w - 1, 0);
        let region = |x: f32, width: f32| BoundingBox {
            x, y: 0.0, width, height: h as f32, confidence: 0.99, landmarks: None,
        };

        // Loose comparisons: enrollment photos go through JPEG.
        let near = |a: &Rgb<u8>, b: [u8; 3]| a.0.iter().zip(b).all(|(&x, y)| x.abs_diff(y) < 16);

        Ok(match (near(left, NOBODY), near(left, right.0)) {
            (true, _) => vec![],
            (false, true) => vec![region(0.0, w as f32)],
            (false, false) => vec![region(0.0, w as f32 / 2.0), region(w as f32 / 2.0, w as f32 / 2.0)],
        })
    }

    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EncoderError> {
        let cx = (face.x + face.width / 2.0) as u32;
        let cy = (face.y + face.height / 2.0) as u32;
        let px = image.get_pixel(cx.min(image.width() - 1), cy.min(image.height() - 1));
        Ok(Embedding::new(px.0.iter().map(|&c| c as f32 / 255.0).collect()))
    }
}

/// Replays a fixed list of frames, then fails like an unplugged camera.
pub struct ScriptedFrames {
    frames: VecDeque<RgbImage>,
    sequence: u32,
}

impl ScriptedFrames {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self { frames: frames.into(), sequence: 0 }
    }

    pub fn solid(colors: &[[u8; 3]]) -> Self {
        Self::new(colors.iter().map(|&c| portrait(c)).collect())
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ScriptedFrames {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let image = self
            .frames
            .pop_front()
            .ok_or_else(|| CameraError::CaptureFailed("end of script".into()))?;
        self.sequence += 1;
        Ok(Frame::new(image, self.sequence))
    }
}

/// Returns one scripted answer per poll, then nothing.
pub struct ScriptedKeys(VecDeque<Option<Key>>);

impl ScriptedKeys {
    pub fn new(keys: Vec<Option<Key>>) -> Self {
        Self(keys.into())
    }

    /// Quit after `polls - 1` silent polls.
    pub fn quit_after(polls: usize) -> Self {
        let mut keys = vec![None; polls.saturating_sub(1)];
        keys.push(Some(Key::Quit));
        Self::new(keys)
    }
}

impl Controls for ScriptedKeys {
    fn poll(&mut self) -> Option<Key> {
        self.0.pop_front().flatten()
    }
}
