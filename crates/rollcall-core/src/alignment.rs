//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face onto the canonical 112×112 ArcFace crop using the
//! five InsightFace reference landmarks.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// ArcFace reference landmarks for a 112×112 output.
pub const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [a -b; b a] * src + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    pub const IDENTITY: Similarity = Similarity { a: 1.0, b: 0.0, tx: 0.0, ty: 0.0 };

    /// Least-squares fit from `src` points onto `dst` points.
    ///
    /// Closed form on centred coordinates; degenerate input (all source
    /// points coincident) yields the identity.
    pub fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Similarity {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst) {
            let (sx, sy) = (sx - msx, sy - msy);
            let (dx, dy) = (dx - mdx, dy - mdy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }

        if norm < 1e-12 {
            return Self::IDENTITY;
        }

        let a = dot / norm;
        let b = cross / norm;
        Similarity {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        }
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    pub fn scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    fn projection(&self) -> Option<Projection> {
        Projection::from_matrix([
            self.a, -self.b, self.tx, //
            self.b, self.a, self.ty, //
            0.0, 0.0, 1.0,
        ])
    }
}

/// Align a detected face to a canonical 112×112 RGB crop.
///
/// Pixels that map outside the source frame are black.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let transform = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112);
    let mut out = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);

    match transform.projection() {
        Some(projection) => {
            warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
        }
        None => tracing::warn!(?transform, "degenerate alignment transform; using blank crop"),
    }

    out
}
