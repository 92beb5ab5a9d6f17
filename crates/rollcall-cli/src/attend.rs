//! The attendance loop: recognize faces in live frames and mark each known
//! student present once per day.

use crate::capture::{Controls, Key};
use crate::preview;
use chrono::NaiveDateTime;
use rollcall_core::{EncoderError, FaceEncoder, Gallery, Matcher, NearestMatcher};
use rollcall_hw::FrameSource;
use rollcall_store::{Database, DbError, MarkOutcome};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendError {
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

#[derive(Debug, Clone)]
pub struct AttendOptions {
    pub tolerance: f32,
    pub downscale: u32,
    pub preview_path: Option<PathBuf>,
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    Quit,
    CaptureFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendSummary {
    pub frames: usize,
    pub dark_skipped: usize,
    pub faces: usize,
    /// Names newly recorded during this run, in order.
    pub recorded: Vec<String>,
    pub exit: LoopExit,
}

/// Run until the user quits or the camera fails.
///
/// A capture failure ends the loop normally and is reported in
/// [`AttendSummary::exit`]; encoder and database failures are returned as
/// errors. `clock` supplies the time stamped on each new record.
pub fn run(
    source: &mut impl FrameSource,
    encoder: &mut impl FaceEncoder,
    gallery: &Gallery,
    db: &Database,
    controls: &mut impl Controls,
    options: &AttendOptions,
    mut clock: impl FnMut() -> NaiveDateTime,
) -> Result<AttendSummary, AttendError> {
    let matcher = NearestMatcher;
    let factor = options.downscale.max(1);
    let mut summary = AttendSummary {
        frames: 0,
        dark_skipped: 0,
        faces: 0,
        recorded: Vec::new(),
        exit: LoopExit::Quit,
    };

    tracing::info!(
        entries = gallery.len(),
        tolerance = options.tolerance,
        downscale = factor,
        "attendance loop started"
    );

    loop {
        if controls.poll() == Some(Key::Quit) {
            break;
        }

        let mut frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "frame capture failed");
                summary.exit = LoopExit::CaptureFailed(e.to_string());
                break;
            }
        };
        summary.frames += 1;

        if frame.is_dark() {
            summary.dark_skipped += 1;
            tracing::trace!(seq = frame.sequence, brightness = frame.avg_brightness(), "dark frame skipped");
            continue;
        }

        let small = frame.downscaled(factor);
        let encodings = encoder.encode(&small)?;
        summary.faces += encodings.len();

        let mut labelled = Vec::with_capacity(encodings.len());
        for encoding in encodings {
            let result = matcher.compare(&encoding.embedding, gallery, options.tolerance);
            tracing::debug!(
                seq = frame.sequence,
                label = result.label(),
                distance = result.distance,
                "face classified"
            );

            if let Some(name) = &result.name {
                if let MarkOutcome::Recorded(record) = db.mark_attendance(name, clock())? {
                    println!("Attendance marked: {} at {}", record.name, record.timestamp);
                    tracing::info!(name = %record.name, timestamp = %record.timestamp, "attendance recorded");
                    summary.recorded.push(record.name);
                }
            }
            labelled.push((encoding.face.scaled(factor as f32), result.label().to_string()));
        }

        if let Some(path) = &options.preview_path {
            preview::annotate(&mut frame.image, &labelled);
            if let Err(e) = preview::write(&frame.image, path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to write preview");
            }
        }
    }

    tracing::info!(
        frames = summary.frames,
        faces = summary.faces,
        recorded = summary.recorded.len(),
        exit = ?summary.exit,
        "attendance loop stopped"
    );
    Ok(summary)
}
