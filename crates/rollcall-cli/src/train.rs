//! Rebuild the gallery from the photos in the faces directory.

use rollcall_core::{EncoderError, FaceEncoder, Gallery};
use rollcall_store::{ModelStore, StoreError};
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("cannot read faces directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// What a training run did with each scanned file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrainReport {
    pub scanned: usize,
    pub trained: usize,
    pub no_face: usize,
    pub multiple_faces: usize,
    pub unreadable: usize,
}

/// Encode every image in `faces_dir` and overwrite the gallery with the
/// result. Names come from file stems; files are visited in name order.
///
/// The gallery lock is held for the whole run. An enrollment that finishes
/// meanwhile blocks on its append and then adds its entry to the rebuilt
/// gallery.
pub fn train(
    faces_dir: &Path,
    encoder: &mut impl FaceEncoder,
    store: &ModelStore,
) -> Result<TrainReport, TrainError> {
    let images = list_images(faces_dir)?;
    tracing::info!(dir = %faces_dir.display(), count = images.len(), "training started");

    let mut report = TrainReport::default();
    store.rebuild(|| encode_all(&images, encoder, &mut report))?;
    tracing::info!(?report, "training finished");
    Ok(report)
}

fn encode_all(
    images: &[PathBuf],
    encoder: &mut impl FaceEncoder,
    report: &mut TrainReport,
) -> Result<Gallery, TrainError> {
    let mut gallery = Gallery::new();

    for path in images {
        report.scanned += 1;
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping file with non-UTF-8 name");
            report.unreadable += 1;
            continue;
        };

        let image = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
                report.unreadable += 1;
                continue;
            }
        };

        let mut encodings = encoder.encode(&image)?;
        match encodings.len() {
            0 => {
                tracing::warn!(path = %path.display(), "no face found; skipping");
                report.no_face += 1;
            }
            1 => {
                let encoding = encodings.remove(0);
                gallery.push(name, &encoding.embedding);
                report.trained += 1;
                tracing::debug!(name, confidence = encoding.face.confidence, "trained");
            }
            n => {
                tracing::warn!(path = %path.display(), faces = n, "several faces found; skipping");
                report.multiple_faces += 1;
            }
        }
    }

    Ok(gallery)
}

/// Image files directly inside `dir`, sorted by file name. A missing
/// directory is treated as empty.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>, TrainError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(TrainError::ReadDir { path: dir.to_path_buf(), source }),
    };

    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}
