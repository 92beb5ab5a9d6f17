//! Student enrollment: one photo, one face, one gallery entry.

use crate::capture::{discard_warmup, Controls, Key};
use crate::preview;
use rollcall_core::{EncoderError, FaceEncoder};
use rollcall_hw::{CameraError, Frame, FrameSource};
use rollcall_store::{Database, DbError, ModelStore, StoreError};
use image::{ImageFormat, ImageReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("please enter a name")]
    EmptyName,
    #[error("invalid name {0:?}: it must be usable as a file name")]
    InvalidName(String),
    #[error("student with this name already exists: {0}")]
    AlreadyEnrolled(String),
    #[error("no face detected in the captured photo")]
    NoFaceDetected,
    #[error("{0} faces detected in the captured photo; exactly one person must be in view")]
    MultipleFaces(usize),
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("database error: {0}")]
    Db(DbError),
    #[error("student enrolled, but the photo could not be saved to {}: {source}", .path.display())]
    PhotoNotSaved {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DbError> for EnrollError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::AlreadyEnrolled(name) => EnrollError::AlreadyEnrolled(name),
            other => EnrollError::Db(other),
        }
    }
}

/// A completed enrollment.
#[derive(Debug)]
pub struct Enrolled {
    pub name: String,
    pub photo: PathBuf,
    pub confidence: f32,
    pub gallery_size: usize,
}

/// Trim and check a name before anything touches the camera or disk.
pub fn validate_name(raw: &str) -> Result<String, EnrollError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(EnrollError::EmptyName);
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(EnrollError::InvalidName(name.to_string()));
    }
    Ok(name.to_string())
}

/// Validate `raw` and make sure no student has that name yet.
pub fn prepare(raw: &str, db: &Database) -> Result<String, EnrollError> {
    let name = validate_name(raw)?;
    if db.student_exists(&name)? {
        return Err(EnrollError::AlreadyEnrolled(name));
    }
    Ok(name)
}

pub fn photo_path(faces_dir: &Path, name: &str) -> PathBuf {
    faces_dir.join(format!("{name}.jpg"))
}

/// Stream frames until the user captures one (`Some`) or cancels (`None`).
pub fn capture_photo(
    source: &mut impl FrameSource,
    controls: &mut impl Controls,
    warmup_frames: usize,
    preview_path: Option<&Path>,
) -> Result<Option<Frame>, EnrollError> {
    discard_warmup(source, warmup_frames)?;

    loop {
        let frame = source.next_frame()?;
        if let Some(path) = preview_path {
            if let Err(e) = preview::write(&frame.image, path) {
                tracing::warn!(error = %e, "failed to write preview");
            }
        }
        match controls.poll() {
            Some(Key::Capture) => {
                tracing::info!(seq = frame.sequence, "photo captured");
                return Ok(Some(frame));
            }
            Some(Key::Quit) => return Ok(None),
            None => {}
        }
    }
}

/// Capture interactively, then enroll. `Ok(None)` means the user cancelled
/// and nothing was written.
#[allow(clippy::too_many_arguments)]
pub fn capture_and_enroll(
    name: &str,
    source: &mut impl FrameSource,
    controls: &mut impl Controls,
    encoder: &mut impl FaceEncoder,
    store: &ModelStore,
    db: &Database,
    faces_dir: &Path,
    warmup_frames: usize,
    preview_path: Option<&Path>,
) -> Result<Option<Enrolled>, EnrollError> {
    let Some(frame) = capture_photo(source, controls, warmup_frames, preview_path)? else {
        tracing::info!(name, "enrollment cancelled");
        return Ok(None);
    };

    std::fs::create_dir_all(faces_dir)?;
    let photo = photo_path(faces_dir, name);
    let staged = staged_path(&photo);
    frame.image.save_with_format(&staged, ImageFormat::Jpeg)?;
    tracing::debug!(path = %staged.display(), "capture staged");

    enroll_image(name, &staged, &photo, encoder, store, db).map(Some)
}

/// Enroll `name` from the image at `staged`.
///
/// `staged` is consumed: it is renamed onto `photo` once the student row
/// and the gallery entry both exist, and removed on every failure, so an
/// existing `photo` is only ever replaced by a successful enrollment. The
/// student row is written before the gallery entry and removed again if the
/// gallery write fails.
pub fn enroll_image(
    name: &str,
    staged: &Path,
    photo: &Path,
    encoder: &mut impl FaceEncoder,
    store: &ModelStore,
    db: &Database,
) -> Result<Enrolled, EnrollError> {
    let registered = register(name, staged, encoder, store, db);
    let (confidence, gallery_size) = match registered {
        Ok(done) => done,
        Err(e) => {
            discard(staged);
            return Err(e);
        }
    };

    if let Err(source) = std::fs::rename(staged, photo) {
        discard(staged);
        return Err(EnrollError::PhotoNotSaved { path: photo.to_path_buf(), source });
    }

    tracing::info!(name, confidence, gallery_size, "student enrolled");
    Ok(Enrolled {
        name: name.to_string(),
        photo: photo.to_path_buf(),
        confidence,
        gallery_size,
    })
}

/// Encode the image and write the student row plus the gallery entry.
/// Returns the face confidence and the new gallery size.
fn register(
    name: &str,
    image_path: &Path,
    encoder: &mut impl FaceEncoder,
    store: &ModelStore,
    db: &Database,
) -> Result<(f32, usize), EnrollError> {
    // Staged files carry no image extension, so sniff the format.
    let image = ImageReader::open(image_path)?.with_guessed_format()?.decode()?.to_rgb8();
    let mut encodings = encoder.encode(&image)?;
    if encodings.len() != 1 {
        return Err(match encodings.len() {
            0 => EnrollError::NoFaceDetected,
            n => EnrollError::MultipleFaces(n),
        });
    }
    let encoding = encodings.remove(0);

    db.add_student(name)?;
    match store.append(name, &encoding.embedding) {
        Ok(gallery_size) => Ok((encoding.face.confidence, gallery_size)),
        Err(e) => {
            if let Err(undo) = db.remove_student(name) {
                tracing::error!(name, error = %undo, "failed to roll back student row");
            }
            Err(e.into())
        }
    }
}

/// `Alice.jpg` -> `Alice.jpg.tmp`, which training skips.
fn staged_path(photo: &Path) -> PathBuf {
    let mut file_name = photo.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    file_name.push(".tmp");
    photo.with_file_name(file_name)
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove staged photo");
        }
    }
}
