//! rollcall-store: persistence for the gallery model file and the
//! attendance database.

pub mod db;
pub mod lock;
pub mod model_file;

use std::path::PathBuf;
use thiserror::Error;

pub use db::{AttendanceRecord, Database, DbError, MarkOutcome};
pub use model_file::ModelStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("model file not found: {} (enroll a student or run `rollcall train` first)", .0.display())]
    ModelMissing(PathBuf),
    #[error("model file is corrupt: {0}")]
    Corrupt(String),
    #[error("failed to encode gallery: {0}")]
    Encode(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
