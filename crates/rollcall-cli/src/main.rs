use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rollcall_core::OnnxFaceEncoder;
use rollcall_hw::Camera;
use rollcall_store::{Database, ModelStore, StoreError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod attend;
mod capture;
mod config;
mod enroll;
mod preview;
mod records;
mod train;

#[cfg(test)]
mod testing;

use attend::{AttendOptions, LoopExit};
use capture::{discard_warmup, TerminalControls};
use config::Config;

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Face-recognition attendance from a webcam")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new student from a webcam photo
    Enroll {
        /// Student name; also the photo file name
        name: String,
    },
    /// Rebuild the face gallery from the saved photos
    Train,
    /// Recognize faces from the webcam and mark attendance
    Attend,
    /// Show attendance records
    Records {
        /// Only this day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List enrolled students
    Students,
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Enroll { name } => {
            let interrupted = watch_interrupt();
            tokio::task::spawn_blocking(move || cmd_enroll(&config, &name, interrupted)).await?
        }
        Commands::Train => tokio::task::spawn_blocking(move || cmd_train(&config)).await?,
        Commands::Attend => {
            let interrupted = watch_interrupt();
            tokio::task::spawn_blocking(move || cmd_attend(&config, interrupted)).await?
        }
        Commands::Records { date, json } => cmd_records(&config, date, json),
        Commands::Students => cmd_students(&config),
        Commands::Devices => {
            cmd_devices();
            Ok(())
        }
    }
}

/// Ctrl-C sets the returned flag instead of killing the process, so the
/// capture loops can release the camera and return.
fn watch_interrupt() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let setter = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            setter.store(true, Ordering::SeqCst);
        }
    });
    flag
}

fn open_db(config: &Config) -> Result<Database> {
    config.ensure_dirs()?;
    let path = config.db_path();
    Database::open(&path).with_context(|| format!("opening database {}", path.display()))
}

fn load_encoder(config: &Config) -> Result<OnnxFaceEncoder> {
    let dir = config.model_dir();
    OnnxFaceEncoder::load(&dir, config.detection_threshold)
        .with_context(|| format!("loading face models from {}", dir.display()))
}

fn open_camera(config: &Config) -> Result<Camera> {
    Camera::open(&config.camera_device, config.capture_width, config.capture_height)
        .with_context(|| format!("opening camera {}", config.camera_device))
}

fn cmd_enroll(config: &Config, raw_name: &str, interrupted: Arc<AtomicBool>) -> Result<()> {
    let db = open_db(config)?;
    let name = enroll::prepare(raw_name, &db)?;

    let store = ModelStore::new(config.model_file());
    store.ensure_exists()?;
    let mut encoder = load_encoder(config)?;
    let camera = open_camera(config)?;
    let mut stream = camera.stream()?;
    let mut controls = TerminalControls::spawn(interrupted);

    println!("Enrolling {name}. Press ENTER to take the photo, or type q and ENTER to cancel.");
    let enrolled = enroll::capture_and_enroll(
        &name,
        &mut stream,
        &mut controls,
        &mut encoder,
        &store,
        &db,
        &config.faces_dir(),
        config.warmup_frames,
        config.preview_path.as_deref(),
    )?;

    match enrolled {
        Some(e) => println!(
            "Enrolled {} (face confidence {:.2}, photo {}, {} entries in gallery)",
            e.name,
            e.confidence,
            e.photo.display(),
            e.gallery_size
        ),
        None => println!("Enrollment cancelled."),
    }
    Ok(())
}

fn cmd_train(config: &Config) -> Result<()> {
    let mut encoder = load_encoder(config)?;
    let store = ModelStore::new(config.model_file());
    let faces_dir = config.faces_dir();

    let report = train::train(&faces_dir, &mut encoder, &store)?;
    println!(
        "Trained {} of {} images ({} without a face, {} with several faces, {} unreadable)",
        report.trained, report.scanned, report.no_face, report.multiple_faces, report.unreadable
    );
    println!("Gallery written to {}", store.path().display());
    Ok(())
}

fn cmd_attend(config: &Config, interrupted: Arc<AtomicBool>) -> Result<()> {
    let store = ModelStore::new(config.model_file());
    let gallery = store.load()?;
    if gallery.is_empty() {
        tracing::warn!("gallery is empty; every face will be Unknown");
    }

    let db = open_db(config)?;
    let mut encoder = load_encoder(config)?;
    let camera = open_camera(config)?;
    let mut stream = camera.stream()?;
    discard_warmup(&mut stream, config.warmup_frames)?;
    let mut controls = TerminalControls::spawn(interrupted);

    let options = AttendOptions {
        tolerance: config.match_tolerance,
        downscale: config.downscale,
        preview_path: config.preview_path.clone(),
    };

    println!("Taking attendance. Type q and ENTER, or press Ctrl-C, to stop.");
    let summary = attend::run(
        &mut stream,
        &mut encoder,
        &gallery,
        &db,
        &mut controls,
        &options,
        || Local::now().naive_local(),
    )?;

    println!(
        "{} frames, {} faces seen, {} newly marked present",
        summary.frames,
        summary.faces,
        summary.recorded.len()
    );
    match summary.exit {
        LoopExit::Quit => Ok(()),
        LoopExit::CaptureFailed(msg) => anyhow::bail!("camera capture failed: {msg}"),
    }
}

fn cmd_records(config: &Config, date: Option<NaiveDate>, json: bool) -> Result<()> {
    let db = open_db(config)?;
    let list = db.attendance(date)?;
    if json {
        println!("{}", records::render_json(&list)?);
    } else {
        print!("{}", records::render_table(&list));
    }
    Ok(())
}

fn cmd_students(config: &Config) -> Result<()> {
    let db = open_db(config)?;
    let gallery = match ModelStore::new(config.model_file()).load() {
        Ok(g) => Some(g),
        Err(StoreError::ModelMissing(_)) => None,
        Err(e) => return Err(e.into()),
    };

    let names = db.students()?;
    if names.is_empty() {
        println!("No students enrolled.");
    }
    for name in names {
        match &gallery {
            Some(g) if !g.contains(&name) => println!("{name}  (not in gallery; run `rollcall train`)"),
            _ => println!("{name}"),
        }
    }
    Ok(())
}

fn cmd_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found.");
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
}
