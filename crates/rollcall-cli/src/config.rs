use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Tool configuration: defaults, then an optional TOML file, then
/// `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path.
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Root for everything below unless overridden individually.
    pub data_dir: PathBuf,
    /// Captured photos, one `<name>.jpg` per student.
    pub faces_dir: Option<PathBuf>,
    /// Persisted gallery of embeddings and names.
    pub model_file: Option<PathBuf>,
    /// SQLite attendance database.
    pub db_path: Option<PathBuf>,
    /// Directory containing the ONNX model files.
    pub model_dir: Option<PathBuf>,
    /// Largest Euclidean distance still accepted as the same person.
    pub match_tolerance: f32,
    /// Minimum SCRFD score for a face detection.
    pub detection_threshold: f32,
    /// Integer shrink factor applied to live frames before detection.
    pub downscale: u32,
    /// Frames discarded after opening the camera (auto-exposure settling).
    pub warmup_frames: usize,
    /// Where to write the annotated live frame, if anywhere.
    pub preview_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
            data_dir: default_data_dir(),
            faces_dir: None,
            model_file: None,
            db_path: None,
            model_dir: None,
            // L2-normalized ArcFace vectors: distance 1.1 ≈ cosine similarity 0.4.
            match_tolerance: 1.1,
            detection_threshold: 0.5,
            downscale: 4,
            warmup_frames: 4,
            preview_path: None,
        }
    }
}

impl Config {
    /// Load from `explicit`, else `$ROLLCALL_CONFIG`, else the XDG config file
    /// when present; then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("ROLLCALL_CONFIG").map(PathBuf::from))
            .or_else(|| Some(default_config_path()).filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                let config = Self::from_toml(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?;
                tracing::debug!(path = %path.display(), "config file loaded");
                config
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `ROLLCALL_*` variables. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let path = |key: &str| lookup(key).map(PathBuf::from);

        if let Some(v) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        env_parse(&lookup, "ROLLCALL_CAPTURE_WIDTH", &mut self.capture_width);
        env_parse(&lookup, "ROLLCALL_CAPTURE_HEIGHT", &mut self.capture_height);
        if let Some(v) = path("ROLLCALL_DATA_DIR") {
            self.data_dir = v;
        }
        if let Some(v) = path("ROLLCALL_FACES_DIR") {
            self.faces_dir = Some(v);
        }
        if let Some(v) = path("ROLLCALL_MODEL_FILE") {
            self.model_file = Some(v);
        }
        if let Some(v) = path("ROLLCALL_DB_PATH") {
            self.db_path = Some(v);
        }
        if let Some(v) = path("ROLLCALL_MODEL_DIR") {
            self.model_dir = Some(v);
        }
        env_parse(&lookup, "ROLLCALL_MATCH_TOLERANCE", &mut self.match_tolerance);
        env_parse(&lookup, "ROLLCALL_DETECTION_THRESHOLD", &mut self.detection_threshold);
        env_parse(&lookup, "ROLLCALL_DOWNSCALE", &mut self.downscale);
        env_parse(&lookup, "ROLLCALL_WARMUP_FRAMES", &mut self.warmup_frames);
        if let Some(v) = path("ROLLCALL_PREVIEW_PATH") {
            self.preview_path = Some(v);
        }
    }

    pub fn faces_dir(&self) -> PathBuf {
        self.faces_dir.clone().unwrap_or_else(|| self.data_dir.join("known_faces"))
    }

    pub fn model_file(&self) -> PathBuf {
        self.model_file.clone().unwrap_or_else(|| self.data_dir.join("gallery.bin"))
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| self.data_dir.join("attendance.db"))
    }

    pub fn model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(|| self.data_dir.join("models"))
    }

    /// Create the directories the tool writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        let db_path = self.db_path();
        let dirs = [Some(self.faces_dir()), db_path.parent().map(Path::to_path_buf)];
        for dir in dirs.into_iter().flatten().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable environment override"),
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
        .join("rollcall")
}

fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("rollcall/config.toml")
}
