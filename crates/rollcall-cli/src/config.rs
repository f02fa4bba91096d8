use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";

/// Runtime configuration.
///
/// Layered: defaults, then the TOML file, then `ROLLCALL_*` environment
/// variables, then command-line flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory of `<name>.jpg` face templates.
    pub faces_dir: PathBuf,
    /// Append-only attendance CSV.
    pub attendance_log: PathBuf,
    /// Directory containing the SCRFD detector model.
    pub model_dir: PathBuf,
    /// V4L2 device path.
    pub camera_device: String,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Histogram correlation a best match must exceed to count as known.
    pub similarity_threshold: f64,
    /// Minimum detector score for a face region.
    pub detection_confidence: f32,
    /// Smallest face side, in pixels, that counts as a detection.
    pub min_face_size: u32,
    /// How long each loop iteration waits for an operator key.
    pub key_poll_ms: u64,
    /// Where to write the annotated preview frame, if anywhere.
    pub preview_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            faces_dir: PathBuf::from("faces"),
            attendance_log: PathBuf::from("attendance.csv"),
            model_dir: PathBuf::from("models"),
            camera_device: "/dev/video0".to_string(),
            frame_width: 640,
            frame_height: 480,
            similarity_threshold: rollcall_core::DEFAULT_SIMILARITY_THRESHOLD,
            detection_confidence: 0.5,
            min_face_size: 30,
            key_poll_ms: 1,
            preview_path: None,
        }
    }
}

/// On-disk form of [`Config`]; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    faces_dir: Option<PathBuf>,
    attendance_log: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    camera_device: Option<String>,
    frame_width: Option<u32>,
    frame_height: Option<u32>,
    similarity_threshold: Option<f64>,
    detection_confidence: Option<f32>,
    min_face_size: Option<u32>,
    key_poll_ms: Option<u64>,
    preview_path: Option<PathBuf>,
}

impl Config {
    /// Load from `path` (required to exist) or from `rollcall.toml` if present,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        match path {
            Some(path) => config.apply_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    config.apply_file(default)?;
                }
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file: FileConfig = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");

        let FileConfig {
            faces_dir,
            attendance_log,
            model_dir,
            camera_device,
            frame_width,
            frame_height,
            similarity_threshold,
            detection_confidence,
            min_face_size,
            key_poll_ms,
            preview_path,
        } = file;

        set(&mut self.faces_dir, faces_dir);
        set(&mut self.attendance_log, attendance_log);
        set(&mut self.model_dir, model_dir);
        set(&mut self.camera_device, camera_device);
        set(&mut self.frame_width, frame_width);
        set(&mut self.frame_height, frame_height);
        set(&mut self.similarity_threshold, similarity_threshold);
        set(&mut self.detection_confidence, detection_confidence);
        set(&mut self.min_face_size, min_face_size);
        set(&mut self.key_poll_ms, key_poll_ms);
        if preview_path.is_some() {
            self.preview_path = preview_path;
        }
        Ok(())
    }

    /// Apply `ROLLCALL_*` overrides. Unparseable values keep the current setting.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROLLCALL_FACES_DIR") {
            self.faces_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_ATTENDANCE_LOG") {
            self.attendance_log = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("ROLLCALL_PREVIEW_PATH") {
            self.preview_path = (!v.is_empty()).then(|| PathBuf::from(v));
        }

        self.frame_width = env_parse(&lookup, "ROLLCALL_FRAME_WIDTH", self.frame_width);
        self.frame_height = env_parse(&lookup, "ROLLCALL_FRAME_HEIGHT", self.frame_height);
        self.similarity_threshold =
            env_parse(&lookup, "ROLLCALL_SIMILARITY_THRESHOLD", self.similarity_threshold);
        self.detection_confidence =
            env_parse(&lookup, "ROLLCALL_DETECTION_CONFIDENCE", self.detection_confidence);
        self.min_face_size = env_parse(&lookup, "ROLLCALL_MIN_FACE_SIZE", self.min_face_size);
        self.key_poll_ms = env_parse(&lookup, "ROLLCALL_KEY_POLL_MS", self.key_poll_ms);
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
            current
        }),
        None => current,
    }
}
