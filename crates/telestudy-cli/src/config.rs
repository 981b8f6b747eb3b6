//! Configuration vault – reads/writes `~/.telestudy/config.toml`.
//!
//! `TELESTUDY_CONFIG` points at a different file.  Every field has a serde
//! default, so a partial file is valid and a missing file means defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use telestudy_runtime::SessionConfig;
use telestudy_runtime::tasks::TRAINING_TASK;
use telestudy_types::{ArmSide, TeleopError};

/// Where trial records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogBackend {
    #[default]
    Csv,
    Sqlite,
}

impl LogBackend {
    fn extension(self) -> &'static str {
        match self {
            LogBackend::Csv => "csv",
            LogBackend::Sqlite => "sqlite",
        }
    }
}

/// Persisted study configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_subject")]
    pub subject_name: String,

    /// Directory holding one trial log per subject.
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,

    #[serde(default)]
    pub log_backend: LogBackend,

    /// Arm driven at the start of every pair.
    #[serde(default = "default_arm")]
    pub arm: ArmSide,

    /// Flip the driven arm on every gripper close.
    #[serde(default)]
    pub switch_on_grasp: bool,

    /// Cycle the viewer camera on every gripper close.
    #[serde(default)]
    pub toggle_camera_on_grasp: bool,

    #[serde(default = "default_sensitivity")]
    pub pos_sensitivity: f64,

    #[serde(default = "default_sensitivity")]
    pub rot_sensitivity: f64,

    #[serde(default = "default_controller")]
    pub controller: String,

    /// Control ticks per second.
    #[serde(default = "default_control_freq")]
    pub control_freq: u32,

    /// Seconds terminal feedback stays on screen.
    #[serde(default = "default_dwell_secs")]
    pub dwell_secs: f64,

    #[serde(default = "default_tasks")]
    pub tasks: Vec<String>,

    #[serde(default = "default_training_task")]
    pub training_task: Option<String>,

    #[serde(default = "default_robots")]
    pub robots: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps_per_pair: Option<u64>,

    /// Device silence, in seconds, treated as a disconnect.
    #[serde(default = "default_device_timeout_secs")]
    pub device_timeout_secs: f64,
}

fn default_subject() -> String {
    "subject".to_string()
}
fn default_data_directory() -> PathBuf {
    PathBuf::from("data")
}
fn default_arm() -> ArmSide {
    ArmSide::Right
}
fn default_sensitivity() -> f64 {
    1.0
}
fn default_controller() -> String {
    "OSC_POSE".to_string()
}
fn default_control_freq() -> u32 {
    20
}
fn default_dwell_secs() -> f64 {
    3.0
}
fn default_tasks() -> Vec<String> {
    ["ConstrainedReorient", "Bookshelf", "DrawerPick"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_training_task() -> Option<String> {
    Some(TRAINING_TASK.to_string())
}
fn default_robots() -> Vec<String> {
    ["Panda", "PandaWrist", "PandaSSLIM"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_device_timeout_secs() -> f64 {
    2.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subject_name: default_subject(),
            data_directory: default_data_directory(),
            log_backend: LogBackend::default(),
            arm: default_arm(),
            switch_on_grasp: false,
            toggle_camera_on_grasp: false,
            pos_sensitivity: default_sensitivity(),
            rot_sensitivity: default_sensitivity(),
            controller: default_controller(),
            control_freq: default_control_freq(),
            dwell_secs: default_dwell_secs(),
            tasks: default_tasks(),
            training_task: default_training_task(),
            robots: default_robots(),
            seed: None,
            max_steps_per_pair: None,
            device_timeout_secs: default_device_timeout_secs(),
        }
    }
}

impl Config {
    /// Reject values the session loop cannot run with.
    pub fn validate(&self) -> Result<(), TeleopError> {
        if self.subject_name.trim().is_empty() {
            return Err(TeleopError::Configuration("subject_name is empty".to_string()));
        }
        // The subject name becomes the trial log file name.
        if matches!(self.subject_name.as_str(), "." | "..") || self.subject_name.contains(['/', '\\', '\0']) {
            return Err(TeleopError::Configuration(format!(
                "subject_name {:?} is not a plain file name",
                self.subject_name
            )));
        }
        for (field, value) in [
            ("pos_sensitivity", self.pos_sensitivity),
            ("rot_sensitivity", self.rot_sensitivity),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(TeleopError::Configuration(format!("{field} must be positive, got {value}")));
            }
        }
        if !self.dwell_secs.is_finite() || self.dwell_secs < 0.0 {
            return Err(TeleopError::Configuration(format!(
                "dwell_secs must be non-negative, got {}",
                self.dwell_secs
            )));
        }
        if !self.device_timeout_secs.is_finite() || self.device_timeout_secs <= 0.0 {
            return Err(TeleopError::Configuration(format!(
                "device_timeout_secs must be positive, got {}",
                self.device_timeout_secs
            )));
        }
        Ok(())
    }

    /// Trial log file for the configured subject and backend.
    pub fn trial_log_path(&self) -> PathBuf {
        self.data_directory
            .join(format!("{}.{}", self.subject_name, self.log_backend.extension()))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            subject_name: self.subject_name.clone(),
            arm: self.arm,
            switch_on_grasp: self.switch_on_grasp,
            toggle_camera_on_grasp: self.toggle_camera_on_grasp,
            pos_sensitivity: self.pos_sensitivity,
            rot_sensitivity: self.rot_sensitivity,
            controller: self.controller.clone(),
            control_freq: self.control_freq,
            dwell_secs: self.dwell_secs,
            tasks: self.tasks.clone(),
            training_task: self.training_task.clone(),
            robots: self.robots.clone(),
            seed: self.seed,
            max_steps_per_pair: self.max_steps_per_pair,
            device_timeout: Duration::from_secs_f64(self.device_timeout_secs),
        }
    }
}

/// `$TELESTUDY_CONFIG`, or `~/.telestudy/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("TELESTUDY_CONFIG")
        && !p.is_empty()
    {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".telestudy").join("config.toml")
}

/// Load the config.  `Ok(None)` when the file does not exist.
pub fn load() -> Result<Option<Config>, TeleopError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, TeleopError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| TeleopError::Configuration(format!("failed to read {}: {e}", path.display())))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| TeleopError::Configuration(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Apply `TELESTUDY_*` environment overrides.
///
/// | Variable | Config field |
/// |---|---|
/// | `TELESTUDY_SUBJECT` | `subject_name` |
/// | `TELESTUDY_DATA_DIR` | `data_directory` |
/// | `TELESTUDY_SEED` | `seed` (ignored unless it parses as `u64`) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TELESTUDY_SUBJECT")
        && !v.trim().is_empty()
    {
        cfg.subject_name = v;
    }
    if let Ok(v) = std::env::var("TELESTUDY_DATA_DIR") {
        cfg.data_directory = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("TELESTUDY_SEED")
        && let Ok(seed) = v.parse::<u64>()
    {
        cfg.seed = Some(seed);
    }
}

pub fn save(cfg: &Config) -> Result<(), TeleopError> {
    save_to(cfg, &config_path())
}

/// Write `cfg` to `path`, owner-only on Unix.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), TeleopError> {
    let io_err = |what: &str, e: std::io::Error| TeleopError::Configuration(format!("{what}: {e}"));

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| io_err("failed to create config directory", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| io_err("failed to restrict config directory", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| TeleopError::Configuration(format!("failed to serialize config: {e}")))?;

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| io_err(&format!("failed to write {}", path.display()), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| io_err(&format!("failed to write {}", path.display()), e))?;
    Ok(())
}
