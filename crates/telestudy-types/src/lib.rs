use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cartesian vector in simulation world coordinates (metres).
pub type Vec3 = [f64; 3];

/// Which end-effector the operator's device currently drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmSide {
    Right,
    Left,
    /// A single bimanual robot controlled as one unit.
    Bimanual,
}

impl ArmSide {
    /// The opposite arm for switch-on-grasp. `Bimanual` has no opposite and
    /// is returned unchanged.
    pub fn flipped(self) -> Self {
        match self {
            ArmSide::Right => ArmSide::Left,
            ArmSide::Left => ArmSide::Right,
            ArmSide::Bimanual => ArmSide::Bimanual,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArmSide::Right => "right",
            ArmSide::Left => "left",
            ArmSide::Bimanual => "bimanual",
        }
    }
}

impl fmt::Display for ArmSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArmSide {
    type Err = TeleopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "right" => Ok(ArmSide::Right),
            "left" => Ok(ArmSide::Left),
            "bimanual" => Ok(ArmSide::Bimanual),
            other => Err(TeleopError::UnsupportedArm(other.to_string())),
        }
    }
}

/// One poll of the operator's control device.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceSample {
    /// `[dx, dy, dz, droll, dpitch, dyaw]` since the previous poll.
    pub pose_delta: [f64; 6],
    /// Gripper intent in `[-1, 1]`; positive closes.
    pub grasp: f64,
    /// The operator asked to end the current episode.
    pub reset_requested: bool,
}

impl DeviceSample {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn reset() -> Self {
        Self {
            reset_requested: true,
            ..Self::default()
        }
    }
}

/// A raw contact reported by the simulation for the current step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub geom1: usize,
    pub geom2: usize,
    pub position: Vec3,
}

/// A contact after safety classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactEvent {
    pub geom1: usize,
    pub geom2: usize,
    pub geom1_name: Option<String>,
    pub geom2_name: Option<String>,
    pub position: Vec3,
    /// Exactly one side of the pair belongs to the safety geometry set.
    pub flagged: bool,
}

/// Shape of a feedback marker drawn into the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerShape {
    Sphere,
    Arrow,
    Label,
}

/// A feedback-only marker. Markers never influence control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualMarker {
    pub shape: MarkerShape,
    pub position: Vec3,
    pub size: Vec3,
    pub rgba: [f32; 4],
    pub label: String,
    /// XYZ Euler angles in radians.
    pub orientation: Option<Vec3>,
}

impl VisualMarker {
    pub fn sphere(position: Vec3, radius: f64, rgba: [f32; 4], label: &str) -> Self {
        Self {
            shape: MarkerShape::Sphere,
            position,
            size: [radius; 3],
            rgba,
            label: label.to_string(),
            orientation: None,
        }
    }

    pub fn arrow(position: Vec3, orientation: Vec3, rgba: [f32; 4]) -> Self {
        Self {
            shape: MarkerShape::Arrow,
            position,
            size: [0.01, 0.01, 0.6],
            rgba,
            label: String::new(),
            orientation: Some(orientation),
        }
    }

    pub fn label(position: Vec3, text: &str, rgba: [f32; 4]) -> Self {
        Self {
            shape: MarkerShape::Label,
            position,
            size: [1.0, 1.0, 1.0],
            rgba,
            label: text.to_string(),
            orientation: None,
        }
    }
}

/// How well a trial went, in the task's own scale.
///
/// Simple tasks report a boolean. Graded tasks report `0` (fail), `1`
/// (partial) or `2` (clean success).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scale", content = "value", rename_all = "lowercase")]
pub enum SuccessLevel {
    Binary(bool),
    Graded(u8),
}

impl SuccessLevel {
    pub const GRADED_PARTIAL: u8 = 1;
    pub const GRADED_FULL: u8 = 2;

    /// `true` for a binary success or the top graded level.
    pub fn is_full_success(self) -> bool {
        match self {
            SuccessLevel::Binary(ok) => ok,
            SuccessLevel::Graded(level) => level >= Self::GRADED_FULL,
        }
    }
}

impl fmt::Display for SuccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Matches the capitalisation already present in study data files.
            SuccessLevel::Binary(true) => f.write_str("True"),
            SuccessLevel::Binary(false) => f.write_str("False"),
            SuccessLevel::Graded(level) => write!(f, "{level}"),
        }
    }
}

/// What a task's success predicate reports for the current step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialStatus {
    pub trial_ended: bool,
    pub success: SuccessLevel,
    /// Seconds since the trial started.
    pub elapsed: f64,
    pub trial: u32,
    pub disturbance: Option<String>,
}

/// Outcome of one terminal trial, as persisted to the trial log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub subject_name: String,
    pub task: String,
    pub robot: String,
    pub trial: u32,
    pub success: SuccessLevel,
    pub success_time: f64,
    pub disturbance: String,
}

impl TrialRecord {
    pub fn from_status(subject_name: &str, task: &str, robot: &str, status: &TrialStatus) -> Self {
        Self {
            subject_name: subject_name.to_string(),
            task: task.to_string(),
            robot: robot.to_string(),
            trial: status.trial,
            success: status.success,
            success_time: status.elapsed,
            disturbance: status.disturbance.clone().unwrap_or_default(),
        }
    }
}

/// Error taxonomy for the teleoperation session.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TeleopError {
    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Unknown robot: {0}")]
    UnknownRobot(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Unsupported arm specified, must be either 'right' or 'left': got {0}")]
    UnsupportedArm(String),

    #[error("Simulation Fault: {0}")]
    SimulationFault(String),

    #[error("Device disconnected: {0}")]
    DeviceDisconnect(String),

    #[error("Invalid device sample: {0}")]
    InvalidSample(String),

    #[error("Trial log error: {0}")]
    TrialLog(String),
}

impl TeleopError {
    /// Errors that must halt session construction.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TeleopError::Configuration(_) | TeleopError::UnknownRobot(_) | TeleopError::UnknownTask(_)
        )
    }
}
