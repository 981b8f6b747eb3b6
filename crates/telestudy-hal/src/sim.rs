//! Headless stand-ins for the simulation backend and the operator device.
//!
//! [`KinematicSim`] moves a single point end-effector by the translational
//! part of each action and reports table, finger and obstacle contacts.  It
//! implements the full [`Simulation`] contract, including the per-task
//! success predicate shapes used in the study, so the whole session loop can
//! run in CI without a physics engine.  [`ScriptedDevice`] replays a fixed
//! list of samples in place of a human operator.
//!
//! # Example
//!
//! ```rust
//! use telestudy_hal::sim::{KinematicSim, KinematicSimConfig, KinematicTask};
//! use telestudy_hal::simulation::Simulation;
//!
//! let mut sim = KinematicSim::new(KinematicSimConfig {
//!     task: KinematicTask::Reach,
//!     ..KinematicSimConfig::default()
//! });
//! sim.reset().unwrap();
//! sim.step(&[0.0; 7]).unwrap();
//! assert!(!sim.check_success().unwrap().trial_ended);
//! ```

use std::f64::consts::PI;

use telestudy_types::{Contact, DeviceSample, SuccessLevel, TeleopError, TrialStatus, Vec3, VisualMarker};
use tracing::debug;

use crate::device::{DeviceAdapter, DeviceFactory, DeviceOptions};
use crate::simulation::{FeedbackAnchor, SimFault, Simulation, SimulationFactory, SimulationRequest, StepResult};

// ────────────────────────────────────────────────────────────────────────────
// Scene geometry
// ────────────────────────────────────────────────────────────────────────────

pub const GEOM_HAND: usize = 0;
pub const GEOM_TABLE: usize = 1;
pub const GEOM_LEFT_FINGER: usize = 2;
pub const GEOM_RIGHT_FINGER: usize = 3;
pub const GEOM_SHELF: usize = 4;
pub const GEOM_WRIST: usize = 5;

const GEOM_NAMES: [&str; 6] = [
    "gripper0_hand_collision",
    "table_collision",
    "robot0_g0_col",
    "robot0_g1_col",
    "shelf_collision",
    "robot0_link6_collision",
];

fn distance(a: Vec3, b: Vec3) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Success predicate shape of a kinematic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KinematicTask {
    /// Free practice; the trial never ends.
    Free,
    /// Reach the goal; binary success.
    Reach,
    /// Reach the goal; graded 0/1/2 by final distance.
    GradedReach,
    /// Reach the goal while avoiding the shelf; binary success plus a
    /// disturbance annotation.
    ReachAvoid,
}

impl KinematicTask {
    /// Predicate shape used for a study task name.
    pub fn for_study_task(task: &str) -> Option<Self> {
        match task {
            "Train" => Some(KinematicTask::Free),
            "DrawerPick" => Some(KinematicTask::Reach),
            "ConstrainedReorient" => Some(KinematicTask::GradedReach),
            "Bookshelf" => Some(KinematicTask::ReachAvoid),
            _ => None,
        }
    }
}

/// Scene and timing parameters for [`KinematicSim`].
#[derive(Debug, Clone)]
pub struct KinematicSimConfig {
    pub task: KinematicTask,
    pub action_dim: usize,
    pub control_freq: u32,
    pub home: Vec3,
    pub goal: Vec3,
    pub goal_orientation: Vec3,
    /// Distance to the goal that counts as full success.
    pub tolerance: f64,
    /// Distance to the goal that counts as partial success on graded tasks.
    pub partial_tolerance: f64,
    pub obstacle: Vec3,
    pub obstacle_radius: f64,
    pub table_height: f64,
    /// End-effector travel per unit of translational action, in metres.
    pub gain: f64,
    /// Seconds after which a trial ends as a failure.
    pub time_limit: f64,
    /// Frames after which the viewer reports itself closed.
    pub max_frames: Option<u64>,
    pub camera_count: usize,
}

impl Default for KinematicSimConfig {
    fn default() -> Self {
        Self {
            task: KinematicTask::Reach,
            action_dim: 7,
            control_freq: 20,
            home: [0.0, 0.0, 1.0],
            goal: [0.15, 0.1, 0.9],
            goal_orientation: [PI, 0.0, 0.0],
            tolerance: 0.02,
            partial_tolerance: 0.06,
            obstacle: [0.3, -0.2, 0.95],
            obstacle_radius: 0.05,
            table_height: 0.82,
            gain: 0.05,
            time_limit: 60.0,
            max_frames: None,
            camera_count: 3,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// KinematicSim
// ────────────────────────────────────────────────────────────────────────────

/// Point end-effector simulation for headless sessions.
pub struct KinematicSim {
    config: KinematicSimConfig,
    eef: Vec3,
    gripper_closed: bool,
    steps_in_trial: u64,
    trial: u32,
    frames: u64,
    disturbed: bool,
    camera: usize,
    contacts: Vec<Contact>,
    pending_markers: Vec<VisualMarker>,
    last_frame: Vec<VisualMarker>,
}

impl KinematicSim {
    pub fn new(config: KinematicSimConfig) -> Self {
        let eef = config.home;
        Self {
            config,
            eef,
            gripper_closed: false,
            steps_in_trial: 0,
            trial: 0,
            frames: 0,
            disturbed: false,
            camera: 0,
            contacts: Vec::new(),
            pending_markers: Vec::new(),
            last_frame: Vec::new(),
        }
    }

    pub fn end_effector(&self) -> Vec3 {
        self.eef
    }

    pub fn active_camera(&self) -> usize {
        self.camera
    }

    /// Markers drawn on the most recently rendered frame.
    pub fn last_frame_markers(&self) -> &[VisualMarker] {
        &self.last_frame
    }

    fn elapsed(&self) -> f64 {
        self.steps_in_trial as f64 / f64::from(self.config.control_freq.max(1))
    }

    fn refresh_contacts(&mut self) {
        self.contacts.clear();
        if self.eef[2] - self.config.table_height <= 1e-9 {
            self.contacts.push(Contact {
                geom1: GEOM_HAND,
                geom2: GEOM_TABLE,
                position: [self.eef[0], self.eef[1], self.config.table_height],
            });
        }
        if self.gripper_closed {
            self.contacts.push(Contact {
                geom1: GEOM_LEFT_FINGER,
                geom2: GEOM_RIGHT_FINGER,
                position: self.eef,
            });
        }
        if distance(self.eef, self.config.obstacle) < self.config.obstacle_radius {
            self.disturbed = true;
            self.contacts.push(Contact {
                geom1: GEOM_WRIST,
                geom2: GEOM_SHELF,
                position: self.config.obstacle,
            });
        }
    }
}

impl Simulation for KinematicSim {
    fn reset(&mut self) -> Result<(), SimFault> {
        self.eef = self.config.home;
        self.gripper_closed = false;
        self.steps_in_trial = 0;
        self.disturbed = false;
        self.contacts.clear();
        self.trial += 1;
        debug!(trial = self.trial, "kinematic sim reset");
        Ok(())
    }

    fn step(&mut self, action: &[f64]) -> Result<StepResult, SimFault> {
        if action.len() != self.config.action_dim {
            return Err(SimFault::Step(format!(
                "expected {} action values, got {}",
                self.config.action_dim,
                action.len()
            )));
        }
        if action.iter().any(|v| !v.is_finite()) {
            return Err(SimFault::Step("non-finite action value".to_string()));
        }

        for (axis, delta) in action.iter().take(3).enumerate() {
            self.eef[axis] += delta * self.config.gain;
        }
        self.eef[2] = self.eef[2].max(self.config.table_height);
        if let Some(grasp) = action.get(6) {
            self.gripper_closed = *grasp > 0.0;
        }
        self.steps_in_trial += 1;
        self.refresh_contacts();

        let mut observation = self.eef.to_vec();
        observation.push(if self.gripper_closed { 1.0 } else { -1.0 });
        Ok(StepResult {
            observation,
            reward: -distance(self.eef, self.config.goal),
            done: false,
        })
    }

    fn action_dim(&self) -> usize {
        self.config.action_dim
    }

    fn contacts(&self) -> Vec<Contact> {
        self.contacts.clone()
    }

    fn geom_name(&self, id: usize) -> Option<&str> {
        GEOM_NAMES.get(id).copied()
    }

    fn add_marker(&mut self, marker: VisualMarker) {
        self.pending_markers.push(marker);
    }

    fn camera_count(&self) -> usize {
        self.config.camera_count
    }

    fn set_camera(&mut self, index: usize) {
        self.camera = index;
    }

    fn render(&mut self) -> Result<(), SimFault> {
        if let Some(max) = self.config.max_frames
            && self.frames >= max
        {
            return Err(SimFault::ViewerClosed);
        }
        self.frames += 1;
        self.last_frame = std::mem::take(&mut self.pending_markers);
        Ok(())
    }

    fn check_success(&mut self) -> Result<TrialStatus, SimFault> {
        let elapsed = self.elapsed();
        let timed_out = elapsed >= self.config.time_limit;
        let dist = distance(self.eef, self.config.goal);
        let reached = dist < self.config.tolerance;

        let (trial_ended, success, disturbance) = match self.config.task {
            KinematicTask::Free => (false, SuccessLevel::Binary(false), None),
            KinematicTask::Reach => (reached || timed_out, SuccessLevel::Binary(reached), None),
            KinematicTask::GradedReach => {
                let level = if reached {
                    SuccessLevel::GRADED_FULL
                } else if dist < self.config.partial_tolerance {
                    SuccessLevel::GRADED_PARTIAL
                } else {
                    0
                };
                (reached || timed_out, SuccessLevel::Graded(level), None)
            }
            KinematicTask::ReachAvoid => {
                let note = if self.disturbed { "shelf_contact" } else { "" };
                (reached || timed_out, SuccessLevel::Binary(reached), Some(note.to_string()))
            }
        };

        Ok(TrialStatus {
            trial_ended,
            success,
            elapsed,
            trial: self.trial,
            disturbance,
        })
    }

    fn feedback_anchor(&self) -> FeedbackAnchor {
        FeedbackAnchor {
            position: self.config.goal,
            orientation: self.config.goal_orientation,
        }
    }
}

/// Builds a [`KinematicSim`] per (task, robot) pair from a base scene.
#[derive(Debug, Clone, Default)]
pub struct KinematicSimFactory {
    pub base: KinematicSimConfig,
}

impl SimulationFactory for KinematicSimFactory {
    fn build(&mut self, request: &SimulationRequest<'_>) -> Result<Box<dyn Simulation>, TeleopError> {
        let task = KinematicTask::for_study_task(request.task)
            .ok_or_else(|| TeleopError::UnknownTask(request.task.to_string()))?;
        debug!(
            task = request.task,
            robot = request.profile.name(),
            controller = request.controller,
            "building kinematic sim"
        );
        Ok(Box::new(KinematicSim::new(KinematicSimConfig {
            task,
            control_freq: request.control_freq,
            ..self.base.clone()
        })))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ScriptedDevice
// ────────────────────────────────────────────────────────────────────────────

/// Replays a fixed list of samples, one per poll.
pub struct ScriptedDevice {
    id: String,
    samples: Vec<DeviceSample>,
    cursor: usize,
    repeat: bool,
    started: bool,
    polls: usize,
    disconnect_after: Option<usize>,
    resets: u32,
}

impl ScriptedDevice {
    pub fn new(id: impl Into<String>, samples: Vec<DeviceSample>) -> Self {
        Self {
            id: id.into(),
            samples,
            cursor: 0,
            repeat: false,
            started: false,
            polls: 0,
            disconnect_after: None,
            resets: 0,
        }
    }

    /// Restart the script once it is exhausted instead of going silent.
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Report a disconnect on every poll after the first `polls`.
    pub fn disconnect_after(mut self, polls: usize) -> Self {
        self.disconnect_after = Some(polls);
        self
    }

    /// Samples that move the end-effector by `delta` (in action units) over
    /// `ticks` polls with the gripper open.
    pub fn straight_line(delta: Vec3, ticks: usize) -> Vec<DeviceSample> {
        let n = ticks.max(1) as f64;
        (0..ticks.max(1))
            .map(|_| DeviceSample {
                pose_delta: [delta[0] / n, delta[1] / n, delta[2] / n, 0.0, 0.0, 0.0],
                grasp: -1.0,
                reset_requested: false,
            })
            .collect()
    }

    /// Number of times [`reset_internal_state`][DeviceAdapter::reset_internal_state] ran.
    pub fn resets(&self) -> u32 {
        self.resets
    }
}

impl DeviceAdapter for ScriptedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn start_control(&mut self) {
        self.started = true;
    }

    fn poll(&mut self) -> Result<Option<DeviceSample>, TeleopError> {
        if let Some(limit) = self.disconnect_after
            && self.polls >= limit
        {
            return Err(TeleopError::DeviceDisconnect(format!("{}: script ended link", self.id)));
        }
        self.polls += 1;
        if !self.started {
            return Ok(None);
        }
        if self.cursor >= self.samples.len() {
            if !self.repeat || self.samples.is_empty() {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let sample = self.samples[self.cursor];
        self.cursor += 1;
        Ok(Some(sample))
    }

    fn reset_internal_state(&mut self) {
        self.cursor = 0;
        self.resets += 1;
    }
}

/// Hands out a fresh [`ScriptedDevice`] for every pair.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDeviceFactory {
    pub samples: Vec<DeviceSample>,
    pub repeat: bool,
}

impl DeviceFactory for ScriptedDeviceFactory {
    fn connect(&mut self, options: &DeviceOptions) -> Result<Box<dyn DeviceAdapter>, TeleopError> {
        debug!(use_robotiq = options.use_robotiq, drawer = options.drawer, "connecting scripted device");
        let device = ScriptedDevice::new("scripted", self.samples.clone());
        Ok(Box::new(if self.repeat { device.repeating() } else { device }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
