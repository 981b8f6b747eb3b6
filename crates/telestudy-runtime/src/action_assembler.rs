//! Device sample → simulation action.
//!
//! [`assemble`] turns one [`DeviceSample`] into the action vector the
//! simulation expects, threading the explicit [`SessionState`] through every
//! tick instead of keeping arm or camera selection in globals.
//!
//! # Per tick
//!
//! 1. A reset request short-circuits to [`Assembled::Reset`].
//! 2. The raw action is `[dpos · pos_sensitivity, drot · rot_sensitivity, grasp]`.
//! 3. A rising gripper edge (`last_grasp <= 0 < grasp`) may flip the active
//!    arm and may advance the camera.
//! 4. [`fit_action`] pads or truncates the raw action to `action_dim`.
//!
//! # Example
//!
//! ```rust
//! use telestudy_runtime::action_assembler::fit_action;
//! use telestudy_types::ArmSide;
//!
//! assert_eq!(fit_action(&[1.0, 2.0], 5, ArmSide::Right).unwrap(), vec![1.0, 2.0, 0.0, 0.0, 0.0]);
//! assert_eq!(fit_action(&[1.0, 2.0], 5, ArmSide::Left).unwrap(), vec![0.0, 0.0, 0.0, 1.0, 2.0]);
//! assert_eq!(fit_action(&[1.0, 2.0, 3.0], 2, ArmSide::Right).unwrap(), vec![1.0, 2.0]);
//! ```

use std::cmp::Ordering;

use telestudy_types::{ArmSide, DeviceSample, TeleopError};
use tracing::debug;

/// Length of the raw action: 3 translation, 3 rotation, 1 gripper.
pub const RAW_ACTION_LEN: usize = 7;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration & state
// ─────────────────────────────────────────────────────────────────────────────

/// Session-wide assembly settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblerConfig {
    pub arm: ArmSide,
    pub switch_on_grasp: bool,
    pub toggle_camera_on_grasp: bool,
    pub pos_sensitivity: f64,
    pub rot_sensitivity: f64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            arm: ArmSide::Right,
            switch_on_grasp: false,
            toggle_camera_on_grasp: false,
            pos_sensitivity: 1.0,
            rot_sensitivity: 1.0,
        }
    }
}

/// Mutable per-session state threaded through every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub active_arm: ArmSide,
    pub active_camera: usize,
    pub camera_count: usize,
    /// Gripper intent seen on the previous tick.
    pub last_grasp: f64,
    pub switch_on_grasp: bool,
    pub toggle_camera_on_grasp: bool,
    pub pos_sensitivity: f64,
    pub rot_sensitivity: f64,
}

impl SessionState {
    pub fn new(config: &AssemblerConfig, camera_count: usize) -> Self {
        Self {
            active_arm: config.arm,
            active_camera: 0,
            camera_count,
            last_grasp: 0.0,
            switch_on_grasp: config.switch_on_grasp,
            toggle_camera_on_grasp: config.toggle_camera_on_grasp,
            pos_sensitivity: config.pos_sensitivity,
            rot_sensitivity: config.rot_sensitivity,
        }
    }

    /// Forget the previous gripper intent so the next close is an edge.
    pub fn clear_grasp(&mut self) {
        self.last_grasp = 0.0;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Assembly
// ─────────────────────────────────────────────────────────────────────────────

/// Result of assembling one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Assembled {
    /// Step the simulation with `vector`.  `camera_changed` carries the new
    /// camera index when a grasp edge advanced it.
    Action {
        vector: Vec<f64>,
        camera_changed: Option<usize>,
    },
    /// The operator asked to end the episode; do not step.
    Reset,
}

/// Convert `sample` into an action of length `env_action_dim`.
///
/// # Errors
///
/// Returns [`TeleopError::InvalidSample`] when the pose delta or grasp is not
/// finite; `state` is left untouched.
///
/// Returns [`TeleopError::UnsupportedArm`] when the action needs padding and
/// the active arm is neither right nor left.  The grasp edge and
/// `last_grasp` are still applied to `state` in that case.
pub fn assemble(
    sample: &DeviceSample,
    state: &mut SessionState,
    env_action_dim: usize,
) -> Result<Assembled, TeleopError> {
    if sample.reset_requested {
        return Ok(Assembled::Reset);
    }
    if !sample.pose_delta.iter().chain([&sample.grasp]).all(|v| v.is_finite()) {
        return Err(TeleopError::InvalidSample(format!(
            "non-finite value in pose {:?} / grasp {}",
            sample.pose_delta, sample.grasp
        )));
    }

    let grasp = sample.grasp.clamp(-1.0, 1.0);
    let mut raw = Vec::with_capacity(RAW_ACTION_LEN);
    raw.extend(sample.pose_delta[..3].iter().map(|v| v * state.pos_sensitivity));
    raw.extend(sample.pose_delta[3..].iter().map(|v| v * state.rot_sensitivity));
    raw.push(grasp);

    let mut camera_changed = None;
    if state.last_grasp <= 0.0 && grasp > 0.0 {
        if state.switch_on_grasp {
            state.active_arm = state.active_arm.flipped();
            debug!(arm = %state.active_arm, "grasp edge switched arm");
        }
        if state.toggle_camera_on_grasp && state.camera_count > 0 {
            state.active_camera = (state.active_camera + 1) % state.camera_count;
            camera_changed = Some(state.active_camera);
            debug!(camera = state.active_camera, "grasp edge switched camera");
        }
    }
    state.last_grasp = grasp;

    let vector = fit_action(&raw, env_action_dim, state.active_arm)?;
    Ok(Assembled::Action { vector, camera_changed })
}

/// Pad or truncate `raw` to exactly `env_action_dim` values.
///
/// A shortfall is zero-filled on the side opposite the controlled arm: after
/// the values for the right arm, before them for the left arm.  Excess
/// values are dropped from the tail.
///
/// # Errors
///
/// Returns [`TeleopError::UnsupportedArm`] when padding is needed for any
/// arm other than right or left.
pub fn fit_action(raw: &[f64], env_action_dim: usize, arm: ArmSide) -> Result<Vec<f64>, TeleopError> {
    match env_action_dim.cmp(&raw.len()) {
        Ordering::Greater => {
            let pad = vec![0.0; env_action_dim - raw.len()];
            match arm {
                ArmSide::Right => Ok([raw, &pad].concat()),
                ArmSide::Left => Ok([&pad, raw].concat()),
                other => Err(TeleopError::UnsupportedArm(other.to_string())),
            }
        }
        Ordering::Less => Ok(raw[..env_action_dim].to_vec()),
        Ordering::Equal => Ok(raw.to_vec()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn state(switch: bool, toggle: bool) -> SessionState {
        SessionState::new(
            &AssemblerConfig {
                switch_on_grasp: switch,
                toggle_camera_on_grasp: toggle,
                ..AssemblerConfig::default()
            },
            3,
        )
    }

    fn grasp(value: f64) -> DeviceSample {
        DeviceSample {
            grasp: value,
            ..DeviceSample::idle()
        }
    }

    #[test]
    fn pads_after_for_right_and_before_for_left() {
        assert_eq!(fit_action(&[1.0, 2.0], 5, ArmSide::Right).unwrap(), vec![1.0, 2.0, 0.0, 0.0, 0.0]);
        assert_eq!(fit_action(&[1.0, 2.0], 5, ArmSide::Left).unwrap(), vec![0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn truncates_excess_from_tail() {
        assert_eq!(fit_action(&[1.0, 2.0, 3.0], 2, ArmSide::Right).unwrap(), vec![1.0, 2.0]);
        // Truncation and pass-through do not care which arm is active.
        assert_eq!(fit_action(&[1.0, 2.0, 3.0], 2, ArmSide::Bimanual).unwrap(), vec![1.0, 2.0]);
        assert_eq!(fit_action(&[1.0, 2.0], 2, ArmSide::Bimanual).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn padding_for_bimanual_is_unsupported() {
        let err = fit_action(&[1.0], 3, ArmSide::Bimanual).unwrap_err();
        assert!(matches!(err, TeleopError::UnsupportedArm(ref a) if a == "bimanual"));
    }

    #[test]
    fn output_length_matches_action_dim_for_every_sign() {
        let mut s = state(false, false);
        for dim in [2, 7, 14] {
            let Assembled::Action { vector, .. } = assemble(&grasp(-1.0), &mut s, dim).unwrap() else {
                panic!("expected an action");
            };
            assert_eq!(vector.len(), dim);
        }
    }

    #[test]
    fn sensitivities_scale_translation_and_rotation() {
        let mut s = state(false, false);
        s.pos_sensitivity = 2.0;
        s.rot_sensitivity = 0.5;
        let sample = DeviceSample {
            pose_delta: [1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            grasp: 3.0,
            reset_requested: false,
        };
        let Assembled::Action { vector, .. } = assemble(&sample, &mut s, 7).unwrap() else {
            panic!("expected an action");
        };
        assert_eq!(vector, vec![2.0, 2.0, 2.0, 0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn rising_grasp_edge_flips_arm_once() {
        let mut s = state(true, false);
        for g in [-1.0, -1.0, 0.5] {
            assemble(&grasp(g), &mut s, 14).unwrap();
        }
        assert_eq!(s.active_arm, ArmSide::Left);
        // Holding the gripper closed is not a new edge.
        assemble(&grasp(0.8), &mut s, 14).unwrap();
        assert_eq!(s.active_arm, ArmSide::Left);
    }

    #[test]
    fn grasp_edge_advances_camera_modulo_count() {
        let mut s = state(false, true);
        let mut changes = Vec::new();
        for g in [1.0, -1.0, 1.0, -1.0, 1.0] {
            if let Assembled::Action { camera_changed: Some(c), .. } = assemble(&grasp(g), &mut s, 7).unwrap() {
                changes.push(c);
            }
        }
        assert_eq!(changes, vec![1, 2, 0]);
        assert_eq!(s.active_arm, ArmSide::Right);
    }

    #[test]
    fn switch_and_toggle_fire_on_same_edge() {
        let mut s = state(true, true);
        let out = assemble(&grasp(1.0), &mut s, 14).unwrap();
        assert!(matches!(out, Assembled::Action { camera_changed: Some(1), .. }));
        assert_eq!(s.active_arm, ArmSide::Left);
    }

    #[test]
    fn reset_request_does_not_touch_state() {
        let mut s = state(true, true);
        let mut sample = grasp(1.0);
        sample.reset_requested = true;
        assert_eq!(assemble(&sample, &mut s, 7).unwrap(), Assembled::Reset);
        assert_eq!(s.last_grasp, 0.0);
        assert_eq!(s.active_arm, ArmSide::Right);
    }

    #[test]
    fn non_finite_sample_is_rejected_without_touching_state() {
        let mut s = state(true, true);
        assemble(&grasp(0.7), &mut s, 7).unwrap();
        let before = s.clone();

        let mut nan_pose = grasp(-1.0);
        nan_pose.pose_delta[0] = f64::NAN;
        let err = assemble(&nan_pose, &mut s, 7).unwrap_err();
        assert!(matches!(err, TeleopError::InvalidSample(_)));
        assert!(!err.is_fatal());

        let err = assemble(&grasp(f64::INFINITY), &mut s, 7).unwrap_err();
        assert!(matches!(err, TeleopError::InvalidSample(_)));
        assert_eq!(s, before);
    }

    #[test]
    fn cleared_grasp_makes_next_close_an_edge() {
        let mut s = state(true, false);
        assemble(&grasp(1.0), &mut s, 14).unwrap();
        assert_eq!(s.active_arm, ArmSide::Left);
        s.clear_grasp();
        assemble(&grasp(1.0), &mut s, 14).unwrap();
        assert_eq!(s.active_arm, ArmSide::Right);
    }
}
