//! Static manipulator descriptions.
//!
//! Every robot variant in a study implements the [`Manipulator`] capability
//! trait.  Variants differ only in the values they return; the control loop
//! never branches on which robot it is driving.  A [`ManipulatorProfile`] is
//! the validated, immutable snapshot of those values that the rest of the
//! session works with.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt;

use telestudy_types::{TeleopError, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Placement
// ────────────────────────────────────────────────────────────────────────────

/// Surface the robot base is placed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    Bins,
    Empty,
    Table,
}

/// Base placement offset for one surface kind.
#[derive(Clone, Copy)]
pub enum BaseOffset {
    Fixed(Vec3),
    /// Offset computed from the table length.
    TableRelative(fn(f64) -> Vec3),
}

impl BaseOffset {
    pub fn resolve(&self, table_length: f64) -> Vec3 {
        match self {
            BaseOffset::Fixed(v) => *v,
            BaseOffset::TableRelative(f) => f(table_length),
        }
    }
}

impl fmt::Debug for BaseOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseOffset::Fixed(v) => f.debug_tuple("Fixed").field(v).finish(),
            BaseOffset::TableRelative(_) => f.write_str("TableRelative(<fn>)"),
        }
    }
}

/// Number of arms a robot model carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmType {
    Single,
    Bimanual,
}

// ────────────────────────────────────────────────────────────────────────────
// Capability trait
// ────────────────────────────────────────────────────────────────────────────

/// Capability set every robot variant supplies.
pub trait Manipulator: Send + Sync {
    /// Registry name, e.g. `"PandaWrist"`.
    fn name(&self) -> &str;
    /// Number of actuated arm joints.
    fn joint_count(&self) -> usize;
    /// Per-joint damping override.
    fn joint_damping(&self) -> Vec<f64>;
    /// Joint angles the robot is reset to at the start of every trial.
    fn init_qpos(&self) -> Vec<f64>;
    fn default_mount(&self) -> &str;
    fn default_gripper(&self) -> &str;
    fn default_controller(&self) -> &str;
    fn base_offsets(&self) -> HashMap<SurfaceKind, BaseOffset>;
    fn top_offset(&self) -> Vec3;
    fn horizontal_radius(&self) -> f64;
    fn arm_type(&self) -> ArmType;
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in variants
// ────────────────────────────────────────────────────────────────────────────

/// The Franka Panda family used in the study.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotModel {
    /// Stock Panda with the Panda parallel gripper.
    Panda,
    /// Panda with an additional two-joint wrist carrying the SSLIM hand.
    PandaWrist,
    /// Stock Panda arm with the SSLIM hand as end-effector.
    PandaSslim,
}

impl RobotModel {
    pub const ALL: [RobotModel; 3] = [RobotModel::Panda, RobotModel::PandaWrist, RobotModel::PandaSslim];
}

fn panda_table_offset(table_length: f64) -> Vec3 {
    [-0.16 - table_length / 2.0, 0.0, 0.0]
}

impl Manipulator for RobotModel {
    fn name(&self) -> &str {
        match self {
            RobotModel::Panda => "Panda",
            RobotModel::PandaWrist => "PandaWrist",
            RobotModel::PandaSslim => "PandaSSLIM",
        }
    }

    fn joint_count(&self) -> usize {
        match self {
            RobotModel::Panda | RobotModel::PandaSslim => 7,
            RobotModel::PandaWrist => 9,
        }
    }

    fn joint_damping(&self) -> Vec<f64> {
        match self {
            RobotModel::Panda | RobotModel::PandaSslim => {
                vec![0.1, 0.1, 0.1, 0.1, 0.1, 0.01, 0.01]
            }
            RobotModel::PandaWrist => vec![0.1, 0.1, 0.1, 0.1, 0.1, 0.01, 0.01, 0.01, 0.01],
        }
    }

    fn init_qpos(&self) -> Vec<f64> {
        match self {
            RobotModel::Panda => vec![0.0, PI / 16.0, 0.0, -PI / 2.0 - PI / 3.0, 0.0, PI - 0.2, PI / 4.0],
            RobotModel::PandaWrist => vec![
                0.0,
                -PI / 2.5,
                0.0,
                -PI / 2.5 - PI / 2.2,
                0.0,
                PI - 0.4,
                PI / 4.0,
                PI / 2.5,
                0.0,
            ],
            RobotModel::PandaSslim => {
                vec![0.0, -PI / 2.5, 0.0, -PI / 2.5 - PI / 2.2, 0.0, PI - 0.4, PI / 4.0]
            }
        }
    }

    fn default_mount(&self) -> &str {
        "RethinkMount"
    }

    fn default_gripper(&self) -> &str {
        match self {
            RobotModel::Panda => "PandaGripper",
            RobotModel::PandaWrist | RobotModel::PandaSslim => SSLIM_HAND,
        }
    }

    fn default_controller(&self) -> &str {
        "default_panda"
    }

    fn base_offsets(&self) -> HashMap<SurfaceKind, BaseOffset> {
        HashMap::from([
            (SurfaceKind::Bins, BaseOffset::Fixed([-0.5, -0.1, 0.0])),
            (SurfaceKind::Empty, BaseOffset::Fixed([-0.6, 0.0, 0.0])),
            (SurfaceKind::Table, BaseOffset::TableRelative(panda_table_offset)),
        ])
    }

    fn top_offset(&self) -> Vec3 {
        [0.0, 0.0, 1.0]
    }

    fn horizontal_radius(&self) -> f64 {
        0.5
    }

    fn arm_type(&self) -> ArmType {
        ArmType::Single
    }
}

/// Gripper identifier of the SSLIM hand.
pub const SSLIM_HAND: &str = "SSLIMHand";

// ────────────────────────────────────────────────────────────────────────────
// Validated profile
// ────────────────────────────────────────────────────────────────────────────

/// Immutable, validated configuration of one robot variant.
#[derive(Debug, Clone)]
pub struct ManipulatorProfile {
    name: String,
    joint_damping: Vec<f64>,
    init_qpos: Vec<f64>,
    default_mount: String,
    default_gripper: String,
    default_controller: String,
    base_offsets: HashMap<SurfaceKind, BaseOffset>,
    top_offset: Vec3,
    horizontal_radius: f64,
    arm_type: ArmType,
}

impl ManipulatorProfile {
    /// Snapshot `model` into a profile.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Configuration`] when the model has no joints or
    /// when its damping or initial joint vector does not have one entry per
    /// declared joint.
    pub fn from_model(model: &dyn Manipulator) -> Result<Self, TeleopError> {
        let joint_count = model.joint_count();
        let joint_damping = model.joint_damping();
        let init_qpos = model.init_qpos();
        if joint_count == 0 {
            return Err(TeleopError::Configuration(format!(
                "robot '{}' declares no joints",
                model.name()
            )));
        }
        for (what, len) in [("damping", joint_damping.len()), ("initial joint", init_qpos.len())] {
            if len != joint_count {
                return Err(TeleopError::Configuration(format!(
                    "robot '{}': {len} {what} values for {joint_count} joints",
                    model.name()
                )));
            }
        }
        if !model.horizontal_radius().is_finite() || model.horizontal_radius() < 0.0 {
            return Err(TeleopError::Configuration(format!(
                "robot '{}': horizontal radius must be a non-negative number",
                model.name()
            )));
        }

        Ok(Self {
            name: model.name().to_string(),
            joint_damping,
            init_qpos,
            default_mount: model.default_mount().to_string(),
            default_gripper: model.default_gripper().to_string(),
            default_controller: model.default_controller().to_string(),
            base_offsets: model.base_offsets(),
            top_offset: model.top_offset(),
            horizontal_radius: model.horizontal_radius(),
            arm_type: model.arm_type(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint_count(&self) -> usize {
        self.init_qpos.len()
    }

    pub fn joint_damping(&self) -> &[f64] {
        &self.joint_damping
    }

    pub fn init_qpos(&self) -> &[f64] {
        &self.init_qpos
    }

    pub fn default_mount(&self) -> &str {
        &self.default_mount
    }

    pub fn default_gripper(&self) -> &str {
        &self.default_gripper
    }

    pub fn default_controller(&self) -> &str {
        &self.default_controller
    }

    /// Base offset for `surface`, or `None` if the robot has no placement
    /// defined for it.
    pub fn base_offset(&self, surface: SurfaceKind, table_length: f64) -> Option<Vec3> {
        self.base_offsets.get(&surface).map(|o| o.resolve(table_length))
    }

    pub fn top_offset(&self) -> Vec3 {
        self.top_offset
    }

    pub fn horizontal_radius(&self) -> f64 {
        self.horizontal_radius
    }

    pub fn arm_type(&self) -> ArmType {
        self.arm_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LopsidedArm;

    impl Manipulator for LopsidedArm {
        fn name(&self) -> &str {
            "Lopsided"
        }
        fn joint_count(&self) -> usize {
            7
        }
        fn joint_damping(&self) -> Vec<f64> {
            vec![0.1; 6]
        }
        fn init_qpos(&self) -> Vec<f64> {
            vec![0.0; 7]
        }
        fn default_mount(&self) -> &str {
            "NullMount"
        }
        fn default_gripper(&self) -> &str {
            "PandaGripper"
        }
        fn default_controller(&self) -> &str {
            "default_panda"
        }
        fn base_offsets(&self) -> HashMap<SurfaceKind, BaseOffset> {
            HashMap::new()
        }
        fn top_offset(&self) -> Vec3 {
            [0.0, 0.0, 1.0]
        }
        fn horizontal_radius(&self) -> f64 {
            0.5
        }
        fn arm_type(&self) -> ArmType {
            ArmType::Single
        }
    }

    #[test]
    fn every_builtin_model_has_consistent_joint_vectors() {
        for model in RobotModel::ALL {
            let profile = ManipulatorProfile::from_model(&model).unwrap();
            assert_eq!(profile.joint_damping().len(), profile.joint_count());
            assert_eq!(profile.init_qpos().len(), profile.joint_count());
        }
    }

    #[test]
    fn wrist_variant_has_nine_joints() {
        let profile = ManipulatorProfile::from_model(&RobotModel::PandaWrist).unwrap();
        assert_eq!(profile.joint_count(), 9);
        assert_eq!(profile.default_gripper(), SSLIM_HAND);
        assert_eq!(profile.default_mount(), "RethinkMount");
    }

    #[test]
    fn mismatched_damping_fails_at_construction() {
        let err = ManipulatorProfile::from_model(&LopsidedArm).unwrap_err();
        assert!(matches!(err, TeleopError::Configuration(ref m) if m.contains("6 damping values for 7 joints")));
    }

    #[test]
    fn table_offset_depends_on_table_length() {
        let profile = ManipulatorProfile::from_model(&RobotModel::Panda).unwrap();
        let offset = profile.base_offset(SurfaceKind::Table, 0.8).unwrap();
        assert!((offset[0] - (-0.56)).abs() < 1e-12);
        assert_eq!(offset[1], 0.0);
    }

    #[test]
    fn fixed_offsets_ignore_table_length() {
        let profile = ManipulatorProfile::from_model(&RobotModel::PandaSslim).unwrap();
        assert_eq!(profile.base_offset(SurfaceKind::Bins, 10.0), Some([-0.5, -0.1, 0.0]));
        assert_eq!(profile.base_offset(SurfaceKind::Empty, 0.0), Some([-0.6, 0.0, 0.0]));
    }

    #[test]
    fn missing_surface_yields_none() {
        let mut profile = ManipulatorProfile::from_model(&RobotModel::Panda).unwrap();
        profile.base_offsets.remove(&SurfaceKind::Bins);
        assert!(profile.base_offset(SurfaceKind::Bins, 0.8).is_none());
    }
}
