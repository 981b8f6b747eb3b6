//! [`ProfileRegistry`] – resolves robot names to validated profiles.
//!
//! Every model is validated when it is registered, so a malformed robot
//! description stops session construction before the first trial instead of
//! surfacing on the first control tick.

use std::collections::HashMap;

use telestudy_types::TeleopError;
use tracing::debug;

use crate::profile::{Manipulator, ManipulatorProfile, RobotModel};

/// Name → profile lookup for every robot a session may drive.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: HashMap<String, ManipulatorProfile>,
}

impl ProfileRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in [`RobotModel`].
    ///
    /// # Errors
    ///
    /// Returns the first [`TeleopError::Configuration`] raised by a built-in
    /// model.
    pub fn with_builtin() -> Result<Self, TeleopError> {
        let mut registry = Self::new();
        for model in RobotModel::ALL {
            registry.register(&model)?;
        }
        Ok(registry)
    }

    /// Validate `model` and register it under its own name.  Any previously
    /// registered profile with the same name is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Configuration`] when the model fails profile
    /// validation; the registry is left unchanged.
    pub fn register(&mut self, model: &dyn Manipulator) -> Result<(), TeleopError> {
        let profile = ManipulatorProfile::from_model(model)?;
        debug!(robot = profile.name(), joints = profile.joint_count(), "registered robot profile");
        self.profiles.insert(profile.name().to_string(), profile);
        Ok(())
    }

    /// Resolve `name` into its profile.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::UnknownRobot`] when `name` is not registered.
    pub fn resolve(&self, name: &str) -> Result<ManipulatorProfile, TeleopError> {
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| TeleopError::UnknownRobot(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Registered robot names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use telestudy_types::Vec3;

    use super::*;
    use crate::profile::{ArmType, BaseOffset, SurfaceKind};

    struct ShortArm {
        damping: usize,
        joints: usize,
    }

    impl Manipulator for ShortArm {
        fn name(&self) -> &str {
            "ShortArm"
        }
        fn joint_count(&self) -> usize {
            self.joints
        }
        fn joint_damping(&self) -> Vec<f64> {
            vec![0.2; self.damping]
        }
        fn init_qpos(&self) -> Vec<f64> {
            vec![0.0; 4]
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
            [0.0, 0.0, 0.5]
        }
        fn horizontal_radius(&self) -> f64 {
            0.3
        }
        fn arm_type(&self) -> ArmType {
            ArmType::Single
        }
    }

    #[test]
    fn builtin_registry_resolves_study_robots() {
        let registry = ProfileRegistry::with_builtin().unwrap();
        for name in ["Panda", "PandaWrist", "PandaSSLIM"] {
            let profile = registry.resolve(name).unwrap();
            assert_eq!(profile.name(), name);
        }
        assert_eq!(registry.names(), vec!["Panda", "PandaSSLIM", "PandaWrist"]);
    }

    #[test]
    fn unknown_robot_is_reported_by_name() {
        let registry = ProfileRegistry::with_builtin().unwrap();
        let err = registry.resolve("Sawyer").unwrap_err();
        assert_eq!(err, TeleopError::UnknownRobot("Sawyer".to_string()));
    }

    #[test]
    fn malformed_model_is_rejected_and_not_registered() {
        let mut registry = ProfileRegistry::new();
        let err = registry.register(&ShortArm { damping: 3, joints: 4 }).unwrap_err();
        assert!(err.is_fatal());
        assert!(!registry.contains("ShortArm"));
    }

    #[test]
    fn joint_vectors_must_match_declared_joint_count() {
        let mut registry = ProfileRegistry::new();
        let err = registry.register(&ShortArm { damping: 4, joints: 9 }).unwrap_err();
        assert!(matches!(err, TeleopError::Configuration(ref m) if m.contains("4 damping values for 9 joints")));
        assert!(!registry.contains("ShortArm"));
    }

    #[test]
    fn re_registering_replaces_profile() {
        let mut registry = ProfileRegistry::new();
        registry.register(&ShortArm { damping: 4, joints: 4 }).unwrap();
        assert_eq!(registry.resolve("ShortArm").unwrap().joint_count(), 4);
        registry.register(&ShortArm { damping: 4, joints: 4 }).unwrap();
        assert_eq!(registry.names().len(), 1);
    }
}
