//! Operator input boundary.
//!
//! Concrete drivers (SpaceMouse, keyboard, VR controller, …) live outside this
//! workspace and implement [`DeviceAdapter`].  The session loop polls the
//! adapter once per control tick; there are no callbacks.

use telestudy_types::{DeviceSample, TeleopError};

use crate::profile::{ManipulatorProfile, SSLIM_HAND};

/// A 6-DoF operator input device with a gripper channel.
pub trait DeviceAdapter {
    /// Stable identifier, e.g. `"spacemouse"`.
    fn id(&self) -> &str;

    /// Arm the device for a new episode.
    fn start_control(&mut self);

    /// Read the latest sample.
    ///
    /// Returns `Ok(None)` when the device has no fresh data this tick.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::DeviceDisconnect`] when the device signal is
    /// lost.
    fn poll(&mut self) -> Result<Option<DeviceSample>, TeleopError>;

    /// Clear drift and offset tracking between trials.
    fn reset_internal_state(&mut self);
}

/// Per-(task, robot) options handed to the device driver on connect.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceOptions {
    pub pos_sensitivity: f64,
    pub rot_sensitivity: f64,
    /// Map the gripper channel to a Robotiq-style parallel gripper.
    pub use_robotiq: bool,
    /// Drawer tasks remap one device axis to the drawer slide.
    pub drawer: bool,
}

impl DeviceOptions {
    /// Options for driving `profile` through `task`.
    pub fn for_pair(task: &str, profile: &ManipulatorProfile, pos_sensitivity: f64, rot_sensitivity: f64) -> Self {
        Self {
            pos_sensitivity,
            rot_sensitivity,
            use_robotiq: profile.default_gripper() != SSLIM_HAND,
            drawer: task.contains("DrawerPick"),
        }
    }
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            pos_sensitivity: 1.0,
            rot_sensitivity: 1.0,
            use_robotiq: true,
            drawer: false,
        }
    }
}

/// Connects a device for each (task, robot) pair.
pub trait DeviceFactory {
    /// # Errors
    ///
    /// Returns [`TeleopError::DeviceDisconnect`] when no device is reachable.
    fn connect(&mut self, options: &DeviceOptions) -> Result<Box<dyn DeviceAdapter>, TeleopError>;
}
