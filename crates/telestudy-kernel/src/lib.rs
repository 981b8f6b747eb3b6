//! `telestudy-kernel` – per-tick safety checks.
//!
//! Nothing here decides what the robot does; it only watches.
//!
//! # Modules
//!
//! - [`safety_monitor`] – [`SafetyMonitor`][safety_monitor::SafetyMonitor]:
//!   flags contacts where exactly one geometry belongs to the robot's
//!   safety-relevant link/gripper set, and builds the feedback marker for
//!   each.
//! - [`watchdog`] – [`DeviceWatchdog`][watchdog::DeviceWatchdog]:
//!   turns an operator device that has gone silent into a
//!   `DeviceDisconnect`.

pub mod safety_monitor;
pub mod watchdog;

pub use safety_monitor::{SafetyGeometrySet, SafetyMonitor};
pub use watchdog::{DeviceHealth, DeviceWatchdog};
