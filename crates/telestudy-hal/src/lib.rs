//! `telestudy-hal` – robot, device and simulation boundaries.
//!
//! # Modules
//!
//! - [`profile`] – the [`Manipulator`][profile::Manipulator] capability trait,
//!   the built-in [`RobotModel`][profile::RobotModel] variants and the
//!   validated [`ManipulatorProfile`][profile::ManipulatorProfile].
//! - [`registry`] – [`ProfileRegistry`][registry::ProfileRegistry]: resolves a
//!   robot name to its profile.
//! - [`device`] – the [`DeviceAdapter`][device::DeviceAdapter] input boundary.
//! - [`simulation`] – the [`Simulation`][simulation::Simulation] backend
//!   boundary and its factory.
//! - [`sim`] – headless [`KinematicSim`][sim::KinematicSim] and
//!   [`ScriptedDevice`][sim::ScriptedDevice] for CI and rehearsal runs.

pub mod device;
pub mod profile;
pub mod registry;
pub mod sim;
pub mod simulation;

pub use device::{DeviceAdapter, DeviceFactory, DeviceOptions};
pub use profile::{ArmType, BaseOffset, Manipulator, ManipulatorProfile, RobotModel, SurfaceKind};
pub use registry::ProfileRegistry;
pub use simulation::{FeedbackAnchor, SimFault, Simulation, SimulationFactory, SimulationRequest, StepResult};
