//! `telestudy-runtime` – the teleoperation session loop.
//!
//! # Modules
//!
//! - [`action_assembler`] – turns a device sample into the simulation's
//!   action vector, handling grasp-edge arm and camera switching.
//! - [`tasks`] – the study task catalogue, task prompts and the
//!   training-first shuffled session order.
//! - [`trial_controller`] – [`TrialController`][trial_controller::TrialController]:
//!   success detection, feedback markers, one record per trial, dwell and
//!   episode reset.
//! - [`session_runner`] – [`SessionRunner`][session_runner::SessionRunner]:
//!   prompts, per-pair simulation lifecycle and the fixed tick order.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console/JSON
//!   logging with optional OTLP export.

pub mod action_assembler;
pub mod session_runner;
pub mod tasks;
pub mod telemetry;
pub mod trial_controller;

pub use action_assembler::{Assembled, AssemblerConfig, SessionState, assemble, fit_action};
pub use session_runner::{
    Acknowledger, Acknowledgment, IterationOutcome, PairOutcome, SessionConfig, SessionReport, SessionRunner,
};
pub use tasks::{FeedbackStyle, TaskCatalogue, TaskSpec};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use trial_controller::{TrialController, TrialPhase};
