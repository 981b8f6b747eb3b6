//! Simulation boundary.
//!
//! The physics/rendering backend is an external collaborator.  The session
//! loop only relies on the contract below: reset, step, contact listing,
//! feedback markers, camera selection, rendering and the task's success
//! predicate.

use telestudy_types::{Contact, TeleopError, TrialStatus, Vec3, VisualMarker};
use thiserror::Error;

use crate::profile::ManipulatorProfile;

/// Faults raised by a simulation backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimFault {
    /// The operator closed the viewer; the (task, robot) pair is finished.
    #[error("viewer closed by operator")]
    ViewerClosed,
    #[error("step failed: {0}")]
    Step(String),
    #[error("success predicate failed: {0}")]
    Predicate(String),
    #[error("render failed: {0}")]
    Render(String),
}

impl From<SimFault> for TeleopError {
    fn from(fault: SimFault) -> Self {
        TeleopError::SimulationFault(fault.to_string())
    }
}

/// Result of one simulation step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResult {
    pub observation: Vec<f64>,
    pub reward: f64,
    pub done: bool,
}

/// Where task feedback markers are anchored in the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackAnchor {
    pub position: Vec3,
    /// XYZ Euler angles of the goal pose, for guidance arrows.
    pub orientation: Vec3,
}

/// A running simulation of one task with one robot.
pub trait Simulation {
    /// Start a new episode.
    fn reset(&mut self) -> Result<(), SimFault>;

    /// Apply `action` for one control step.
    fn step(&mut self, action: &[f64]) -> Result<StepResult, SimFault>;

    /// Length of the action vector [`step`][Self::step] expects.
    fn action_dim(&self) -> usize;

    /// Contacts present after the most recent step.
    fn contacts(&self) -> Vec<Contact>;

    /// Name of geometry `id`, if it has one.
    fn geom_name(&self, id: usize) -> Option<&str>;

    /// Draw `marker` on the next rendered frame.
    fn add_marker(&mut self, marker: VisualMarker);

    fn camera_count(&self) -> usize;

    fn set_camera(&mut self, index: usize);

    /// Present the current frame.  Pacing to the control frequency happens
    /// here.
    fn render(&mut self) -> Result<(), SimFault>;

    /// Evaluate the task's success predicate for the current state.
    fn check_success(&mut self) -> Result<TrialStatus, SimFault>;

    fn feedback_anchor(&self) -> FeedbackAnchor;

    /// Release backend resources.  Called once when the pair ends.
    fn close(&mut self) {}
}

/// Parameters for building a simulation for one (task, robot) pair.
#[derive(Debug, Clone, Copy)]
pub struct SimulationRequest<'a> {
    pub task: &'a str,
    pub profile: &'a ManipulatorProfile,
    pub controller: &'a str,
    pub control_freq: u32,
}

/// Builds a fresh simulation for every (task, robot) pair.
pub trait SimulationFactory {
    /// # Errors
    ///
    /// Returns [`TeleopError::SimulationFault`] or
    /// [`TeleopError::UnknownTask`] when the backend cannot be constructed.
    fn build(&mut self, request: &SimulationRequest<'_>) -> Result<Box<dyn Simulation>, TeleopError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_fault_converts_to_simulation_fault() {
        let err: TeleopError = SimFault::Step("nan in qacc".to_string()).into();
        assert_eq!(err, TeleopError::SimulationFault("step failed: nan in qacc".to_string()));
    }

    #[test]
    fn viewer_closed_display() {
        assert_eq!(SimFault::ViewerClosed.to_string(), "viewer closed by operator");
    }
}
