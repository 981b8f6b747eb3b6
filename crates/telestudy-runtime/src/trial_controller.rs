//! [`TrialController`] – the lifecycle of one trial.
//!
//! ```text
//!            trial_ended
//!  Running ──────────────► TerminalPendingFeedback { remaining_ticks }
//!     ▲                                │ countdown reaches zero
//!     │  device reset, sim reset,      ▼
//!     └──────── start_control ────── Reset
//! ```
//!
//! While `Running` the task predicate is evaluated after every step and the
//! task's progress marker is drawn.  When a trial ends the record is appended
//! to the trial log exactly once, terminal feedback is drawn, and the
//! controller holds that frame for `dwell_ticks` ticks without stepping.
//! An operator reset request or a device disconnect jumps straight to
//! `Reset` without writing a record.

use telestudy_hal::{DeviceAdapter, FeedbackAnchor, Simulation};
use telestudy_memory::TrialLog;
use telestudy_types::{SuccessLevel, TeleopError, TrialRecord, TrialStatus, VisualMarker};
use tracing::{debug, info, info_span};

use crate::action_assembler::SessionState;
use crate::tasks::{FeedbackStyle, TaskSpec};

pub const FULL_SUCCESS_RGBA: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
pub const PARTIAL_SUCCESS_RGBA: [f32; 4] = [0.902, 0.616, 0.094, 0.6];
pub const FAILURE_RGBA: [f32; 4] = [1.0, 0.0, 0.0, 0.4];
pub const SUCCESS_LABEL_RGBA: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
pub const SUCCESS_LABEL: &str = "Success!";

/// Where the controller is in the current trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialPhase {
    Running,
    TerminalPendingFeedback { remaining_ticks: u32 },
    Reset,
}

/// Ticks to hold terminal feedback: `ceil(dwell_secs × control_freq)`.
pub fn dwell_ticks(dwell_secs: f64, control_freq: u32) -> u32 {
    let ticks = (dwell_secs.max(0.0) * f64::from(control_freq)).ceil();
    if ticks.is_finite() { ticks as u32 } else { 0 }
}

/// Drives one (task, robot) pair's trials.
pub struct TrialController {
    subject_name: String,
    task_id: String,
    feedback: FeedbackStyle,
    robot: String,
    dwell_ticks: u32,
    phase: TrialPhase,
    held: Vec<VisualMarker>,
    trials_recorded: u32,
}

impl TrialController {
    pub fn new(subject_name: &str, task: &TaskSpec, robot: &str, dwell_ticks: u32) -> Self {
        Self {
            subject_name: subject_name.to_string(),
            task_id: task.id.clone(),
            feedback: task.feedback,
            robot: robot.to_string(),
            dwell_ticks,
            phase: TrialPhase::Running,
            held: Vec::new(),
            trials_recorded: 0,
        }
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn trials_recorded(&self) -> u32 {
        self.trials_recorded
    }

    /// Evaluate the task predicate after a step.
    ///
    /// Returns the appended record when the trial ended on this tick.  Does
    /// nothing unless the controller is [`TrialPhase::Running`].
    ///
    /// # Errors
    ///
    /// A predicate fault becomes [`TeleopError::SimulationFault`]; a failed
    /// append becomes [`TeleopError::TrialLog`].  In both cases the phase is
    /// left unchanged.
    pub fn evaluate(
        &mut self,
        sim: &mut dyn Simulation,
        log: &mut dyn TrialLog,
    ) -> Result<Option<TrialRecord>, TeleopError> {
        if self.phase != TrialPhase::Running {
            return Ok(None);
        }
        let status = sim.check_success()?;
        let anchor = sim.feedback_anchor();

        if !status.trial_ended {
            if let Some(marker) = self.progress_marker(&status, &anchor) {
                sim.add_marker(marker);
            }
            return Ok(None);
        }

        let _span = info_span!("trial", trial = status.trial).entered();
        let record = TrialRecord::from_status(&self.subject_name, &self.task_id, &self.robot, &status);
        log.append(&record)?;
        self.trials_recorded += 1;
        info!(
            task = %record.task,
            robot = %record.robot,
            trial = record.trial,
            success = %record.success,
            success_time = record.success_time,
            "trial recorded"
        );

        self.held = self.terminal_markers(&status, &anchor);
        for marker in &self.held {
            sim.add_marker(marker.clone());
        }
        self.phase = match self.dwell_ticks {
            0 => TrialPhase::Reset,
            n => TrialPhase::TerminalPendingFeedback { remaining_ticks: n },
        };
        Ok(Some(record))
    }

    /// One dwell tick: redraw the held feedback and count down.
    pub fn hold(&mut self, sim: &mut dyn Simulation) {
        if let TrialPhase::TerminalPendingFeedback { remaining_ticks } = self.phase {
            for marker in &self.held {
                sim.add_marker(marker.clone());
            }
            self.phase = match remaining_ticks.saturating_sub(1) {
                0 => TrialPhase::Reset,
                n => TrialPhase::TerminalPendingFeedback { remaining_ticks: n },
            };
        }
    }

    /// End the current episode without a record.
    pub fn request_reset(&mut self) {
        debug!(phase = ?self.phase, "episode reset requested");
        self.phase = TrialPhase::Reset;
    }

    /// Start the next episode: clear the device, reset the simulation,
    /// re-arm the device and forget the previous grasp.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::SimulationFault`] when the simulation cannot
    /// reset.
    pub fn reset_episode(
        &mut self,
        sim: &mut dyn Simulation,
        device: &mut dyn DeviceAdapter,
        state: &mut SessionState,
    ) -> Result<(), TeleopError> {
        device.reset_internal_state();
        sim.reset()?;
        device.start_control();
        state.clear_grasp();
        self.held.clear();
        self.phase = TrialPhase::Running;
        debug!(task = %self.task_id, robot = %self.robot, "episode reset");
        Ok(())
    }

    fn progress_marker(&self, status: &TrialStatus, anchor: &FeedbackAnchor) -> Option<VisualMarker> {
        match (self.feedback, status.success) {
            (FeedbackStyle::Guide, _) => Some(VisualMarker::arrow(
                anchor.position,
                anchor.orientation,
                FULL_SUCCESS_RGBA,
            )),
            (FeedbackStyle::Graded, SuccessLevel::Graded(level)) => {
                let rgba = if level == SuccessLevel::GRADED_PARTIAL {
                    PARTIAL_SUCCESS_RGBA
                } else {
                    FAILURE_RGBA
                };
                Some(VisualMarker::arrow(anchor.position, anchor.orientation, rgba))
            }
            _ => None,
        }
    }

    fn terminal_markers(&self, status: &TrialStatus, anchor: &FeedbackAnchor) -> Vec<VisualMarker> {
        match (self.feedback, status.success) {
            (FeedbackStyle::Graded, SuccessLevel::Graded(level)) if level >= SuccessLevel::GRADED_FULL => {
                vec![VisualMarker::arrow(anchor.position, anchor.orientation, FULL_SUCCESS_RGBA)]
            }
            (_, SuccessLevel::Binary(true)) => {
                vec![VisualMarker::label(anchor.position, SUCCESS_LABEL, SUCCESS_LABEL_RGBA)]
            }
            _ => self.progress_marker(status, anchor).into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telestudy_hal::{SimFault, StepResult};
    use telestudy_memory::InMemoryTrialLog;
    use telestudy_types::{Contact, DeviceSample, MarkerShape};

    use crate::action_assembler::AssemblerConfig;

    /// Ends the trial with `outcome` once `end_tick` steps have run.
    struct ScriptedPredicateSim {
        steps: u32,
        end_tick: u32,
        outcome: SuccessLevel,
        trial: u32,
        resets: u32,
        fail_predicate: bool,
        markers: Vec<VisualMarker>,
    }

    impl ScriptedPredicateSim {
        fn new(end_tick: u32, outcome: SuccessLevel) -> Self {
            Self {
                steps: 0,
                end_tick,
                outcome,
                trial: 1,
                resets: 0,
                fail_predicate: false,
                markers: Vec::new(),
            }
        }
    }

    impl Simulation for ScriptedPredicateSim {
        fn reset(&mut self) -> Result<(), SimFault> {
            self.steps = 0;
            self.trial += 1;
            self.resets += 1;
            Ok(())
        }
        fn step(&mut self, _action: &[f64]) -> Result<StepResult, SimFault> {
            self.steps += 1;
            Ok(StepResult::default())
        }
        fn action_dim(&self) -> usize {
            7
        }
        fn contacts(&self) -> Vec<Contact> {
            Vec::new()
        }
        fn geom_name(&self, _id: usize) -> Option<&str> {
            None
        }
        fn add_marker(&mut self, marker: VisualMarker) {
            self.markers.push(marker);
        }
        fn camera_count(&self) -> usize {
            1
        }
        fn set_camera(&mut self, _index: usize) {}
        fn render(&mut self) -> Result<(), SimFault> {
            self.markers.clear();
            Ok(())
        }
        fn check_success(&mut self) -> Result<TrialStatus, SimFault> {
            if self.fail_predicate {
                return Err(SimFault::Predicate("object pose unavailable".to_string()));
            }
            let ended = self.steps >= self.end_tick;
            Ok(TrialStatus {
                trial_ended: ended,
                success: if ended { self.outcome } else { SuccessLevel::Graded(0) },
                elapsed: f64::from(self.steps) / 20.0,
                trial: self.trial,
                disturbance: None,
            })
        }
        fn feedback_anchor(&self) -> FeedbackAnchor {
            FeedbackAnchor {
                position: [0.0, 0.0, 1.0],
                orientation: [0.0, 0.0, 0.0],
            }
        }
    }

    #[derive(Default)]
    struct CountingDevice {
        starts: u32,
        resets: u32,
    }

    impl DeviceAdapter for CountingDevice {
        fn id(&self) -> &str {
            "counting"
        }
        fn start_control(&mut self) {
            self.starts += 1;
        }
        fn poll(&mut self) -> Result<Option<DeviceSample>, TeleopError> {
            Ok(Some(DeviceSample::idle()))
        }
        fn reset_internal_state(&mut self) {
            self.resets += 1;
        }
    }

    fn graded_task() -> TaskSpec {
        TaskSpec::new("ConstrainedReorient", "place the toppled object upright", FeedbackStyle::Graded)
    }

    #[test]
    fn dwell_ticks_rounds_up() {
        assert_eq!(dwell_ticks(3.0, 20), 60);
        assert_eq!(dwell_ticks(0.01, 20), 1);
        assert_eq!(dwell_ticks(0.0, 20), 0);
    }

    #[test]
    fn trial_ending_on_tick_ten_records_once_and_resumes_within_dwell() {
        let dwell = dwell_ticks(3.0, 20);
        let mut sim = ScriptedPredicateSim::new(10, SuccessLevel::Graded(2));
        let mut device = CountingDevice::default();
        let mut log = InMemoryTrialLog::new();
        let mut state = SessionState::new(&AssemblerConfig::default(), 1);
        let mut ctl = TrialController::new("s01", &graded_task(), "Panda", dwell);

        let mut recorded_on = None;
        for tick in 1..=10 {
            sim.step(&[0.0; 7]).unwrap();
            if ctl.evaluate(&mut sim, &mut log).unwrap().is_some() {
                recorded_on = Some(tick);
            }
        }
        assert_eq!(recorded_on, Some(10));
        assert_eq!(ctl.phase(), TrialPhase::TerminalPendingFeedback { remaining_ticks: dwell });

        let mut ticks_after = 0;
        while ctl.phase() != TrialPhase::Running {
            ticks_after += 1;
            ctl.hold(&mut sim);
            // Dwell ticks never step or re-evaluate.
            assert!(ctl.evaluate(&mut sim, &mut log).unwrap().is_none());
            if ctl.phase() == TrialPhase::Reset {
                ctl.reset_episode(&mut sim, &mut device, &mut state).unwrap();
            }
            assert!(ticks_after <= dwell, "still not running after {ticks_after} ticks");
        }
        assert_eq!(ticks_after, dwell);

        assert_eq!(log.records().len(), 1);
        let record = &log.records()[0];
        assert_eq!(record.success, SuccessLevel::Graded(2));
        assert!((record.success_time - 0.5).abs() < 1e-9);
        assert_eq!(record.trial, 1);

        assert_eq!(sim.resets, 1);
        assert_eq!(device.resets, 1);
        assert_eq!(device.starts, 1);
        assert_eq!(sim.steps, 0);
    }

    #[test]
    fn full_graded_success_holds_green_arrow() {
        let mut sim = ScriptedPredicateSim::new(1, SuccessLevel::Graded(2));
        let mut log = InMemoryTrialLog::new();
        let mut ctl = TrialController::new("s01", &graded_task(), "Panda", 2);
        sim.step(&[0.0; 7]).unwrap();
        ctl.evaluate(&mut sim, &mut log).unwrap();
        sim.render().unwrap();

        ctl.hold(&mut sim);
        assert_eq!(sim.markers.len(), 1);
        assert_eq!(sim.markers[0].shape, MarkerShape::Arrow);
        assert_eq!(sim.markers[0].rgba, FULL_SUCCESS_RGBA);
    }

    #[test]
    fn graded_progress_arrow_tracks_level() {
        let mut sim = ScriptedPredicateSim::new(100, SuccessLevel::Graded(2));
        let ctl = TrialController::new("s01", &graded_task(), "Panda", 2);
        let anchor = sim.feedback_anchor();
        let mut status = sim.check_success().unwrap();
        status.success = SuccessLevel::Graded(1);
        assert_eq!(ctl.progress_marker(&status, &anchor).unwrap().rgba, PARTIAL_SUCCESS_RGBA);
        status.success = SuccessLevel::Graded(0);
        assert_eq!(ctl.progress_marker(&status, &anchor).unwrap().rgba, FAILURE_RGBA);
    }

    #[test]
    fn binary_success_shows_label() {
        let task = TaskSpec::new("DrawerPick", "retrieve the green object from the box", FeedbackStyle::Label);
        let mut sim = ScriptedPredicateSim::new(1, SuccessLevel::Binary(true));
        let mut log = InMemoryTrialLog::new();
        let mut ctl = TrialController::new("s01", &task, "PandaSSLIM", 5);
        sim.step(&[0.0; 7]).unwrap();
        ctl.evaluate(&mut sim, &mut log).unwrap();
        assert_eq!(sim.markers.len(), 1);
        assert_eq!(sim.markers[0].label, SUCCESS_LABEL);
        assert_eq!(sim.markers[0].rgba, SUCCESS_LABEL_RGBA);
    }

    #[test]
    fn training_task_always_draws_guide_arrow() {
        let task = TaskSpec::new("Train", "gain familiarity", FeedbackStyle::Guide);
        let mut sim = ScriptedPredicateSim::new(u32::MAX, SuccessLevel::Binary(false));
        let mut log = InMemoryTrialLog::new();
        let mut ctl = TrialController::new("s01", &task, "Panda", 5);
        for _ in 0..3 {
            sim.step(&[0.0; 7]).unwrap();
            ctl.evaluate(&mut sim, &mut log).unwrap();
        }
        assert_eq!(sim.markers.len(), 3);
        assert!(sim.markers.iter().all(|m| m.rgba == FULL_SUCCESS_RGBA));
        assert!(log.records().is_empty());
    }

    #[test]
    fn predicate_fault_writes_no_record() {
        let mut sim = ScriptedPredicateSim::new(1, SuccessLevel::Graded(2));
        sim.fail_predicate = true;
        let mut log = InMemoryTrialLog::new();
        let mut ctl = TrialController::new("s01", &graded_task(), "Panda", 5);
        sim.step(&[0.0; 7]).unwrap();
        let err = ctl.evaluate(&mut sim, &mut log).unwrap_err();
        assert!(matches!(err, TeleopError::SimulationFault(_)));
        assert!(log.records().is_empty());
        assert_eq!(ctl.phase(), TrialPhase::Running);
    }

    #[test]
    fn reset_request_skips_record_and_clears_grasp() {
        let mut sim = ScriptedPredicateSim::new(100, SuccessLevel::Graded(2));
        let mut device = CountingDevice::default();
        let mut state = SessionState::new(&AssemblerConfig::default(), 1);
        state.last_grasp = 1.0;
        let mut ctl = TrialController::new("s01", &graded_task(), "Panda", 5);

        ctl.request_reset();
        assert_eq!(ctl.phase(), TrialPhase::Reset);
        ctl.reset_episode(&mut sim, &mut device, &mut state).unwrap();
        assert_eq!(ctl.phase(), TrialPhase::Running);
        assert_eq!(state.last_grasp, 0.0);
        assert_eq!(ctl.trials_recorded(), 0);
    }

    #[test]
    fn zero_dwell_goes_straight_to_reset() {
        let mut sim = ScriptedPredicateSim::new(1, SuccessLevel::Graded(0));
        let mut log = InMemoryTrialLog::new();
        let mut ctl = TrialController::new("s01", &graded_task(), "Panda", 0);
        sim.step(&[0.0; 7]).unwrap();
        ctl.evaluate(&mut sim, &mut log).unwrap();
        assert_eq!(ctl.phase(), TrialPhase::Reset);
    }
}
