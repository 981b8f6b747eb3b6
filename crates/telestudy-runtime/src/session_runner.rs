//! [`SessionRunner`] – sequences a whole study session.
//!
//! For every task (training first, the rest shuffled) the operator
//! acknowledges a task prompt; for every robot (reshuffled per task) a
//! scenario prompt.  Each (task, robot) pair then gets a fresh simulation
//! and device, and runs ticks in a fixed order until the operator closes
//! the viewer:
//!
//! 1. **Poll** the device (`None` keeps the previous grasp, zero motion).
//! 2. **Watch** device liveness; a silent device resets the episode.
//! 3. **Assemble** the action; a reset request resets the episode and an
//!    unusable sample skips the tick.
//! 4. **Step** the simulation.
//! 5. **Scan** contacts and draw a marker for each flagged one.
//! 6. **Evaluate** the trial predicate (may append a record).
//! 7. **Render**.
//!
//! While the trial controller holds terminal feedback, steps 1–6 are
//! replaced by redrawing the held frame.
//!
//! A fault inside a pair is reported as [`IterationOutcome::Fault`] and the
//! session moves on to the next pair.  Configuration problems are caught by
//! [`SessionRunner::new`] before any prompt is shown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use telestudy_hal::{
    DeviceAdapter, DeviceFactory, DeviceOptions, ManipulatorProfile, ProfileRegistry, SimFault, Simulation,
    SimulationFactory, SimulationRequest,
};
use telestudy_kernel::{DeviceWatchdog, SafetyMonitor};
use telestudy_memory::TrialLog;
use telestudy_types::{ArmSide, DeviceSample, TeleopError};
use tracing::{debug, info, instrument, warn};

use crate::action_assembler::{Assembled, AssemblerConfig, SessionState, assemble};
use crate::tasks::{self, TRAINING_TASK, TaskCatalogue, TaskSpec};
use crate::trial_controller::{self, TrialController, TrialPhase};

/// Shown before every (task, robot) pair.
pub const SCENARIO_PROMPT: &str = "Press any key to begin the next scenario.";

// ─────────────────────────────────────────────────────────────────────────────
// Acknowledgment
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgment {
    Continue,
    Quit,
}

/// Blocks until the operator acknowledges `text`.
pub trait Acknowledger {
    fn acknowledge(&mut self, text: &str) -> Result<Acknowledgment, TeleopError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the runner needs to sequence a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub subject_name: String,
    pub arm: ArmSide,
    pub switch_on_grasp: bool,
    pub toggle_camera_on_grasp: bool,
    pub pos_sensitivity: f64,
    pub rot_sensitivity: f64,
    pub controller: String,
    pub control_freq: u32,
    pub dwell_secs: f64,
    pub tasks: Vec<String>,
    pub training_task: Option<String>,
    pub robots: Vec<String>,
    /// Fixes task and robot order; `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Stop a pair after this many ticks even if the viewer stays open.
    pub max_steps_per_pair: Option<u64>,
    /// Silence after which the device counts as disconnected.
    pub device_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subject_name: "subject".to_string(),
            arm: ArmSide::Right,
            switch_on_grasp: false,
            toggle_camera_on_grasp: false,
            pos_sensitivity: 1.0,
            rot_sensitivity: 1.0,
            controller: "OSC_POSE".to_string(),
            control_freq: 20,
            dwell_secs: 3.0,
            tasks: vec![
                TRAINING_TASK.to_string(),
                "ConstrainedReorient".to_string(),
                "Bookshelf".to_string(),
                "DrawerPick".to_string(),
            ],
            training_task: Some(TRAINING_TASK.to_string()),
            robots: vec!["Panda".to_string(), "PandaWrist".to_string(), "PandaSSLIM".to_string()],
            seed: None,
            max_steps_per_pair: None,
            device_timeout: Duration::from_secs(2),
        }
    }
}

impl SessionConfig {
    pub fn assembler(&self) -> AssemblerConfig {
        AssemblerConfig {
            arm: self.arm,
            switch_on_grasp: self.switch_on_grasp,
            toggle_camera_on_grasp: self.toggle_camera_on_grasp,
            pos_sensitivity: self.pos_sensitivity,
            rot_sensitivity: self.rot_sensitivity,
        }
    }

    pub fn dwell_ticks(&self) -> u32 {
        trial_controller::dwell_ticks(self.dwell_secs, self.control_freq)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// How one (task, robot) pair ended.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// The viewer closed (or the pair hit its tick limit) normally.
    Completed { trials: u32 },
    /// The pair was torn down early; no record was written for the trial in
    /// progress.  `trials` counts the records appended before the fault.
    Fault { reason: String, trials: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairOutcome {
    pub task: String,
    pub robot: String,
    pub outcome: IterationOutcome,
}

/// Every pair the session ran, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    pub pairs: Vec<PairOutcome>,
    /// The operator quit at a prompt.
    pub quit: bool,
    /// A shutdown was requested (Ctrl-C).
    pub interrupted: bool,
}

impl SessionReport {
    pub fn trials_recorded(&self) -> u32 {
        self.pairs
            .iter()
            .map(|p| match p.outcome {
                IterationOutcome::Completed { trials } | IterationOutcome::Fault { trials, .. } => trials,
            })
            .sum()
    }

    pub fn faults(&self) -> impl Iterator<Item = &PairOutcome> {
        self.pairs
            .iter()
            .filter(|p| matches!(p.outcome, IterationOutcome::Fault { .. }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionRunner
// ─────────────────────────────────────────────────────────────────────────────

pub struct SessionRunner {
    config: SessionConfig,
    registry: ProfileRegistry,
    catalogue: TaskCatalogue,
    monitor: SafetyMonitor,
    sims: Box<dyn SimulationFactory>,
    devices: Box<dyn DeviceFactory>,
    log: Box<dyn TrialLog>,
    prompts: Box<dyn Acknowledger>,
    shutdown: Arc<AtomicBool>,
}

impl SessionRunner {
    /// Validate `config` against the registry and catalogue.
    ///
    /// # Errors
    ///
    /// [`TeleopError::UnknownTask`], [`TeleopError::UnknownRobot`] or
    /// [`TeleopError::Configuration`]; all are fatal.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SessionConfig,
        registry: ProfileRegistry,
        catalogue: TaskCatalogue,
        sims: Box<dyn SimulationFactory>,
        devices: Box<dyn DeviceFactory>,
        log: Box<dyn TrialLog>,
        prompts: Box<dyn Acknowledger>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, TeleopError> {
        if config.control_freq == 0 {
            return Err(TeleopError::Configuration("control_freq must be positive".to_string()));
        }
        if config.controller.trim().is_empty() {
            return Err(TeleopError::Configuration("controller name is empty".to_string()));
        }
        if config.robots.is_empty() {
            return Err(TeleopError::Configuration("no robots configured".to_string()));
        }
        for task in config.tasks.iter().chain(config.training_task.as_ref()) {
            catalogue.get(task)?;
        }
        for robot in &config.robots {
            registry.resolve(robot)?;
        }
        Ok(Self {
            config,
            registry,
            catalogue,
            monitor: SafetyMonitor::default(),
            sims,
            devices,
            log,
            prompts,
            shutdown,
        })
    }

    /// Replace the default contact safety monitor.
    pub fn with_monitor(mut self, monitor: SafetyMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run the whole session.
    ///
    /// # Errors
    ///
    /// Only a failing acknowledgment prompt or an unknown task aborts the
    /// session; pair-level faults are collected in the report.
    #[instrument(name = "session", skip_all, fields(subject = %self.config.subject_name))]
    pub fn run(&mut self) -> Result<SessionReport, TeleopError> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let order = tasks::session_order(self.config.training_task.as_deref(), &self.config.tasks, &mut rng);
        info!(subject = %self.config.subject_name, tasks = ?order, "session starting");

        let mut report = SessionReport::default();
        for task_id in order {
            if self.shutdown_requested() {
                report.interrupted = true;
                break;
            }
            let task = self.catalogue.get(&task_id)?.clone();
            if self.prompts.acknowledge(&task.prompt())? == Acknowledgment::Quit {
                report.quit = true;
                break;
            }

            for robot in tasks::robot_order(&self.config.robots, &mut rng) {
                if self.shutdown_requested() {
                    report.interrupted = true;
                    break;
                }
                if self.prompts.acknowledge(SCENARIO_PROMPT)? == Acknowledgment::Quit {
                    report.quit = true;
                    break;
                }

                let mut controller =
                    TrialController::new(&self.config.subject_name, &task, &robot, self.config.dwell_ticks());
                let outcome = match self.run_pair(&task, &robot, &mut controller) {
                    Ok(()) => IterationOutcome::Completed {
                        trials: controller.trials_recorded(),
                    },
                    Err(err) => {
                        warn!(
                            task = %task.id,
                            robot = %robot,
                            error = %err,
                            trials = controller.trials_recorded(),
                            "pair aborted"
                        );
                        eprintln!("[telestudy] {}/{} aborted: {err}", task.id, robot);
                        IterationOutcome::Fault {
                            reason: err.to_string(),
                            trials: controller.trials_recorded(),
                        }
                    }
                };
                report.pairs.push(PairOutcome {
                    task: task.id.clone(),
                    robot,
                    outcome,
                });
            }
            if report.quit || report.interrupted {
                break;
            }
        }

        info!(
            pairs = report.pairs.len(),
            trials = report.trials_recorded(),
            quit = report.quit,
            interrupted = report.interrupted,
            "session finished"
        );
        Ok(report)
    }

    /// Build the pair's simulation, drive it, and always close it.
    #[instrument(name = "pair", skip_all, fields(task = %task.id, robot = %robot))]
    fn run_pair(&mut self, task: &TaskSpec, robot: &str, controller: &mut TrialController) -> Result<(), TeleopError> {
        let profile = self.registry.resolve(robot)?;
        let request = SimulationRequest {
            task: &task.id,
            profile: &profile,
            controller: &self.config.controller,
            control_freq: self.config.control_freq,
        };
        let mut sim = self.sims.build(&request)?;
        info!(task = %task.id, robot = %robot, action_dim = sim.action_dim(), "pair starting");
        let result = self.drive_pair(task, &profile, sim.as_mut(), controller);
        sim.close();
        result
    }

    fn drive_pair(
        &mut self,
        task: &TaskSpec,
        profile: &ManipulatorProfile,
        sim: &mut dyn Simulation,
        controller: &mut TrialController,
    ) -> Result<(), TeleopError> {
        let options = DeviceOptions::for_pair(
            &task.id,
            profile,
            self.config.pos_sensitivity,
            self.config.rot_sensitivity,
        );
        let mut device = self.devices.connect(&options)?;
        let mut state = SessionState::new(&self.config.assembler(), sim.camera_count());
        let mut watchdog = DeviceWatchdog::new(device.id(), self.config.device_timeout);

        sim.reset()?;
        device.start_control();
        watchdog.arm();

        let mut ticks: u64 = 0;
        loop {
            if self.shutdown_requested() {
                info!(task = %task.id, robot = profile.name(), "shutdown requested, leaving pair");
                break;
            }
            if let Some(limit) = self.config.max_steps_per_pair
                && ticks >= limit
            {
                info!(task = %task.id, robot = profile.name(), ticks, "tick limit reached");
                break;
            }
            ticks += 1;

            match controller.phase() {
                TrialPhase::Running => {
                    self.control_tick(sim, device.as_mut(), &mut watchdog, &mut state, controller)?;
                }
                TrialPhase::TerminalPendingFeedback { .. } => controller.hold(sim),
                TrialPhase::Reset => {}
            }
            if controller.phase() == TrialPhase::Reset {
                controller.reset_episode(sim, device.as_mut(), &mut state)?;
                watchdog.arm();
            }

            match sim.render() {
                Ok(()) => {}
                Err(SimFault::ViewerClosed) => {
                    info!(task = %task.id, robot = profile.name(), "viewer closed");
                    break;
                }
                Err(fault) => return Err(fault.into()),
            }
        }
        Ok(())
    }

    /// Steps 1–6 of a running tick.
    fn control_tick(
        &mut self,
        sim: &mut dyn Simulation,
        device: &mut dyn DeviceAdapter,
        watchdog: &mut DeviceWatchdog,
        state: &mut SessionState,
        controller: &mut TrialController,
    ) -> Result<(), TeleopError> {
        let fresh = match device.poll() {
            Ok(sample) => sample,
            Err(TeleopError::DeviceDisconnect(reason)) => {
                warn!(device = device.id(), %reason, "device disconnected, resetting episode");
                controller.request_reset();
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if fresh.is_some() {
            watchdog.feed();
        } else if watchdog.check().is_err() {
            controller.request_reset();
            return Ok(());
        }
        let sample = fresh.unwrap_or(DeviceSample {
            grasp: state.last_grasp,
            ..DeviceSample::idle()
        });

        match assemble(&sample, state, sim.action_dim()) {
            Ok(Assembled::Reset) => {
                info!(device = device.id(), "operator requested reset");
                controller.request_reset();
                return Ok(());
            }
            Ok(Assembled::Action { vector, camera_changed }) => {
                if let Some(camera) = camera_changed {
                    sim.set_camera(camera);
                }
                sim.step(&vector)?;
            }
            Err(err @ (TeleopError::UnsupportedArm(_) | TeleopError::InvalidSample(_))) => {
                warn!(error = %err, "tick skipped");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        let contacts = sim.contacts();
        let flagged: Vec<_> = self
            .monitor
            .scan(&contacts, |id| sim.geom_name(id).map(str::to_string))
            .collect();
        for event in &flagged {
            sim.add_marker(SafetyMonitor::marker_for(event));
        }

        if let Some(record) = controller.evaluate(sim, self.log.as_mut())? {
            debug!(trial = record.trial, contacts = flagged.len(), "trial closed on this tick");
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
