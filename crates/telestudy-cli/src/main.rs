//! `telestudy` – runs a teleoperation study session from the terminal.
//!
//! 1. Loads `~/.telestudy/config.toml`, asking for a subject name and saving
//!    defaults on first run.
//! 2. Opens the subject's trial log (CSV or SQLite).
//! 3. Runs the session headless: the kinematic simulation stands in for the
//!    physics backend and a scripted device drives each trial to the goal.
//! 4. Ctrl-C finishes the current tick, leaves the pair and ends the session.

mod config;
mod prompt;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use telestudy_hal::ProfileRegistry;
use telestudy_hal::sim::{KinematicSimConfig, KinematicSimFactory, ScriptedDevice, ScriptedDeviceFactory};
use telestudy_memory::{CsvTrialLog, SqliteTrialLog, TrialLog};
use telestudy_runtime::{IterationOutcome, SessionReport, SessionRunner, TaskCatalogue, init_tracing};
use telestudy_types::TeleopError;

use config::{Config, LogBackend};

/// Tick cap per pair when the config sets none, so the headless run ends.
const HEADLESS_PAIR_TICKS: u64 = 600;
/// Ticks the scripted operator takes to reach the goal.
const SCRIPTED_REACH_TICKS: usize = 40;

fn main() -> ExitCode {
    let _guard = init_tracing("telestudy");
    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – ending the session after this tick …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; Ctrl-C will abort without cleanup");
    }

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => return fatal(&e),
    };

    match run(cfg, shutdown) {
        Ok(report) => {
            print_report(&report);
            if report.faults().next().is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => fatal(&e),
    }
}

fn run(cfg: Config, shutdown: Arc<AtomicBool>) -> Result<SessionReport, TeleopError> {
    cfg.validate()?;
    let registry = ProfileRegistry::with_builtin()?;
    let log = open_trial_log(&cfg)?;

    let base = KinematicSimConfig::default();
    let sims = KinematicSimFactory { base: base.clone() };
    let toward_goal = [
        (base.goal[0] - base.home[0]) / base.gain,
        (base.goal[1] - base.home[1]) / base.gain,
        (base.goal[2] - base.home[2]) / base.gain,
    ];
    let devices = ScriptedDeviceFactory {
        samples: ScriptedDevice::straight_line(toward_goal, SCRIPTED_REACH_TICKS),
        repeat: false,
    };

    let mut session = cfg.session_config();
    session.max_steps_per_pair = session.max_steps_per_pair.or(Some(HEADLESS_PAIR_TICKS));

    println!(
        "  Subject {} · trial log {}",
        cfg.subject_name.bold(),
        cfg.trial_log_path().display().to_string().dimmed()
    );

    let mut runner = SessionRunner::new(
        session,
        registry,
        TaskCatalogue::study(),
        Box::new(sims),
        Box::new(devices),
        log,
        Box::new(prompt::ConsoleAcknowledger::stdio().with_shutdown(Arc::clone(&shutdown))),
        shutdown,
    )?;
    runner.run()
}

fn open_trial_log(cfg: &Config) -> Result<Box<dyn TrialLog>, TeleopError> {
    let path = cfg.trial_log_path();
    let log: Box<dyn TrialLog> = match cfg.log_backend {
        LogBackend::Csv => Box::new(CsvTrialLog::open(path)?),
        LogBackend::Sqlite => {
            std::fs::create_dir_all(&cfg.data_directory).map_err(|e| {
                TeleopError::TrialLog(format!("failed to create {}: {e}", cfg.data_directory.display()))
            })?;
            Box::new(SqliteTrialLog::open(path)?)
        }
    };
    Ok(log)
}

fn fatal(err: &TeleopError) -> ExitCode {
    error!(error = %err, "session cannot start");
    println!("{}: {}", "Fatal".red().bold(), err);
    ExitCode::FAILURE
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      TeleStudy First-Run Setup       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();

    let mut cfg = Config::default();
    cfg.subject_name = prompt_line(&format!("  Subject name [{}]: ", cfg.subject_name), &cfg.subject_name);

    println!("  Where should trial records go?");
    println!("    1) CSV file   (default)");
    println!("    2) SQLite database");
    if prompt_line("  Enter choice [1]: ", "1").trim() == "2" {
        cfg.log_backend = LogBackend::Sqlite;
    }
    config::apply_env_overrides(&mut cfg);

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  ______     __      ______          __     "#.bold().cyan());
    println!("{}", r#" /_  __/__  / /__   / __/ /___ _____/ /_ __ "#.bold().cyan());
    println!("{}", r#"  / / / -_)/ / -_) _\ \/ __/ // / _  / // / "#.bold().cyan());
    println!("{}", r#" /_/  \__/_/\__/ /___/\__/\_,_/\_,_/\_, /  "#.bold().cyan());
    println!("{}", r#"                                   /___/   "#.bold().cyan());
    println!();
    println!("  {} {}", "TeleStudy".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Teleoperation user-study session runner");
    println!();
}

fn print_report(report: &SessionReport) {
    println!();
    println!("{}", "  Session summary".bold());
    for pair in &report.pairs {
        match &pair.outcome {
            IterationOutcome::Completed { trials } => println!(
                "    {} {:<22} {:<12} {} trial(s)",
                "✓".green(),
                pair.task,
                pair.robot,
                trials
            ),
            IterationOutcome::Fault { reason, trials } => println!(
                "    {} {:<22} {:<12} {} trial(s), then {}",
                "✗".red(),
                pair.task,
                pair.robot,
                trials,
                reason.red()
            ),
        }
    }
    println!("  {} trial(s) recorded.", report.trials_recorded().to_string().bold());
    if report.quit {
        println!("  {}", "Session ended at the operator's request.".yellow());
    }
    if report.interrupted {
        println!("  {}", "Session interrupted.".yellow());
    }
}

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{msg}");
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
