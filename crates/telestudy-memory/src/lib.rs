//! `telestudy-memory` – trial outcome persistence.
//!
//! # Modules
//!
//! - [`trial_log`] – the append-only [`TrialLog`][trial_log::TrialLog] trait
//!   with CSV, SQLite and in-memory stores.

pub mod trial_log;

pub use trial_log::{CsvTrialLog, InMemoryTrialLog, SqliteTrialLog, StoredTrial, TrialLog, TrialLogError};
