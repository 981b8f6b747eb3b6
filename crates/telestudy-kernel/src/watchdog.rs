//! [`DeviceWatchdog`] – operator device liveness.
//!
//! Devices may return "no fresh data" on a tick without that being a fault.
//! The watchdog turns a device that has stayed silent for longer than its
//! timeout into a [`TeleopError::DeviceDisconnect`], which the session loop
//! treats like an operator reset request.
//!
//! Call [`DeviceWatchdog::arm`] when control starts, [`DeviceWatchdog::feed`]
//! on every fresh sample, and [`DeviceWatchdog::check`] once per tick.

use std::time::{Duration, Instant};

use telestudy_types::TeleopError;
use tracing::warn;

/// Health of the watched device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceHealth {
    /// Not armed; silence is expected.
    Idle,
    /// A fresh sample arrived within the timeout.
    Live,
    /// Silent for longer than the timeout.
    Silent,
}

/// Detects an operator device that stopped producing samples.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use telestudy_kernel::watchdog::{DeviceHealth, DeviceWatchdog};
///
/// let mut wd = DeviceWatchdog::new("spacemouse", Duration::from_secs(1));
/// assert_eq!(wd.health(), DeviceHealth::Idle);
/// wd.arm();
/// wd.feed();
/// assert_eq!(wd.health(), DeviceHealth::Live);
/// assert!(wd.check().is_ok());
/// ```
#[derive(Debug)]
pub struct DeviceWatchdog {
    device_id: String,
    timeout: Duration,
    last_fresh: Option<Instant>,
}

impl DeviceWatchdog {
    pub fn new(device_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            device_id: device_id.into(),
            timeout,
            last_fresh: None,
        }
    }

    /// Start the deadline from now.  Re-arming resets it.
    pub fn arm(&mut self) {
        self.last_fresh = Some(Instant::now());
    }

    /// Stop watching until the next [`arm`][Self::arm].
    pub fn disarm(&mut self) {
        self.last_fresh = None;
    }

    /// Record a fresh sample.  No-op while disarmed.
    pub fn feed(&mut self) {
        if self.last_fresh.is_some() {
            self.last_fresh = Some(Instant::now());
        }
    }

    pub fn health(&self) -> DeviceHealth {
        match self.last_fresh {
            None => DeviceHealth::Idle,
            Some(t) if t.elapsed() <= self.timeout => DeviceHealth::Live,
            Some(_) => DeviceHealth::Silent,
        }
    }

    /// # Errors
    ///
    /// Returns [`TeleopError::DeviceDisconnect`] when the device is
    /// [`DeviceHealth::Silent`].
    pub fn check(&self) -> Result<(), TeleopError> {
        if self.health() == DeviceHealth::Silent {
            warn!(device = %self.device_id, timeout_ms = self.timeout.as_millis() as u64, "device silent past timeout");
            return Err(TeleopError::DeviceDisconnect(format!(
                "{} sent no samples for {:?}",
                self.device_id, self.timeout
            )));
        }
        Ok(())
    }
}
