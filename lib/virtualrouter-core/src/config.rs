//! Controller configuration

use std::time::Duration;

use crate::workqueue::{default_controller_rate_limiter, MaxOf};
use crate::{ControllerError, Result};

/// Runtime settings of the VirtualRouter controller
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Number of concurrent sync workers
    pub workers: usize,
    /// First per-key retry delay
    pub backoff_base: Duration,
    /// Upper bound of the per-key retry delay
    pub backoff_max: Duration,
    /// Overall requeue rate shared by all keys
    pub qps: f64,
    /// Requeues allowed in a burst above `qps`
    pub burst: u32,
    /// Component name events are reported under
    pub reporter: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_secs(1000),
            qps: 10.0,
            burst: 100,
            reporter: "virtual-router".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Reject settings under which the controller could never make progress
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ControllerError::InvalidConfig(
                "at least one worker is required".to_string(),
            ));
        }
        if !(self.qps.is_finite() && self.qps > 0.0) {
            return Err(ControllerError::InvalidConfig(format!(
                "qps must be a positive number, got {}",
                self.qps
            )));
        }
        if self.backoff_base > self.backoff_max {
            return Err(ControllerError::InvalidConfig(format!(
                "backoff base {:?} exceeds backoff max {:?}",
                self.backoff_base, self.backoff_max
            )));
        }
        Ok(())
    }

    /// Rate limiter for requeues of failed keys
    pub fn rate_limiter(&self) -> MaxOf<String> {
        default_controller_rate_limiter(self.backoff_base, self.backoff_max, self.qps, self.burst)
    }
}
