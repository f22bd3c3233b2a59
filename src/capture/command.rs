//! Blocking device command execution

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::capture::device::FeatureAccess;
use crate::error::{Result, StreamError};
use crate::CommandConfig;

/// How long to wait for a command to report completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPolicy {
    pub poll_interval: Duration,
    /// `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl From<&CommandConfig> for CommandPolicy {
    fn from(config: &CommandConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout: (config.timeout_ms > 0).then(|| Duration::from_millis(config.timeout_ms)),
        }
    }
}

/// Issue `name` and sleep on the calling thread until the device reports it done.
pub fn run_command(features: &dyn FeatureAccess, name: &str, policy: &CommandPolicy) -> Result<()> {
    if let Err(e) = features.run_command(name) {
        error!("Command {} failed: {}", name, e);
        return Err(e);
    }

    let started = Instant::now();
    while !features.is_command_done(name) {
        if let Some(timeout) = policy.timeout {
            let waited = started.elapsed();
            if waited >= timeout {
                error!("Command {} not done after {:?}", name, waited);
                return Err(StreamError::CommandTimeout {
                    name: name.to_string(),
                    waited,
                });
            }
        }
        thread::sleep(policy.poll_interval);
    }

    debug!("Command {} done after {:?}", name, started.elapsed());
    Ok(())
}
