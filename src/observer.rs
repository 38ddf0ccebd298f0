use std::fmt;
use std::time::Duration;

use tracing::{error, info, warn};

/// Vendor step an acquisition attempt was in when it reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generate,
    Reserve,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => f.write_str("generate"),
            Self::Reserve => f.write_str("reserve"),
        }
    }
}

/// Presentation hooks for a generation run. Every method defaults to a no-op.
pub trait RunObserver: Send + Sync {
    fn alias_generated(&self, _address: &str) {}

    fn alias_reserved(&self, _address: &str) {}

    fn step_failed(&self, _stage: Stage, _reason: &str, _attempt: u32) {}

    fn retry_scheduled(&self, _stage: Stage, _next_attempt: u32, _delay: Duration) {}

    fn rate_limited(&self, _stage: Stage, _reason: &str) {}

    fn gave_up(&self, _stage: Stage, _reason: &str) {}

    fn batch_started(&self, _batch_size: usize, _remaining: usize) {}

    fn progress(&self, _completed: usize, _total: usize) {}

    fn cooling_down(&self, _delay: Duration) {}
}

/// Discards every event.
#[cfg(test)]
pub struct SilentObserver;

#[cfg(test)]
impl RunObserver for SilentObserver {}

/// Turns run events into log lines.
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn alias_generated(&self, address: &str) {
        info!("[50%] \"{address}\" generated");
    }

    fn alias_reserved(&self, address: &str) {
        info!("[100%] \"{address}\" reserved");
    }

    fn step_failed(&self, stage: Stage, reason: &str, attempt: u32) {
        error!("{stage} failed on attempt {}: {reason}", attempt + 1);
    }

    fn retry_scheduled(&self, stage: Stage, next_attempt: u32, delay: Duration) {
        info!(
            "Retrying from {stage} (attempt {}) in {:.1}s",
            next_attempt + 1,
            delay.as_secs_f64()
        );
    }

    fn rate_limited(&self, stage: Stage, reason: &str) {
        warn!("Rate limit hit during {stage}: {reason}");
    }

    fn gave_up(&self, stage: Stage, reason: &str) {
        error!("Giving up on this alias after {stage} kept failing: {reason}");
    }

    fn batch_started(&self, batch_size: usize, remaining: usize) {
        info!("Generating a batch of {batch_size} ({remaining} remaining)");
    }

    fn progress(&self, completed: usize, total: usize) {
        info!("Progress: {completed}/{total}");
    }

    fn cooling_down(&self, delay: Duration) {
        info!("Waiting {} before the next batch", format_delay(delay));
    }
}

/// Renders a delay as `1h 05m 00s`.
pub fn format_delay(delay: Duration) -> String {
    let total = delay.as_secs();
    let (hours, rest) = (total / 3_600, total % 3_600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    format!("{hours}h {minutes:02}m {seconds:02}s")
}
