// file: src/utils/telemetry.rs
// description: request timing with a slow-request warning
// reference: https://docs.rs/tracing

use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Times one labelled operation, such as `GET /todos/1`.
pub struct OperationTimer {
    label: String,
    started: Instant,
}

impl OperationTimer {
    pub fn new(label: &str) -> Self {
        debug!("{} started", label);
        Self {
            label: label.to_string(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        debug!("{} done in {} ms", self.label, elapsed.as_millis());
        elapsed
    }

    /// Logs a warning and returns `true` once `threshold` has been exceeded.
    pub fn warn_if_slow(&self, threshold: Duration) -> bool {
        let elapsed = self.elapsed();
        let slow = elapsed > threshold;
        if slow {
            warn!(
                label = %self.label,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = threshold.as_millis() as u64,
                "Slow request"
            );
        }
        slow
    }
}
