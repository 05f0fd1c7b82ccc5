//! Phase timing.

use std::time::{Duration, Instant};

use tracing::info;

/// A simple timer for measuring workflow phase durations.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    /// Start a new timer with the given phase name.
    pub fn start(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    /// Finish the timer and log the elapsed time.
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        info!("{} took {}", self.name, format_elapsed(elapsed));
        elapsed
    }
}

/// `"42.0s"` or `"3.5m"`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42.0s");
        assert_eq!(format_elapsed(Duration::from_secs(210)), "3.5m");
    }

    #[test]
    fn test_timer_measures() {
        let timer = Timer::start("phase");
        assert!(timer.finish() < Duration::from_secs(5));
    }
}
