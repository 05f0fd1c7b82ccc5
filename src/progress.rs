//! Live progress for long-running external commands.
//!
//! Neither `diskutil` nor `createinstallmedia` reports a percentage, so one
//! is inferred from two sources:
//! - an ordered table of [`ProgressRule`]s matched against each output line,
//! - elapsed time against a rough estimate of the total duration.
//!
//! The result is cosmetic. Whether a command succeeded is decided by its exit
//! status alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::trace;

use crate::error::Result;
use crate::process::{Cmd, CommandOutput};

/// Animation refresh interval.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Time-based estimation stays silent for this long.
pub const TIME_HEURISTIC_DELAY: Duration = Duration::from_secs(5);

/// Time-based estimation never goes past this percentage.
pub const TIME_HEURISTIC_CEILING: u8 = 90;

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "];

/// `(substring, percent, message)` used to recognise a stage in tool output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressRule {
    /// Lower-case substring to look for.
    pub pattern: &'static str,
    pub percent: u8,
    pub message: &'static str,
}

impl ProgressRule {
    pub const fn new(pattern: &'static str, percent: u8, message: &'static str) -> Self {
        Self {
            pattern,
            percent,
            message,
        }
    }
}

/// First rule whose pattern occurs in the lower-cased line.
pub fn match_rule<'a>(line: &str, rules: &'a [ProgressRule]) -> Option<&'a ProgressRule> {
    let line = line.to_lowercase();
    rules.iter().find(|rule| line.contains(rule.pattern))
}

/// Percentage implied by elapsed time alone, capped at the ceiling.
pub fn time_based_percent(elapsed: Duration, estimate: Duration) -> u8 {
    let estimate_ms = estimate.as_millis();
    if estimate_ms == 0 {
        return TIME_HEURISTIC_CEILING;
    }
    let percent = elapsed.as_millis() * u128::from(TIME_HEURISTIC_CEILING) / estimate_ms;
    percent.min(u128::from(TIME_HEURISTIC_CEILING)) as u8
}

#[derive(Debug)]
struct State {
    percent: u8,
    message: Option<String>,
}

/// Progress of one operation, shared between the output reader and the
/// animation ticker.
///
/// The percentage only ever grows: every proposal lower than the current
/// value is dropped.
#[derive(Debug)]
pub struct ProgressTracker {
    operation: String,
    estimate: Duration,
    start: Instant,
    state: Mutex<State>,
}

impl ProgressTracker {
    pub fn new(operation: &str, estimate: Duration) -> Self {
        Self {
            operation: operation.to_string(),
            estimate,
            start: Instant::now(),
            state: Mutex::new(State {
                percent: 0,
                message: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Adopt `percent` and `message` unless that would move backwards.
    pub fn propose(&self, percent: u8, message: &str) -> bool {
        let percent = percent.min(100);
        let mut state = self.state();
        if percent < state.percent {
            return false;
        }
        state.percent = percent;
        state.message = Some(message.to_string());
        true
    }

    /// Match one line of tool output against `rules`.
    pub fn apply_line(&self, line: &str, rules: &[ProgressRule]) -> bool {
        match match_rule(line, rules) {
            Some(rule) => self.propose(rule.percent, rule.message),
            None => false,
        }
    }

    /// Advance from elapsed time, for tools that stay quiet for minutes.
    pub fn apply_elapsed(&self, elapsed: Duration) -> bool {
        let mut state = self.state();
        if elapsed <= TIME_HEURISTIC_DELAY || state.percent >= TIME_HEURISTIC_CEILING {
            return false;
        }
        let percent = time_based_percent(elapsed, self.estimate);
        if percent <= state.percent {
            return false;
        }
        state.percent = percent;
        if state.message.is_none() {
            state.message = Some(self.in_progress_message());
        }
        true
    }

    /// Apply the time heuristic using the real clock.
    pub fn tick(&self) -> bool {
        self.apply_elapsed(self.start.elapsed())
    }

    /// Mark the operation finished.
    pub fn complete(&self) {
        self.state().percent = 100;
    }

    pub fn percent(&self) -> u8 {
        self.state().percent
    }

    pub fn message(&self) -> String {
        self.state()
            .message
            .clone()
            .unwrap_or_else(|| self.in_progress_message())
    }

    /// `"<message> <percent>%"`, as shown next to the spinner.
    pub fn status_line(&self) -> String {
        let state = self.state();
        let message = match &state.message {
            Some(message) => message.clone(),
            None => self.in_progress_message(),
        };
        format!("{} {}%", message, state.percent)
    }

    fn in_progress_message(&self) -> String {
        format!("{} in progress...", self.operation)
    }
}

/// Animated single-line indicator driven by a [`ProgressTracker`].
///
/// A ticker thread refreshes the line every [`TICK_INTERVAL`] until the
/// monitor is stopped or dropped; stopping clears the line.
pub struct ProgressMonitor {
    tracker: Arc<ProgressTracker>,
    running: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
    bar: ProgressBar,
}

impl ProgressMonitor {
    pub fn start(operation: &str, estimate: Duration) -> Self {
        let tracker = Arc::new(ProgressTracker::new(operation, estimate));
        let running = Arc::new(AtomicBool::new(true));

        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("   {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);
        bar.set_style(style);

        let ticker = {
            let tracker = Arc::clone(&tracker);
            let running = Arc::clone(&running);
            let bar = bar.clone();
            thread::spawn(move || {
                while running.load(Ordering::Acquire) {
                    tracker.tick();
                    bar.set_message(tracker.status_line());
                    bar.tick();
                    thread::sleep(TICK_INTERVAL);
                }
            })
        };

        Self {
            tracker,
            running,
            ticker: Some(ticker),
            bar,
        }
    }

    pub fn tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
            self.bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run `cmd` with its merged output feeding a live progress indicator.
///
/// Returns the exit status and all output lines; a non-zero exit is not
/// turned into an error here so callers can inspect the output first.
pub fn run_with_progress(
    cmd: &Cmd,
    operation: &str,
    rules: &'static [ProgressRule],
    estimate: Duration,
) -> Result<CommandOutput> {
    let monitor = ProgressMonitor::start(operation, estimate);
    let tracker = monitor.tracker();

    let line_tracker = Arc::clone(&tracker);
    let running = cmd.spawn_merged(move |line| {
        trace!("{}", line);
        line_tracker.apply_line(line, rules);
    })?;

    let output = running.wait()?;
    if output.success() {
        tracker.complete();
    }
    monitor.stop();
    Ok(output)
}
