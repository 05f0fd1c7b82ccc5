//! Ctrl-C handling.
//!
//! SIGINT reaches the running `diskutil`/`createinstallmedia` child through
//! the terminal's process group, so the child stops on its own. The handler
//! here only records the interrupt; the orchestrator checks the flag between
//! phases and after failures, restores the disk if needed and exits with 130.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

use crate::error::Error;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the process-wide SIGINT handler.
pub fn install_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        INTERRUPTED.store(true, Ordering::SeqCst);
        eprintln!("\nInterrupt received, stopping after the current step...");
    })
    .context("Failed to install Ctrl-C handler")
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Record an interrupt without a signal.
pub fn raise() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Clear the flag.
pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Fail with [`Error::Interrupted`] if an interrupt has been received.
pub fn checkpoint() -> Result<(), Error> {
    if is_interrupted() {
        return Err(Error::Interrupted);
    }
    Ok(())
}
