//! Multiboot library exports.
//!
//! The binary is a thin CLI over these modules; integration tests drive
//! them directly with a fake `diskutil` and fake installer bundles.

pub mod config;
pub mod disk;
pub mod error;
pub mod installer;
pub mod interrupt;
pub mod orchestrator;
pub mod preflight;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod size;
pub mod timing;

pub use error::{Error, ErrorKind, Result};
