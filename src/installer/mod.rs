//! Installer bundles: discovery on the host and writing to the target volumes.

pub mod finder;
pub mod media;

use std::path::PathBuf;

pub use finder::{display_size_summary, find_installers, total_space_needed};
pub use media::{create_install_media, verify_volume, VolumeCheck};

/// One discovered installer, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerInfo {
    /// Display name from the catalog.
    pub name: String,
    /// The `.app` bundle.
    pub path: PathBuf,
    /// Label of the partition it is written to.
    pub volume: String,
    /// Measured bundle size, without margin.
    pub size_bytes: u64,
}
