//! Disk discovery and metadata queries.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::diskutil;
use crate::config::Config;
use crate::error::Result;
use crate::interrupt;
use crate::size::format_gb;

/// Metadata from `diskutil info -plist <disk>`.
///
/// Only the keys the workflow relies on are decoded; `TotalSize` is
/// required, everything else is optional.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DiskInfo {
    pub total_size: u64,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub device_identifier: Option<String>,
    #[serde(default)]
    pub media_name: Option<String>,
    #[serde(default)]
    pub volume_name: Option<String>,
}

impl DiskInfo {
    pub fn from_plist(data: &[u8]) -> Result<Self> {
        Ok(plist::from_bytes(data)?)
    }
}

/// Decode a property list whose root is a dictionary.
pub fn parse_plist(data: &[u8]) -> Result<plist::Dictionary> {
    Ok(plist::from_bytes(data)?)
}

/// A removable disk offered to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalDisk {
    /// `/dev/diskN`
    pub identifier: String,
    pub size_bytes: u64,
    pub media_name: String,
}

impl fmt::Display for ExternalDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {}  {}",
            self.identifier,
            format_gb(self.size_bytes),
            self.media_name
        )
    }
}

/// Normalise `disk4` to `/dev/disk4`.
pub fn device_path(identifier: &str) -> String {
    if identifier.starts_with("/dev/") {
        identifier.to_string()
    } else {
        format!("/dev/{}", identifier)
    }
}

/// Whole-disk identifiers from a `diskutil list -plist` dictionary.
pub fn whole_disks(listing: &plist::Dictionary) -> Vec<String> {
    listing
        .get("WholeDisks")
        .and_then(|v| v.as_array())
        .map(|disks| {
            disks
                .iter()
                .filter_map(|d| d.as_string())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Query metadata for one disk.
pub fn get_disk_info(config: &Config, disk: &str) -> Result<DiskInfo> {
    let result = diskutil(config).args(["info", "-plist", disk]).run()?;
    DiskInfo::from_plist(result.stdout.as_bytes())
}

/// List external physical disks, never the internal one.
pub fn list_external_disks(config: &Config) -> Result<Vec<ExternalDisk>> {
    info!("Listing external disks");
    let result = diskutil(config)
        .args(["list", "-plist", "external", "physical"])
        .run()?;
    let listing = parse_plist(result.stdout.as_bytes())?;

    let mut disks = Vec::new();
    for identifier in whole_disks(&listing) {
        let path = device_path(&identifier);
        match get_disk_info(config, &path) {
            Ok(info) if info.internal => {
                debug!("Skipping internal disk {}", path);
            }
            Ok(info) => disks.push(ExternalDisk {
                identifier: path,
                size_bytes: info.total_size,
                media_name: info.media_name.unwrap_or_else(|| "Unknown media".to_string()),
            }),
            Err(e) => {
                warn!("Skipping {}: could not read disk information: {}", path, e);
            }
        }
    }

    info!("Found {} external disk(s)", disks.len());
    Ok(disks)
}

/// Advisory check of the total installer size against disk capacity.
///
/// Returns whether everything (including the last, flexible partition) fits.
/// Never blocks the run: the last partition is deliberately outside the hard
/// validation in the partitioner.
pub fn check_disk_space(config: &Config, disk: &str, total_needed: u64) -> Result<bool> {
    let info = get_disk_info(config, disk)?;
    if total_needed > info.total_size {
        warn!(
            "Installers need {} but {} only holds {}",
            format_gb(total_needed),
            disk,
            format_gb(info.total_size)
        );
        println!(
            "⚠️  The installers need {} (with margins) but {} is only {}.",
            format_gb(total_needed),
            disk,
            format_gb(info.total_size)
        );
        println!("   The last installer may not fit in the remaining space.");
        return Ok(false);
    }
    info!(
        "Disk space OK: {} needed, {} available",
        format_gb(total_needed),
        format_gb(info.total_size)
    );
    Ok(true)
}

/// Locate the mount point of the volume labelled `label`.
///
/// An exact match wins; otherwise a volume renamed by the OS to avoid a
/// clash (`"<label> 1"`) is accepted, the first one by name.
pub fn find_volume_path(volumes_dir: &Path, label: &str) -> Option<PathBuf> {
    let exact = volumes_dir.join(label);
    if exact.is_dir() {
        return Some(exact);
    }

    let mut renamed: Vec<PathBuf> = fs::read_dir(volumes_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| is_renamed_volume(&entry.file_name().to_string_lossy(), label))
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    renamed.sort();
    renamed.into_iter().next()
}

fn is_renamed_volume(name: &str, label: &str) -> bool {
    name.strip_prefix(label)
        .and_then(|rest| rest.strip_prefix(' '))
        .is_some_and(|suffix| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
}

/// Poll until the volume labelled `label` is mounted or the configured
/// timeout passes. Gives up early on Ctrl-C. Never fails, only reports.
pub fn wait_for_volume(config: &Config, label: &str) -> bool {
    let deadline = Instant::now() + config.volume_wait;
    debug!(
        "Waiting up to {}s for volume '{}'",
        config.volume_wait.as_secs(),
        label
    );
    loop {
        if let Some(path) = find_volume_path(&config.volumes_dir, label) {
            debug!("Volume '{}' mounted at {}", label, path.display());
            return true;
        }
        if interrupt::is_interrupted() {
            debug!("Stopped waiting for volume '{}': interrupted", label);
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            warn!("Volume '{}' did not appear within {:?}", label, config.volume_wait);
            return false;
        }
        thread::sleep(config.poll_interval.min(deadline - now));
    }
}
