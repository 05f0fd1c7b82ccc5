//! Partition layout and execution.
//!
//! A [`PartitionPlan`] can only be built through validation, so nothing
//! destructive ever runs with a layout that does not fit the disk.

use std::fmt;
use std::time::Duration;

use tracing::{error, info};

use super::detection::get_disk_info;
use super::diskutil;
use super::management::{
    extract_process_info, failure_text, is_in_use_failure, mark_reported, print_in_use_guidance,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::installer::InstallerInfo;
use crate::process::Cmd;
use crate::progress::{run_with_progress, ProgressRule};
use crate::size::{format_for_partition_tool, format_gb, format_remaining, partition_size_bytes};

pub const PARTITION_SCHEME: &str = "GPT";
pub const PARTITION_FORMAT: &str = "JHFS+";

/// diskutil's "all remaining space" size.
pub const REMAINING_SPACE: &str = "0b";

const PARTITION_RULES: &[ProgressRule] = &[
    ProgressRule::new("unmounting", 10, "Unmounting disk..."),
    ProgressRule::new("unmount", 10, "Unmounting disk..."),
    ProgressRule::new("creating partition", 20, "Creating partition map..."),
    ProgressRule::new(
        "waiting for partitions to activate",
        40,
        "Waiting for partitions...",
    ),
    ProgressRule::new("formatting", 60, "Formatting partitions..."),
    ProgressRule::new("mounting", 80, "Mounting volumes..."),
    ProgressRule::new("mount", 80, "Mounting volumes..."),
    ProgressRule::new("finished", 100, "Done!"),
    ProgressRule::new("complete", 100, "Done!"),
];

const PARTITION_ESTIMATE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeToken {
    /// Explicit size such as `"13G"`.
    Fixed(String),
    /// Takes whatever is left.
    Remaining,
}

impl fmt::Display for SizeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeToken::Fixed(size) => f.write_str(size),
            SizeToken::Remaining => f.write_str(REMAINING_SPACE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    pub name: String,
    pub label: String,
    pub size: SizeToken,
}

/// Sum of the fixed partitions: every installer but the last.
pub fn fixed_partitions_size(installers: &[InstallerInfo]) -> u64 {
    match installers.split_last() {
        Some((_, fixed)) => fixed.iter().map(|i| partition_size_bytes(i.size_bytes)).sum(),
        None => 0,
    }
}

/// Check the fixed partitions fit on a disk of `disk_size` bytes.
///
/// Returns the bytes they need. A total equal to the disk size is accepted.
/// The last installer is not counted: it gets whatever is left, and a
/// single installer always passes.
pub fn validate_partition_sizes(installers: &[InstallerInfo], disk_size: u64) -> Result<u64> {
    let needed = fixed_partitions_size(installers);
    if needed > disk_size {
        error!(
            "Partitions too large: {} needed, {} available",
            format_gb(needed),
            format_gb(disk_size)
        );
        return Err(Error::SizingInvalid {
            needed,
            available: disk_size,
        });
    }
    info!(
        "Validation passed: {} needed for fixed partitions, {} available",
        format_gb(needed),
        format_gb(disk_size)
    );
    Ok(needed)
}

/// Validated layout of the target disk, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub disk: String,
    pub disk_size: u64,
    pub fixed_bytes: u64,
    pub entries: Vec<PartitionEntry>,
}

impl PartitionPlan {
    /// Validate and lay out `installers` on a disk of known size.
    pub fn new(disk: &str, disk_size: u64, installers: &[InstallerInfo]) -> Result<Self> {
        let fixed_bytes = validate_partition_sizes(installers, disk_size)?;
        let last = installers.len().saturating_sub(1);
        let entries = installers
            .iter()
            .enumerate()
            .map(|(index, installer)| PartitionEntry {
                name: installer.name.clone(),
                label: installer.volume.clone(),
                size: if index == last {
                    SizeToken::Remaining
                } else {
                    SizeToken::Fixed(format_for_partition_tool(installer.size_bytes))
                },
            })
            .collect();

        Ok(Self {
            disk: disk.to_string(),
            disk_size,
            fixed_bytes,
            entries,
        })
    }

    /// Query the disk size and validate, before anything is unmounted.
    pub fn prepare(config: &Config, disk: &str, installers: &[InstallerInfo]) -> Result<Self> {
        let info = get_disk_info(config, disk)?;
        Self::new(disk, info.total_size, installers)
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.disk_size.saturating_sub(self.fixed_bytes)
    }

    /// Human estimate of the last partition, only when there are fixed ones.
    pub fn remaining_estimate(&self) -> Option<String> {
        (self.entries.len() > 1).then(|| format_remaining(self.remaining_bytes()))
    }

    pub fn command(&self, config: &Config) -> Cmd {
        let mut cmd = diskutil(config).args(["partitionDisk", self.disk.as_str(), PARTITION_SCHEME]);
        for entry in &self.entries {
            cmd = cmd
                .arg(PARTITION_FORMAT)
                .arg(&entry.label)
                .arg(entry.size.to_string());
        }
        cmd
    }

    /// Show the planned layout.
    pub fn print(&self) {
        for entry in &self.entries {
            match (&entry.size, self.remaining_estimate()) {
                (SizeToken::Fixed(size), _) => {
                    info!("{}: {} partition", entry.name, size);
                    println!("   {}: {} partition", entry.name, size);
                }
                (SizeToken::Remaining, Some(remaining)) => {
                    info!("{}: last partition (~{} remaining)", entry.name, remaining);
                    println!("   {}: last partition (~{} remaining)", entry.name, remaining);
                }
                (SizeToken::Remaining, None) => {
                    info!("{}: last partition (whole disk)", entry.name);
                    println!("   {}: last partition (takes the whole disk)", entry.name);
                }
            }
        }
    }
}

/// Run `diskutil partitionDisk` for a validated plan.
///
/// An in-use failure prints guidance here and comes back marked as reported;
/// any other failure carries the full tool output for the caller to show.
pub fn partition_disk(config: &Config, plan: &PartitionPlan) -> Result<()> {
    info!("Partitioning {}", plan.disk);
    println!("\n🧩 Partitioning {}...", plan.disk);
    plan.print();

    let cmd = plan.command(config);
    info!("Running: {}", cmd.display());

    let output = run_with_progress(&cmd, "Partitioning", PARTITION_RULES, PARTITION_ESTIMATE)?;
    match output.into_result() {
        Ok(_) => {
            info!("Partitioning finished");
            Ok(())
        }
        Err(err) => {
            let text = failure_text(&err);
            error!("Partitioning failed: {}", err);
            if is_in_use_failure(&text) {
                print_in_use_guidance(
                    &plan.disk,
                    extract_process_info(&text).as_ref(),
                    "Partitioning",
                );
                return Err(mark_reported(err));
            }
            Err(err)
        }
    }
}
