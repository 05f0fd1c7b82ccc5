//! Unmounting, safety checks and restoration of the target disk.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{error, info, warn};

use super::detection::get_disk_info;
use super::diskutil;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::{run_with_progress, ProgressRule};
use crate::prompt::Operator;

static IN_USE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"in use by process (\d+) \(([^)]+)\)").expect("Invalid in-use regex")
});

const RESTORE_RULES: &[ProgressRule] = &[
    ProgressRule::new("unmounting", 10, "Unmounting disk..."),
    ProgressRule::new("unmount", 10, "Unmounting disk..."),
    ProgressRule::new("erasing", 20, "Removing partitions..."),
    ProgressRule::new("formatting", 40, "Formatting disk..."),
    ProgressRule::new("creating", 60, "Creating partition..."),
    ProgressRule::new("mounting", 80, "Mounting volume..."),
    ProgressRule::new("mount", 80, "Mounting volume..."),
    ProgressRule::new("finished", 100, "Done!"),
    ProgressRule::new("complete", 100, "Done!"),
];

const RESTORE_ESTIMATE: Duration = Duration::from_secs(30);

/// Filesystem and volume name used when putting a disk back to a single volume.
pub const RESTORE_FORMAT: &str = "ExFAT";
pub const RESTORE_LABEL: &str = "USB_DISK";

/// Process holding a volume of the disk open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingProcess {
    pub name: String,
    pub pid: String,
}

/// Find `in use by process <PID> (<name>)` in diskutil output.
pub fn extract_process_info(message: &str) -> Option<BlockingProcess> {
    let caps = IN_USE_PATTERN.captures(message)?;
    Some(BlockingProcess {
        pid: caps.get(1)?.as_str().to_string(),
        name: caps.get(2)?.as_str().to_string(),
    })
}

/// Whether diskutil refused because something still holds the disk.
pub fn is_in_use_failure(message: &str) -> bool {
    message.contains("in use by process") || message.contains("Couldn't unmount")
}

/// Text to inspect for in-use signatures: captured output plus the message.
pub fn failure_text(err: &Error) -> String {
    match err.command_output() {
        Some(output) => format!("{} {}", output, err),
        None => err.to_string(),
    }
}

/// Print remediation steps for a disk that cannot be released.
///
/// `action` names what is blocked, e.g. "Partitioning".
pub fn print_in_use_guidance(disk: &str, blocker: Option<&BlockingProcess>, action: &str) {
    error!("{} cannot be unmounted: it is in use by a process", disk);
    println!("\n❌ The disk {} cannot be unmounted.", disk);
    match blocker {
        Some(process) => {
            println!(
                "   Process '{}' (PID: {}) is using the disk.",
                process.name, process.pid
            );
            println!("\n💡 Possible fixes:");
            println!("   1. Quit every application using the disk");
            println!("   2. Close Finder windows showing the disk");
            println!("   3. Eject the disk from Finder (⌘+E)");
            println!("   4. Kill the process manually: sudo kill {}", process.pid);
            println!("   5. Wait a few seconds and try again");
        }
        None => {
            println!("   A process is using the disk.");
            println!("\n💡 Possible fixes:");
            println!("   1. Quit every application using the disk");
            println!("   2. Close Finder windows showing the disk");
            println!("   3. Eject the disk from Finder (⌘+E)");
        }
    }
    println!("\n⚠️  {} cannot continue while the disk is in use.", action);
    println!("   Free the disk, then run multiboot again.");
}

/// Mark a failure whose guidance was already shown.
pub fn mark_reported(err: Error) -> Error {
    match err {
        Error::CommandFailed {
            argv,
            status,
            output,
            ..
        } => Error::CommandFailed {
            argv,
            status,
            output,
            reported: true,
        },
        other => other,
    }
}

/// Unmount every volume of `disk`.
///
/// A disk held open by a process is fatal, after printing guidance. Any
/// other failure only warns: the next destructive command may still work.
pub fn unmount_disk(config: &Config, disk: &str) -> Result<()> {
    unmount_before(config, disk, "Partitioning")
}

fn unmount_before(config: &Config, disk: &str, action: &str) -> Result<()> {
    info!("Unmounting {}", disk);
    match diskutil(config).args(["unmountDisk", disk]).run() {
        Ok(result) => {
            if !result.stdout_trimmed().is_empty() {
                info!("unmountDisk: {}", result.stdout_trimmed());
            }
            info!("{} unmounted", disk);
            Ok(())
        }
        Err(err @ Error::CommandFailed { .. }) => {
            let text = failure_text(&err);
            if is_in_use_failure(&text) {
                print_in_use_guidance(disk, extract_process_info(&text).as_ref(), action);
                return Err(mark_reported(err));
            }
            warn!("Could not unmount {}: {}", disk, err);
            println!("\n⚠️  Could not unmount {}", disk);
            println!("   Continuing, but partitioning may fail.");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Outcome of the internal-disk check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyVerdict {
    Proceed,
    Cancelled,
}

/// Refuse to silently wipe a disk reported as internal.
///
/// Metadata that cannot be read is a warning, not a stop.
pub fn verify_disk_safety(
    config: &Config,
    disk: &str,
    operator: &mut dyn Operator,
) -> Result<SafetyVerdict> {
    let info = match get_disk_info(config, disk) {
        Ok(info) => info,
        Err(e @ (Error::Interrupted | Error::Io(_))) => return Err(e),
        Err(e) => {
            warn!("Could not verify disk information: {}", e);
            println!("⚠️  Could not verify disk information: {}", e);
            println!("   Continuing, be careful.");
            return Ok(SafetyVerdict::Proceed);
        }
    };

    if !info.internal {
        return Ok(SafetyVerdict::Proceed);
    }

    warn!("{} is reported as an internal disk", disk);
    println!("⚠️  WARNING: {} is reported as an internal disk.", disk);
    println!("   Make sure it is not your system disk.");
    if operator.confirm("   Continue anyway?")? {
        Ok(SafetyVerdict::Proceed)
    } else {
        info!("Cancelled by operator (internal disk)");
        println!("Cancelled.");
        Ok(SafetyVerdict::Cancelled)
    }
}

/// Final warning before the disk is erased.
pub fn confirm_disk_erasure(
    disk: &str,
    partitions: usize,
    operator: &mut dyn Operator,
) -> Result<bool> {
    println!("\n⚠️  WARNING: {} will be COMPLETELY ERASED.", disk);
    println!("   It will be split into {} installer volume(s).", partitions);
    let confirmed = operator.confirm("   Erase the disk?")?;
    if !confirmed {
        info!("Cancelled by operator");
        println!("Cancelled.");
    }
    Ok(confirmed)
}

/// Manual command that does what [`restore_disk`] attempts.
pub fn manual_restore_command(disk: &str) -> String {
    format!("diskutil eraseDisk {} {} {}", RESTORE_FORMAT, RESTORE_LABEL, disk)
}

/// Put the disk back to one ExFAT volume after a failed run.
pub fn restore_disk(config: &Config, disk: &str) -> Result<()> {
    info!("Restoring {}", disk);
    unmount_before(config, disk, "Restore")?;

    let cmd = diskutil(config).args(["eraseDisk", RESTORE_FORMAT, RESTORE_LABEL, disk]);
    let output = run_with_progress(&cmd, "Restore", RESTORE_RULES, RESTORE_ESTIMATE)?;
    let lines = output.into_result()?;
    if !lines.is_empty() {
        info!("eraseDisk: {}", lines.join(" "));
    }

    info!("{} restored to a single {} volume", disk, RESTORE_FORMAT);
    println!("\n✅ Disk restored");
    Ok(())
}
