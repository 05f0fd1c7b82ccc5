//! Writing installers to their volumes with `createinstallmedia`.
//!
//! One installer at a time: wait for its volume, run the bundle's tool with
//! live progress, then check the volume really holds an installer.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::InstallerInfo;
use crate::config::{Config, EXECUTABLE_PERMISSIONS, MIN_VOLUME_SIZE_BYTES};
use crate::disk::{find_volume_path, wait_for_volume};
use crate::error::{Error, ExitKind, Result};
use crate::interrupt;
use crate::process::Cmd;
use crate::progress::{run_with_progress, ProgressRule};
use crate::size::BYTES_PER_MB;
use crate::timing::Timer;

/// Location of the media tool inside an installer bundle.
pub const MEDIA_TOOL: &str = "Contents/Resources/createinstallmedia";

const INSTALL_RULES: &[ProgressRule] = &[
    ProgressRule::new("erasing", 5, "Erasing volume..."),
    ProgressRule::new("formatting", 5, "Erasing volume..."),
    ProgressRule::new("copying", 20, "Copying files..."),
    ProgressRule::new("install", 40, "Installing..."),
    ProgressRule::new("base system", 60, "Installing base system..."),
    ProgressRule::new("basesystem", 60, "Installing base system..."),
    ProgressRule::new("packages", 75, "Installing packages..."),
    ProgressRule::new("complete", 100, "Done!"),
    ProgressRule::new("done", 100, "Done!"),
    ProgressRule::new("success", 100, "Done!"),
];

const INSTALL_ESTIMATE: Duration = Duration::from_secs(1200);

/// Top-level names that show an installer was written.
const EXPECTED_ITEMS: &[&str] = &[
    "Applications",
    "System",
    "Library",
    "BaseSystem.dmg",
    "InstallESD.dmg",
    "Install macOS",
    "Install OS X",
];

/// Files counted per top-level directory when sizing an unusual volume.
const SAMPLE_FILES_PER_DIR: usize = 100;

const NOTABLE_KEYWORDS: &[&str] = &[
    "error", "fail", "success", "complete", "done", "copying", "erasing", "creating", "warning",
];

/// Path of the media tool, checked to exist and be executable.
pub fn check_media_tool(installer: &InstallerInfo) -> Result<PathBuf> {
    let tool = installer.path.join(MEDIA_TOOL);
    let metadata = match fs::metadata(&tool) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!("createinstallmedia not found: {}", tool.display());
            println!("❌ createinstallmedia not found for {}", installer.name);
            println!("   Expected at: {}", tool.display());
            return Err(Error::installation(
                &installer.name,
                format!("createinstallmedia not found: {}", tool.display()),
            ));
        }
        Err(e) => {
            error!("Cannot check {}: {}", tool.display(), e);
            return Err(Error::installation(
                &installer.name,
                format!("cannot check createinstallmedia permissions: {}", e),
            ));
        }
    };

    if metadata.permissions().mode() & EXECUTABLE_PERMISSIONS == 0 {
        error!("{} is not executable", tool.display());
        println!("❌ createinstallmedia is not executable for {}", installer.name);
        return Err(Error::installation(
            &installer.name,
            "createinstallmedia is not executable",
        ));
    }
    Ok(tool)
}

pub fn install_command(tool: &Path, volume: &Path, bundle: &Path) -> Cmd {
    Cmd::new(tool.to_string_lossy())
        .arg("--volume")
        .arg_path(volume)
        .arg("--applicationpath")
        .arg_path(bundle)
        .arg("--nointeraction")
}

/// Result of inspecting a freshly written volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeCheck {
    /// A known installer item is present at the top level.
    Recognized(String),
    /// No known item, but enough data to pass.
    NonStandard { size: u64 },
    Missing,
    Empty,
    TooSmall { size: u64 },
    Unreadable(String),
}

impl VolumeCheck {
    pub fn passed(&self) -> bool {
        matches!(self, VolumeCheck::Recognized(_) | VolumeCheck::NonStandard { .. })
    }
}

/// Check that `volume` looks like it holds an installer.
pub fn verify_volume(volume: &Path) -> VolumeCheck {
    if !volume.is_dir() {
        return VolumeCheck::Missing;
    }

    let items = match top_level_names(volume) {
        Ok(items) => items,
        Err(e) => {
            warn!("Cannot read volume {}: {}", volume.display(), e);
            return VolumeCheck::Unreadable(e.to_string());
        }
    };
    if items.is_empty() {
        warn!("Volume {} is empty", volume.display());
        return VolumeCheck::Empty;
    }

    for expected in EXPECTED_ITEMS {
        let needle = expected.to_lowercase();
        if items.iter().any(|item| item.to_lowercase().contains(&needle)) {
            debug!("Found installer item: {}", expected);
            return VolumeCheck::Recognized(expected.to_string());
        }
    }

    let size = sampled_size(volume);
    if size < MIN_VOLUME_SIZE_BYTES {
        error!(
            "Volume {} too small ({:.1} MB), expected at least {} MB. Items: {:?}",
            volume.display(),
            size as f64 / BYTES_PER_MB as f64,
            MIN_VOLUME_SIZE_BYTES / BYTES_PER_MB,
            items
        );
        return VolumeCheck::TooSmall { size };
    }

    warn!(
        "Volume {} has an unusual layout ({:.1} MB)",
        volume.display(),
        size as f64 / BYTES_PER_MB as f64
    );
    VolumeCheck::NonStandard { size }
}

fn top_level_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Approximate data size: top-level files plus at most
/// [`SAMPLE_FILES_PER_DIR`] files from each top-level directory.
pub fn sampled_size(volume: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(volume) else {
        return 0;
    };
    let mut total = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_file() {
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        } else if file_type.is_dir() {
            total += WalkDir::new(entry.path())
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .take(SAMPLE_FILES_PER_DIR)
                .map(|e| e.metadata().map(|m| m.len()).unwrap_or(0))
                .sum::<u64>();
        }
    }
    total
}

/// Verify after a settle delay, and once more after the retry delay.
pub fn verify_with_retry(config: &Config, volume: &Path) -> VolumeCheck {
    debug!("Waiting for the filesystem to settle");
    thread::sleep(config.verify_settle);
    let check = verify_volume(volume);
    if check.passed() {
        return check;
    }
    debug!("First verification failed ({:?}), retrying", check);
    thread::sleep(config.verify_retry);
    verify_volume(volume)
}

/// Extra advice for a failed tool run.
pub fn failure_guidance(status: ExitKind) -> Option<&'static str> {
    match status {
        ExitKind::Signal(_) => Some(
            "The process was killed. Check there is enough free space on the target \
             volume and that multiboot runs with sudo.",
        ),
        ExitKind::Code(1) => Some(
            "Check the target volume is still mounted and writable, then try again.",
        ),
        ExitKind::Code(_) => None,
    }
}

/// Lines worth keeping in the log: the first ten matching a keyword, or
/// the last five if none match.
pub fn notable_lines(lines: &[String]) -> Vec<&str> {
    let notable: Vec<&str> = lines
        .iter()
        .map(String::as_str)
        .filter(|line| {
            let lower = line.to_lowercase();
            NOTABLE_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .take(10)
        .collect();
    if !notable.is_empty() {
        return notable;
    }
    let start = lines.len().saturating_sub(5);
    lines[start..].iter().map(String::as_str).collect()
}

fn log_notable_lines(installer: &InstallerInfo, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    debug!("createinstallmedia output:\n{}", lines.join("\n"));
    info!("createinstallmedia output for {}:", installer.name);
    for line in notable_lines(lines) {
        info!("  {}", line);
    }
}

/// Write one installer to its volume and verify the result.
pub fn write_installer(config: &Config, installer: &InstallerInfo) -> Result<()> {
    let tool = check_media_tool(installer)?;

    info!("Installing {} on {}", installer.name, installer.volume);
    println!("\n💿 Installing {}...", installer.name);

    let mounted = wait_for_volume(config, &installer.volume);
    interrupt::checkpoint()?;
    if !mounted {
        println!(
            "❌ Volume {} was not mounted after {}s",
            installer.volume,
            config.volume_wait.as_secs()
        );
        return Err(Error::installation(
            &installer.name,
            format!(
                "timed out: volume {} not mounted after {}s",
                installer.volume,
                config.volume_wait.as_secs()
            ),
        ));
    }

    let volume = find_volume_path(&config.volumes_dir, &installer.volume)
        .filter(|path| path.is_dir())
        .ok_or_else(|| {
            error!("Volume {} not found for {}", installer.volume, installer.name);
            Error::installation(
                &installer.name,
                format!("volume {} is not accessible", installer.volume),
            )
        })?;
    info!("Using volume {}", volume.display());

    // A tool started after Ctrl-C never sees the signal.
    interrupt::checkpoint()?;
    let cmd = install_command(&tool, &volume, &installer.path);
    let output = run_with_progress(&cmd, "Installation", INSTALL_RULES, INSTALL_ESTIMATE)?;

    if !output.success() {
        let text = output.text();
        error!(
            "createinstallmedia failed for {}: {}",
            installer.name, output.status
        );
        println!("❌ Installing {} failed ({})", installer.name, output.status);
        if let Some(help) = failure_guidance(output.status) {
            println!("   {}", help);
        }
        return Err(Error::InstallationFailed {
            installer: installer.name.clone(),
            cause: format!("createinstallmedia failed ({})", output.status),
            output: (!text.is_empty()).then_some(text),
        });
    }

    log_notable_lines(installer, &output.lines);

    let check = verify_with_retry(config, &volume);
    interrupt::checkpoint()?;
    if !check.passed() {
        let contents = top_level_names(&volume).unwrap_or_default();
        error!(
            "Verification failed for {}: {:?}",
            installer.name, check
        );
        println!("❌ Installation of {} seems to have failed.", installer.name);
        if let VolumeCheck::TooSmall { size } = check {
            println!(
                "   Volume holds {:.1} MB, expected at least {} MB.",
                size as f64 / BYTES_PER_MB as f64,
                MIN_VOLUME_SIZE_BYTES / BYTES_PER_MB
            );
        }
        if contents.is_empty() {
            println!("   Current contents: (empty)");
        } else {
            println!("   Current contents: {}", contents.join(", "));
        }
        println!("   Volume: {}", volume.display());
        return Err(Error::installation(
            &installer.name,
            "installation appears to have failed: the volume does not contain an installer",
        ));
    }

    info!("{} written to {}", installer.name, installer.volume);
    println!("✅ {} installed", installer.name);
    Ok(())
}

/// Write every installer, newest first, stopping at the first failure.
pub fn create_install_media(config: &Config, installers: &[InstallerInfo]) -> Result<()> {
    info!("Creating installation media");
    println!("\n📀 Creating installation media...");
    println!("   This can take a while for each installer.");

    for installer in installers {
        interrupt::checkpoint()?;
        let timer = Timer::start(&installer.name);
        write_installer(config, installer)?;
        timer.finish();
    }
    Ok(())
}
