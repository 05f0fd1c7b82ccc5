//! Configuration management for multiboot.
//!
//! Built-in defaults, overridden by environment variables, overridden by
//! command-line flags. Nothing is read from or written to disk.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

/// Default directory scanned for installer bundles.
pub const DEFAULT_APP_DIR: &str = "/Applications";

/// Where macOS mounts volumes.
pub const DEFAULT_VOLUMES_DIR: &str = "/Volumes";

pub const DEFAULT_DISKUTIL: &str = "diskutil";

/// How long to wait for a freshly created volume to mount.
pub const MAX_VOLUME_WAIT_TIME: Duration = Duration::from_secs(30);

pub const VOLUME_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Delay before the first post-install verification.
pub const VERIFY_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Delay before the second (last) verification attempt.
pub const VERIFY_RETRY_DELAY: Duration = Duration::from_secs(3);

/// A written installer volume smaller than this is considered empty.
pub const MIN_VOLUME_SIZE_BYTES: u64 = 100 * 1024 * 1024;

pub const EXECUTABLE_PERMISSIONS: u32 = 0o111;

/// One supported OS release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsRelease {
    /// Display name.
    pub name: &'static str,
    /// Substring identifying the installer bundle.
    pub keyword: &'static str,
    /// Label of the volume the installer is written to.
    pub volume: &'static str,
}

const fn release(name: &'static str, keyword: &'static str, volume: &'static str) -> OsRelease {
    OsRelease {
        name,
        keyword,
        volume,
    }
}

/// Supported releases, newest first. The order is the partition order.
pub const TARGET_OS: &[OsRelease] = &[
    release("macOS Tahoe", "Tahoe", "Install macOS Tahoe"),
    release("macOS Sequoia", "Sequoia", "Install macOS Sequoia"),
    release("macOS Sonoma", "Sonoma", "Install macOS Sonoma"),
    release("macOS Ventura", "Ventura", "Install macOS Ventura"),
    release("macOS Monterey", "Monterey", "Install macOS Monterey"),
    release("macOS Big Sur", "Big Sur", "Install macOS Big Sur"),
    release("macOS Catalina", "Catalina", "Install macOS Catalina"),
    release("macOS Mojave", "Mojave", "Install macOS Mojave"),
    release("macOS High Sierra", "High Sierra", "Install macOS High Sierra"),
    release("macOS Sierra", "Sierra", "Install macOS Sierra"),
    release("OS X El Capitan", "El Capitan", "Install OS X El Capitan"),
    release("OS X Yosemite", "Yosemite", "Install OS X Yosemite"),
    release("OS X Mavericks", "Mavericks", "Install OS X Mavericks"),
];

/// Multiboot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned for installer bundles (default: /Applications)
    pub app_dir: PathBuf,
    /// Mount root searched for volume labels (default: /Volumes)
    pub volumes_dir: PathBuf,
    /// Disk utility program (default: diskutil from PATH)
    pub diskutil: String,
    pub volume_wait: Duration,
    pub poll_interval: Duration,
    pub verify_settle: Duration,
    pub verify_retry: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from(DEFAULT_APP_DIR),
            volumes_dir: PathBuf::from(DEFAULT_VOLUMES_DIR),
            diskutil: DEFAULT_DISKUTIL.to_string(),
            volume_wait: MAX_VOLUME_WAIT_TIME,
            poll_interval: VOLUME_POLL_INTERVAL,
            verify_settle: VERIFY_SETTLE_DELAY,
            verify_retry: VERIFY_RETRY_DELAY,
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Recognised variables:
    /// - `MULTIBOOT_APP_DIR`
    /// - `MULTIBOOT_VOLUMES_DIR`
    /// - `MULTIBOOT_DISKUTIL`
    /// - `MULTIBOOT_VOLUME_WAIT_SECS`
    pub fn load() -> Self {
        let env_vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&env_vars)
    }

    /// Build configuration from an explicit variable map.
    pub fn from_vars(env_vars: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        let app_dir = env_vars
            .get("MULTIBOOT_APP_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.app_dir);

        let volumes_dir = env_vars
            .get("MULTIBOOT_VOLUMES_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.volumes_dir);

        let diskutil = env_vars
            .get("MULTIBOOT_DISKUTIL")
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or(defaults.diskutil);

        let volume_wait = env_vars
            .get("MULTIBOOT_VOLUME_WAIT_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.volume_wait);

        Self {
            app_dir,
            volumes_dir,
            diskutil,
            volume_wait,
            ..defaults
        }
    }

    /// Override the installer directory (from `--app-dir`).
    pub fn with_app_dir(mut self, app_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = app_dir {
            self.app_dir = dir;
        }
        self
    }

    /// Log configuration for debugging.
    pub fn print(&self) {
        debug!("Configuration:");
        debug!("  MULTIBOOT_APP_DIR: {}", self.app_dir.display());
        debug!("  MULTIBOOT_VOLUMES_DIR: {}", self.volumes_dir.display());
        debug!("  MULTIBOOT_DISKUTIL: {}", self.diskutil);
        debug!("  MULTIBOOT_VOLUME_WAIT_SECS: {}", self.volume_wait.as_secs());
    }
}
