//! Shared test utilities for multiboot tests.
//!
//! `TestEnv` builds a throwaway host: an installer directory, a volume
//! mount root and a fake `diskutil` shell script whose behaviour is driven
//! by files in a state directory. Every invocation is appended to
//! `calls.log`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use multiboot::config::Config;
use multiboot::disk::ExternalDisk;
use multiboot::prompt::Operator;
use tempfile::TempDir;

pub const GB: u64 = 1024 * 1024 * 1024;

/// A `createinstallmedia` that writes an installer app onto the volume.
pub const WORKING_MEDIA_TOOL: &str = r#"#!/bin/sh
vol="$2"
echo "Ready to start."
echo "Erasing disk: 0%... 10%... 100%"
echo "Copying to disk: 0%... 100%"
mkdir -p "$vol/Install macOS.app/Contents"
echo "Install media now available at \"$vol\""
"#;

/// A `createinstallmedia` that exits cleanly but writes nothing.
pub const SILENT_MEDIA_TOOL: &str = "#!/bin/sh\necho \"Done.\"\n";

/// A `createinstallmedia` that fails with exit code 1.
pub const FAILING_MEDIA_TOOL: &str =
    "#!/bin/sh\necho \"Erasing disk: 0%\"\necho \"The volume is not mounted\" >&2\nexit 1\n";

/// A working `createinstallmedia` that touches `marker` once it has written
/// the volume, then keeps running for `pause_secs`.
pub fn marking_media_tool(marker: &Path, pause_secs: u32) -> String {
    format!(
        r#"#!/bin/sh
vol="$2"
echo "Copying to disk: 0%"
mkdir -p "$vol/Install macOS.app/Contents"
touch "{marker}"
sleep {pause_secs}
echo "Install media now available at \"$vol\""
"#,
        marker = marker.display()
    )
}

const FAKE_DISKUTIL: &str = r#"#!/bin/sh
STATE="@STATE@"
VOLUMES="@VOLUMES@"
echo "$*" >> "$STATE/calls.log"
verb="$1"
shift
case "$verb" in
  list)
    cat "$STATE/list.plist"
    exit 0
    ;;
  info)
    name=$(basename "$2")
    if [ -f "$STATE/info-$name.plist" ]; then
      cat "$STATE/info-$name.plist"
      exit 0
    fi
    echo "Could not find disk: $2" >&2
    exit 1
    ;;
  unmountDisk)
    if [ -f "$STATE/unmount.fail" ]; then
      cat "$STATE/unmount.fail" >&2
      exit 1
    fi
    echo "Unmount of all volumes on $1 was successful"
    exit 0
    ;;
  partitionDisk)
    if [ -f "$STATE/partition.fail" ]; then
      cat "$STATE/partition.fail"
      exit 1
    fi
    disk="$1"
    shift 2
    echo "Started partitioning on $disk"
    echo "Unmounting disk"
    echo "Creating the partition map"
    while [ $# -ge 3 ]; do
      mkdir -p "$VOLUMES/$2"
      echo "Formatting disk as $1 with name $2"
      shift 3
    done
    echo "Finished partitioning on $disk"
    exit 0
    ;;
  eraseDisk)
    if [ -f "$STATE/erase.fail" ]; then
      echo "Error: -69877: Couldn't open device"
      exit 1
    fi
    echo "Started erase on $3"
    echo "Finished erase on $3"
    exit 0
    ;;
esac
echo "unknown verb $verb" >&2
exit 2
"#;

pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Installer directory (stands in for /Applications)
    pub apps: PathBuf,
    /// Mount root (stands in for /Volumes)
    pub volumes: PathBuf,
    /// Files steering the fake diskutil
    pub state: PathBuf,
    pub diskutil: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let apps = base.join("Applications");
        let volumes = base.join("Volumes");
        let state = base.join("state");
        for dir in [&apps, &volumes, &state] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        let diskutil = base.join("bin/diskutil");
        let script = FAKE_DISKUTIL
            .replace("@STATE@", &state.to_string_lossy())
            .replace("@VOLUMES@", &volumes.to_string_lossy());
        create_mock_binary(&diskutil, &script);

        let env = Self {
            _temp_dir: temp_dir,
            apps,
            volumes,
            state,
            diskutil,
        };
        env.write_listing();
        env
    }

    /// Configuration pointing at the fake host, with short timeouts.
    pub fn config(&self) -> Config {
        Config {
            app_dir: self.apps.clone(),
            volumes_dir: self.volumes.clone(),
            diskutil: self.diskutil.to_string_lossy().into_owned(),
            volume_wait: Duration::from_millis(500),
            poll_interval: Duration::from_millis(20),
            verify_settle: Duration::from_millis(10),
            verify_retry: Duration::from_millis(10),
        }
    }

    /// Register a disk: listed by `diskutil list`, described by `diskutil info`.
    pub fn add_disk(&self, id: &str, size: u64, internal: bool, media: &str) {
        fs::write(
            self.state.join(format!("info-{}.plist", id)),
            info_plist(id, size, internal, media),
        )
        .expect("Failed to write disk info");
        self.write_listing();
    }

    /// List a disk that `diskutil info` knows nothing about.
    pub fn add_unknown_disk(&self, id: &str) {
        fs::write(self.state.join(format!("unknown-{}", id)), b"").expect("Failed to mark disk");
        self.write_listing();
    }

    fn write_listing(&self) {
        let mut ids: Vec<String> = fs::read_dir(&self.state)
            .expect("Failed to read state dir")
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_prefix("info-")
                    .and_then(|n| n.strip_suffix(".plist"))
                    .or_else(|| name.strip_prefix("unknown-"))
                    .map(String::from)
            })
            .collect();
        ids.sort();
        fs::write(self.state.join("list.plist"), list_plist(&ids))
            .expect("Failed to write listing");
    }

    /// Replace the `diskutil list` output verbatim.
    pub fn set_listing(&self, content: &str) {
        fs::write(self.state.join("list.plist"), content).expect("Failed to write listing");
    }

    /// Make `unmountDisk` fail, printing `message` on stderr.
    pub fn fail_unmount(&self, message: &str) {
        fs::write(self.state.join("unmount.fail"), message).expect("Failed to write state");
    }

    /// Make `partitionDisk` fail, printing `message`.
    pub fn fail_partition(&self, message: &str) {
        fs::write(self.state.join("partition.fail"), message).expect("Failed to write state");
    }

    pub fn fail_erase(&self) {
        fs::write(self.state.join("erase.fail"), b"").expect("Failed to write state");
    }

    /// Every diskutil invocation so far, arguments joined by spaces.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.state.join("calls.log"))
            .map(|log| log.lines().map(String::from).collect())
            .unwrap_or_default()
    }

    pub fn called(&self, verb: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(verb))
    }

    /// Create an installer bundle with `payload` bytes and the given media tool.
    pub fn add_installer(&self, bundle: &str, payload: usize, media_tool: &str) -> PathBuf {
        let path = self.apps.join(bundle);
        let resources = path.join("Contents/Resources");
        fs::create_dir_all(&resources).expect("Failed to create bundle");
        fs::write(resources.join("InstallESD.payload"), vec![0u8; payload])
            .expect("Failed to write payload");
        create_mock_binary(&resources.join("createinstallmedia"), media_tool);
        path
    }
}

/// Create an executable shell script.
pub fn create_mock_binary(path: &Path, script: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for binary");
    }
    fs::write(path, script).expect("Failed to create mock binary");

    let mut perms = fs::metadata(path).expect("Failed to get metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to set permissions");
}

pub fn info_plist(id: &str, size: u64, internal: bool, media: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>DeviceIdentifier</key>
    <string>{id}</string>
    <key>Internal</key>
    <{internal}/>
    <key>MediaName</key>
    <string>{media}</string>
    <key>TotalSize</key>
    <integer>{size}</integer>
</dict>
</plist>
"#
    )
}

pub fn list_plist(ids: &[String]) -> String {
    let disks: String = ids
        .iter()
        .map(|id| format!("        <string>{}</string>\n", id))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>WholeDisks</key>
    <array>
{disks}    </array>
</dict>
</plist>
"#
    )
}

/// Operator with canned answers. Unanswered confirmations decline.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    pub selection: Option<usize>,
    pub answers: VecDeque<bool>,
    pub prompts: Vec<String>,
    pub offered: Vec<ExternalDisk>,
}

impl ScriptedOperator {
    /// Pick the first disk and confirm everything asked.
    pub fn approving(confirmations: usize) -> Self {
        Self {
            selection: Some(0),
            answers: std::iter::repeat_n(true, confirmations).collect(),
            ..Self::default()
        }
    }
}

impl Operator for ScriptedOperator {
    fn select_disk(&mut self, disks: &[ExternalDisk]) -> multiboot::Result<Option<usize>> {
        self.offered = disks.to_vec();
        Ok(self.selection)
    }

    fn confirm(&mut self, prompt: &str) -> multiboot::Result<bool> {
        self.prompts.push(prompt.to_string());
        Ok(self.answers.pop_front().unwrap_or(false))
    }
}
