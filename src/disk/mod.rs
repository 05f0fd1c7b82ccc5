//! Target disk handling: discovery, safety, partitioning and restoration.

pub mod detection;
pub mod management;
pub mod partitioning;

pub use detection::{
    check_disk_space, find_volume_path, get_disk_info, list_external_disks, wait_for_volume,
    DiskInfo, ExternalDisk,
};
pub use management::{
    confirm_disk_erasure, restore_disk, unmount_disk, verify_disk_safety, BlockingProcess,
    SafetyVerdict,
};
pub use partitioning::{partition_disk, validate_partition_sizes, PartitionPlan, SizeToken};

use crate::config::Config;
use crate::process::Cmd;

/// A `diskutil` invocation using the configured program.
pub fn diskutil(config: &Config) -> Cmd {
    Cmd::new(&config.diskutil)
}
