//! Size arithmetic for partitions.
//!
//! All byte totals are exact integers. Floating point is only used to
//! render human-readable summaries.

use std::path::Path;

use walkdir::WalkDir;

pub const BYTES_PER_KB: u64 = 1024;
pub const BYTES_PER_MB: u64 = BYTES_PER_KB * 1024;
pub const BYTES_PER_GB: u64 = BYTES_PER_MB * 1024;

/// Extra space reserved on top of every installer's measured size.
pub const MARGIN_SIZE_MB: u64 = 500;

/// Installer size plus the fixed margin.
pub fn size_with_margin(size_bytes: u64) -> u64 {
    size_bytes + MARGIN_SIZE_MB * BYTES_PER_MB
}

/// Partition size in bytes: the margined size rounded up to the next whole GB.
///
/// The rounding always moves up, so a margined size that lands exactly on a
/// GB boundary still gains one more GB.
pub fn partition_size_bytes(size_bytes: u64) -> u64 {
    (size_with_margin(size_bytes) / BYTES_PER_GB + 1) * BYTES_PER_GB
}

/// Size token passed to `diskutil partitionDisk` for a fixed partition.
///
/// `"NNNM"` when the margined size is under one GB, otherwise `"NNG"` with
/// the same upward rounding as [`partition_size_bytes`].
pub fn format_for_partition_tool(size_bytes: u64) -> String {
    let margined = size_with_margin(size_bytes);
    if margined < BYTES_PER_GB {
        return format!("{}M", margined.div_ceil(BYTES_PER_MB));
    }
    format!("{}G", margined / BYTES_PER_GB + 1)
}

/// Parse a token produced by [`format_for_partition_tool`] back into bytes.
pub fn parse_partition_token(token: &str) -> Option<u64> {
    let (number, unit) = token.split_at(token.len().checked_sub(1)?);
    let value: u64 = number.parse().ok()?;
    match unit {
        "M" => Some(value * BYTES_PER_MB),
        "G" => Some(value * BYTES_PER_GB),
        _ => None,
    }
}

pub fn to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB as f64
}

/// `"12.34 GB"`.
pub fn format_gb(bytes: u64) -> String {
    format!("{:.2} GB", to_gb(bytes))
}

/// Remaining-space estimate for progress messages: `"463.5G"` or `"512M"`.
pub fn format_remaining(bytes: u64) -> String {
    if bytes < BYTES_PER_GB {
        format!("{:.0}M", bytes as f64 / BYTES_PER_MB as f64)
    } else {
        format!("{:.1}G", to_gb(bytes))
    }
}

/// Total size of all regular files under `path`.
///
/// Symlinks are not followed and entries that cannot be read count as 0.
pub fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.metadata().map(|m| m.len()).unwrap_or(0))
        .sum()
}
