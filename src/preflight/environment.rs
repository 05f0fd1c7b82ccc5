//! Host environment checks (privileges, directories).

use std::path::Path;

use super::types::CheckResult;

/// Partitioning needs root.
pub fn check_root() -> CheckResult {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    root_result(euid)
}

fn root_result(euid: libc::uid_t) -> CheckResult {
    if euid == 0 {
        CheckResult::pass("root privileges")
    } else {
        CheckResult::fail(
            "root privileges",
            "diskutil partitioning requires root. Run with sudo.",
        )
    }
}

pub fn check_app_dir(app_dir: &Path) -> CheckResult {
    let name = "installer directory";
    if app_dir.is_dir() {
        CheckResult::pass_with(name, &app_dir.display().to_string())
    } else if app_dir.exists() {
        CheckResult::fail(name, &format!("{} is not a directory", app_dir.display()))
    } else {
        CheckResult::fail(
            name,
            &format!("{} does not exist. Use --app-dir to point elsewhere.", app_dir.display()),
        )
    }
}

/// Volumes only appear once partitions mount, so a missing root is a warning.
pub fn check_volumes_dir(volumes_dir: &Path) -> CheckResult {
    let name = "volume mount root";
    if volumes_dir.is_dir() {
        CheckResult::pass_with(name, &volumes_dir.display().to_string())
    } else {
        CheckResult::warn(
            name,
            &format!("{} not found; new volumes may not be detected", volumes_dir.display()),
        )
    }
}
