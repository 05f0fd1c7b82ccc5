//! Host tool availability checks.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::config::EXECUTABLE_PERMISSIONS;
use crate::process;

use super::types::CheckResult;

/// The disk utility must be on PATH, or executable when given as a path.
pub fn check_disk_utility(program: &str) -> CheckResult {
    if program.contains('/') {
        let path = Path::new(program);
        return match fs::metadata(path) {
            Ok(meta) if meta.is_file() && meta.permissions().mode() & EXECUTABLE_PERMISSIONS != 0 => {
                CheckResult::pass_with("disk utility", program)
            }
            Ok(_) => CheckResult::fail("disk utility", &format!("{} is not executable", program)),
            Err(e) => CheckResult::fail("disk utility", &format!("{}: {}", program, e)),
        };
    }

    match process::which(program) {
        Some(path) => CheckResult::pass_with("disk utility", &path.to_string_lossy()),
        None => CheckResult::fail(
            "disk utility",
            &format!("'{}' not found in PATH. multiboot only runs on macOS.", program),
        ),
    }
}
