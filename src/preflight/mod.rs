//! Preflight checks.
//!
//! Verifies the host can run the workflow before anything is discovered or
//! touched: root privileges, the disk utility, the installer directory.

mod environment;
mod host_tools;
mod types;

use anyhow::{bail, Result};

use crate::config::Config;

pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    checks.push(environment::check_root());
    checks.push(host_tools::check_disk_utility(&config.diskutil));
    checks.push(environment::check_app_dir(&config.app_dir));
    checks.push(environment::check_volumes_dir(&config.volumes_dir));

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config) -> Result<()> {
    let report = run_preflight(config);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above and run again.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}
