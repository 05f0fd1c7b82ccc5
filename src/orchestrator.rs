//! The end-to-end workflow and its failure policy.
//!
//! Phases run strictly in order: discovery, disk selection, safety check,
//! size summary, validation, confirmation, unmount, partitioning, media
//! creation. Nothing destructive happens before validation and
//! confirmation. Once partitioning has been issued, every failure (and
//! Ctrl-C) puts the disk back to a single volume before the run ends.

use tracing::{debug, error, info, warn};

use crate::config::{Config, TARGET_OS};
use crate::disk::management::manual_restore_command;
use crate::disk::{
    check_disk_space, confirm_disk_erasure, list_external_disks, partition_disk, restore_disk,
    unmount_disk, verify_disk_safety, PartitionPlan, SafetyVerdict,
};
use crate::error::{Error, ErrorKind, Result};
use crate::installer::{
    create_install_media, display_size_summary, find_installers, total_space_needed,
    InstallerInfo,
};
use crate::interrupt;
use crate::prompt::Operator;
use crate::timing::Timer;

/// What the failure path needs to know about how far the run got.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub target_disk: Option<String>,
    pub installers: Vec<InstallerInfo>,
    /// Set right before the partition command is issued.
    pub partitioning_started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Final status of a run, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Cancelled,
    Failed,
    Interrupted,
}

impl RunStatus {
    pub fn code(&self) -> u8 {
        match self {
            RunStatus::Success | RunStatus::Cancelled => 0,
            RunStatus::Failed => 1,
            RunStatus::Interrupted => 130,
        }
    }
}

pub struct Orchestrator<O: Operator> {
    config: Config,
    operator: O,
    state: RunState,
}

impl<O: Operator> Orchestrator<O> {
    pub fn new(config: Config, operator: O) -> Self {
        Self {
            config,
            operator,
            state: RunState::default(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    /// Run the whole workflow and report the outcome.
    pub fn run(&mut self) -> RunStatus {
        info!("Starting multiboot disk creation");
        match self.execute() {
            Ok(RunOutcome::Completed) => {
                println!("\n🎉 Multiboot disk ready!");
                RunStatus::Success
            }
            Ok(RunOutcome::Cancelled) => RunStatus::Cancelled,
            Err(err) if err.kind() == ErrorKind::Interrupted || interrupt::is_interrupted() => {
                self.handle_interrupt(err)
            }
            Err(err) => self.handle_failure(err),
        }
    }

    fn execute(&mut self) -> Result<RunOutcome> {
        let timer = Timer::start("Discovery");
        let installers = find_installers(&self.config.app_dir, TARGET_OS)?;
        timer.finish();
        info!("{} installer(s) found", installers.len());
        self.state.installers = installers;
        interrupt::checkpoint()?;

        let disks = list_external_disks(&self.config)?;
        if disks.is_empty() {
            return Err(Error::NoExternalDisk);
        }
        let Some(index) = self.operator.select_disk(&disks)? else {
            info!("No disk selected");
            println!("Cancelled.");
            return Ok(RunOutcome::Cancelled);
        };
        let disk = disks
            .get(index)
            .ok_or_else(|| Error::Prompt(format!("invalid disk selection: {}", index)))?
            .identifier
            .clone();
        info!("Selected {}", disk);
        self.state.target_disk = Some(disk.clone());
        interrupt::checkpoint()?;

        if verify_disk_safety(&self.config, &disk, &mut self.operator)?
            == SafetyVerdict::Cancelled
        {
            return Ok(RunOutcome::Cancelled);
        }

        let total_needed = total_space_needed(&self.state.installers);
        display_size_summary(&self.state.installers);
        check_disk_space(&self.config, &disk, total_needed)?;

        let plan = PartitionPlan::prepare(&self.config, &disk, &self.state.installers)?;
        interrupt::checkpoint()?;

        if !confirm_disk_erasure(&disk, self.state.installers.len(), &mut self.operator)? {
            return Ok(RunOutcome::Cancelled);
        }
        interrupt::checkpoint()?;

        unmount_disk(&self.config, &disk)?;
        self.state.partitioning_started = true;

        let timer = Timer::start("Partitioning");
        partition_disk(&self.config, &plan)?;
        timer.finish();
        interrupt::checkpoint()?;

        let timer = Timer::start("Media creation");
        create_install_media(&self.config, &self.state.installers)?;
        timer.finish();
        interrupt::checkpoint()?;

        Ok(RunOutcome::Completed)
    }

    fn handle_failure(&mut self, err: Error) -> RunStatus {
        error!("{}", err);
        println!("\n❌ {}: {}", err.kind().label(), err);

        if !err.already_reported() {
            if let Some(output) = err.command_output() {
                println!("   Details:\n{}", output);
            }
        }

        self.cleanup();

        if err.kind() == ErrorKind::InstallationFailed && self.state.target_disk.is_some() {
            println!("\n⚠️  The disk may be partially written.");
            println!("   Some volumes may hold a complete installer, others not.");
        }

        self.print_disk_hint();
        RunStatus::Failed
    }

    fn handle_interrupt(&mut self, err: Error) -> RunStatus {
        if err.kind() != ErrorKind::Interrupted {
            debug!("Failure after interrupt: {}", err);
        }
        warn!("Interrupted by user");
        println!("\n⚠️  Interrupted by user");
        self.cleanup();
        self.print_disk_hint();
        RunStatus::Interrupted
    }

    /// Restore the disk if partitioning had begun. Never masks the original error.
    fn cleanup(&self) {
        if !self.state.partitioning_started {
            return;
        }
        let Some(disk) = &self.state.target_disk else {
            return;
        };
        println!("\n🔄 Restoring {}...", disk);
        if let Err(e) = restore_disk(&self.config, disk) {
            warn!("Could not restore {}: {}", disk, e);
            println!("⚠️  Could not restore the disk: {}", e);
            println!("   Restore it manually with: {}", manual_restore_command(disk));
        }
    }

    fn print_disk_hint(&self) {
        match &self.state.target_disk {
            Some(disk) => {
                println!("\n💡 Inspect the disk with: diskutil list {}", disk);
            }
            None => {
                println!("\n💡 List disks with: diskutil list");
            }
        }
    }
}
