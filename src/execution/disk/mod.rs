pub mod automatic;
pub mod device;
pub mod layout;
pub mod probe;
pub mod reclaim;

use anyhow::{Context, Result};
use dialoguer::Input;

use super::CommandExecutor;
use super::swap::{self, SwapSpec};
use crate::engine::InstallContext;
use crate::ui::prelude::*;

pub use device::{DiskError, PartitionNaming, TargetDevice};
pub use layout::{PartitionPlan, PlanError};
pub use reclaim::{ReclaimBackend, ReclaimReport, SystemBackend, reclaim_device};

/// The operator has to type the device path back before anything is destroyed.
pub fn confirmation_matches(typed: &str, device: &TargetDevice) -> bool {
    typed.trim() == device.path_str()
}

fn confirm_wipe(device: &TargetDevice) -> Result<()> {
    emit(
        Level::Warn,
        "disk.confirm",
        &format!(
            "{} ALL DATA ON {} WILL BE DESTROYED.",
            char::from(NerdFont::Warning),
            device
        ),
        None,
    );
    let typed: String = Input::new()
        .with_prompt(format!("Type {} to continue", device))
        .allow_empty(true)
        .interact_text()
        .context("Failed to read confirmation input")?;

    if !confirmation_matches(&typed, device) {
        anyhow::bail!("Confirmation did not match {}, aborting", device);
    }
    Ok(())
}

/// Release the disk as far as the backend allows, then wipe it. A disk that is
/// still busy only produces a warning; the wipe itself decides whether to fail.
pub fn reclaim_then_wipe(
    device: &TargetDevice,
    backend: &dyn ReclaimBackend,
    attempts: u32,
    executor: &CommandExecutor,
) -> Result<ReclaimReport> {
    let report = reclaim_device(device, backend, attempts);
    if !report.success {
        emit(
            Level::Warn,
            "disk.reclaim.incomplete",
            &format!(
                "{} {} may still be in use; wiping anyway",
                char::from(NerdFont::Warning),
                device
            ),
            None,
        );
    }

    automatic::wipe_disk(device, executor)?;
    Ok(report)
}

/// Reclaim, wipe, partition, format and mount the target disk, then set up
/// the swap file. Returns the swap layout for the later steps.
pub fn prepare_disk(
    context: &InstallContext,
    executor: &CommandExecutor,
    assume_yes: bool,
) -> Result<SwapSpec> {
    let config = &context.config;
    let device = if executor.dry_run {
        // Dry runs may target disks that only exist on the machine being installed
        TargetDevice::open(&config.disk).or_else(|e| match e {
            DiskError::NotFound(_) => TargetDevice::describe(&config.disk),
            other => Err(other),
        })?
    } else {
        TargetDevice::open(&config.disk)?
    };

    let boot_mode = context.boot_mode();
    emit(
        Level::Info,
        "disk.prepare",
        &format!(
            "{} Preparing disk: {} ({} boot)",
            char::from(NerdFont::HardDrive),
            device,
            boot_mode
        ),
        None,
    );

    let plan = PartitionPlan::for_boot_mode(boot_mode, &config.layout);
    plan.validate().context("Invalid partition plan")?;

    let ram_bytes = context
        .system_info
        .total_ram_bytes
        .context("Could not determine the amount of RAM")?;

    if !assume_yes && !executor.dry_run {
        confirm_wipe(&device)?;
    }

    let attempts = if executor.dry_run {
        1
    } else {
        config.reclaim.attempts
    };
    reclaim_then_wipe(&device, &SystemBackend::new(executor), attempts, executor)?;
    automatic::partition_disk(&device, &plan, executor)?;
    automatic::format_partitions(&device, &plan, executor)?;
    automatic::mount_partitions(&device, &plan, executor)?;

    let root = plan
        .root()
        .context("Partition plan has no root partition")?;
    let root_partition = device.partition_path(root.number);

    swap::provision_swap(&root_partition, ram_bytes, config.hibernation, executor)
}
