use anyhow::{Context, Result};
use std::process::Command;
use std::time::Duration;

use super::device::TargetDevice;
use super::layout::{Filesystem, PartitionPlan};
use super::probe;
use crate::common::progress::wait_with_spinner;
use crate::execution::paths;
use crate::execution::{CommandExecutor, command_from};
use crate::ui::prelude::*;

/// Remove old filesystem, RAID and partition-table signatures.
pub fn wipe_disk(device: &TargetDevice, executor: &CommandExecutor) -> Result<()> {
    emit(
        Level::Info,
        "disk.wipe",
        &format!("Wiping signatures on {}...", device),
        None,
    );

    // Partitions first; their signatures survive a table rewrite otherwise
    let partitions = probe::get_current_partitions(&device.path_str()).unwrap_or_default();
    for partition in partitions {
        executor
            .run(Command::new("wipefs").args(["-a", &partition]))
            .with_context(|| format!("Failed to wipe {}", partition))?;
    }

    executor
        .run(Command::new("wipefs").args(["-a", &device.path_str()]))
        .with_context(|| format!("Failed to wipe {}", device))?;
    Ok(())
}

pub fn partition_disk(
    device: &TargetDevice,
    plan: &PartitionPlan,
    executor: &CommandExecutor,
) -> Result<()> {
    emit(
        Level::Info,
        "disk.partition",
        &format!("Partitioning {} ({} partitions, GPT)...", device, plan.partitions.len()),
        None,
    );

    executor
        .run(Command::new("parted").args(plan.parted_args(device)))
        .with_context(|| format!("Failed to partition {}", device))?;

    executor
        .run(Command::new("partprobe").arg(device.path()))
        .context("Failed to re-read the partition table")?;

    if !executor.dry_run {
        executor.run(Command::new("udevadm").arg("settle"))?;
        wait_with_spinner("Waiting for partition devices...", Duration::from_secs(2));
    }

    Ok(())
}

/// `mkfs` invocations for every partition that carries a filesystem.
pub fn format_commands(device: &TargetDevice, plan: &PartitionPlan) -> Vec<Vec<String>> {
    plan.partitions
        .iter()
        .filter_map(|part| {
            let path = device.partition_path(part.number);
            match part.filesystem {
                Filesystem::Fat32 => Some(vec!["mkfs.fat".into(), "-F32".into(), path]),
                Filesystem::Ext4 => Some(vec!["mkfs.ext4".into(), "-F".into(), path]),
                Filesystem::None => None,
            }
        })
        .collect()
}

pub fn format_partitions(
    device: &TargetDevice,
    plan: &PartitionPlan,
    executor: &CommandExecutor,
) -> Result<()> {
    emit(Level::Info, "disk.format", "Formatting partitions...", None);
    for argv in format_commands(device, plan) {
        executor
            .run(&mut command_from(&argv))
            .with_context(|| format!("Failed to format {}", argv[argv.len() - 1]))?;
    }
    Ok(())
}

/// Root first, then the boot partition on top of it.
pub fn mount_commands(device: &TargetDevice, plan: &PartitionPlan) -> Result<Vec<Vec<String>>> {
    let root = plan
        .root()
        .context("Partition plan has no root partition")?;
    let boot = plan
        .boot()
        .context("Partition plan has no boot partition")?;

    let boot_target = paths::chroot_path("/boot");
    Ok(vec![
        vec![
            "mount".into(),
            device.partition_path(root.number),
            paths::CHROOT_MOUNT.into(),
        ],
        vec![
            "mount".into(),
            "--mkdir".into(),
            device.partition_path(boot.number),
            boot_target.to_string_lossy().to_string(),
        ],
    ])
}

pub fn mount_partitions(
    device: &TargetDevice,
    plan: &PartitionPlan,
    executor: &CommandExecutor,
) -> Result<()> {
    emit(Level::Info, "disk.mount", "Mounting partitions...", None);
    for argv in mount_commands(device, plan)? {
        executor
            .run(&mut command_from(&argv))
            .with_context(|| format!("Failed to mount {}", argv[argv.len() - 2]))?;
    }
    Ok(())
}
