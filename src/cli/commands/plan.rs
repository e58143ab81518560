use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;

use crate::engine::config::LayoutConfig;
use crate::engine::{BootMode, SystemInfo};
use crate::execution::disk::{PartitionPlan, TargetDevice};
use crate::execution::display_command;
use crate::ui::prelude::*;

pub(super) fn handle_plan_command(disk: PathBuf, boot_mode: Option<BootMode>) -> Result<()> {
    // Previews never touch the disk, so it does not have to exist here
    let device = TargetDevice::describe(&disk)?;
    let boot_mode = boot_mode.unwrap_or_else(|| SystemInfo::detect().boot_mode);

    let plan = PartitionPlan::for_boot_mode(boot_mode, &LayoutConfig::default());
    plan.validate().context("Invalid partition plan")?;

    let mut parted = Command::new("parted");
    parted.args(plan.parted_args(&device));

    emit(
        Level::Info,
        "plan.header",
        &format!(
            "{} {} ({} boot, GPT)",
            char::from(NerdFont::HardDrive),
            device,
            boot_mode
        ),
        Some(serde_json::json!({
            "device": device.path_str(),
            "boot_mode": boot_mode,
            "plan": plan,
            "command": display_command(&parted),
        })),
    );

    for line in plan.describe(&device) {
        emit(Level::Info, "plan.partition", &format!("  {}", line), None);
    }
    emit(
        Level::Debug,
        "plan.command",
        &format!("$ {}", display_command(&parted)),
        None,
    );
    Ok(())
}
