use anyhow::Result;
use std::path::PathBuf;

use super::super::utils::ensure_root;
use crate::execution::CommandExecutor;
use crate::execution::disk::{SystemBackend, TargetDevice, reclaim_device};
use crate::ui::prelude::*;

pub(super) fn handle_reclaim_command(disk: PathBuf, attempts: u32, dry_run: bool) -> Result<()> {
    if !dry_run {
        ensure_root()?;
    }

    let device = TargetDevice::open(&disk)?;
    let executor = CommandExecutor::new(dry_run);
    let attempts = if dry_run { 1 } else { attempts };

    let report = reclaim_device(&device, &SystemBackend::new(&executor), attempts);

    let level = if report.success {
        Level::Success
    } else {
        Level::Warn
    };
    emit(
        level,
        "reclaim.summary",
        &format!(
            "{} attempt(s): {} process(es) signalled, {} mount(s) removed, {} swap area(s) disabled, {} volume group(s) deactivated",
            report.attempts_made(),
            report.processes_killed(),
            report.mounts_removed(),
            report.swaps_disabled(),
            report.lvm_deactivated()
        ),
        serde_json::to_value(&report).ok(),
    );
    Ok(())
}
