use anyhow::Result;
use std::path::PathBuf;

use super::super::utils::ensure_root;
use crate::execution::paths;
use crate::execution::step::InstallStep;

pub(super) fn handle_exec_command(
    step: Option<InstallStep>,
    config: PathBuf,
    dry_run: bool,
    yes: bool,
) -> Result<()> {
    if !dry_run {
        ensure_root()?;
        crate::ui::set_log_file(Some(PathBuf::from(paths::LOG_FILE)));
    }

    crate::execution::execute_installation(config, step, dry_run, yes)
}
