use anyhow::Result;

use super::super::utils::print_system_info;
use crate::engine::SystemInfo;
use crate::ui::prelude::*;

pub(super) fn handle_info_command() -> Result<()> {
    let info = SystemInfo::detect();
    match get_output_format() {
        OutputFormat::Json => emit(
            Level::Info,
            "info.system",
            "System information",
            serde_json::to_value(&info).ok(),
        ),
        OutputFormat::Text => print_system_info(&info),
    }
    Ok(())
}
