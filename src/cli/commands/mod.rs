mod exec;
mod info;
mod plan;
mod reclaim;

use anyhow::Result;

use crate::cli::Commands;

use self::exec::handle_exec_command;
use self::info::handle_info_command;
use self::plan::handle_plan_command;
use self::reclaim::handle_reclaim_command;

pub fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Exec {
            step,
            config,
            dry_run,
            yes,
        } => handle_exec_command(step, config, dry_run, yes),
        Commands::Reclaim {
            disk,
            attempts,
            dry_run,
        } => handle_reclaim_command(disk, attempts, dry_run),
        Commands::Plan { disk, boot_mode } => handle_plan_command(disk, boot_mode),
        Commands::Info => handle_info_command(),
    }
}
