mod commands;
mod utils;

use clap::Subcommand;
use std::path::PathBuf;

use crate::engine::BootMode;
use crate::execution::step::InstallStep;

pub use commands::handle_command;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "/etc/archstrap/install.toml";

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Execute installation steps from a configuration file
    Exec {
        /// The step to execute (defaults to all steps in order)
        #[arg(value_enum)]
        step: Option<InstallStep>,
        /// Path to the installation TOML file
        #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Run in dry-run mode (no changes will be made)
        #[arg(long)]
        dry_run: bool,
        /// Skip the typed confirmation before the disk is wiped
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Release a disk from mounts, swap, LVM and processes holding it
    Reclaim {
        /// Whole-disk device, e.g. /dev/sdb
        disk: PathBuf,
        /// Maximum number of cleanup attempts
        #[arg(long, default_value_t = 3)]
        attempts: u32,
        /// Print actions instead of running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the partition layout that would be created on a disk
    Plan {
        /// Whole-disk device, e.g. /dev/nvme0n1
        disk: PathBuf,
        /// Boot mode to plan for (defaults to the detected one)
        #[arg(long, value_enum)]
        boot_mode: Option<BootMode>,
    },
    /// Show system information in a pretty format
    Info,
}
