mod cli;
mod common;
mod engine;
mod execution;
mod mkinitcpio;
mod ui;

use clap::Parser;
use std::io::IsTerminal;

use crate::cli::Commands;
use crate::ui::prelude::*;

/// Arch Linux installer: disk preparation, base system and hibernation setup
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit machine-readable JSON lines instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() {
    let cli = Cli::parse();

    ui::set_debug_mode(cli.debug);
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    ui::init(format, std::io::stdout().is_terminal());

    if cli.debug {
        emit(Level::Debug, "archstrap.debug", "Debug mode is on", None);
    }

    if let Err(e) = cli::handle_command(cli.command) {
        emit(
            Level::Error,
            "archstrap.error",
            &format!("{} Error: {:#}", char::from(NerdFont::Cross), e),
            None,
        );
        std::process::exit(1);
    }
}
