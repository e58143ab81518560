use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

pub mod base;
pub mod bootloader;
pub mod config;
pub mod disk;
pub mod fstab;
pub mod pacman;
pub mod paths;
pub mod state;
pub mod step;
pub mod swap;

use self::state::InstallState;
use self::step::InstallStep;
use crate::engine::InstallContext;
use crate::ui::prelude::*;

pub struct CommandExecutor {
    pub dry_run: bool,
}

impl CommandExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn run(&self, command: &mut Command) -> Result<()> {
        if self.dry_run {
            self.print_dry_run(command, None);
            return Ok(());
        }
        emit(
            Level::Debug,
            "exec.command",
            &format!("$ {}", display_command(command)),
            None,
        );
        let status = command
            .status()
            .with_context(|| format!("Failed to start {}", display_command(command)))?;
        if !status.success() {
            anyhow::bail!("Command failed ({}): {}", status, display_command(command));
        }
        Ok(())
    }

    pub fn run_with_input(&self, command: &mut Command, input: &str) -> Result<()> {
        self.run_piped(command, input, Some(input))
    }

    /// Like `run_with_input`, but the input never shows up in dry-run output or logs.
    pub fn run_with_secret_input(&self, command: &mut Command, input: &str) -> Result<()> {
        self.run_piped(command, input, Some("<redacted>"))
    }

    fn run_piped(&self, command: &mut Command, input: &str, shown: Option<&str>) -> Result<()> {
        if self.dry_run {
            self.print_dry_run(command, shown);
            return Ok(());
        }

        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped()); // Capture output to avoid clutter

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start {}", display_command(command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes())?;
        }

        let status = child.wait()?;
        if !status.success() {
            anyhow::bail!("Command failed ({}): {}", status, display_command(command));
        }
        Ok(())
    }

    pub fn run_with_output(&self, command: &mut Command) -> Result<Option<Output>> {
        if self.dry_run {
            self.print_dry_run(command, None);
            return Ok(None);
        }
        command.stdout(Stdio::piped());
        let output = command
            .output()
            .with_context(|| format!("Failed to start {}", display_command(command)))?;
        if !output.status.success() {
            anyhow::bail!(
                "Command failed ({}): {}",
                output.status,
                display_command(command)
            );
        }
        Ok(Some(output))
    }

    /// Write a file, or describe the write in dry-run mode.
    pub fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if self.dry_run {
            emit(
                Level::Info,
                "exec.dry_run",
                &format!("[DRY RUN] write {} ({} bytes)", path.display(), content.len()),
                None,
            );
            return Ok(());
        }
        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn print_dry_run(&self, command: &Command, input: Option<&str>) {
        let cmd_str = display_command(command);

        let message = match input {
            Some(input_str) if input_str.contains('\n') => {
                format!("[DRY RUN] {} <<EOF\n{}\nEOF", cmd_str, input_str.trim_end())
            }
            Some(input_str) => format!("[DRY RUN] echo '{}' | {}", input_str, cmd_str),
            None => format!("[DRY RUN] {}", cmd_str),
        };
        emit(Level::Info, "exec.dry_run", &message, None);
    }
}

/// Shell-quoted rendering of a command for logs.
pub fn display_command(command: &Command) -> String {
    let mut words = vec![command.get_program().to_string_lossy().to_string()];
    words.extend(command.get_args().map(|a| a.to_string_lossy().to_string()));
    shell_words::join(words)
}

/// Build a command from an argv list.
pub fn command_from(argv: &[String]) -> Command {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    cmd
}

pub fn execute_installation(
    config_path: PathBuf,
    step: Option<InstallStep>,
    mut dry_run: bool,
    assume_yes: bool,
) -> Result<()> {
    // Check for force dry-run file
    if Path::new(paths::DRY_RUN_FLAG).exists() {
        if !dry_run {
            emit(
                Level::Warn,
                "exec.dry_run.forced",
                &format!(
                    "{} {} exists, forcing dry-run mode.",
                    char::from(NerdFont::Warning),
                    paths::DRY_RUN_FLAG
                ),
                None,
            );
        }
        dry_run = true;
    }

    if dry_run {
        emit(
            Level::Info,
            "exec.dry_run.enabled",
            "*** DRY RUN MODE ENABLED - No changes will be made ***",
            None,
        );
    }

    let executor = CommandExecutor::new(dry_run);

    emit(
        Level::Info,
        "exec.config.load",
        &format!("Loading configuration from: {}", config_path.display()),
        None,
    );
    let mut context = InstallContext::load(&config_path)?;

    emit(
        Level::Info,
        "exec.config.loaded",
        &format!(
            "Installing to {} for user {} ({} boot)",
            context.config.disk,
            context.config.username,
            context.boot_mode()
        ),
        None,
    );

    let steps: Vec<InstallStep> = match step {
        Some(step) => vec![step],
        None => InstallStep::ALL.to_vec(),
    };

    let mut state = InstallState::load().unwrap_or_else(|e| {
        emit(
            Level::Warn,
            "exec.state.load",
            &format!("Warning: Failed to load install state: {}", e),
            None,
        );
        InstallState::new()
    });

    for step in steps {
        execute_step(step, &mut context, &mut state, &executor, assume_yes)?;
    }

    emit(
        Level::Success,
        "exec.done",
        &format!("{} Installation steps finished.", char::from(NerdFont::Check)),
        None,
    );
    Ok(())
}

fn execute_step(
    step: InstallStep,
    context: &mut InstallContext,
    state: &mut InstallState,
    executor: &CommandExecutor,
    assume_yes: bool,
) -> Result<()> {
    if let Err(missing) = state.check_dependencies(step) {
        if executor.dry_run {
            emit(
                Level::Warn,
                "exec.step.dependencies",
                &format!(
                    "Warning: Missing dependencies for {:?}: {:?}. Proceeding (Dry Run).",
                    step, missing
                ),
                None,
            );
        } else {
            anyhow::bail!("Missing dependencies for {:?}: {:?}", step, missing);
        }
    }

    separator(true);
    emit(
        Level::Info,
        "exec.step.start",
        &format!("{} Step: {}", char::from(NerdFont::Gear), step.name()),
        None,
    );

    match step {
        InstallStep::Disk => {
            let swap = disk::prepare_disk(context, executor, assume_yes)?;
            state.swap = Some(swap);
        }
        InstallStep::Base => base::install_base(context, executor)?,
        InstallStep::Fstab => fstab::generate_fstab(state.swap.as_ref(), executor)?,
        InstallStep::Config => config::install_config(context, executor)?,
        InstallStep::Bootloader => {
            bootloader::install_bootloader(context, state.swap.as_ref(), executor)?
        }
    }

    emit(
        Level::Success,
        "exec.step.done",
        &format!("{} Step {} complete", char::from(NerdFont::Check), step.name()),
        None,
    );

    // Dry runs keep the in-memory state only
    if !executor.dry_run {
        state.mark_complete(step);
        if let Err(e) = state.save() {
            emit(
                Level::Warn,
                "exec.state.save",
                &format!("Warning: Failed to save install state: {}", e),
                None,
            );
        }
    }

    Ok(())
}
