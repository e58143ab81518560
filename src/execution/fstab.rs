use anyhow::{Context, Result};
use std::process::Command;

use super::CommandExecutor;
use super::paths;
use super::swap::{FSTAB_LINE, SwapSpec};
use crate::ui::prelude::*;

pub fn generate_fstab(swap: Option<&SwapSpec>, executor: &CommandExecutor) -> Result<()> {
    emit(Level::Info, "fstab.generate", "Generating fstab...", None);

    let fstab_path = paths::chroot_path("/etc/fstab");
    let output = executor.run_with_output(
        Command::new("genfstab")
            .arg("-U")
            .arg(paths::CHROOT_MOUNT),
    )?;

    let Some(output) = output else {
        // Dry run: the command was printed already
        let mut content = String::from("# genfstab -U /mnt output\n");
        if swap.is_some() {
            content = with_swap_line(&content);
        }
        return executor.write_file(&fstab_path, &content);
    };

    let existing = std::fs::read_to_string(&fstab_path).unwrap_or_default();
    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&String::from_utf8_lossy(&output.stdout));

    match swap {
        Some(spec) => {
            content = with_swap_line(&content);
            emit(
                Level::Debug,
                "fstab.swap",
                &format!("Swap file {} listed in fstab", spec.path.display()),
                None,
            );
        }
        None => emit(
            Level::Warn,
            "fstab.swap.missing",
            "No swap file recorded by the disk step; fstab has no swap entry",
            None,
        ),
    }

    executor
        .write_file(&fstab_path, &content)
        .context("Failed to write fstab")?;

    emit(Level::Success, "fstab.done", "Fstab generated.", None);
    Ok(())
}

fn has_swap_line(content: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim();
        if line.starts_with('#') {
            return false;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        fields.len() >= 3 && fields[0] == paths::SWAPFILE && fields[2] == "swap"
    })
}

/// Append the swap file entry unless genfstab already wrote one.
pub fn with_swap_line(content: &str) -> String {
    if has_swap_line(content) {
        return content.to_string();
    }
    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(FSTAB_LINE);
    out.push('\n');
    out
}
