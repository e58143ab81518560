use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::CommandExecutor;
use super::disk::probe;
use super::paths;
use crate::ui::prelude::*;

/// fstab entry for the swap file, relative to the installed root.
pub const FSTAB_LINE: &str = "/swapfile none swap defaults 0 0";

/// Where the kernel finds the hibernation image on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeTarget {
    /// Filesystem UUID of the partition holding the swap file.
    pub uuid: String,
    /// Physical offset of the swap file's first extent, in filesystem blocks.
    pub offset: u64,
}

impl ResumeTarget {
    pub fn kernel_params(&self) -> String {
        format!("resume=UUID={} resume_offset={}", self.uuid, self.offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSpec {
    pub ram_bytes: u64,
    pub size_bytes: u64,
    /// Path inside the installed system.
    pub path: PathBuf,
    /// `None` when hibernation is disabled or could not be set up.
    pub resume: Option<ResumeTarget>,
}

/// 115% of RAM, rounded down.
pub fn swap_size_for(ram_bytes: u64) -> u64 {
    let size = u128::from(ram_bytes) * 115 / 100;
    u64::try_from(size).unwrap_or(u64::MAX)
}

/// `physical_offset` start of extent 0 in `filefrag -v` output.
pub fn parse_first_extent_offset(output: &str) -> Option<u64> {
    for line in output.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 3 || fields[0].trim() != "0" {
            continue;
        }
        let start = fields[2].split("..").next()?.trim();
        let offset: u64 = start.parse().ok()?;
        return if offset == 0 { None } else { Some(offset) };
    }
    None
}

/// Combine the probed UUID and offset, warning when hibernation has to be dropped.
pub fn resume_from(uuid: Option<String>, offset: Option<u64>) -> Option<ResumeTarget> {
    match (uuid, offset) {
        (Some(uuid), Some(offset)) => Some(ResumeTarget { uuid, offset }),
        (None, _) => {
            emit(
                Level::Warn,
                "swap.resume.uuid",
                &format!(
                    "{} Could not determine the root filesystem UUID; hibernation resume disabled",
                    char::from(NerdFont::Warning)
                ),
                None,
            );
            None
        }
        (_, None) => {
            emit(
                Level::Warn,
                "swap.resume.offset",
                &format!(
                    "{} Could not determine the swap file offset; hibernation resume disabled",
                    char::from(NerdFont::Warning)
                ),
                None,
            );
            None
        }
    }
}

fn probe_offset(swapfile: &Path) -> Option<u64> {
    let output = Command::new("filefrag").arg("-v").arg(swapfile).output();
    match output {
        Ok(output) if output.status.success() => {
            parse_first_extent_offset(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            emit(
                Level::Debug,
                "swap.filefrag",
                &format!(
                    "filefrag failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                None,
            );
            None
        }
        Err(e) => {
            emit(
                Level::Debug,
                "swap.filefrag",
                &format!("Failed to run filefrag: {}", e),
                None,
            );
            None
        }
    }
}

/// Allocate `size_bytes` at `swapfile`, restrict it to root and check the
/// resulting length. A pre-existing larger file is an error, not truncated.
pub fn allocate_swapfile(
    swapfile: &Path,
    size_bytes: u64,
    executor: &CommandExecutor,
) -> Result<()> {
    executor
        .run(
            Command::new("fallocate")
                .args(["-l", &size_bytes.to_string()])
                .arg(swapfile),
        )
        .context("Failed to allocate swap file")?;
    executor
        .run(Command::new("chmod").arg("600").arg(swapfile))
        .context("Failed to restrict swap file permissions")?;

    if executor.dry_run {
        return Ok(());
    }
    let actual = std::fs::metadata(swapfile)
        .with_context(|| format!("Failed to stat {}", swapfile.display()))?
        .len();
    if actual != size_bytes {
        anyhow::bail!("Swap file is {} bytes, expected {}", actual, size_bytes);
    }
    Ok(())
}

/// Create, verify and activate the swap file on the mounted root, then work out
/// the hibernation resume target.
pub fn provision_swap(
    root_partition: &str,
    ram_bytes: u64,
    hibernation: bool,
    executor: &CommandExecutor,
) -> Result<SwapSpec> {
    let size_bytes = swap_size_for(ram_bytes);
    let swapfile = paths::chroot_path(paths::SWAPFILE);

    emit(
        Level::Info,
        "swap.create",
        &format!(
            "{} Creating {} bytes of swap at {}",
            char::from(NerdFont::Swap),
            size_bytes,
            swapfile.display()
        ),
        None,
    );

    allocate_swapfile(&swapfile, size_bytes, executor)?;

    executor
        .run(Command::new("mkswap").arg(&swapfile))
        .context("Failed to format swap file")?;
    executor
        .run(Command::new("swapon").arg(&swapfile))
        .context("Failed to activate swap file")?;

    let resume = if !hibernation {
        emit(
            Level::Info,
            "swap.resume.disabled",
            "Hibernation disabled in configuration",
            None,
        );
        None
    } else if executor.dry_run {
        emit(
            Level::Info,
            "exec.dry_run",
            &format!(
                "[DRY RUN] filefrag -v {} && blkid -o value -s UUID {}",
                swapfile.display(),
                root_partition
            ),
            None,
        );
        None
    } else {
        let uuid = probe::get_fs_uuid(root_partition).ok().flatten();
        resume_from(uuid, probe_offset(&swapfile))
    };

    if let Some(target) = &resume {
        emit(
            Level::Success,
            "swap.resume",
            &format!("Hibernation resume: {}", target.kernel_params()),
            None,
        );
    }

    Ok(SwapSpec {
        ram_bytes,
        size_bytes,
        path: PathBuf::from(paths::SWAPFILE),
        resume,
    })
}
