use serde::{Deserialize, Serialize};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::probe;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiskError {
    #[error("invalid device path '{0}': expected /dev/<name>")]
    InvalidPath(String),
    #[error("device {0} does not exist")]
    NotFound(PathBuf),
    #[error("{0} is not a block device")]
    NotBlockDevice(PathBuf),
    #[error("{0} is a partition; select the whole disk instead")]
    IsPartition(PathBuf),
    #[error("{0} holds the running system's root filesystem")]
    InUseBySystem(PathBuf),
}

/// How the kernel names partitions of a disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionNaming {
    /// `sda` -> `sda1`
    Plain,
    /// `nvme0n1` -> `nvme0n1p1`, also mmcblk and loop devices
    Suffixed,
}

impl PartitionNaming {
    pub fn for_name(name: &str) -> Self {
        if name.chars().last().is_some_and(|c| c.is_ascii_digit()) {
            PartitionNaming::Suffixed
        } else {
            PartitionNaming::Plain
        }
    }
}

/// A whole-disk block device that has been checked before anything destructive runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDevice {
    path: PathBuf,
    name: String,
    naming: PartitionNaming,
}

impl TargetDevice {
    /// Parse a device path without touching the system. Used for previews.
    pub fn describe(path: impl AsRef<Path>) -> Result<Self, DiskError> {
        let path = path.as_ref();
        let raw = path.to_string_lossy().to_string();
        let name = raw
            .strip_prefix("/dev/")
            .filter(|n| !n.is_empty() && !n.contains('/'))
            .ok_or_else(|| DiskError::InvalidPath(raw.clone()))?
            .to_string();
        Ok(Self {
            path: path.to_path_buf(),
            naming: PartitionNaming::for_name(&name),
            name,
        })
    }

    /// Validate that `path` is a whole, unused-by-the-host block device.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DiskError> {
        let device = Self::describe(path)?;

        let metadata =
            std::fs::metadata(&device.path).map_err(|_| DiskError::NotFound(device.path.clone()))?;
        if !metadata.file_type().is_block_device() {
            return Err(DiskError::NotBlockDevice(device.path.clone()));
        }

        let sys_entry = Path::new("/sys/class/block").join(&device.name);
        if sys_entry.join("partition").exists() {
            return Err(DiskError::IsPartition(device.path.clone()));
        }

        if let Ok(Some(root_disk)) = probe::get_root_disk()
            && root_disk == device.path_str()
        {
            return Err(DiskError::InUseBySystem(device.path.clone()));
        }

        Ok(device)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn naming(&self) -> PartitionNaming {
        self.naming
    }

    pub fn partition_path(&self, number: u32) -> String {
        match self.naming {
            PartitionNaming::Suffixed => format!("{}p{}", self.path_str(), number),
            PartitionNaming::Plain => format!("{}{}", self.path_str(), number),
        }
    }

    /// Whether `source` is this disk or one of its partitions.
    pub fn owns(&self, source: &str) -> bool {
        let name = source.strip_prefix("/dev/").unwrap_or(source);
        let Some(rest) = name.strip_prefix(self.name.as_str()) else {
            return false;
        };
        if rest.is_empty() {
            return true;
        }
        let digits = match self.naming {
            PartitionNaming::Suffixed => match rest.strip_prefix('p') {
                Some(d) => d,
                None => return false,
            },
            PartitionNaming::Plain => rest,
        };
        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    }
}

impl std::fmt::Display for TargetDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
