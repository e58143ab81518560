use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, clap::ValueEnum, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstallStep {
    /// Prepare disk (reclaim, partition, format, mount, swap file)
    Disk,
    /// Install base system (pacstrap)
    Base,
    /// Generate fstab
    Fstab,
    /// Configure system (timezone, locale, hostname, users, services)
    Config,
    /// Install and configure the bootloader
    Bootloader,
}

impl InstallStep {
    pub const ALL: [InstallStep; 5] = [
        InstallStep::Disk,
        InstallStep::Base,
        InstallStep::Fstab,
        InstallStep::Config,
        InstallStep::Bootloader,
    ];

    pub fn dependencies(&self) -> Vec<InstallStep> {
        match self {
            InstallStep::Disk => vec![],
            InstallStep::Base => vec![InstallStep::Disk],
            InstallStep::Fstab => vec![InstallStep::Base],
            InstallStep::Config => vec![InstallStep::Base],
            InstallStep::Bootloader => vec![InstallStep::Fstab, InstallStep::Config],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InstallStep::Disk => "disk",
            InstallStep::Base => "base",
            InstallStep::Fstab => "fstab",
            InstallStep::Config => "config",
            InstallStep::Bootloader => "bootloader",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_only_point_backwards() {
        for (idx, step) in InstallStep::ALL.iter().enumerate() {
            for dep in step.dependencies() {
                let dep_idx = InstallStep::ALL.iter().position(|s| *s == dep).unwrap();
                assert!(dep_idx < idx, "{:?} depends on later step {:?}", step, dep);
            }
        }
    }
}
