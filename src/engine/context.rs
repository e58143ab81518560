use anyhow::Result;
use std::path::Path;

use super::config::InstallConfig;
use super::types::{BootMode, SystemInfo};

/// Holds the configuration of an installation together with the detected hardware.
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub config: InstallConfig,
    pub system_info: SystemInfo,
}

impl InstallContext {
    pub fn new(config: InstallConfig, system_info: SystemInfo) -> Self {
        Self {
            config,
            system_info,
        }
    }

    /// Load the configuration file and detect the running system.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = InstallConfig::load(path)?;
        Ok(Self::new(config, SystemInfo::detect()))
    }

    /// The configured boot mode, or the one the firmware reports.
    pub fn boot_mode(&self) -> BootMode {
        self.config.boot_mode.unwrap_or(self.system_info.boot_mode)
    }
}
