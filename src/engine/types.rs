use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BootMode {
    #[value(name = "uefi")]
    #[serde(alias = "uefi")]
    UEFI64,
    #[value(name = "uefi32")]
    UEFI32,
    #[default]
    #[value(name = "bios")]
    BIOS,
}

impl BootMode {
    pub fn is_uefi(&self) -> bool {
        matches!(self, BootMode::UEFI64 | BootMode::UEFI32)
    }
}

/// Hardware vendor as classified from CPU or GPU identification strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Vendor {
    Intel,
    Amd,
    Nvidia,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SystemInfo {
    pub boot_mode: BootMode,
    pub cpu: Vendor,
    pub gpus: Vec<Vendor>,
    pub vm_type: Option<String>,
    pub architecture: String,
    pub total_ram_bytes: Option<u64>,
}
