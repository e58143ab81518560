use colored::Colorize;
use std::collections::HashSet;
use std::path::Path;

use super::types::{BootMode, SystemInfo, Vendor};
use crate::execution::disk::probe;

impl std::fmt::Display for BootMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootMode::UEFI64 => write!(f, "UEFI64"),
            BootMode::UEFI32 => write!(f, "UEFI32"),
            BootMode::BIOS => write!(f, "BIOS"),
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vendor::Intel => write!(f, "Intel"),
            Vendor::Amd => write!(f, "AMD"),
            Vendor::Nvidia => write!(f, "NVIDIA"),
            Vendor::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Vendor {
    pub fn to_colored_string(&self) -> colored::ColoredString {
        match self {
            Vendor::Nvidia => self.to_string().bright_green(),
            Vendor::Amd => self.to_string().bright_red(),
            Vendor::Intel => self.to_string().bright_blue(),
            Vendor::Unknown => self.to_string().bright_black(),
        }
    }

    /// Microcode package for a CPU of this vendor.
    pub fn microcode_package(&self) -> Option<&'static str> {
        match self {
            Vendor::Intel => Some("intel-ucode"),
            Vendor::Amd => Some("amd-ucode"),
            Vendor::Nvidia | Vendor::Unknown => None,
        }
    }

    /// Returns driver packages for a GPU of this vendor.
    /// For NVIDIA, pass the kernel name to get kernel-specific drivers (nvidia, nvidia-lts, nvidia-dkms).
    pub fn gpu_driver_packages(&self, kernel: &str) -> Vec<&'static str> {
        match self {
            Vendor::Nvidia => {
                let mut packages = Vec::new();
                match kernel {
                    "linux" => packages.push("nvidia"),
                    "linux-lts" => packages.push("nvidia-lts"),
                    _ => {
                        // Custom kernels (zen, hardened, etc) need DKMS
                        packages.push("nvidia-dkms");
                        packages.push("dkms");
                    }
                }
                packages.push("nvidia-utils");
                packages
            }
            Vendor::Amd => vec!["mesa", "vulkan-radeon", "libva-mesa-driver"],
            Vendor::Intel => vec!["mesa", "vulkan-intel", "intel-media-driver"],
            Vendor::Unknown => vec!["mesa"],
        }
    }
}

/// Classify a CPU from `/proc/cpuinfo` content.
pub fn classify_cpu(cpuinfo: &str) -> Vendor {
    for line in cpuinfo.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim() != "vendor_id" {
            continue;
        }
        return match value.trim() {
            "GenuineIntel" => Vendor::Intel,
            "AuthenticAMD" => Vendor::Amd,
            _ => Vendor::Unknown,
        };
    }
    Vendor::Unknown
}

/// Classify a single GPU description: a `/sys/class/drm/*/device` link target,
/// a PCI vendor id, or an `lspci` line.
pub fn classify_gpu(description: &str) -> Vendor {
    let lower = description.to_lowercase();
    if lower.contains("nvidia") || lower.contains("0x10de") {
        Vendor::Nvidia
    } else if lower.contains("amd")
        || lower.contains("radeon")
        || lower.contains("advanced micro devices")
        || lower.contains("0x1002")
    {
        Vendor::Amd
    } else if lower.contains("intel") || lower.contains("0x8086") {
        Vendor::Intel
    } else {
        Vendor::Unknown
    }
}

/// Classify every display controller in `lspci` output.
pub fn classify_lspci(output: &str) -> Vec<Vendor> {
    let mut found = HashSet::new();
    for line in output.lines() {
        let lower = line.to_lowercase();
        let is_display = lower.contains("vga compatible controller")
            || lower.contains("3d controller")
            || lower.contains("display controller");
        if is_display {
            found.insert(classify_gpu(line));
        }
    }
    let mut gpus: Vec<Vendor> = found.into_iter().collect();
    gpus.sort_by_key(|v| v.to_string());
    gpus
}

/// Boot mode from the firmware directory (normally `/sys/firmware/efi`).
pub fn detect_boot_mode(efi_dir: &Path) -> BootMode {
    let platform_size = efi_dir.join("fw_platform_size");
    if let Ok(content) = std::fs::read_to_string(&platform_size) {
        return match content.trim() {
            "32" => BootMode::UEFI32,
            _ => BootMode::UEFI64,
        };
    }
    if efi_dir.exists() {
        // Fallback if fw_platform_size doesn't exist but efi does
        BootMode::UEFI64
    } else {
        BootMode::BIOS
    }
}

impl SystemInfo {
    pub fn detect() -> Self {
        let mut info = SystemInfo {
            boot_mode: detect_boot_mode(Path::new("/sys/firmware/efi")),
            ..Default::default()
        };

        if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") {
            info.cpu = classify_cpu(&cpuinfo);
        }

        info.gpus = detect_gpus();

        if let Ok(virt) = std::process::Command::new("systemd-detect-virt").output()
            && virt.status.success()
        {
            let kind = String::from_utf8_lossy(&virt.stdout).trim().to_string();
            if kind != "none" && !kind.is_empty() {
                info.vm_type = Some(kind);
            }
        }

        info.architecture = std::env::consts::ARCH.to_string();
        info.total_ram_bytes = probe::get_total_ram_bytes();

        info
    }
}

fn detect_gpus() -> Vec<Vendor> {
    let mut detected = HashSet::new();

    // /sys/class/drm/cardN/device/vendor holds the PCI vendor id
    if let Ok(entries) = std::fs::read_dir("/sys/class/drm") {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("card") || name.contains('-') {
                continue;
            }
            if let Ok(vendor_id) = std::fs::read_to_string(entry.path().join("device/vendor")) {
                let vendor = classify_gpu(vendor_id.trim());
                if vendor != Vendor::Unknown {
                    detected.insert(vendor);
                }
            }
        }
    }

    if detected.is_empty()
        && let Ok(lspci) = std::process::Command::new("lspci").output()
    {
        return classify_lspci(&String::from_utf8_lossy(&lspci.stdout));
    }

    let mut gpus: Vec<Vendor> = detected.into_iter().collect();
    gpus.sort_by_key(|v| v.to_string());
    gpus
}
