use anyhow::Result;

use super::CommandExecutor;
use super::pacman;
use super::paths;
use crate::engine::{InstallContext, Vendor};
use crate::ui::prelude::*;

pub fn install_base(context: &InstallContext, executor: &CommandExecutor) -> Result<()> {
    let packages = base_packages(context);

    if context.system_info.cpu == Vendor::Unknown {
        emit(
            Level::Warn,
            "base.cpu.unknown",
            "Unknown CPU vendor, no microcode will be installed",
            None,
        );
    }
    if context.system_info.gpus.is_empty() {
        emit(
            Level::Warn,
            "base.gpu.unknown",
            "No GPU detected, installing generic mesa drivers",
            None,
        );
    }

    pacman::pacstrap(paths::CHROOT_MOUNT, &packages, executor)
}

/// Full package list for pacstrap, in install order and without duplicates.
pub fn base_packages(context: &InstallContext) -> Vec<String> {
    let config = &context.config;
    let info = &context.system_info;

    let mut packages: Vec<String> = Vec::new();
    let mut add = |name: &str| {
        if !packages.iter().any(|p| p == name) {
            packages.push(name.to_string());
        }
    };

    add("base");
    add(&config.kernel);
    add("linux-firmware");
    add("grub");
    if context.boot_mode().is_uefi() {
        add("efibootmgr");
    }
    add("networkmanager");
    add("sudo");

    if let Some(ucode) = info.cpu.microcode_package() {
        add(ucode);
    }

    let gpus: &[Vendor] = if info.gpus.is_empty() {
        &[Vendor::Unknown]
    } else {
        &info.gpus
    };
    for gpu in gpus {
        for package in gpu.gpu_driver_packages(&config.kernel) {
            add(package);
        }
    }

    for extra in &config.extra_packages {
        add(extra);
    }

    packages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BootMode, InstallConfig, SystemInfo};

    fn context(extra: &str, info: SystemInfo) -> InstallContext {
        let toml = format!(
            "disk = \"/dev/sdb\"\nhostname = \"box\"\nusername = \"alex\"\npassword = \"pw\"\n{}",
            extra
        );
        InstallContext::new(InstallConfig::from_toml(&toml).unwrap(), info)
    }

    #[test]
    fn test_uefi_intel_nvidia_package_list() {
        let info = SystemInfo {
            boot_mode: BootMode::UEFI64,
            cpu: Vendor::Intel,
            gpus: vec![Vendor::Intel, Vendor::Nvidia],
            ..Default::default()
        };
        let packages = base_packages(&context("extra_packages = [\"vim\", \"mesa\"]", info));
        assert_eq!(
            packages,
            vec![
                "base",
                "linux",
                "linux-firmware",
                "grub",
                "efibootmgr",
                "networkmanager",
                "sudo",
                "intel-ucode",
                "mesa",
                "vulkan-intel",
                "intel-media-driver",
                "nvidia",
                "nvidia-utils",
                "vim",
            ]
        );
    }

    #[test]
    fn test_bios_unknown_hardware_package_list() {
        let info = SystemInfo {
            boot_mode: BootMode::BIOS,
            ..Default::default()
        };
        let packages = base_packages(&context("kernel = \"linux-lts\"", info));
        assert!(!packages.contains(&"efibootmgr".to_string()));
        assert!(packages.contains(&"linux-lts".to_string()));
        assert!(!packages.iter().any(|p| p.ends_with("-ucode")));
        assert!(packages.contains(&"mesa".to_string()));
    }
}
