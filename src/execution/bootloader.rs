use anyhow::{Context, Result};
use std::process::Command;

use super::CommandExecutor;
use super::paths;
use super::swap::{ResumeTarget, SwapSpec};
use crate::engine::{BootMode, InstallContext};
use crate::mkinitcpio::MkinitcpioConfig;
use crate::ui::prelude::*;

const BASE_CMDLINE: &str = "loglevel=3 quiet";

pub fn install_bootloader(
    context: &InstallContext,
    swap: Option<&SwapSpec>,
    executor: &CommandExecutor,
) -> Result<()> {
    emit(
        Level::Info,
        "bootloader.start",
        "Installing bootloader (inside chroot)...",
        None,
    );

    let mut grub_install = chroot(&["grub-install"]);
    if context.boot_mode().is_uefi() {
        emit(
            Level::Info,
            "bootloader.uefi",
            "Installing GRUB for UEFI...",
            None,
        );
    } else {
        emit(
            Level::Info,
            "bootloader.bios",
            &format!("Installing GRUB to {}", context.config.disk),
            None,
        );
    }
    grub_install.args(grub_install_args(context.boot_mode(), &context.config.disk));
    executor
        .run(&mut grub_install)
        .context("Failed to install GRUB")?;

    let resume = swap.and_then(|s| s.resume.as_ref());
    if resume.is_none() {
        emit(
            Level::Warn,
            "bootloader.resume.missing",
            &format!(
                "{} No hibernation resume target; booting with '{}'",
                char::from(NerdFont::Warning),
                BASE_CMDLINE
            ),
            None,
        );
    }

    configure_grub_defaults(resume, executor)?;

    if resume.is_some() {
        configure_resume_hook(executor)?;
    }

    executor
        .run(&mut chroot(&["grub-mkconfig", "-o", "/boot/grub/grub.cfg"]))
        .context("Failed to generate grub.cfg")?;

    Ok(())
}

/// `grub-install` arguments. 32-bit UEFI firmware needs the i386 EFI image even
/// on a 64-bit kernel.
pub fn grub_install_args(boot_mode: BootMode, disk: &str) -> Vec<String> {
    let target = match boot_mode {
        BootMode::UEFI64 => "x86_64-efi",
        BootMode::UEFI32 => "i386-efi",
        BootMode::BIOS => return vec!["--target=i386-pc".to_string(), disk.to_string()],
    };
    vec![
        format!("--target={}", target),
        "--efi-directory=/boot".to_string(),
        "--bootloader-id=GRUB".to_string(),
    ]
}

fn chroot(args: &[&str]) -> Command {
    let mut cmd = Command::new("arch-chroot");
    cmd.arg(paths::CHROOT_MOUNT).args(args);
    cmd
}

/// Kernel command line for the installed system.
pub fn kernel_cmdline(resume: Option<&ResumeTarget>) -> String {
    match resume {
        Some(target) => format!("{} {}", BASE_CMDLINE, target.kernel_params()),
        None => BASE_CMDLINE.to_string(),
    }
}

/// Replace `GRUB_CMDLINE_LINUX_DEFAULT`, appending it when absent.
pub fn set_grub_cmdline_default(content: &str, cmdline: &str) -> String {
    let new_line = format!("GRUB_CMDLINE_LINUX_DEFAULT=\"{}\"", cmdline);
    let mut replaced = false;

    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            if !replaced && line.trim().starts_with("GRUB_CMDLINE_LINUX_DEFAULT=") {
                replaced = true;
                new_line.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(new_line);
    }
    lines.join("\n") + "\n"
}

fn read_or_empty(path: &std::path::Path, executor: &CommandExecutor) -> Result<String> {
    if executor.dry_run {
        return Ok(String::new());
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn configure_grub_defaults(
    resume: Option<&ResumeTarget>,
    executor: &CommandExecutor,
) -> Result<()> {
    let cmdline = kernel_cmdline(resume);
    emit(
        Level::Info,
        "bootloader.cmdline",
        &format!("Kernel command line: {}", cmdline),
        None,
    );

    let grub_default = paths::chroot_path("/etc/default/grub");
    let content = read_or_empty(&grub_default, executor)?;
    executor.write_file(&grub_default, &set_grub_cmdline_default(&content, &cmdline))
}

/// Add the `resume` hook unless the initramfs is systemd based, which resumes on its own.
pub fn add_resume_hook(content: &str) -> Option<String> {
    let mut config = MkinitcpioConfig::parse(content);
    if config.contains_hook("systemd") || config.contains_hook("resume") {
        return None;
    }
    config.insert_after("resume", "filesystems");
    Some(config.to_string())
}

fn configure_resume_hook(executor: &CommandExecutor) -> Result<()> {
    let conf = paths::chroot_path("/etc/mkinitcpio.conf");
    let content = read_or_empty(&conf, executor)?;

    match add_resume_hook(&content) {
        Some(updated) => {
            emit(
                Level::Info,
                "bootloader.mkinitcpio",
                "Adding resume hook to mkinitcpio.conf",
                None,
            );
            executor.write_file(&conf, &updated)?;
        }
        None => emit(
            Level::Debug,
            "bootloader.mkinitcpio",
            "mkinitcpio.conf already handles resume",
            None,
        ),
    }

    executor
        .run(&mut chroot(&["mkinitcpio", "-P"]))
        .context("Failed to regenerate initramfs")
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRUB_DEFAULT: &str = "\
GRUB_DEFAULT=0
GRUB_TIMEOUT=5
GRUB_DISTRIBUTOR=\"Arch\"
GRUB_CMDLINE_LINUX_DEFAULT=\"loglevel=3 quiet\"
GRUB_CMDLINE_LINUX=\"\"
";

    #[test]
    fn test_grub_install_target_follows_firmware() {
        assert_eq!(
            grub_install_args(BootMode::UEFI64, "/dev/sdb"),
            vec!["--target=x86_64-efi", "--efi-directory=/boot", "--bootloader-id=GRUB"]
        );
        assert_eq!(
            grub_install_args(BootMode::UEFI32, "/dev/sdb")[0],
            "--target=i386-efi"
        );
        assert_eq!(
            grub_install_args(BootMode::BIOS, "/dev/sdb"),
            vec!["--target=i386-pc", "/dev/sdb"]
        );
    }

    #[test]
    fn test_kernel_cmdline() {
        assert_eq!(kernel_cmdline(None), "loglevel=3 quiet");
        let target = ResumeTarget {
            uuid: "0a3407de-014b-458b-b5c1-848e92a327a3".into(),
            offset: 34816,
        };
        assert_eq!(
            kernel_cmdline(Some(&target)),
            "loglevel=3 quiet resume=UUID=0a3407de-014b-458b-b5c1-848e92a327a3 resume_offset=34816"
        );
    }

    #[test]
    fn test_set_grub_cmdline_default_only_touches_default_line() {
        let updated = set_grub_cmdline_default(GRUB_DEFAULT, "loglevel=3 quiet resume=UUID=x resume_offset=1");
        assert!(updated.contains(
            "GRUB_CMDLINE_LINUX_DEFAULT=\"loglevel=3 quiet resume=UUID=x resume_offset=1\"\n"
        ));
        assert!(updated.contains("GRUB_CMDLINE_LINUX=\"\"\n"));
        assert_eq!(updated.lines().count(), GRUB_DEFAULT.lines().count());
    }

    #[test]
    fn test_set_grub_cmdline_default_without_resume() {
        let with_resume = GRUB_DEFAULT.replace("quiet\"", "quiet resume=UUID=old resume_offset=9\"");
        let updated = set_grub_cmdline_default(&with_resume, &kernel_cmdline(None));
        assert!(updated.contains("GRUB_CMDLINE_LINUX_DEFAULT=\"loglevel=3 quiet\"\n"));
        assert!(!updated.contains("resume"));
    }

    #[test]
    fn test_set_grub_cmdline_default_appends_when_missing() {
        let updated = set_grub_cmdline_default("GRUB_TIMEOUT=5", "loglevel=3 quiet");
        assert_eq!(
            updated,
            "GRUB_TIMEOUT=5\nGRUB_CMDLINE_LINUX_DEFAULT=\"loglevel=3 quiet\"\n"
        );
    }

    #[test]
    fn test_add_resume_hook() {
        let conf = "HOOKS=(base udev autodetect modconf block filesystems keyboard fsck)\n";
        assert_eq!(
            add_resume_hook(conf).unwrap(),
            "HOOKS=(base udev autodetect modconf block filesystems resume keyboard fsck)\n"
        );

        let systemd = "HOOKS=(base systemd autodetect modconf block filesystems fsck)\n";
        assert_eq!(add_resume_hook(systemd), None);

        let already = "HOOKS=(base udev block filesystems resume fsck)\n";
        assert_eq!(add_resume_hook(already), None);
    }

    #[test]
    fn test_dry_run_bootloader() {
        use crate::engine::{BootMode, InstallConfig, SystemInfo};
        use std::path::PathBuf;

        let config = InstallConfig::from_toml(
            "disk = \"/dev/sdb\"\nhostname = \"box\"\nusername = \"alex\"\npassword = \"pw\"\n",
        )
        .unwrap();
        let info = SystemInfo {
            boot_mode: BootMode::BIOS,
            ..Default::default()
        };
        let context = InstallContext::new(config, info);
        let swap = SwapSpec {
            ram_bytes: 1024,
            size_bytes: 1177,
            path: PathBuf::from("/swapfile"),
            resume: Some(ResumeTarget {
                uuid: "abcd".into(),
                offset: 1,
            }),
        };
        let executor = CommandExecutor::new(true);
        install_bootloader(&context, Some(&swap), &executor).unwrap();
        install_bootloader(&context, None, &executor).unwrap();
    }
}
