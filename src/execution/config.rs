use anyhow::{Context, Result};
use std::process::Command;

use super::CommandExecutor;
use super::paths;
use crate::engine::InstallContext;
use crate::ui::prelude::*;

const WHEEL_RULE: &str = "%wheel ALL=(ALL:ALL) ALL";

pub fn install_config(context: &mut InstallContext, executor: &CommandExecutor) -> Result<()> {
    emit(
        Level::Info,
        "config.start",
        &format!("{} Configuring system...", char::from(NerdFont::Gear)),
        None,
    );

    configure_timezone(context, executor)?;
    configure_locale(context, executor)?;
    configure_vconsole(context, executor)?;
    configure_network(context, executor)?;
    configure_users(context, executor)?;
    configure_sudo(executor)?;
    enable_services(context, executor)?;

    Ok(())
}

fn chroot(args: &[&str]) -> Command {
    let mut cmd = Command::new("arch-chroot");
    cmd.arg(paths::CHROOT_MOUNT).args(args);
    cmd
}

fn configure_timezone(context: &InstallContext, executor: &CommandExecutor) -> Result<()> {
    let timezone = &context.config.timezone;
    emit(
        Level::Info,
        "config.timezone",
        &format!("Setting timezone to {}", timezone),
        None,
    );

    let zoneinfo = format!("/usr/share/zoneinfo/{}", timezone);
    executor
        .run(&mut chroot(&["ln", "-sf", &zoneinfo, "/etc/localtime"]))
        .with_context(|| format!("Failed to set timezone {}", timezone))?;
    executor.run(&mut chroot(&["hwclock", "--systohc"]))?;
    Ok(())
}

/// Uncomment `locale` in locale.gen, appending it when it is missing entirely.
pub fn enable_locale(locale_gen: &str, locale: &str) -> String {
    let mut found = false;
    let mut lines: Vec<String> = locale_gen
        .lines()
        .map(|line| {
            // Header examples read `#  en_US.UTF-8 UTF-8`; real entries have no
            // space after the hash
            let entry = match line.strip_prefix('#') {
                Some(rest) if rest.starts_with(char::is_whitespace) => None,
                Some(rest) => Some(rest.trim()),
                None => Some(line.trim()),
            };
            if !found && entry == Some(locale) {
                found = true;
                locale.to_string()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !found {
        lines.push(locale.to_string());
    }
    lines.join("\n") + "\n"
}

fn configure_locale(context: &InstallContext, executor: &CommandExecutor) -> Result<()> {
    let locale = &context.config.locale;
    emit(
        Level::Info,
        "config.locale",
        &format!("Setting locale to {}", locale),
        None,
    );

    let locale_gen = paths::chroot_path("/etc/locale.gen");
    let content = if executor.dry_run {
        String::new()
    } else {
        std::fs::read_to_string(&locale_gen)
            .with_context(|| format!("Failed to read {}", locale_gen.display()))?
    };
    executor.write_file(&locale_gen, &enable_locale(&content, locale))?;
    executor.run(&mut chroot(&["locale-gen"]))?;

    // "en_US.UTF-8 UTF-8" -> "en_US.UTF-8"
    let lang = locale.split_whitespace().next().unwrap_or(locale);
    executor.write_file(
        &paths::chroot_path("/etc/locale.conf"),
        &format!("LANG={}\n", lang),
    )
}

fn configure_vconsole(context: &InstallContext, executor: &CommandExecutor) -> Result<()> {
    let keymap = &context.config.keymap;
    emit(
        Level::Info,
        "config.keymap",
        &format!("Setting console keymap to {}", keymap),
        None,
    );
    executor.write_file(
        &paths::chroot_path("/etc/vconsole.conf"),
        &format!("KEYMAP={}\n", keymap),
    )
}

pub fn hosts_file(hostname: &str) -> String {
    format!(
        "127.0.0.1\tlocalhost\n::1\t\tlocalhost\n127.0.1.1\t{}.localdomain\t{}\n",
        hostname, hostname
    )
}

fn configure_network(context: &InstallContext, executor: &CommandExecutor) -> Result<()> {
    let hostname = &context.config.hostname;
    emit(
        Level::Info,
        "config.hostname",
        &format!("Setting hostname to {}", hostname),
        None,
    );
    executor.write_file(
        &paths::chroot_path("/etc/hostname"),
        &format!("{}\n", hostname),
    )?;
    executor.write_file(&paths::chroot_path("/etc/hosts"), &hosts_file(hostname))
}

fn configure_users(context: &mut InstallContext, executor: &CommandExecutor) -> Result<()> {
    let username = context.config.username.clone();
    emit(
        Level::Info,
        "config.user",
        &format!("Configuring user: {}", username),
        None,
    );

    // Dropped, and wiped, at the end of this function
    let credentials = context.config.take_credentials();
    if credentials.user.is_empty() {
        anyhow::bail!("Password already consumed; re-run with the configuration file");
    }

    let root_input = zeroize::Zeroizing::new(format!("root:{}", credentials.root.as_str()));
    executor
        .run_with_secret_input(&mut chroot(&["chpasswd"]), &root_input)
        .context("Failed to set root password")?;

    let user_exists = !executor.dry_run
        && paths::chroot_path("/home").join(&username).exists();
    if !user_exists {
        executor
            .run(&mut chroot(&["useradd", "-m", "-G", "wheel", "-s", "/bin/bash", &username]))
            .with_context(|| format!("Failed to create user {}", username))?;
    }

    let user_input = zeroize::Zeroizing::new(format!("{}:{}", username, credentials.user.as_str()));
    executor
        .run_with_secret_input(&mut chroot(&["chpasswd"]), &user_input)
        .with_context(|| format!("Failed to set password for {}", username))?;

    Ok(())
}

/// Enable the wheel rule. An uncommented rule is left alone.
pub fn enable_wheel(sudoers: &str) -> String {
    let mut found = false;
    let mut lines: Vec<String> = sudoers
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed == WHEEL_RULE {
                found = true;
                line.to_string()
            } else if trimmed.trim_start_matches('#').trim() == WHEEL_RULE && !found {
                found = true;
                WHEEL_RULE.to_string()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !found {
        lines.push(WHEEL_RULE.to_string());
    }
    lines.join("\n") + "\n"
}

fn configure_sudo(executor: &CommandExecutor) -> Result<()> {
    emit(Level::Info, "config.sudo", "Configuring sudoers...", None);

    let sudoers = paths::chroot_path("/etc/sudoers");
    let content = if executor.dry_run {
        String::new()
    } else {
        std::fs::read_to_string(&sudoers)
            .with_context(|| format!("Failed to read {}", sudoers.display()))?
    };
    executor.write_file(&sudoers, &enable_wheel(&content))
}

fn enable_services(context: &InstallContext, executor: &CommandExecutor) -> Result<()> {
    for service in &context.config.services {
        emit(
            Level::Info,
            "config.service",
            &format!("Enabling {}", service),
            None,
        );
        executor
            .run(&mut chroot(&["systemctl", "enable", service]))
            .with_context(|| format!("Failed to enable {}", service))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InstallConfig, SystemInfo};

    #[test]
    fn test_enable_locale_uncomments_exact_entry() {
        let locale_gen = "#en_GB.UTF-8 UTF-8\n#en_US.UTF-8 UTF-8\n#en_US ISO-8859-1\n";
        let updated = enable_locale(locale_gen, "en_US.UTF-8 UTF-8");
        assert_eq!(
            updated,
            "#en_GB.UTF-8 UTF-8\nen_US.UTF-8 UTF-8\n#en_US ISO-8859-1\n"
        );
    }

    #[test]
    fn test_enable_locale_skips_header_examples() {
        let locale_gen = "\
# Locale name generation
#
#  en_US.UTF-8 UTF-8
#  en_US ISO-8859-1
#
#en_GB.UTF-8 UTF-8
#en_US.UTF-8 UTF-8
";
        let updated = enable_locale(locale_gen, "en_US.UTF-8 UTF-8");
        assert!(updated.contains("\n#  en_US.UTF-8 UTF-8\n"));
        assert_eq!(
            updated.lines().filter(|l| *l == "en_US.UTF-8 UTF-8").count(),
            1
        );
        assert!(updated.ends_with("#en_GB.UTF-8 UTF-8\nen_US.UTF-8 UTF-8\n"));

        // Already enabled: nothing appended
        assert_eq!(enable_locale(&updated, "en_US.UTF-8 UTF-8"), updated);
    }

    #[test]
    fn test_enable_locale_appends_missing_entry() {
        let updated = enable_locale("#de_DE.UTF-8 UTF-8", "sv_SE.UTF-8 UTF-8");
        assert!(updated.ends_with("sv_SE.UTF-8 UTF-8\n"));
        assert!(updated.starts_with("#de_DE.UTF-8 UTF-8\n"));
    }

    #[test]
    fn test_enable_wheel() {
        let sudoers = "root ALL=(ALL:ALL) ALL\n# %wheel ALL=(ALL:ALL) ALL\n# %wheel ALL=(ALL:ALL) NOPASSWD: ALL\n";
        let updated = enable_wheel(sudoers);
        assert!(updated.contains("\n%wheel ALL=(ALL:ALL) ALL\n"));
        assert!(updated.contains("# %wheel ALL=(ALL:ALL) NOPASSWD: ALL"));
        assert_eq!(enable_wheel(&updated), updated);
    }

    #[test]
    fn test_hosts_file() {
        assert!(hosts_file("archbox").contains("127.0.1.1\tarchbox.localdomain\tarchbox"));
    }

    #[test]
    fn test_dry_run_consumes_credentials() {
        let config = InstallConfig::from_toml(
            "disk = \"/dev/sdb\"\nhostname = \"box\"\nusername = \"alex\"\npassword = \"pw\"\n",
        )
        .unwrap();
        let mut context = InstallContext::new(config, SystemInfo::default());
        let executor = CommandExecutor::new(true);

        install_config(&mut context, &executor).unwrap();
        assert!(context.config.password.is_empty());
        // A second run has nothing left to set
        assert!(install_config(&mut context, &executor).is_err());
    }
}
