mod common;
mod utils;

use anyhow::Result;
use common::TestEnvironment;

#[test]
fn test_help_lists_commands() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_archstrap_command(&env, &["--help"])?;
    assert_eq!(output.exit_code, 0, "help failed: {}", output.stderr);
    for command in ["exec", "reclaim", "plan", "info"] {
        assert!(output.stdout.contains(command), "missing {} in help", command);
    }
    Ok(())
}

#[test]
fn test_plan_uefi_nvme() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output =
        utils::run_archstrap_command(&env, &["plan", "/dev/nvme0n1", "--boot-mode", "uefi"])?;
    assert_eq!(output.exit_code, 0, "plan failed: {}", output.stderr);

    assert!(output.stdout.contains("/dev/nvme0n1p1"));
    assert!(output.stdout.contains("/dev/nvme0n1p2"));
    assert!(!output.stdout.contains("/dev/nvme0n1p3"));
    assert!(output.stdout.contains("esp"));
    Ok(())
}

#[test]
fn test_plan_bios_json() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_archstrap_command(
        &env,
        &["--json", "plan", "/dev/sdb", "--boot-mode", "bios"],
    )?;
    assert_eq!(output.exit_code, 0, "plan failed: {}", output.stderr);

    let events = utils::json_events(&output);
    let header = events
        .iter()
        .find(|e| e["code"] == "plan.header")
        .expect("plan.header event");
    let data = &header["data"];
    assert_eq!(data["device"], "/dev/sdb");
    assert_eq!(data["boot_mode"], "bios");

    let partitions = data["plan"]["partitions"].as_array().unwrap();
    assert_eq!(partitions.len(), 3);
    assert_eq!(partitions[0]["flags"][0], "bios_grub");
    assert_eq!(partitions[2]["end"], "remaining");

    let command = data["command"].as_str().unwrap();
    assert!(command.starts_with("parted --script /dev/sdb mklabel gpt"));
    Ok(())
}

#[test]
fn test_plan_rejects_bare_device_names() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_archstrap_command(&env, &["plan", "sdb"])?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("invalid device path"));
    Ok(())
}

#[test]
fn test_exec_rejects_invalid_config() -> Result<()> {
    let env = TestEnvironment::new()?;
    let config = env.write_config("/dev/sdb", "unknown_key = true")?;
    let output = utils::run_archstrap_command(
        &env,
        &["exec", "--dry-run", "-c", config.to_str().unwrap()],
    )?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("Invalid install configuration"));
    Ok(())
}

#[test]
fn test_exec_dry_run_never_prints_passwords() -> Result<()> {
    let env = TestEnvironment::new()?;
    let config = env.write_config("/dev/archstrap-e2e0", "hibernation = true")?;
    let output = utils::run_archstrap_command(
        &env,
        &["exec", "config", "--dry-run", "-c", config.to_str().unwrap()],
    )?;
    assert_eq!(output.exit_code, 0, "exec failed: {}", output.stderr);

    assert!(output.stdout.contains("[DRY RUN]"));
    assert!(output.stdout.contains("chpasswd"));
    assert!(output.stdout.contains("<redacted>"));
    assert!(!output.stdout.contains("correct horse"));
    assert!(!output.stderr.contains("correct horse"));
    Ok(())
}

#[test]
fn test_exec_full_dry_run() -> Result<()> {
    let env = TestEnvironment::new()?;
    let config = env.write_config("/dev/archstrap-e2e0", "boot_mode = \"uefi\"")?;
    let output = utils::run_archstrap_command(
        &env,
        &["exec", "--dry-run", "-c", config.to_str().unwrap()],
    )?;
    assert_eq!(output.exit_code, 0, "exec failed: {}", output.stderr);

    let stdout = &output.stdout;
    assert!(stdout.contains("parted --script /dev/archstrap-e2e0 mklabel gpt"));
    assert!(stdout.contains("mkfs.fat -F32 /dev/archstrap-e2e0p1"));
    assert!(stdout.contains("fallocate -l"));
    assert!(stdout.contains("pacstrap -K /mnt base"));
    assert!(stdout.contains("--target=x86_64-efi"));
    assert!(stdout.contains("grub-mkconfig -o /boot/grub/grub.cfg"));
    Ok(())
}
