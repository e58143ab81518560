use anyhow::Result;
use std::process::Command;
use std::time::Duration;

use super::CommandExecutor;
use crate::common::progress::wait_with_spinner;
use crate::ui::prelude::*;

const MAX_ATTEMPTS: u32 = 10;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Run `action` until it succeeds, at most `max_attempts` times. `action`
/// receives the 1-based attempt number.
pub fn retry<F>(label: &str, max_attempts: u32, delay: Duration, mut action: F) -> Result<()>
where
    F: FnMut(u32) -> Result<()>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        if attempt > 1 {
            emit(
                Level::Info,
                "pacman.retry",
                &format!("Retry attempt {}/{} for {}", attempt, max_attempts, label),
                None,
            );
        }

        match action(attempt) {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= max_attempts => {
                return Err(e.context(format!(
                    "{} failed after {} attempts. Please check your internet connection.",
                    label, max_attempts
                )));
            }
            Err(e) => {
                emit(
                    Level::Warn,
                    "pacman.failed",
                    &format!("{} failed: {}", label, e),
                    None,
                );
                if !delay.is_zero() {
                    wait_with_spinner(
                        format!("Retrying in {} seconds...", delay.as_secs()),
                        delay,
                    );
                }
            }
        }
    }
}

/// Things worth trying on the live system before pacstrap runs again.
fn recover(attempt: u32, executor: &CommandExecutor) {
    if attempt == 2 {
        emit(
            Level::Info,
            "pacman.keyring",
            "Attempting to refresh archlinux-keyring...",
            None,
        );
        if let Err(e) = executor.run(Command::new("pacman").args([
            "-Sy",
            "archlinux-keyring",
            "--noconfirm",
        ])) {
            emit(
                Level::Warn,
                "pacman.keyring",
                &format!("Warning: Failed to refresh keyring: {}", e),
                None,
            );
        }
        return;
    }

    if which::which("reflector").is_ok() {
        emit(Level::Info, "pacman.mirrors", "Updating mirrors...", None);
        let mut cmd = Command::new("reflector");
        cmd.args([
            "--latest",
            "40",
            "--protocol",
            "http,https",
            "--sort",
            "rate",
            "--save",
            "/etc/pacman.d/mirrorlist",
        ]);
        if let Err(e) = executor.run(&mut cmd) {
            emit(
                Level::Warn,
                "pacman.mirrors",
                &format!("Warning: Reflector failed: {}", e),
                None,
            );
        }
    } else {
        emit(
            Level::Debug,
            "pacman.mirrors",
            "Reflector not found, skipping mirror optimization.",
            None,
        );
    }
}

/// `pacstrap -K` with retries.
pub fn pacstrap(mount_point: &str, packages: &[String], executor: &CommandExecutor) -> Result<()> {
    if packages.is_empty() {
        return Ok(());
    }

    emit(
        Level::Info,
        "pacman.pacstrap",
        &format!(
            "{} Installing packages: {}",
            char::from(NerdFont::Package),
            packages.join(" ")
        ),
        None,
    );

    let delay = if executor.dry_run {
        Duration::ZERO
    } else {
        RETRY_DELAY
    };

    retry("pacstrap", MAX_ATTEMPTS, delay, |attempt| {
        if attempt > 1 {
            recover(attempt, executor);
        }
        let mut cmd = Command::new("pacstrap");
        cmd.arg("-K").arg(mount_point).args(packages);
        executor.run(&mut cmd)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_stops_on_first_success() {
        let mut calls = Vec::new();
        retry("flaky", 10, Duration::ZERO, |attempt| {
            calls.push(attempt);
            if attempt < 3 {
                anyhow::bail!("mirror timed out");
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(calls, vec![1, 2, 3]);
    }

    #[test]
    fn test_retry_gives_up_after_max_attempts() {
        let mut calls = 0;
        let err = retry("pacstrap", 4, Duration::ZERO, |_| {
            calls += 1;
            anyhow::bail!("no network")
        })
        .unwrap_err();
        assert_eq!(calls, 4);
        assert!(format!("{:#}", err).contains("pacstrap failed after 4 attempts"));
        assert!(format!("{:#}", err).contains("no network"));
    }

    #[test]
    fn test_empty_package_list_is_a_no_op() {
        let executor = CommandExecutor::new(false);
        pacstrap("/mnt", &[], &executor).unwrap();
    }
}
