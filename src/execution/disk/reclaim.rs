use anyhow::{Context, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::device::TargetDevice;
use super::probe::{self, MountEntry};
use crate::common::progress::wait_with_spinner;
use crate::execution::CommandExecutor;
use crate::ui::prelude::*;

const KILL_SETTLE: Duration = Duration::from_secs(1);
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Everything the reclaimer needs from the running system.
pub trait ReclaimBackend {
    /// PIDs holding a file on the device, one of its partitions, or under one of `mount_targets`.
    fn open_handle_pids(&self, device: &TargetDevice, mount_targets: &[PathBuf])
    -> Result<Vec<i32>>;
    fn terminate(&self, pid: i32) -> Result<()>;
    fn mounts(&self) -> Result<Vec<MountEntry>>;
    fn unmount(&self, target: &Path, recursive: bool) -> Result<()>;
    fn lvm_available(&self) -> bool;
    fn volume_groups(&self, device: &TargetDevice) -> Result<Vec<String>>;
    fn deactivate_volume_group(&self, vg: &str) -> Result<()>;
    fn partitions(&self, device: &TargetDevice) -> Result<Vec<String>>;
    fn fs_type(&self, partition: &str) -> Result<Option<String>>;
    fn active_swaps(&self) -> Result<Vec<String>>;
    fn swapoff(&self, area: &str) -> Result<()>;
    fn pause(&self, message: &str, duration: Duration);
}

/// What one pass of the reclaimer did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupAttempt {
    pub attempt: u32,
    pub processes_killed: usize,
    pub mounts_removed: usize,
    pub swaps_disabled: usize,
    pub lvm_deactivated: usize,
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    pub attempts: Vec<CleanupAttempt>,
    pub success: bool,
}

impl ReclaimReport {
    pub fn attempts_made(&self) -> usize {
        self.attempts.len()
    }

    pub fn processes_killed(&self) -> usize {
        self.attempts.iter().map(|a| a.processes_killed).sum()
    }

    pub fn mounts_removed(&self) -> usize {
        self.attempts.iter().map(|a| a.mounts_removed).sum()
    }

    pub fn swaps_disabled(&self) -> usize {
        self.attempts.iter().map(|a| a.swaps_disabled).sum()
    }

    pub fn lvm_deactivated(&self) -> usize {
        self.attempts.iter().map(|a| a.lvm_deactivated).sum()
    }
}

/// Free `device` for destructive use, trying at most `attempts` times.
///
/// Never fails: individual action errors are warnings, and an exhausted retry
/// budget is reported through `ReclaimReport::success`.
pub fn reclaim_device(
    device: &TargetDevice,
    backend: &dyn ReclaimBackend,
    attempts: u32,
) -> ReclaimReport {
    let attempts = attempts.max(1);
    let mut report = ReclaimReport::default();

    for attempt in 1..=attempts {
        emit(
            Level::Info,
            "reclaim.attempt",
            &format!(
                "{} Releasing {} (attempt {}/{})",
                char::from(NerdFont::HardDrive),
                device,
                attempt,
                attempts
            ),
            None,
        );

        let result = run_attempt(device, backend, attempt);
        let done = result.success;
        report.attempts.push(result);

        if done {
            report.success = true;
            emit(
                Level::Success,
                "reclaim.done",
                &format!("{} {} is free", char::from(NerdFont::Check), device),
                None,
            );
            return report;
        }

        if attempt < attempts {
            backend.pause(
                &format!("{} is still busy, retrying...", device),
                RETRY_DELAY,
            );
        }
    }

    emit(
        Level::Warn,
        "reclaim.exhausted",
        &format!(
            "{} Could not fully release {} after {} attempts; continuing anyway",
            char::from(NerdFont::Warning),
            device,
            attempts
        ),
        serde_json::to_value(&report).ok(),
    );
    report
}

fn run_attempt(device: &TargetDevice, backend: &dyn ReclaimBackend, attempt: u32) -> CleanupAttempt {
    let mut result = CleanupAttempt {
        attempt,
        ..Default::default()
    };

    result.processes_killed = kill_holders(device, backend);
    result.mounts_removed = unmount_device(device, backend);
    if backend.lvm_available() {
        result.lvm_deactivated = deactivate_lvm(device, backend);
    } else {
        emit(
            Level::Debug,
            "reclaim.lvm.skip",
            "vgchange not found, skipping LVM deactivation",
            None,
        );
    }
    result.swaps_disabled = disable_swap(device, backend);
    result.mounts_removed += recheck_partitions(device, backend);
    result.success = is_released(device, backend);
    result
}

fn owned_mounts(device: &TargetDevice, mounts: &[MountEntry]) -> Vec<MountEntry> {
    mounts
        .iter()
        .filter(|m| device.owns(&m.source))
        .cloned()
        .collect()
}

fn depth(path: &Path) -> usize {
    path.components().count()
}

/// Two rounds of SIGTERM, so children spawned during the first round are caught too.
fn kill_holders(device: &TargetDevice, backend: &dyn ReclaimBackend) -> usize {
    let targets: Vec<PathBuf> = match backend.mounts() {
        Ok(mounts) => owned_mounts(device, &mounts)
            .into_iter()
            .map(|m| m.target)
            .collect(),
        Err(e) => {
            emit(
                Level::Warn,
                "reclaim.mounts.read",
                &format!("Failed to read mount table: {}", e),
                None,
            );
            Vec::new()
        }
    };

    let own_pid = std::process::id() as i32;
    let mut killed = 0;

    for round in 0..2 {
        let pids = match backend.open_handle_pids(device, &targets) {
            Ok(pids) => pids,
            Err(e) => {
                emit(
                    Level::Warn,
                    "reclaim.processes.scan",
                    &format!("Failed to scan open file handles: {}", e),
                    None,
                );
                break;
            }
        };
        let pids: Vec<i32> = pids
            .into_iter()
            .filter(|&pid| pid > 1 && pid != own_pid)
            .collect();
        if pids.is_empty() {
            break;
        }

        for pid in pids {
            match backend.terminate(pid) {
                Ok(()) => {
                    killed += 1;
                    emit(
                        Level::Info,
                        "reclaim.processes.kill",
                        &format!("Sent SIGTERM to process {}", pid),
                        None,
                    );
                }
                Err(e) => emit(
                    Level::Warn,
                    "reclaim.processes.kill",
                    &format!("Failed to terminate process {}: {}", pid, e),
                    None,
                ),
            }
        }

        if round == 0 {
            backend.pause("Waiting for processes to exit...", KILL_SETTLE);
        }
    }

    killed
}

fn unmount_device(device: &TargetDevice, backend: &dyn ReclaimBackend) -> usize {
    let mounts = match backend.mounts() {
        Ok(mounts) => owned_mounts(device, &mounts),
        Err(e) => {
            emit(
                Level::Warn,
                "reclaim.mounts.read",
                &format!("Failed to read mount table: {}", e),
                None,
            );
            return 0;
        }
    };

    let mut targets: Vec<PathBuf> = mounts.into_iter().map(|m| m.target).collect();
    targets.sort_by_key(|t| std::cmp::Reverse(depth(t)));
    targets.dedup();

    let mut removed = 0;
    for target in targets {
        match backend.unmount(&target, true) {
            Ok(()) => {
                removed += 1;
                emit(
                    Level::Info,
                    "reclaim.unmount",
                    &format!("Unmounted {}", target.display()),
                    None,
                );
            }
            Err(e) => emit(
                Level::Warn,
                "reclaim.unmount",
                &format!("Failed to unmount {}: {}", target.display(), e),
                None,
            ),
        }
    }
    removed
}

fn deactivate_lvm(device: &TargetDevice, backend: &dyn ReclaimBackend) -> usize {
    let groups = match backend.volume_groups(device) {
        Ok(groups) => groups,
        Err(e) => {
            emit(
                Level::Warn,
                "reclaim.lvm.scan",
                &format!("Failed to list LVM volume groups: {}", e),
                None,
            );
            return 0;
        }
    };

    let mut deactivated = 0;
    for vg in groups {
        match backend.deactivate_volume_group(&vg) {
            Ok(()) => {
                deactivated += 1;
                emit(
                    Level::Info,
                    "reclaim.lvm",
                    &format!("Deactivated volume group {}", vg),
                    None,
                );
            }
            Err(e) => emit(
                Level::Warn,
                "reclaim.lvm",
                &format!("Failed to deactivate volume group {}: {}", vg, e),
                None,
            ),
        }
    }
    deactivated
}

/// Swap areas that live on the device: its partitions, or files on filesystems mounted from it.
fn owned_swaps(device: &TargetDevice, active: &[String], mounts: &[MountEntry]) -> Vec<String> {
    let owned_targets: Vec<&PathBuf> = mounts
        .iter()
        .filter(|m| device.owns(&m.source))
        .map(|m| &m.target)
        .collect();

    active
        .iter()
        .filter(|area| {
            device.owns(area) || owned_targets.iter().any(|t| Path::new(area).starts_with(t))
        })
        .cloned()
        .collect()
}

fn disable_swap(device: &TargetDevice, backend: &dyn ReclaimBackend) -> usize {
    let active = match backend.active_swaps() {
        Ok(active) => active,
        Err(e) => {
            emit(
                Level::Warn,
                "reclaim.swap.scan",
                &format!("Failed to read active swap areas: {}", e),
                None,
            );
            return 0;
        }
    };
    let mounts = backend.mounts().unwrap_or_default();

    let mut areas = owned_swaps(device, &active, &mounts);

    // Swap partitions not listed above are inactive, which is all we need
    if let Ok(partitions) = backend.partitions(device) {
        for partition in partitions {
            if let Ok(Some(fs)) = backend.fs_type(&partition)
                && fs == "swap"
                && !areas.contains(&partition)
            {
                if active.contains(&partition) {
                    areas.push(partition);
                } else {
                    emit(
                        Level::Debug,
                        "reclaim.swap.inactive",
                        &format!("{} is a swap partition but not active", partition),
                        None,
                    );
                }
            }
        }
    }

    let mut disabled = 0;
    for area in areas {
        match backend.swapoff(&area) {
            Ok(()) => {
                disabled += 1;
                emit(
                    Level::Info,
                    "reclaim.swap",
                    &format!("Disabled swap on {}", area),
                    None,
                );
            }
            Err(e) => emit(
                Level::Warn,
                "reclaim.swap",
                &format!("Failed to disable swap on {}: {}", area, e),
                None,
            ),
        }
    }
    disabled
}

fn recheck_partitions(device: &TargetDevice, backend: &dyn ReclaimBackend) -> usize {
    let Ok(mounts) = backend.mounts() else {
        return 0;
    };
    let partitions: HashSet<String> = match backend.partitions(device) {
        Ok(partitions) => partitions.into_iter().collect(),
        Err(_) => return 0,
    };

    let mut leftovers: Vec<PathBuf> = mounts
        .into_iter()
        .filter(|m| partitions.contains(&m.source))
        .map(|m| m.target)
        .collect();
    leftovers.sort_by_key(|t| std::cmp::Reverse(depth(t)));

    let mut removed = 0;
    for target in leftovers {
        match backend.unmount(&target, false) {
            Ok(()) => removed += 1,
            Err(e) => emit(
                Level::Warn,
                "reclaim.recheck",
                &format!("{} is still mounted: {}", target.display(), e),
                None,
            ),
        }
    }
    removed
}

/// No mounts and no open handles. Anything we cannot verify counts as busy.
fn is_released(device: &TargetDevice, backend: &dyn ReclaimBackend) -> bool {
    let Ok(mounts) = backend.mounts() else {
        return false;
    };
    if !owned_mounts(device, &mounts).is_empty() {
        return false;
    }
    let own_pid = std::process::id() as i32;
    match backend.open_handle_pids(device, &[]) {
        Ok(pids) => pids.iter().all(|&pid| pid <= 1 || pid == own_pid),
        Err(_) => false,
    }
}

fn holds_path(device: &TargetDevice, mount_targets: &[PathBuf], path: &Path) -> bool {
    device.owns(&path.to_string_lossy()) || mount_targets.iter().any(|t| path.starts_with(t))
}

/// Talks to the real system. Mutating commands go through the executor so
/// dry runs only print them.
pub struct SystemBackend<'a> {
    executor: &'a CommandExecutor,
}

impl<'a> SystemBackend<'a> {
    pub fn new(executor: &'a CommandExecutor) -> Self {
        Self { executor }
    }
}

impl ReclaimBackend for SystemBackend<'_> {
    fn open_handle_pids(
        &self,
        device: &TargetDevice,
        mount_targets: &[PathBuf],
    ) -> Result<Vec<i32>> {
        let processes =
            procfs::process::all_processes().context("Failed to enumerate processes")?;

        let mut pids = Vec::new();
        for process in processes {
            // Processes can vanish while we look at them
            let Ok(process) = process else { continue };

            // A working directory or chroot under a mount keeps it busy as
            // much as an open file does
            let in_tree = [process.cwd(), process.root()]
                .into_iter()
                .flatten()
                .any(|path| holds_path(device, mount_targets, &path));

            let holds = in_tree
                || process.fd().is_ok_and(|fds| {
                    fds.flatten().any(|fd| match &fd.target {
                        procfs::process::FDTarget::Path(path) => {
                            holds_path(device, mount_targets, path)
                        }
                        _ => false,
                    })
                });

            if holds {
                let name = process
                    .stat()
                    .map(|s| s.comm)
                    .unwrap_or_else(|_| "?".to_string());
                emit(
                    Level::Debug,
                    "reclaim.processes.found",
                    &format!("Process {} ({}) holds {}", process.pid(), name, device),
                    None,
                );
                pids.push(process.pid());
            }
        }
        Ok(pids)
    }

    fn terminate(&self, pid: i32) -> Result<()> {
        if self.executor.dry_run {
            emit(
                Level::Info,
                "exec.dry_run",
                &format!("[DRY RUN] kill -TERM {}", pid),
                None,
            );
            return Ok(());
        }
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            // Already gone
            Ok(()) | Err(nix::Error::ESRCH) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("kill({}, SIGTERM)", pid)),
        }
    }

    fn mounts(&self) -> Result<Vec<MountEntry>> {
        probe::read_mounts()
    }

    fn unmount(&self, target: &Path, recursive: bool) -> Result<()> {
        let mut cmd = Command::new("umount");
        if recursive {
            cmd.arg("-R");
        }
        cmd.arg(target);
        self.executor.run(&mut cmd)
    }

    fn lvm_available(&self) -> bool {
        which::which("vgchange").is_ok()
    }

    fn volume_groups(&self, device: &TargetDevice) -> Result<Vec<String>> {
        let output = Command::new("pvs")
            .args(["--noheadings", "-o", "pv_name,vg_name"])
            .output()
            .context("Failed to run pvs")?;
        if !output.status.success() {
            anyhow::bail!("pvs failed: {}", String::from_utf8_lossy(&output.stderr).trim());
        }

        let mut groups: Vec<String> = probe::parse_pvs(&String::from_utf8_lossy(&output.stdout))
            .into_iter()
            .filter(|(pv, _)| device.owns(pv))
            .map(|(_, vg)| vg)
            .collect();
        groups.sort();
        groups.dedup();
        Ok(groups)
    }

    fn deactivate_volume_group(&self, vg: &str) -> Result<()> {
        self.executor.run(Command::new("vgchange").args(["-an", vg]))
    }

    fn partitions(&self, device: &TargetDevice) -> Result<Vec<String>> {
        probe::get_current_partitions(&device.path_str())
    }

    fn fs_type(&self, partition: &str) -> Result<Option<String>> {
        probe::get_fs_type(partition)
    }

    fn active_swaps(&self) -> Result<Vec<String>> {
        probe::read_active_swaps()
    }

    fn swapoff(&self, area: &str) -> Result<()> {
        self.executor.run(Command::new("swapoff").arg(area))
    }

    fn pause(&self, message: &str, duration: Duration) {
        if self.executor.dry_run {
            return;
        }
        wait_with_spinner(message, duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Scripted system: unmounting succeeds unless an active swap file lives
    /// under the target, and `stubborn` processes ignore SIGTERM.
    #[derive(Default)]
    struct FakeSystem {
        mounts: RefCell<Vec<MountEntry>>,
        holders: RefCell<Vec<i32>>,
        stubborn: Vec<i32>,
        swaps: RefCell<Vec<String>>,
        fs_types: HashMap<String, String>,
        partitions: Vec<String>,
        lvm: bool,
        pvs: Vec<(String, String)>,
        deactivated: RefCell<Vec<String>>,
        pauses: RefCell<usize>,
    }

    impl FakeSystem {
        fn mount(&self, source: &str, target: &str) {
            self.mounts.borrow_mut().push(MountEntry {
                source: source.to_string(),
                target: PathBuf::from(target),
            });
        }
    }

    impl ReclaimBackend for FakeSystem {
        fn open_handle_pids(&self, _: &TargetDevice, _: &[PathBuf]) -> Result<Vec<i32>> {
            Ok(self.holders.borrow().clone())
        }

        fn terminate(&self, pid: i32) -> Result<()> {
            if !self.stubborn.contains(&pid) {
                self.holders.borrow_mut().retain(|&p| p != pid);
            }
            Ok(())
        }

        fn mounts(&self) -> Result<Vec<MountEntry>> {
            Ok(self.mounts.borrow().clone())
        }

        fn unmount(&self, target: &Path, recursive: bool) -> Result<()> {
            if self.swaps.borrow().iter().any(|s| Path::new(s).starts_with(target)) {
                anyhow::bail!("target is busy");
            }
            self.mounts.borrow_mut().retain(|m| {
                if recursive {
                    !m.target.starts_with(target)
                } else {
                    m.target != target
                }
            });
            Ok(())
        }

        fn lvm_available(&self) -> bool {
            self.lvm
        }

        fn volume_groups(&self, device: &TargetDevice) -> Result<Vec<String>> {
            Ok(self
                .pvs
                .iter()
                .filter(|(pv, _)| device.owns(pv))
                .map(|(_, vg)| vg.clone())
                .collect())
        }

        fn deactivate_volume_group(&self, vg: &str) -> Result<()> {
            self.deactivated.borrow_mut().push(vg.to_string());
            Ok(())
        }

        fn partitions(&self, _: &TargetDevice) -> Result<Vec<String>> {
            Ok(self.partitions.clone())
        }

        fn fs_type(&self, partition: &str) -> Result<Option<String>> {
            Ok(self.fs_types.get(partition).cloned())
        }

        fn active_swaps(&self) -> Result<Vec<String>> {
            Ok(self.swaps.borrow().clone())
        }

        fn swapoff(&self, area: &str) -> Result<()> {
            self.swaps.borrow_mut().retain(|s| s != area);
            Ok(())
        }

        fn pause(&self, _: &str, _: Duration) {
            *self.pauses.borrow_mut() += 1;
        }
    }

    fn sdb() -> TargetDevice {
        TargetDevice::describe("/dev/sdb").unwrap()
    }

    #[test]
    fn test_reclaims_mounted_device_in_one_attempt() {
        let system = FakeSystem {
            holders: RefCell::new(vec![4242]),
            partitions: vec!["/dev/sdb1".into(), "/dev/sdb2".into()],
            ..Default::default()
        };
        system.mount("/dev/sdb2", "/mnt");
        system.mount("/dev/sdb1", "/mnt/boot");
        system.mount("/dev/sda2", "/");

        let report = reclaim_device(&sdb(), &system, 3);

        assert!(report.success);
        assert_eq!(report.attempts_made(), 1);
        assert_eq!(report.processes_killed(), 1);
        assert_eq!(report.mounts_removed(), 2);
        // The host root is untouched
        assert_eq!(system.mounts.borrow().len(), 1);
        assert_eq!(system.mounts.borrow()[0].target, PathBuf::from("/"));
    }

    #[test]
    fn test_stubborn_process_exhausts_retries() {
        let system = FakeSystem {
            holders: RefCell::new(vec![777]),
            stubborn: vec![777],
            ..Default::default()
        };

        let report = reclaim_device(&sdb(), &system, 3);

        assert!(!report.success);
        assert_eq!(report.attempts_made(), 3);
        assert!(report.attempts.iter().all(|a| !a.success));
        // one settle pause per attempt plus a retry delay between attempts
        assert_eq!(*system.pauses.borrow(), 3 + 2);
    }

    #[test]
    fn test_never_signals_init_or_kernel() {
        let system = FakeSystem {
            holders: RefCell::new(vec![0, 1]),
            ..Default::default()
        };
        let report = reclaim_device(&sdb(), &system, 1);
        assert_eq!(report.processes_killed(), 0);
        assert!(report.success);
    }

    #[test]
    fn test_swap_file_on_device_blocks_unmount_until_swapoff() {
        let system = FakeSystem {
            swaps: RefCell::new(vec![
                "/mnt/swapfile".to_string(),
                "/dev/sdb3".to_string(),
                "/dev/sdc2".to_string(),
            ]),
            fs_types: HashMap::from([("/dev/sdb3".to_string(), "swap".to_string())]),
            partitions: vec!["/dev/sdb2".into(), "/dev/sdb3".into()],
            ..Default::default()
        };
        system.mount("/dev/sdb2", "/mnt");

        let report = reclaim_device(&sdb(), &system, 3);

        assert!(report.success);
        assert_eq!(report.attempts[0].swaps_disabled, 2);
        // /mnt only comes free in the re-check after swapoff
        assert_eq!(report.attempts[0].mounts_removed, 1);
        // Swap on another disk stays active
        assert_eq!(*system.swaps.borrow(), vec!["/dev/sdc2".to_string()]);
    }

    #[test]
    fn test_lvm_only_when_tooling_present() {
        let pvs = vec![
            ("/dev/sdb2".to_string(), "vg0".to_string()),
            ("/dev/sdc1".to_string(), "other".to_string()),
        ];

        let without = FakeSystem {
            pvs: pvs.clone(),
            ..Default::default()
        };
        reclaim_device(&sdb(), &without, 1);
        assert!(without.deactivated.borrow().is_empty());

        let with = FakeSystem {
            lvm: true,
            pvs,
            ..Default::default()
        };
        let report = reclaim_device(&sdb(), &with, 1);
        assert_eq!(*with.deactivated.borrow(), vec!["vg0".to_string()]);
        assert_eq!(report.lvm_deactivated(), 1);
    }

    #[test]
    fn test_owned_swaps() {
        let mounts = vec![MountEntry {
            source: "/dev/nvme0n1p2".into(),
            target: PathBuf::from("/mnt"),
        }];
        let active = vec![
            "/mnt/swapfile".to_string(),
            "/swapfile".to_string(),
            "/dev/nvme0n1p3".to_string(),
        ];
        let nvme = TargetDevice::describe("/dev/nvme0n1").unwrap();
        assert_eq!(
            owned_swaps(&nvme, &active, &mounts),
            vec!["/mnt/swapfile".to_string(), "/dev/nvme0n1p3".to_string()]
        );
    }

    #[test]
    fn test_process_working_in_mount_target_is_a_holder() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().canonicalize().unwrap();
        let mut child = Command::new("sleep")
            .arg("30")
            .current_dir(&target)
            .spawn()
            .unwrap();

        let executor = CommandExecutor::new(false);
        let backend = SystemBackend::new(&executor);
        let sdz = TargetDevice::describe("/dev/sdz").unwrap();
        let found = backend.open_handle_pids(&sdz, &[target.clone()]);
        let unrelated = backend.open_handle_pids(&sdz, &[PathBuf::from("/nonexistent-archstrap")]);

        child.kill().unwrap();
        child.wait().unwrap();

        let pid = child.id() as i32;
        assert!(found.unwrap().contains(&pid));
        assert!(!unrelated.unwrap().contains(&pid));
    }
}
