use std::path::PathBuf;

pub const STATE_FILE: &str = "/tmp/archstrap/install_state.toml";
pub const LOG_FILE: &str = "/tmp/archstrap/install.log";
pub const DRY_RUN_FLAG: &str = "/tmp/archstrap/dryrun";
pub const CHROOT_MOUNT: &str = "/mnt";
/// Location of the swap file inside the installed system.
pub const SWAPFILE: &str = "/swapfile";

pub fn chroot_path(path: &str) -> PathBuf {
    PathBuf::from(CHROOT_MOUNT).join(path.trim_start_matches('/'))
}
