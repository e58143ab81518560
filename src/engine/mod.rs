pub mod config;
pub mod context;
pub mod system_info;
pub mod types;

pub use config::{Credentials, InstallConfig, Secret};
pub use context::InstallContext;
pub use types::{BootMode, SystemInfo, Vendor};
