use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use zeroize::Zeroizing;

use super::types::BootMode;

/// A password that is wiped from memory when dropped.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Move the secret out, leaving an empty one behind.
    pub fn take(&mut self) -> Zeroizing<String> {
        std::mem::replace(&mut self.0, Zeroizing::new(String::new()))
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Secret::new)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutConfig {
    #[serde(default = "default_esp_size_mib")]
    pub esp_size_mib: u64,
    #[serde(default = "default_boot_size_mib")]
    pub boot_size_mib: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            esp_size_mib: default_esp_size_mib(),
            boot_size_mib: default_boot_size_mib(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReclaimConfig {
    #[serde(default = "default_reclaim_attempts")]
    pub attempts: u32,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            attempts: default_reclaim_attempts(),
        }
    }
}

/// Everything an unattended installation needs, loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallConfig {
    pub disk: String,
    /// Overrides the detected firmware boot mode.
    #[serde(default)]
    pub boot_mode: Option<BootMode>,
    pub hostname: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_keymap")]
    pub keymap: String,
    #[serde(default = "default_kernel")]
    pub kernel: String,
    pub username: String,
    pub password: Secret,
    /// Falls back to `password` when unset.
    #[serde(default)]
    pub root_password: Option<Secret>,
    #[serde(default = "default_services")]
    pub services: Vec<String>,
    #[serde(default)]
    pub extra_packages: Vec<String>,
    #[serde(default = "default_true")]
    pub hibernation: bool,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub reclaim: ReclaimConfig,
}

fn default_esp_size_mib() -> u64 {
    2048
}

fn default_boot_size_mib() -> u64 {
    1024
}

fn default_reclaim_attempts() -> u32 {
    3
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_locale() -> String {
    "en_US.UTF-8 UTF-8".to_string()
}

fn default_keymap() -> String {
    "us".to_string()
}

fn default_kernel() -> String {
    "linux".to_string()
}

fn default_services() -> Vec<String> {
    vec!["NetworkManager".to_string()]
}

fn default_true() -> bool {
    true
}

/// Passwords handed to `chpasswd`; zeroed when this goes out of scope.
pub struct Credentials {
    pub user: Zeroizing<String>,
    pub root: Zeroizing<String>,
}

impl InstallConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Invalid install configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }
        // The raw file holds the passwords too
        let content = Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.disk.starts_with("/dev/") {
            anyhow::bail!("Invalid disk '{}': must start with /dev/", self.disk);
        }
        validate_hostname(&self.hostname)?;
        validate_username(&self.username)?;
        if self.password.is_empty() {
            anyhow::bail!("Password cannot be empty.");
        }
        if self.reclaim.attempts == 0 {
            anyhow::bail!("reclaim.attempts must be at least 1");
        }
        if self.layout.esp_size_mib < 300 {
            anyhow::bail!("layout.esp_size_mib must be at least 300 MiB");
        }
        if self.layout.boot_size_mib < 256 {
            anyhow::bail!("layout.boot_size_mib must be at least 256 MiB");
        }
        Ok(())
    }

    /// Take both passwords out of the configuration. Calling this twice yields
    /// empty strings the second time.
    pub fn take_credentials(&mut self) -> Credentials {
        let user = self.password.take();
        let root = match self.root_password.as_mut() {
            Some(root) if !root.is_empty() => root.take(),
            _ => Zeroizing::new(user.as_str().to_string()),
        };
        Credentials { user, root }
    }
}

fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.trim().is_empty() {
        anyhow::bail!("Hostname cannot be empty.");
    }
    if hostname.len() > 63 {
        anyhow::bail!("Hostname cannot be longer than 63 characters.");
    }
    if hostname.starts_with('-') || hostname.ends_with('-') {
        anyhow::bail!("Hostname cannot start or end with '-'.");
    }
    if !hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        anyhow::bail!("Hostname may only contain letters, digits and '-'.");
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        anyhow::bail!("Username cannot be empty.");
    }
    if username == "root" {
        anyhow::bail!("Username cannot be 'root'.");
    }
    if username.len() > 32 {
        anyhow::bail!("Username cannot be longer than 32 characters.");
    }
    let mut chars = username.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !first_ok || !rest_ok {
        anyhow::bail!(
            "Username '{}' must start with a lowercase letter or '_' and contain only lowercase letters, digits, '_' or '-'.",
            username
        );
    }
    Ok(())
}
