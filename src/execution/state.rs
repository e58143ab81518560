use super::step::InstallStep;
use super::swap::SwapSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::paths;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InstallState {
    pub completed_steps: HashSet<InstallStep>,
    /// Written by the disk step, read by fstab and bootloader.
    #[serde(default)]
    pub swap: Option<SwapSpec>,
}

impl InstallState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(paths::STATE_FILE))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Path::new(paths::STATE_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let state: InstallState = toml::from_str(&content)?;
            Ok(state)
        } else {
            Ok(Self::new())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn mark_complete(&mut self, step: InstallStep) {
        self.completed_steps.insert(step);
    }

    pub fn is_complete(&self, step: InstallStep) -> bool {
        self.completed_steps.contains(&step)
    }

    pub fn check_dependencies(&self, step: InstallStep) -> Result<(), Vec<InstallStep>> {
        let deps = step.dependencies();
        let missing: Vec<InstallStep> = deps
            .into_iter()
            .filter(|dep| !self.is_complete(*dep))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }
}
