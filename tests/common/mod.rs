use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: tempfile::tempdir()?,
        })
    }

    /// Get the temp directory path for storing test files
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write an installation config pointing at `disk` and return its path.
    pub fn write_config(&self, disk: &str, extra: &str) -> Result<PathBuf> {
        let path = self.path().join("install.toml");
        let content = format!(
            r#"disk = "{}"
hostname = "archbox"
username = "alex"
password = "correct horse"
{}
"#,
            disk, extra
        );
        std::fs::write(&path, content)?;
        Ok(path)
    }
}
