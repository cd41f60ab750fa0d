//! Where the agent keeps its files on disk

use std::path::PathBuf;

use crate::filesys::file::File;

/// Storage layout for the agent
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Directory holding `settings.json`
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Agent settings, created with defaults on first start
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }
}

/// Overrides the default settings directory
pub const CONFIG_DIR_ENV: &str = "CAMSYNC_CONFIG_DIR";

impl Default for StorageLayout {
    fn default() -> Self {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Self::new(dir);
        }

        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/etc/camsync");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".camsync");

        Self::new(base_dir)
    }
}
