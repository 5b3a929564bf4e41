use std::path::PathBuf;

use serde::Deserialize;

/// Where persisted browser state lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// App-private directory holding the session index and session files.
    pub dir: PathBuf,
}

impl StorageConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform data directory for the browser, or the working directory if unknown.
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("owl-browser")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}
