use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use storage::StorageConfig;
use tabs::TabsConfig;

const CONFIG_FILE: &str = "config.json";

/// Contents of `config.json`. Every section and field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub tabs: TabsConfig,
}

impl AppConfig {
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("owl-browser").join(CONFIG_FILE))
    }

    /// Loads the user's config, falling back to defaults.
    pub fn load() -> Self {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::warn!("No config directory, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {:?}, using defaults", path);
                return Self::default();
            }
            Err(err) => {
                log::warn!("Failed to read {:?}: {}", path, err);
                return Self::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|err| {
            log::warn!("Invalid config {:?}, using defaults: {}", path, err);
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabs::NewTabPosition;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join(CONFIG_FILE));
        assert_eq!(config.storage.dir, StorageConfig::default_dir());
        assert!(config.tabs.restore_tabs_on_startup);
    }

    #[test]
    fn sections_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{
                "storage": { "dir": "/tmp/owl-state" },
                "tabs": { "new_tab_position": "end", "tab_limit": 50 }
            }"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.storage.dir, PathBuf::from("/tmp/owl-state"));
        assert_eq!(config.tabs.new_tab_position, NewTabPosition::End);
        assert_eq!(config.tabs.tab_limit, Some(50));
        assert_eq!(config.tabs.default_session_name, "Default");
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{ tabs: ").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.tabs.tab_limit, None);
    }
}
