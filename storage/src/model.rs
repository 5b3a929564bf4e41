use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Key prefix of each tab entry inside a session blob.
pub const TAB_KEY_PREFIX: &str = "TAB_";

/// Zero-padded key for the tab at `index`.
///
/// Five digits keep lexicographic and numeric order identical up to 99,999
/// tabs. Longer keys are still ordered by [`SessionBlob::ordered_tabs`].
pub fn tab_key(index: usize) -> String {
    format!("{TAB_KEY_PREFIX}{index:05}")
}

/// Position encoded in a tab key, if it has one.
fn tab_key_index(key: &str) -> Option<usize> {
    key.strip_prefix(TAB_KEY_PREFIX)?.parse().ok()
}

/// A named, independently persisted collection of tabs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub name: String,
    /// Number of tabs, or `-1` when unknown until the session is loaded.
    #[serde(default = "unknown_tab_count")]
    pub tab_count: i32,
    #[serde(default)]
    pub is_current: bool,
}

fn unknown_tab_count() -> i32 {
    -1
}

impl Session {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_tab_count(name, -1)
    }

    pub fn with_tab_count(name: impl Into<String>, tab_count: i32) -> Self {
        Self {
            name: name.into(),
            tab_count,
            is_current: false,
        }
    }
}

/// Contents of the `SESSIONS` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndex {
    #[serde(default)]
    pub current_session_name: String,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

impl SessionIndex {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(name: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| StorageError::Decode {
            name: name.to_string(),
            source,
        })
    }
}

/// Persisted state of a single tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabModel {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub desktop_mode: bool,
    #[serde(default)]
    pub dark_mode: bool,
    /// PNG bytes; `None` means the default placeholder icon.
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub favicon: Option<Vec<u8>>,
    #[serde(default)]
    pub search_query: String,
    #[serde(default)]
    pub search_active: bool,
    /// Opaque render-surface state.
    #[serde(default, with = "base64_bytes")]
    pub render_surface_snapshot: Vec<u8>,
}

impl TabModel {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Contents of a `SESSION_<name>` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBlob {
    pub tabs: BTreeMap<String, TabModel>,
    /// Tab positions from least to most recently used.
    #[serde(default)]
    pub recent_tab_indices: Vec<i64>,
}

impl SessionBlob {
    /// Builds a blob from tabs in display order.
    pub fn from_tabs(tabs: impl IntoIterator<Item = TabModel>, recent: Vec<i64>) -> Self {
        Self {
            tabs: tabs
                .into_iter()
                .enumerate()
                .map(|(index, tab)| (tab_key(index), tab))
                .collect(),
            recent_tab_indices: recent,
        }
    }

    /// Tabs in their persisted order. Entries without the tab key prefix are skipped.
    ///
    /// Keys are compared by their number, so a blob with more tabs than the
    /// padding covers loads in the order it was saved.
    pub fn ordered_tabs(&self) -> Vec<&TabModel> {
        let mut tabs: Vec<(Option<usize>, &TabModel)> = self
            .tabs
            .iter()
            .filter(|(key, _)| key.starts_with(TAB_KEY_PREFIX))
            .map(|(key, tab)| (tab_key_index(key), tab))
            .collect();
        // Keys that are not numbered keep their map order after the numbered ones.
        tabs.sort_by_key(|(index, _)| index.map_or((1, 0), |index| (0, index)));
        tabs.into_iter().map(|(_, tab)| tab).collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(name: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| StorageError::Decode {
            name: name.to_string(),
            source,
        })
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

mod base64_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}
