use serde::Deserialize;

/// Where newly opened tabs are inserted in the tab list.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NewTabPosition {
    Start,
    End,
    BeforeCurrent,
    #[default]
    AfterCurrent,
}

impl NewTabPosition {
    /// Insertion index in a list of `len` tabs whose current tab is at `current`.
    ///
    /// Positions relative to the current tab fall back to the end when no tab
    /// is current.
    pub fn resolve(self, len: usize, current: Option<usize>) -> usize {
        match (self, current) {
            (NewTabPosition::Start, _) => 0,
            (NewTabPosition::BeforeCurrent, Some(index)) => index,
            (NewTabPosition::AfterCurrent, Some(index)) => index + 1,
            _ => len,
        }
    }
}

/// Tab and session behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TabsConfig {
    pub new_tab_position: NewTabPosition,
    /// When off, backgrounding discards the saved tabs instead of writing them.
    pub restore_tabs_on_startup: bool,
    /// Advisory tab count above which the UI is told to nag. Tabs still open.
    pub tab_limit: Option<usize>,
    pub default_session_name: String,
    pub recovery_session_prefix: String,
    /// Search engine template, `%s` stands for the query.
    pub search_url: String,
}

impl Default for TabsConfig {
    fn default() -> Self {
        Self {
            new_tab_position: NewTabPosition::default(),
            restore_tabs_on_startup: true,
            tab_limit: None,
            default_session_name: "Default".to_string(),
            recovery_session_prefix: "Recovery".to_string(),
            search_url: "https://duckduckgo.com/?q=%s".to_string(),
        }
    }
}
