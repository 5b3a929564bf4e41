//! Internal page addresses and search URL construction.

pub const HOME_URL: &str = "owl://home";
pub const INCOGNITO_URL: &str = "owl://incognito";
pub const BOOKMARKS_URL: &str = "owl://bookmarks";
pub const HISTORY_URL: &str = "owl://history";
pub const DOWNLOADS_URL: &str = "owl://downloads";
/// Placeholder address of a tab that loads nothing.
pub const NOOP_URL: &str = "owl://noop";

/// Pages rendered by the browser itself rather than fetched from the web.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SpecialPage {
    Home,
    Incognito,
    Bookmarks,
    History,
    Downloads,
}

impl SpecialPage {
    pub const ALL: [SpecialPage; 5] = [
        SpecialPage::Home,
        SpecialPage::Incognito,
        SpecialPage::Bookmarks,
        SpecialPage::History,
        SpecialPage::Downloads,
    ];

    pub fn url(self) -> &'static str {
        match self {
            SpecialPage::Home => HOME_URL,
            SpecialPage::Incognito => INCOGNITO_URL,
            SpecialPage::Bookmarks => BOOKMARKS_URL,
            SpecialPage::History => HISTORY_URL,
            SpecialPage::Downloads => DOWNLOADS_URL,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            SpecialPage::Home => "Home",
            SpecialPage::Incognito => "Incognito",
            SpecialPage::Bookmarks => "Bookmarks",
            SpecialPage::History => "History",
            SpecialPage::Downloads => "Downloads",
        }
    }

    /// Recognizes internal page addresses, including their `about:` aliases.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.trim_end_matches('/');
        match url {
            "about:home" => Some(SpecialPage::Home),
            "about:incognito" => Some(SpecialPage::Incognito),
            "about:bookmarks" => Some(SpecialPage::Bookmarks),
            "about:history" => Some(SpecialPage::History),
            _ => Self::ALL.into_iter().find(|page| page.url() == url),
        }
    }
}

pub fn is_special_url(url: &str) -> bool {
    url == NOOP_URL || SpecialPage::from_url(url).is_some()
}

/// Fills `template` with the percent-encoded `query`.
///
/// Templates without a `%s` placeholder get the query appended.
pub fn search_url(template: &str, query: &str) -> String {
    let encoded = urlencoding::encode(query.trim());
    if template.contains("%s") {
        template.replace("%s", &encoded)
    } else {
        format!("{template}{encoded}")
    }
}
