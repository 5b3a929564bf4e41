//! Best-effort tab recovery from blobs whose structure can no longer be trusted.
//!
//! Older builds stored tabs in a parcel container: strings are an `i32`
//! little-endian character count, UTF-16LE code units and a NUL code unit,
//! padded to four bytes. A key string is followed by an `i32` type tag and the
//! value. After an engine upgrade those headers may no longer line up, so this
//! module only searches for patterns and never follows lengths blindly.

use std::collections::HashSet;
use std::fmt;

use crate::model::TAB_KEY_PREFIX;

const URL_KEY: &str = "URL";
const TITLE_KEY: &str = "TITLE";

/// Type tag of a string value.
const VAL_STRING: i32 = 0;

/// Longest string the parser will decode, in UTF-16 code units.
const MAX_STRING_UNITS: i32 = 10_000;
/// Bytes searched on each side of a URL key for the tab title.
const TITLE_WINDOW: usize = 1000;
/// Bytes searched after a URL key whose value cannot be read.
const FALLBACK_WINDOW: usize = 2000;

/// Schemes a recovered string must start with to count as a URL.
pub const URL_SCHEMES: [&str; 6] = ["http://", "https://", "file://", "owl://", "about:", "data:"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredTab {
    pub url: String,
    pub title: String,
    /// Key of the tab entry the URL was found under, when one precedes it.
    pub tab_key: Option<String>,
}

pub fn is_recoverable_url(text: &str) -> bool {
    URL_SCHEMES.iter().any(|scheme| text.starts_with(scheme))
}

/// Extracts every tab that can still be identified in `data`.
///
/// URLs are found through their field key first. Only when that yields
/// nothing is the whole buffer scanned for URL-looking strings. The result is
/// de-duplicated by URL in first-seen order.
pub fn recover_tabs(data: &[u8]) -> Vec<RecoveredTab> {
    let tab_keys = find_tab_keys(data);

    let mut tabs: Vec<RecoveredTab> = find_string(data, URL_KEY)
        .into_iter()
        .filter_map(|pos| {
            let url = extract_url(data, pos, &tab_keys)?;
            Some(RecoveredTab {
                url,
                title: find_title(data, pos, &tab_keys).unwrap_or_default(),
                tab_key: owning_tab_key(pos, &tab_keys).map(|(_, key)| key.clone()),
            })
        })
        .collect();

    if tabs.is_empty() {
        tabs = find_urls(data)
            .into_iter()
            .map(|url| RecoveredTab {
                url,
                title: String::new(),
                tab_key: None,
            })
            .collect();
    }

    let mut seen = HashSet::new();
    tabs.retain(|tab| seen.insert(tab.url.clone()));
    if !tabs.is_empty() {
        log::debug!("Recovered {} tabs from damaged state", tabs.len());
    }
    tabs
}

/// What the parser can see in a damaged blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub size: usize,
    /// Tab keys with their byte offsets.
    pub tab_keys: Vec<(usize, String)>,
    /// URLs found by the pattern scan alone.
    pub url_hits: Vec<String>,
    pub tabs: Vec<RecoveredTab>,
}

pub fn describe(data: &[u8]) -> RecoveryReport {
    RecoveryReport {
        size: data.len(),
        tab_keys: find_tab_keys(data),
        url_hits: find_urls(data),
        tabs: recover_tabs(data),
    }
}

impl fmt::Display for RecoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Size: {} bytes", self.size)?;
        writeln!(f, "Tab keys found: {}", self.tab_keys.len())?;
        for (pos, key) in &self.tab_keys {
            writeln!(f, "  - {key} at position {pos}")?;
        }
        writeln!(f, "URLs found: {}", self.url_hits.len())?;
        for url in &self.url_hits {
            writeln!(f, "  - {url}")?;
        }
        writeln!(f, "Recovered tabs: {}", self.tabs.len())?;
        for tab in &self.tabs {
            let title: String = tab.title.chars().take(50).collect();
            writeln!(f, "  - [{}] {}", tab.tab_key.as_deref().unwrap_or("?"), title)?;
            writeln!(f, "    {}", tab.url)?;
        }
        Ok(())
    }
}

fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn read_i32(data: &[u8], offset: usize) -> Option<i32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(i32::from_le_bytes(bytes.try_into().ok()?))
}

/// Decodes the length-prefixed string at `offset`. Unpaired surrogates
/// become U+FFFD and embedded NULs are kept.
fn read_string(data: &[u8], offset: usize) -> Option<String> {
    let units = read_i32(data, offset)?;
    if !(0..=MAX_STRING_UNITS).contains(&units) {
        return None;
    }
    let start = offset + 4;
    let bytes = data.get(start..start + units as usize * 2)?;
    let decoded = char::decode_utf16(
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]])),
    )
    .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
    .collect();
    Some(decoded)
}

/// Offsets at which `target` is stored as a complete length-prefixed string.
fn find_string(data: &[u8], target: &str) -> Vec<usize> {
    let encoded = utf16le(target);
    let units = encoded.len() / 2;
    let limit = data.len().saturating_sub(encoded.len() + 4);

    (0..limit)
        .filter(|&i| {
            read_i32(data, i) == Some(units as i32)
                && i + 4 + units * 2 + 2 <= data.len()
                && data[i + 4..i + 4 + encoded.len()] == encoded[..]
        })
        .collect()
}

/// Offsets and values of `TAB_` keys.
fn find_tab_keys(data: &[u8]) -> Vec<(usize, String)> {
    let prefix = utf16le(TAB_KEY_PREFIX);
    let limit = data.len().saturating_sub(prefix.len() + 4);

    (0..limit)
        .filter(|&i| {
            matches!(read_i32(data, i), Some(units @ 5..=15)
                if i + 4 + units as usize * 2 + 2 <= data.len())
                && data[i + 4..i + 4 + prefix.len()] == prefix[..]
        })
        .filter_map(|i| {
            read_string(data, i)
                .filter(|key| key.starts_with(TAB_KEY_PREFIX))
                .map(|key| (i, key))
        })
        .collect()
}

/// Decodes the string value stored after the key at `key_pos`.
fn extract_value(data: &[u8], key_pos: usize, key: &str) -> Option<String> {
    let key_units = key.encode_utf16().count();
    let pos = (key_pos + 4 + key_units * 2 + 2 + 3) & !3;

    if read_i32(data, pos)? != VAL_STRING {
        return None;
    }
    read_string(data, pos + 4)
}

/// URL stored under the URL key at `key_pos`.
///
/// A value with the wrong type, a broken length or non-URL contents sends the
/// search forward through the rest of the tab entry.
fn extract_url(data: &[u8], key_pos: usize, tab_keys: &[(usize, String)]) -> Option<String> {
    extract_value(data, key_pos, URL_KEY)
        .filter(|url| is_recoverable_url(url))
        .or_else(|| find_url_after(data, key_pos, tab_keys))
}

/// First URL within the fallback window after `key_pos`, stopping at the next tab key.
///
/// Length-prefixed strings are preferred. Failing that, a scheme prefix is
/// read up to its NUL terminator, which covers a value whose length is corrupt.
fn find_url_after(data: &[u8], key_pos: usize, tab_keys: &[(usize, String)]) -> Option<String> {
    let mut end = (key_pos + FALLBACK_WINDOW).min(data.len());
    if let Some((next, _)) = tab_keys.iter().find(|(pos, _)| *pos > key_pos) {
        end = end.min(*next);
    }
    let window = &data[key_pos.min(end)..end];

    (0..window.len().saturating_sub(4))
        .filter(|&i| matches!(read_i32(window, i), Some(5..=2000)))
        .filter_map(|i| read_string(window, i))
        .find(|text| is_recoverable_url(text))
        .or_else(|| (0..window.len()).find_map(|i| read_terminated_url(&window[i..])))
}

/// URL starting at the beginning of `data` and ending at a NUL code unit.
fn read_terminated_url(data: &[u8]) -> Option<String> {
    if !URL_SCHEMES.iter().any(|scheme| data.starts_with(&utf16le(scheme))) {
        return None;
    }
    let units = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|unit| *unit != 0)
        .take(MAX_STRING_UNITS as usize);
    let url: String = char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    is_recoverable_url(&url).then_some(url)
}

/// Nearest tab key stored before `pos`.
fn owning_tab_key(pos: usize, tab_keys: &[(usize, String)]) -> Option<&(usize, String)> {
    tab_keys.iter().filter(|(key_pos, _)| *key_pos < pos).max_by_key(|(key_pos, _)| *key_pos)
}

/// Title stored near the URL key at `url_pos`.
///
/// The window is clipped to the tab entry the URL belongs to, so a short
/// neighbouring tab never lends its title.
fn find_title(data: &[u8], url_pos: usize, tab_keys: &[(usize, String)]) -> Option<String> {
    let mut start = url_pos.saturating_sub(TITLE_WINDOW);
    let mut end = (url_pos + TITLE_WINDOW).min(data.len());
    if let Some((owner, _)) = owning_tab_key(url_pos, tab_keys) {
        start = start.max(*owner);
    }
    if let Some((next, _)) = tab_keys.iter().find(|(key_pos, _)| *key_pos > url_pos) {
        end = end.min(*next);
    }

    find_string(&data[start..end], TITLE_KEY)
        .into_iter()
        .filter_map(|rel| extract_value(data, start + rel, TITLE_KEY))
        .find(|title| !title.is_empty() && !is_recoverable_url(title))
}

/// URL strings located by their scheme prefix alone, in buffer order.
fn find_urls(data: &[u8]) -> Vec<String> {
    let prefixes: Vec<Vec<u8>> = URL_SCHEMES.iter().map(|scheme| utf16le(scheme)).collect();
    let mut seen = HashSet::new();

    (4..data.len())
        .filter(|&i| {
            prefixes
                .iter()
                .any(|prefix| data.len() > i + prefix.len() && data[i..].starts_with(prefix))
        })
        .filter_map(|i| read_string(data, i - 4))
        .filter(|url| is_recoverable_url(url) && seen.insert(url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tab_key;
    use proptest::prelude::*;

    /// Builds buffers in the parcel layout the parser understands.
    #[derive(Default)]
    struct Parcel(Vec<u8>);

    impl Parcel {
        fn int(&mut self, value: i32) -> &mut Self {
            self.0.extend_from_slice(&value.to_le_bytes());
            self
        }

        fn string(&mut self, text: &str) -> &mut Self {
            let encoded = utf16le(text);
            self.int((encoded.len() / 2) as i32);
            self.0.extend_from_slice(&encoded);
            self.0.extend_from_slice(&[0, 0]);
            while self.0.len() % 4 != 0 {
                self.0.push(0);
            }
            self
        }

        fn entry(&mut self, key: &str, value: &str) -> &mut Self {
            self.string(key).int(VAL_STRING).string(value)
        }

        fn tab(&mut self, index: usize, url: &str, title: &str) -> &mut Self {
            self.string(&tab_key(index))
                .int(3)
                .entry(URL_KEY, url)
                .entry(TITLE_KEY, title)
                .string("DESKTOP_MODE")
                .int(9)
                .int(0)
        }

        fn bytes(&self) -> Vec<u8> {
            self.0.clone()
        }
    }

    fn pairs(tabs: &[RecoveredTab]) -> Vec<(&str, &str)> {
        tabs.iter().map(|t| (t.url.as_str(), t.title.as_str())).collect()
    }

    #[test]
    fn recovers_tabs_from_well_formed_entries() {
        let mut parcel = Parcel::default();
        parcel
            .int(2)
            .tab(0, "https://example.com", "Example")
            .tab(1, "owl://bookmarks", "Bookmarks")
            .tab(2, "https://www.rust-lang.org/learn", "Learn Rust");

        let tabs = recover_tabs(&parcel.bytes());

        assert_eq!(
            pairs(&tabs),
            vec![
                ("https://example.com", "Example"),
                ("owl://bookmarks", "Bookmarks"),
                ("https://www.rust-lang.org/learn", "Learn Rust"),
            ]
        );
        let keys: Vec<_> = tabs.iter().map(|t| t.tab_key.as_deref()).collect();
        assert_eq!(keys, vec![Some("TAB_00000"), Some("TAB_00001"), Some("TAB_00002")]);
    }

    #[test]
    fn neighbouring_title_is_not_borrowed() {
        let long_url = format!("https://example.com/{}", "a".repeat(300));
        let mut parcel = Parcel::default();
        parcel.tab(0, "https://a.example", "A").tab(1, &long_url, "");

        let tabs = recover_tabs(&parcel.bytes());
        assert_eq!(pairs(&tabs), vec![("https://a.example", "A"), (long_url.as_str(), "")]);
    }

    #[test]
    fn mistyped_url_value_uses_forward_scan() {
        let mut parcel = Parcel::default();
        parcel
            .string(URL_KEY)
            .int(17)
            .int(-1)
            .int(0x7fff_0000)
            .string("not a url")
            .string("https://example.com");

        let tabs = recover_tabs(&parcel.bytes());
        assert_eq!(pairs(&tabs), vec![("https://example.com", "")]);
    }

    #[test]
    fn corrupt_url_length_does_not_lose_the_tab() {
        let mut parcel = Parcel::default();
        parcel.tab(0, "https://a.example", "A");
        parcel.string(&tab_key(1)).int(3).string(URL_KEY).int(VAL_STRING).int(-7);
        parcel.0.extend(utf16le("https://b.example"));
        parcel.0.extend_from_slice(&[0, 0]);

        let tabs = recover_tabs(&parcel.bytes());
        let urls: Vec<_> = tabs.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
        assert_eq!(tabs[1].tab_key.as_deref(), Some("TAB_00001"));
    }

    #[test]
    fn non_url_value_scans_the_rest_of_its_tab() {
        let mut parcel = Parcel::default();
        parcel
            .string(&tab_key(0))
            .int(3)
            .entry(URL_KEY, "garbled")
            .entry("ORIGINAL_URL", "https://a.example/start")
            .tab(1, "https://b.example", "B");

        let tabs = recover_tabs(&parcel.bytes());
        assert_eq!(
            pairs(&tabs),
            vec![("https://a.example/start", ""), ("https://b.example", "B")]
        );
    }

    #[test]
    fn forward_scan_is_bounded() {
        let mut parcel = Parcel::default();
        parcel.string(URL_KEY).int(17);
        parcel.0.extend(std::iter::repeat(0xAA).take(FALLBACK_WINDOW));
        parcel.string("https://too-far.example");

        // The key path finds nothing, so the pattern scan picks the URL up instead.
        let tabs = recover_tabs(&parcel.bytes());
        assert_eq!(pairs(&tabs), vec![("https://too-far.example", "")]);
        assert_eq!(tabs[0].tab_key, None);
    }

    #[test]
    fn pattern_scan_runs_when_no_key_matches() {
        let mut parcel = Parcel::default();
        parcel
            .int(42)
            .string("owl://home")
            .string("garbage")
            .string("https://example.com/a")
            .string("owl://home")
            .string("ftp://ignored.example");

        let tabs = recover_tabs(&parcel.bytes());
        assert_eq!(
            pairs(&tabs),
            vec![("owl://home", ""), ("https://example.com/a", "")]
        );
    }

    #[test]
    fn duplicate_urls_keep_first_title() {
        let mut parcel = Parcel::default();
        parcel
            .tab(0, "https://example.com", "First")
            .tab(1, "https://example.com", "Second");

        let tabs = recover_tabs(&parcel.bytes());
        assert_eq!(pairs(&tabs), vec![("https://example.com", "First")]);
    }

    #[test]
    fn title_that_looks_like_a_url_is_ignored() {
        let mut parcel = Parcel::default();
        parcel.tab(0, "https://example.com", "https://example.com");

        let tabs = recover_tabs(&parcel.bytes());
        assert_eq!(pairs(&tabs), vec![("https://example.com", "")]);
    }

    #[test]
    fn truncated_buffer_recovers_complete_tabs() {
        let mut parcel = Parcel::default();
        parcel
            .tab(0, "https://example.com", "Example")
            .tab(1, "https://cut.example/path", "Cut");
        let bytes = parcel.bytes();
        let cut = bytes.len() - 60;

        let tabs = recover_tabs(&bytes[..cut]);
        assert_eq!(tabs[0].url, "https://example.com");
        assert!(tabs.iter().all(|t| t.url != "https://cut.example/path" || t.title.is_empty()));
    }

    #[test]
    fn empty_and_tiny_buffers() {
        assert!(recover_tabs(&[]).is_empty());
        assert!(recover_tabs(&[3, 0, 0]).is_empty());
        assert!(recover_tabs(&[0xff; 64]).is_empty());
    }

    #[test]
    fn report_lists_keys_and_hits() {
        let mut parcel = Parcel::default();
        parcel.tab(0, "https://example.com", "Example");
        let report = describe(&parcel.bytes());

        assert_eq!(report.tab_keys, vec![(0, "TAB_00000".to_string())]);
        assert_eq!(report.url_hits, vec!["https://example.com".to_string()]);
        assert_eq!(report.tabs.len(), 1);

        let text = report.to_string();
        assert!(text.contains("TAB_00000 at position 0"));
        assert!(text.contains("[TAB_00000] Example"));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let _ = recover_tabs(&data);
            let _ = describe(&data);
        }

        #[test]
        fn recovery_is_idempotent_and_well_formed(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let first = recover_tabs(&data);
            prop_assert_eq!(&first, &recover_tabs(&data));

            let mut urls = HashSet::new();
            for tab in &first {
                prop_assert!(is_recoverable_url(&tab.url));
                prop_assert!(urls.insert(tab.url.clone()));
            }
        }

        #[test]
        fn embedded_nuls_are_kept(
            path in "[a-z\\x00]{1,24}",
            title in "[A-Za-z \\x00]{1,24}",
            junk in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let url = format!("https://example.com/{path}");
            let mut parcel = Parcel(junk);
            while parcel.0.len() % 4 != 0 {
                parcel.0.push(0);
            }
            parcel.tab(0, &url, &title);

            let tabs = recover_tabs(&parcel.bytes());
            prop_assert!(tabs.iter().any(|t| t.url == url && t.title == title));
        }

        #[test]
        fn recovers_generated_sessions(
            entries in proptest::collection::vec(("[a-z]{1,16}", "[A-Za-z ]{1,32}"), 1..12)
        ) {
            let mut parcel = Parcel::default();
            let mut expected = Vec::new();
            for (index, (host, title)) in entries.iter().enumerate() {
                let url = format!("https://{host}.example/{index}");
                parcel.tab(index, &url, title);
                expected.push((url, title.clone()));
            }

            let tabs = recover_tabs(&parcel.bytes());
            let got: Vec<(String, String)> =
                tabs.into_iter().map(|t| (t.url, t.title)).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
