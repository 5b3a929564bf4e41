//! Markup for `owl://` pages served by the browser itself.

use tabs::SpecialPage;

const STYLE: &str = "body{font-family:sans-serif;margin:4em auto;max-width:40em;\
color:#222;background:#fafafa}@media(prefers-color-scheme:dark){body{color:#eee;\
background:#1e1e1e}}h1{font-weight:300}";

fn blurb(page: SpecialPage) -> &'static str {
    match page {
        SpecialPage::Home => "Type an address or a search to get started.",
        SpecialPage::Incognito => {
            "Tabs opened here are not saved, and nothing is restored after a restart."
        }
        SpecialPage::Bookmarks => "No bookmarks yet.",
        SpecialPage::History => "No history yet.",
        SpecialPage::Downloads => "No downloads yet.",
    }
}

/// Full HTML document for `page`.
pub fn render(page: SpecialPage) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
         <style>{STYLE}</style></head><body><h1>{title}</h1><p>{blurb}</p></body></html>",
        title = page.title(),
        blurb = blurb(page),
    )
}

/// HTML for the internal page at `uri`, or `None` for unknown pages.
pub fn render_uri(uri: &str) -> Option<String> {
    SpecialPage::from_url(uri).map(render)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_page_has_its_title() {
        for page in SpecialPage::ALL {
            let html = render(page);
            assert!(html.contains(&format!("<title>{}</title>", page.title())));
        }
    }

    #[test]
    fn unknown_pages_are_not_served() {
        assert!(render_uri("owl://settings").is_none());
        assert!(render_uri("owl://home/").is_some());
    }
}
