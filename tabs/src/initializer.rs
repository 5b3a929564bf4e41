use storage::TabModel;

use crate::surface::SurfaceProvider;
use crate::uris::{self, SpecialPage};

/// How a tab's surface is populated the first time it is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabInitializer {
    /// Load a web address.
    Url(String),
    /// Show one of the browser's own pages.
    Page(SpecialPage),
    /// Restore a persisted or recently closed tab.
    Restore(TabModel),
    /// Serve a request the engine is waiting on, identified by token.
    Deferred(u64),
    /// Leave the surface empty.
    NoOp,
}

impl TabInitializer {
    /// Initializer for a web address, mapping internal addresses to their page.
    pub fn for_url(url: impl Into<String>) -> Self {
        let url = url.into();
        if url == uris::NOOP_URL {
            return TabInitializer::NoOp;
        }
        match SpecialPage::from_url(&url) {
            Some(page) => TabInitializer::Page(page),
            None => TabInitializer::Url(url),
        }
    }

    /// Initializer bringing back a saved tab.
    ///
    /// Internal pages are rebuilt rather than restored from their snapshot.
    pub fn for_model(model: TabModel) -> Self {
        if uris::is_special_url(&model.url) {
            Self::for_url(model.url)
        } else {
            TabInitializer::Restore(model)
        }
    }

    /// Address shown for a tab that has not been populated yet.
    pub fn url(&self) -> &str {
        match self {
            TabInitializer::Url(url) => url,
            TabInitializer::Page(page) => page.url(),
            TabInitializer::Restore(model) => &model.url,
            TabInitializer::Deferred(_) | TabInitializer::NoOp => "",
        }
    }

    pub fn title(&self) -> &str {
        match self {
            TabInitializer::Page(page) => page.title(),
            TabInitializer::Restore(model) => &model.title,
            _ => "",
        }
    }

    /// Populates a freshly created surface.
    pub fn populate<P: SurfaceProvider>(&self, provider: &P, surface: &P::Surface) {
        match self {
            TabInitializer::Url(url) => provider.load_url(surface, url),
            TabInitializer::Page(page) => provider.load_url(surface, page.url()),
            TabInitializer::Restore(model) => {
                provider.set_desktop_mode(surface, model.desktop_mode);
                provider.set_dark_mode(surface, model.dark_mode);

                let restored = !model.render_surface_snapshot.is_empty()
                    && provider.restore_state(surface, &model.render_surface_snapshot);
                if !restored && !model.url.is_empty() {
                    log::debug!("Loading '{}' instead of restoring its state", model.url);
                    provider.load_url(surface, &model.url);
                }

                if model.search_active {
                    provider.find_in_page(surface, Some(&model.search_query));
                }
            }
            TabInitializer::Deferred(token) => provider.attach_deferred(surface, *token),
            TabInitializer::NoOp => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_addresses_map_to_pages() {
        assert_eq!(
            TabInitializer::for_url("owl://history"),
            TabInitializer::Page(SpecialPage::History)
        );
        assert_eq!(TabInitializer::for_url(uris::NOOP_URL), TabInitializer::NoOp);
        assert_eq!(
            TabInitializer::for_url("https://example.com"),
            TabInitializer::Url("https://example.com".into())
        );
    }

    #[test]
    fn saved_internal_pages_are_rebuilt() {
        let mut model = TabModel::new("about:bookmarks", "Bookmarks");
        model.render_surface_snapshot = vec![1, 2, 3];
        assert_eq!(
            TabInitializer::for_model(model),
            TabInitializer::Page(SpecialPage::Bookmarks)
        );

        let model = TabModel::new("https://example.com", "Example");
        assert_eq!(
            TabInitializer::for_model(model.clone()),
            TabInitializer::Restore(model)
        );
    }
}
