use storage::TabModel;

use crate::initializer::TabInitializer;
use crate::surface::SurfaceProvider;
use crate::TabId;

/// A tab in the live tab list.
///
/// A record is either frozen, holding the initializer that will populate its
/// surface, or thawed, owning a surface. Only thawed records can be in the
/// foreground.
#[derive(Debug)]
pub struct TabRecord<S> {
    id: TabId,
    url: String,
    title: String,
    desktop_mode: bool,
    dark_mode: bool,
    favicon: Option<Vec<u8>>,
    search_query: String,
    search_active: bool,
    is_new_tab: bool,
    foreground: bool,
    initializer: Option<TabInitializer>,
    surface: Option<S>,
}

impl<S> TabRecord<S> {
    /// Creates a frozen record.
    pub(crate) fn new(id: TabId, initializer: TabInitializer) -> Self {
        let mut record = Self {
            id,
            url: initializer.url().to_string(),
            title: initializer.title().to_string(),
            desktop_mode: false,
            dark_mode: false,
            favicon: None,
            search_query: String::new(),
            search_active: false,
            is_new_tab: false,
            foreground: false,
            initializer: None,
            surface: None,
        };
        if let TabInitializer::Restore(model) = &initializer {
            record.apply_model(model);
        }
        record.initializer = Some(initializer);
        record
    }

    fn apply_model(&mut self, model: &TabModel) {
        self.desktop_mode = model.desktop_mode;
        self.dark_mode = model.dark_mode;
        self.favicon = model.favicon.clone();
        self.search_query = model.search_query.clone();
        self.search_active = model.search_active;
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn desktop_mode(&self) -> bool {
        self.desktop_mode
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn favicon(&self) -> Option<&[u8]> {
        self.favicon.as_deref()
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn search_active(&self) -> bool {
        self.search_active
    }

    /// Whether the tab was opened on behalf of another application and has
    /// not been left since.
    pub fn is_new_tab(&self) -> bool {
        self.is_new_tab
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    pub fn is_frozen(&self) -> bool {
        self.surface.is_none()
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub(crate) fn set_new_tab(&mut self, is_new_tab: bool) {
        self.is_new_tab = is_new_tab;
    }

    pub(crate) fn set_navigation(&mut self, url: &str, title: &str) {
        self.url = url.to_string();
        self.title = title.to_string();
    }

    pub(crate) fn set_favicon(&mut self, favicon: Option<Vec<u8>>) {
        self.favicon = favicon;
    }

    /// Moves the tab in or out of the foreground.
    ///
    /// Entering the foreground thaws a frozen tab. Leaving it clears the
    /// new-tab flag but keeps the surface alive.
    pub(crate) fn set_foreground<P>(&mut self, provider: &P, foreground: bool)
    where
        P: SurfaceProvider<Surface = S>,
    {
        if foreground {
            self.thaw(provider);
        } else {
            self.is_new_tab = false;
        }
        self.foreground = foreground;
    }

    fn thaw<P>(&mut self, provider: &P)
    where
        P: SurfaceProvider<Surface = S>,
    {
        if self.surface.is_some() {
            return;
        }
        log::debug!("Thawing tab {}", self.id);
        let surface = provider.create(self.id);
        if let Some(initializer) = self.initializer.take() {
            initializer.populate(provider, &surface);
        }
        provider.set_desktop_mode(&surface, self.desktop_mode);
        provider.set_dark_mode(&surface, self.dark_mode);
        self.surface = Some(surface);
    }

    pub(crate) fn set_desktop_mode<P>(&mut self, provider: &P, enabled: bool)
    where
        P: SurfaceProvider<Surface = S>,
    {
        self.desktop_mode = enabled;
        if let Some(surface) = &self.surface {
            provider.set_desktop_mode(surface, enabled);
        }
    }

    pub(crate) fn set_dark_mode<P>(&mut self, provider: &P, enabled: bool)
    where
        P: SurfaceProvider<Surface = S>,
    {
        self.dark_mode = enabled;
        if let Some(surface) = &self.surface {
            provider.set_dark_mode(surface, enabled);
        }
    }

    pub(crate) fn set_find_in_page<P>(&mut self, provider: &P, query: Option<&str>)
    where
        P: SurfaceProvider<Surface = S>,
    {
        self.search_active = query.is_some();
        if let Some(query) = query {
            self.search_query = query.to_string();
        }
        if let Some(surface) = &self.surface {
            provider.find_in_page(surface, query);
        }
    }

    /// Persistable state of the tab.
    pub(crate) fn model<P>(&self, provider: &P) -> TabModel
    where
        P: SurfaceProvider<Surface = S>,
    {
        let render_surface_snapshot = match (&self.surface, &self.initializer) {
            (Some(surface), _) => provider.snapshot_state(surface),
            (None, Some(TabInitializer::Restore(model))) => model.render_surface_snapshot.clone(),
            _ => Vec::new(),
        };

        TabModel {
            url: self.url.clone(),
            title: self.title.clone(),
            desktop_mode: self.desktop_mode,
            dark_mode: self.dark_mode,
            favicon: self.favicon.clone(),
            search_query: self.search_query.clone(),
            search_active: self.search_active,
            render_surface_snapshot,
        }
    }

    /// Drops the surface and freezes the tab from its current state.
    pub(crate) fn refreeze<P>(&mut self, provider: &P)
    where
        P: SurfaceProvider<Surface = S>,
    {
        let model = self.model(provider);
        self.release(provider);
        self.initializer = Some(TabInitializer::for_model(model));
    }

    /// Destroys the surface if there is one. Safe to call more than once.
    pub(crate) fn release<P>(&mut self, provider: &P)
    where
        P: SurfaceProvider<Surface = S>,
    {
        if let Some(surface) = self.surface.take() {
            log::debug!("Destroying surface of tab {}", self.id);
            provider.destroy(surface);
        }
        self.foreground = false;
    }
}
