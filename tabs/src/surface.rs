use crate::TabId;

/// Render-surface factory backing the tabs.
///
/// Surfaces are owned by their tab record and handed back exactly once
/// through [`SurfaceProvider::destroy`].
pub trait SurfaceProvider {
    type Surface;

    /// Creates a surface for the given tab.
    fn create(&self, tab: TabId) -> Self::Surface;

    /// Starts loading `url` into the surface.
    fn load_url(&self, surface: &Self::Surface, url: &str);

    /// Serializes the surface's navigation state.
    fn snapshot_state(&self, surface: &Self::Surface) -> Vec<u8>;

    /// Restores state produced by [`SurfaceProvider::snapshot_state`].
    ///
    /// Returns `false` if the state was rejected, e.g. after an engine upgrade.
    fn restore_state(&self, surface: &Self::Surface, state: &[u8]) -> bool;

    /// Connects the surface to a pending request identified by `token`,
    /// typically a popup the engine asked to open.
    fn attach_deferred(&self, surface: &Self::Surface, token: u64);

    /// Releases the surface.
    fn destroy(&self, surface: Self::Surface);

    fn set_desktop_mode(&self, _surface: &Self::Surface, _enabled: bool) {}

    fn set_dark_mode(&self, _surface: &Self::Surface, _enabled: bool) {}

    /// Highlights `query` in the page, or clears highlights when `None`.
    fn find_in_page(&self, _surface: &Self::Surface, _query: Option<&str>) {}
}
