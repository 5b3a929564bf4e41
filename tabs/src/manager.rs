use std::cell::RefCell;
use std::rc::Rc;

use storage::{recover_tabs, Session, SessionBlob, SessionStore, TabModel, LEGACY_TABS_FILE};
use util::{unix_millis, IdGenerator};

use crate::config::{NewTabPosition, TabsConfig};
use crate::events::{Notice, TabEvent, TabEventSink};
use crate::initializer::TabInitializer;
use crate::record::TabRecord;
use crate::surface::SurfaceProvider;
use crate::uris::{self, SpecialPage};
use crate::TabId;

/// Outcome of reading a session file.
enum Loaded {
    Blob(SessionBlob),
    /// The file exists but could not be decoded. Holds the raw bytes when
    /// they could be read at all.
    Damaged(Option<Vec<u8>>),
    Missing,
}

/// Owner of the live tab list of the current session.
///
/// All methods must be called from the thread driving the UI. Storage errors
/// never escape: they are logged and turned into recovery or no-ops.
pub struct TabManager<P: SurfaceProvider> {
    provider: P,
    store: Rc<RefCell<SessionStore>>,
    config: TabsConfig,
    sink: Box<dyn TabEventSink>,
    ids: IdGenerator,
    tabs: Vec<TabRecord<P::Surface>>,
    current: Option<TabId>,
    /// Least recently used first, so the current tab is last.
    recent: Vec<TabId>,
    closed: Vec<TabModel>,
    /// Addresses requested by other applications before initialization.
    pending: Vec<String>,
    initialized: bool,
    incognito: bool,
}

impl<P: SurfaceProvider> TabManager<P> {
    pub fn new(
        provider: P,
        store: Rc<RefCell<SessionStore>>,
        config: TabsConfig,
        sink: impl TabEventSink + 'static,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            sink: Box::new(sink),
            ids: IdGenerator::default(),
            tabs: Vec::new(),
            current: None,
            recent: Vec::new(),
            closed: Vec::new(),
            pending: Vec::new(),
            initialized: false,
            incognito: false,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &Rc<RefCell<SessionStore>> {
        &self.store
    }

    pub fn config(&self) -> &TabsConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_incognito(&self) -> bool {
        self.incognito
    }

    pub fn tabs(&self) -> &[TabRecord<P::Surface>] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Looks a tab up by id. Closed tabs are simply not found.
    pub fn tab(&self, id: TabId) -> Option<&TabRecord<P::Surface>> {
        self.tabs.iter().find(|tab| tab.id() == id)
    }

    pub fn tab_at(&self, index: usize) -> Option<&TabRecord<P::Surface>> {
        self.tabs.get(index)
    }

    pub fn position(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id() == id)
    }

    pub fn current_tab(&self) -> Option<&TabRecord<P::Surface>> {
        self.current.and_then(|id| self.tab(id))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current.and_then(|id| self.position(id))
    }

    /// Tab ids from most to least recently used.
    pub fn recent_tabs(&self) -> impl Iterator<Item = TabId> + '_ {
        self.recent.iter().rev().copied()
    }

    pub fn closed_tab_count(&self) -> usize {
        self.closed.len()
    }

    fn notify(&self, event: TabEvent) {
        self.sink.notify(event);
    }

    fn notice(&self, notice: Notice) {
        self.notify(TabEvent::Notice(notice));
    }

    /// Replaces the tab list with the current session's saved tabs.
    ///
    /// Incognito starts from a single incognito page and never reads storage.
    /// At least one tab exists afterwards, and the most recently used tab is
    /// current.
    pub fn initialize(&mut self, incognito: bool) -> &[TabRecord<P::Surface>] {
        log::info!("Initializing tabs, incognito: {}", incognito);
        self.shutdown();
        self.incognito = incognito;

        let recent_indices = if incognito {
            self.push_tab(TabInitializer::Page(SpecialPage::Incognito));
            Vec::new()
        } else {
            let indices = self.restore_previous_tabs();
            if self.tabs.is_empty() {
                self.push_tab(TabInitializer::Page(SpecialPage::Home));
            }
            let mut store = self.store.borrow_mut();
            let name = store.current_session_name().to_string();
            store.set_tab_count(&name, self.tabs.len());
            indices
        };

        self.rebuild_recent(&recent_indices);
        self.initialized = true;
        self.notify(TabEvent::Initialized);
        self.notify(TabEvent::TabCountChanged(self.tabs.len()));

        if let Some(index) = self.recent.last().and_then(|id| self.position(*id)) {
            self.switch_to_tab(index);
        }

        for url in std::mem::take(&mut self.pending) {
            self.open_external_url(url);
        }

        &self.tabs
    }

    /// Appends a frozen tab without notifying anyone.
    fn push_tab(&mut self, initializer: TabInitializer) -> TabId {
        let id = TabId::new(self.ids.next());
        self.tabs.push(TabRecord::new(id, initializer));
        id
    }

    /// Sets the MRU order from saved indices, or list order if they do not
    /// describe every tab exactly once.
    fn rebuild_recent(&mut self, indices: &[i64]) {
        let len = self.tabs.len();
        let mut seen = vec![false; len];
        let valid = indices.len() == len
            && indices.iter().all(|&index| {
                usize::try_from(index)
                    .ok()
                    .filter(|&index| index < len)
                    .is_some_and(|index| !std::mem::replace(&mut seen[index], true))
            });

        self.recent = if valid {
            indices.iter().map(|&index| self.tabs[index as usize].id()).collect()
        } else {
            if !indices.is_empty() {
                log::debug!("Saved tab order does not match the tabs, resetting it");
            }
            self.tabs.iter().map(|tab| tab.id()).collect()
        };
    }

    fn restore_previous_tabs(&mut self) -> Vec<i64> {
        let name = self.store.borrow().current_session_name().to_string();
        if name.is_empty() {
            let name = self.config.default_session_name.clone();
            log::info!("No current session, starting '{}'", name);
            {
                let mut store = self.store.borrow_mut();
                if store.session(&name).is_none() {
                    store.add_session(Session::new(name.clone()));
                }
                store.set_current_session(&name);
            }
            return self.migrate_legacy_tabs();
        }

        match self.read_session(&name) {
            Loaded::Blob(blob) => self.restore_blob(blob),
            Loaded::Missing => {
                log::debug!("Session '{}' has no saved tabs", name);
                Vec::new()
            }
            Loaded::Damaged(bytes) => self.recover(&name, bytes),
        }
    }

    fn read_session(&self, name: &str) -> Loaded {
        let bytes = match self.store.borrow().read_session_bytes(name) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Loaded::Missing,
            Err(err) => {
                log::error!("Failed to read session '{}': {}", name, err);
                return Loaded::Damaged(None);
            }
        };

        match SessionBlob::decode(&SessionStore::file_name_for_session(name), &bytes) {
            Ok(blob) => Loaded::Blob(blob),
            Err(err) => {
                log::warn!("{}", err);
                Loaded::Damaged(Some(bytes))
            }
        }
    }

    /// Adds the blob's tabs and returns its saved MRU indices.
    fn restore_blob(&mut self, blob: SessionBlob) -> Vec<i64> {
        for model in blob.ordered_tabs() {
            self.push_tab(TabInitializer::for_model(model.clone()));
        }
        log::debug!("Restored {} tabs", self.tabs.len());
        blob.recent_tab_indices
    }

    fn push_salvaged(&mut self, bytes: &[u8]) -> usize {
        let salvaged = recover_tabs(bytes);
        let count = salvaged.len();
        for tab in salvaged {
            self.push_tab(TabInitializer::for_model(TabModel::new(tab.url, tab.title)));
        }
        count
    }

    /// Seeds the default session from the single-session file of older versions.
    fn migrate_legacy_tabs(&mut self) -> Vec<i64> {
        let bytes = match self.store.borrow().read_legacy_tabs() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(err) => {
                log::warn!("Failed to read {}: {}", LEGACY_TABS_FILE, err);
                return Vec::new();
            }
        };

        log::info!("Migrating tabs from {}", LEGACY_TABS_FILE);
        match SessionBlob::decode(LEGACY_TABS_FILE, &bytes) {
            Ok(blob) => self.restore_blob(blob),
            Err(_) => {
                let count = self.push_salvaged(&bytes);
                log::info!("Salvaged {} legacy tabs", count);
                Vec::new()
            }
        }
    }

    /// Recovers from a session that failed to load.
    ///
    /// Tries, in order: salvaging tabs from the raw bytes, loading another
    /// saved session, and starting a new recovery session.
    fn recover(&mut self, name: &str, bytes: Option<Vec<u8>>) -> Vec<i64> {
        if let Some(bytes) = bytes {
            let count = self.push_salvaged(&bytes);
            if count > 0 {
                log::warn!("Salvaged {} tabs from damaged session '{}'", count, name);
                self.notice(Notice::TabsSalvaged {
                    session: name.to_string(),
                    count,
                });
                return Vec::new();
            }
        }

        let candidates: Vec<String> = {
            let mut store = self.store.borrow_mut();
            store.recover_sessions();
            store
                .sessions()
                .iter()
                .map(|session| session.name.clone())
                .filter(|candidate| candidate != name)
                .collect()
        };
        for candidate in candidates {
            if let Loaded::Blob(blob) = self.read_session(&candidate) {
                log::warn!("Session '{}' damaged, loading '{}'", name, candidate);
                self.store.borrow_mut().set_current_session(&candidate);
                self.notice(Notice::SessionFallback {
                    damaged: name.to_string(),
                    loaded: candidate,
                });
                return self.restore_blob(blob);
            }
        }

        let recovery = self.recovery_session_name();
        log::warn!("Session '{}' damaged, starting '{}'", name, recovery);
        {
            let mut store = self.store.borrow_mut();
            store.add_session(Session::with_tab_count(recovery.clone(), 1));
            store.set_current_session(&recovery);
        }
        self.push_tab(TabInitializer::NoOp);
        self.notice(Notice::RecoverySessionCreated(recovery));
        Vec::new()
    }

    fn recovery_session_name(&self) -> String {
        let base = format!("{}-{}", self.config.recovery_session_prefix, unix_millis());
        let store = self.store.borrow();
        let mut name = base.clone();
        let mut suffix = 1;
        while !store.is_valid_session_name(&name) {
            name = format!("{base}-{suffix}");
            suffix += 1;
        }
        name
    }

    /// Inserts a tab at `position` without switching to it.
    ///
    /// The tab starts frozen and least recently used.
    pub fn new_tab(
        &mut self,
        initializer: TabInitializer,
        position: NewTabPosition,
    ) -> &TabRecord<P::Surface> {
        let index = self.insert_tab(initializer, position);
        &self.tabs[index]
    }

    fn insert_tab(&mut self, initializer: TabInitializer, position: NewTabPosition) -> usize {
        let id = TabId::new(self.ids.next());
        let index = position.resolve(self.tabs.len(), self.current_index());
        log::info!("New tab {} at {}", id, index);

        self.tabs.insert(index, TabRecord::new(id, initializer));
        self.recent.insert(0, id);
        self.notify(TabEvent::TabAdded(index));
        self.notify(TabEvent::TabCountChanged(self.tabs.len()));
        index
    }

    /// Opens a tab at the configured position, switching to it if `show`.
    ///
    /// Going over the tab limit only emits [`TabEvent::MaxTabsReached`].
    pub fn open_tab(&mut self, initializer: TabInitializer, show: bool) -> TabId {
        if let Some(limit) = self.config.tab_limit {
            if self.tabs.len() >= limit {
                log::warn!("Tab limit of {} reached", limit);
                self.notify(TabEvent::MaxTabsReached(limit));
            }
        }

        let index = self.insert_tab(initializer, self.config.new_tab_position);
        let id = self.tabs[index].id();
        if show {
            self.switch_to_tab(index);
        }
        id
    }

    /// Makes the tab at `index` current and most recently used.
    ///
    /// Returns `None` when `index` is out of range.
    pub fn switch_to_tab(&mut self, index: usize) -> Option<&TabRecord<P::Surface>> {
        self.activate(index)?;
        self.notify(TabEvent::TabChanged(index));
        self.tabs.get(index)
    }

    fn activate(&mut self, index: usize) -> Option<TabId> {
        let id = self.tabs.get(index)?.id();
        log::debug!("Switching to tab {} at {}", id, index);

        let previous = self.current.filter(|current| *current != id);
        if let Some(previous) = previous.and_then(|previous| self.position(previous)) {
            self.tabs[previous].set_foreground(&self.provider, false);
        }

        self.current = Some(id);
        self.recent.retain(|recent| *recent != id);
        self.recent.push(id);
        self.tabs[index].set_foreground(&self.provider, true);
        Some(id)
    }

    /// Closes the tab at `index`, remembering it for reopening.
    ///
    /// Closing the current tab switches to the previously used one. The browser
    /// is only told to close once no tab remains. Returns `false` when `index`
    /// is out of range.
    pub fn delete_tab(&mut self, index: usize) -> bool {
        let Some(record) = self.tabs.get(index) else {
            log::debug!("No tab to delete at {}", index);
            return false;
        };
        let id = record.id();
        let was_current = self.current == Some(id);
        let return_to_caller =
            was_current && record.is_new_tab() && record.is_foreground() && !self.incognito;
        log::info!("Deleting tab {} at {}", id, index);

        if was_current {
            let next = self
                .recent
                .len()
                .checked_sub(2)
                .map(|slot| self.recent[slot])
                .and_then(|next| self.position(next));
            match next {
                Some(next) => {
                    self.activate(next);
                }
                None => self.current = None,
            }
        }

        let mut record = self.tabs.remove(index);
        self.recent.retain(|recent| *recent != id);
        self.closed.push(record.model(&self.provider));
        record.release(&self.provider);

        self.notify(TabEvent::TabRemoved(index));
        self.notify(TabEvent::TabCountChanged(self.tabs.len()));
        if self.tabs.is_empty() {
            self.notify(TabEvent::CloseBrowser);
            return true;
        }

        // Background tabs may remain after the current one went away.
        let switched = was_current || self.current.is_none();
        if self.current.is_none() {
            if let Some(next) = self.recent.last().and_then(|id| self.position(*id)) {
                self.activate(next);
            }
        }
        if let Some(current) = self.current_index() {
            if switched {
                self.notify(TabEvent::TabChanged(current));
            }
            if return_to_caller {
                self.notify(TabEvent::ReturnToCaller);
            }
        }
        true
    }

    /// Closes every tab except the current one.
    pub fn close_all_other_tabs(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        while let Some(index) = self.tabs.iter().rposition(|tab| tab.id() != current) {
            self.delete_tab(index);
        }
    }

    /// Closes tabs from the end of the list until a single one is left.
    pub fn close_all_tabs(&mut self) {
        while self.tabs.len() > 1 {
            self.delete_tab(self.tabs.len() - 1);
        }
    }

    /// Reopens the most recently closed tab.
    pub fn recover_closed_tab(&mut self, show: bool) -> Option<TabId> {
        let model = self.closed.pop()?;
        self.notice(Notice::ReopeningClosedTab);
        Some(self.open_tab(TabInitializer::for_model(model), show))
    }

    /// Reopens every closed tab in the background. Returns how many were reopened.
    pub fn recover_all_closed_tabs(&mut self) -> usize {
        let mut count = 0;
        while self.recover_closed_tab(false).is_some() {
            count += 1;
        }
        count
    }

    fn snapshot(&self) -> SessionBlob {
        let recent = self
            .recent
            .iter()
            .filter_map(|id| self.position(*id))
            .map(|index| index as i64)
            .collect();
        SessionBlob::from_tabs(
            self.tabs.iter().map(|tab| tab.model(&self.provider)),
            recent,
        )
    }

    /// Queues the session index and the current session's tabs for writing.
    ///
    /// Does nothing before initialization completes, so a half-built tab list
    /// never replaces good saved state. Incognito tabs are never written.
    pub fn save_state(&mut self) {
        if !self.initialized {
            log::debug!("Tabs not initialized, not saving");
            return;
        }
        if self.incognito {
            return;
        }

        let blob = self.snapshot();
        let mut store = self.store.borrow_mut();
        let name = store.current_session_name().to_string();
        log::debug!("Saving {} tabs of session '{}'", self.tabs.len(), name);

        store.set_tab_count(&name, self.tabs.len());
        if let Err(err) = store.save_sessions() {
            log::error!("Failed to save sessions: {}", err);
        }
        if let Err(err) = store.save_session_blob(&name, &blob) {
            log::error!("Failed to save session '{}': {}", name, err);
        }
    }

    /// Forgets the current session's saved tabs.
    pub fn clear_saved_state(&self) {
        let store = self.store.borrow();
        if let Err(err) = store.clear_session_tabs(store.current_session_name()) {
            log::warn!("Failed to clear saved tabs: {}", err);
        }
    }

    /// Call when the browser leaves the foreground.
    pub fn on_background(&mut self) {
        if let Some(index) = self.current_index() {
            self.tabs[index].set_new_tab(false);
        }
        if self.incognito {
            return;
        }
        if self.config.restore_tabs_on_startup {
            self.save_state();
        } else {
            self.clear_saved_state();
        }
    }

    /// Saves the current session and loads `name` in its place.
    ///
    /// Closed tabs of the old session are forgotten. Returns `false` for
    /// unknown names, the current session, or before initialization.
    pub fn switch_to_session(&mut self, name: &str) -> bool {
        {
            let store = self.store.borrow();
            if !self.initialized
                || store.current_session_name() == name
                || store.session(name).is_none()
            {
                log::debug!("Not switching to session '{}'", name);
                return false;
            }
        }

        log::info!("Switching to session '{}'", name);
        self.save_state();
        self.initialized = false;
        self.closed.clear();
        self.store.borrow_mut().set_current_session(name);
        self.initialize(self.incognito);
        true
    }

    /// Opens `url` in a new foreground tab on behalf of another application.
    ///
    /// Requests made before initialization are replayed once it completes.
    pub fn open_external_url(&mut self, url: impl Into<String>) -> Option<TabId> {
        let url = url.into();
        if !self.initialized {
            log::debug!("Deferring '{}' until tabs are initialized", url);
            self.pending.push(url);
            return None;
        }

        let id = self.open_tab(TabInitializer::for_url(url), true);
        if let Some(index) = self.position(id) {
            self.tabs[index].set_new_tab(true);
        }
        Some(id)
    }

    /// Opens a search for `query` like [`TabManager::open_external_url`].
    pub fn open_search(&mut self, query: &str) -> Option<TabId> {
        if query.trim().is_empty() {
            return None;
        }
        let url = uris::search_url(&self.config.search_url, query);
        self.open_external_url(url)
    }

    /// Rebuilds a tab whose renderer died.
    ///
    /// Only that tab's surface is destroyed. The tab is frozen from its last
    /// known state and thawed again right away if it is current.
    pub fn on_render_process_gone(&mut self, id: TabId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        log::warn!("Renderer of tab {} gone, rebuilding it", id);

        self.tabs[index].refreeze(&self.provider);
        if self.current == Some(id) {
            self.tabs[index].set_foreground(&self.provider, true);
        }
        self.notify(TabEvent::TabChanged(index));
        true
    }

    fn update_tab(
        &mut self,
        id: TabId,
        update: impl FnOnce(&mut TabRecord<P::Surface>, &P),
    ) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        update(&mut self.tabs[index], &self.provider);
        self.notify(TabEvent::TabChanged(index));
        true
    }

    /// Records where a tab navigated to.
    pub fn update_navigation(&mut self, id: TabId, url: &str, title: &str) -> bool {
        self.update_tab(id, |tab, _| tab.set_navigation(url, title))
    }

    pub fn set_favicon(&mut self, id: TabId, favicon: Option<Vec<u8>>) -> bool {
        self.update_tab(id, |tab, _| tab.set_favicon(favicon))
    }

    pub fn set_desktop_mode(&mut self, id: TabId, enabled: bool) -> bool {
        self.update_tab(id, |tab, provider| tab.set_desktop_mode(provider, enabled))
    }

    pub fn set_dark_mode(&mut self, id: TabId, enabled: bool) -> bool {
        self.update_tab(id, |tab, provider| tab.set_dark_mode(provider, enabled))
    }

    /// Starts or, with `None`, stops a find-in-page search.
    pub fn set_find_in_page(&mut self, id: TabId, query: Option<&str>) -> bool {
        self.update_tab(id, |tab, provider| tab.set_find_in_page(provider, query))
    }

    /// Destroys every surface and empties the tab list.
    ///
    /// Closed tabs and deferred requests are kept. [`TabManager::initialize`]
    /// may be called again afterwards.
    pub fn shutdown(&mut self) {
        if !self.tabs.is_empty() {
            log::debug!("Shutting down {} tabs", self.tabs.len());
        }
        for mut record in self.tabs.drain(..) {
            record.release(&self.provider);
        }
        self.recent.clear();
        self.current = None;
        self.initialized = false;
    }
}

impl<P: SurfaceProvider> Drop for TabManager<P> {
    fn drop(&mut self) {
        for record in &mut self.tabs {
            record.release(&self.provider);
        }
    }
}
