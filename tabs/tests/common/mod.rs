//! Shared helpers for the tab manager integration tests.
//!
//! `FakeSurfaces` records every call the manager makes on its render-surface
//! provider and panics if a surface is destroyed twice.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;

use owl_tabs::{SurfaceProvider, TabEvent, TabId, TabManager, TabsConfig};
use storage::{SessionStore, StorageConfig};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Create(TabId),
    Load(TabId, String),
    Restore(TabId, Vec<u8>),
    Deferred(TabId, u64),
    Destroy(TabId),
}

#[derive(Debug)]
pub struct FakeSurface {
    serial: u32,
    tab: TabId,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSurfaces {
    ops: Rc<RefCell<Vec<Op>>>,
    next_serial: Rc<Cell<u32>>,
    live: Rc<RefCell<HashSet<u32>>>,
    urls: Rc<RefCell<HashMap<u32, String>>>,
    reject_restore: Rc<Cell<bool>>,
}

impl FakeSurfaces {
    pub fn ops(&self) -> Vec<Op> {
        self.ops.borrow().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.borrow_mut().clear();
    }

    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }

    /// Makes every later restore fail, as after an engine upgrade.
    pub fn reject_restores(&self) {
        self.reject_restore.set(true);
    }

    pub fn created(&self, tab: TabId) -> usize {
        self.ops
            .borrow()
            .iter()
            .filter(|op| **op == Op::Create(tab))
            .count()
    }

    pub fn destroyed(&self, tab: TabId) -> usize {
        self.ops
            .borrow()
            .iter()
            .filter(|op| **op == Op::Destroy(tab))
            .count()
    }
}

impl SurfaceProvider for FakeSurfaces {
    type Surface = FakeSurface;

    fn create(&self, tab: TabId) -> FakeSurface {
        let serial = self.next_serial.get();
        self.next_serial.set(serial + 1);
        self.live.borrow_mut().insert(serial);
        self.ops.borrow_mut().push(Op::Create(tab));
        FakeSurface { serial, tab }
    }

    fn load_url(&self, surface: &FakeSurface, url: &str) {
        self.urls.borrow_mut().insert(surface.serial, url.to_string());
        self.ops.borrow_mut().push(Op::Load(surface.tab, url.to_string()));
    }

    fn snapshot_state(&self, surface: &FakeSurface) -> Vec<u8> {
        let url = self.urls.borrow().get(&surface.serial).cloned().unwrap_or_default();
        format!("state:{url}").into_bytes()
    }

    fn restore_state(&self, surface: &FakeSurface, state: &[u8]) -> bool {
        self.ops.borrow_mut().push(Op::Restore(surface.tab, state.to_vec()));
        if self.reject_restore.get() {
            return false;
        }
        let text = String::from_utf8_lossy(state);
        if let Some(url) = text.strip_prefix("state:") {
            self.urls.borrow_mut().insert(surface.serial, url.to_string());
        }
        true
    }

    fn attach_deferred(&self, surface: &FakeSurface, token: u64) {
        self.ops.borrow_mut().push(Op::Deferred(surface.tab, token));
    }

    fn destroy(&self, surface: FakeSurface) {
        assert!(
            self.live.borrow_mut().remove(&surface.serial),
            "surface of tab {} destroyed twice",
            surface.tab
        );
        self.ops.borrow_mut().push(Op::Destroy(surface.tab));
    }
}

pub type Events = Rc<RefCell<Vec<TabEvent>>>;

pub struct Harness {
    pub manager: TabManager<FakeSurfaces>,
    pub surfaces: FakeSurfaces,
    pub events: Events,
    pub store: Rc<RefCell<SessionStore>>,
}

impl Harness {
    pub fn new(dir: &Path) -> Self {
        Self::with_config(dir, TabsConfig::default())
    }

    pub fn with_config(dir: &Path, config: TabsConfig) -> Self {
        let store = SessionStore::open(&StorageConfig::new(dir)).expect("open store");
        let store = Rc::new(RefCell::new(store));
        let surfaces = FakeSurfaces::default();
        let events: Events = Rc::default();

        let sink_events = Rc::clone(&events);
        let manager = TabManager::new(
            surfaces.clone(),
            Rc::clone(&store),
            config,
            move |event: TabEvent| sink_events.borrow_mut().push(event),
        );

        Self {
            manager,
            surfaces,
            events,
            store,
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.manager
            .tabs()
            .iter()
            .map(|tab| tab.url().to_string())
            .collect()
    }

    /// Tab urls from most to least recently used.
    pub fn recent_urls(&self) -> Vec<String> {
        self.manager
            .recent_tabs()
            .filter_map(|id| self.manager.tab(id))
            .map(|tab| tab.url().to_string())
            .collect()
    }

    pub fn current_url(&self) -> Option<String> {
        self.manager.current_tab().map(|tab| tab.url().to_string())
    }

    pub fn take_events(&self) -> Vec<TabEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Saves and waits for the background writer.
    pub fn save(&mut self) {
        self.manager.save_state();
        self.store.borrow().flush().expect("flush");
    }
}

pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}
