//! Tab lifecycle for OwL Browser: the live tab list, its most-recently-used
//! order and the sessions it is saved to.

use std::fmt;

mod config;
mod events;
mod initializer;
mod manager;
mod record;
mod surface;
pub mod uris;

pub use config::{NewTabPosition, TabsConfig};
pub use events::{NoopSink, Notice, TabEvent, TabEventSink};
pub use initializer::TabInitializer;
pub use manager::TabManager;
pub use record::TabRecord;
pub use surface::SurfaceProvider;
pub use uris::SpecialPage;

/// Stable identifier for a browser tab.
///
/// Ids are never reused, so a handler holding the id of a closed tab simply
/// finds nothing.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TabId(u64);

impl TabId {
    /// Creates a new `TabId` from a raw numeric value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
