//! Crash-safe persistence of browsing sessions.

mod atomic;
mod config;
mod error;
mod model;
pub mod recovery;
mod sessions;
mod worker;

pub use atomic::AtomicStateWriter;
pub use config::StorageConfig;
pub use error::{Result, StorageError};
pub use model::{tab_key, Session, SessionBlob, SessionIndex, TabModel, TAB_KEY_PREFIX};
pub use recovery::{describe, recover_tabs, RecoveredTab, RecoveryReport};
pub use sessions::{SessionStore, LEGACY_TABS_FILE, SESSIONS_FILE, SESSION_FILE_PREFIX};
pub use worker::SaveQueue;
