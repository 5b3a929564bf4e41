//! The list of known sessions and which one is current.
//!
//! The store can be opened and edited without any tab being loaded, so a
//! settings screen and the tab manager share one instance and never re-read
//! the index behind each other's back.

use crate::atomic::AtomicStateWriter;
use crate::config::StorageConfig;
use crate::error::Result;
use crate::model::{Session, SessionBlob, SessionIndex};
use crate::worker::SaveQueue;

/// File holding the session index.
pub const SESSIONS_FILE: &str = "SESSIONS";
/// Prefix of every per-session tab file.
pub const SESSION_FILE_PREFIX: &str = "SESSION_";
/// Tab file written by versions without multi-session support.
pub const LEGACY_TABS_FILE: &str = "SAVED_TABS";

/// Owner of session metadata and of the files backing each session.
pub struct SessionStore {
    queue: SaveQueue,
    sessions: Vec<Session>,
    current: String,
}

impl SessionStore {
    /// Opens the store for `config.dir` and loads the session index.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let queue = SaveQueue::start(AtomicStateWriter::new(&config.dir))?;
        let mut store = Self {
            queue,
            sessions: Vec::new(),
            current: String::new(),
        };
        store.load_sessions();
        Ok(store)
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn current_session_name(&self) -> &str {
        &self.current
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.session(&self.current)
    }

    pub fn current_session_index(&self) -> Option<usize> {
        self.sessions.iter().position(|s| s.name == self.current)
    }

    pub fn session(&self, name: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.name == name)
    }

    /// Discards the cache and loads the index from disk again.
    pub fn reload_sessions(&mut self) {
        self.load_sessions();
    }

    fn load_sessions(&mut self) {
        log::debug!("Loading sessions");
        let mut index = match self.writer().read(SESSIONS_FILE) {
            Ok(Some(bytes)) => SessionIndex::decode(SESSIONS_FILE, &bytes).unwrap_or_else(|err| {
                log::warn!("Session index unreadable, rebuilding it: {}", err);
                SessionIndex::default()
            }),
            Ok(None) => SessionIndex::default(),
            Err(err) => {
                log::error!("Failed to read session index: {}", err);
                SessionIndex::default()
            }
        };

        if index.sessions.is_empty() {
            index.sessions = self.scan_session_files();
            index.current_session_name = index
                .sessions
                .first()
                .map(|s| s.name.clone())
                .unwrap_or_default();
        }

        self.sessions = index.sessions;
        self.current = index.current_session_name;
        self.repair_current();
        self.update_current_flags();

        log::debug!(
            "Loaded {} sessions, current '{}'",
            self.sessions.len(),
            self.current
        );
    }

    /// Makes sure a non-empty current name refers to a listed session.
    fn repair_current(&mut self) {
        if self.current.is_empty() || self.session(&self.current).is_some() {
            return;
        }

        if self.session_exists(&self.current) {
            log::warn!("Current session '{}' was not indexed", self.current);
            self.sessions.push(Session::new(self.current.clone()));
        } else {
            log::warn!("Current session '{}' does not exist", self.current);
            self.current = self
                .sessions
                .first()
                .map(|s| s.name.clone())
                .unwrap_or_default();
        }
    }

    fn scan_session_files(&self) -> Vec<Session> {
        log::info!("Recovering sessions from {:?}", self.writer().dir());
        match self.writer().list(SESSION_FILE_PREFIX) {
            Ok(files) => files
                .iter()
                .filter_map(|file| file.strip_prefix(SESSION_FILE_PREFIX))
                .filter(|name| !name.is_empty())
                .map(Session::new)
                .collect(),
            Err(err) => {
                log::error!("Failed to scan for session files: {}", err);
                Vec::new()
            }
        }
    }

    /// Rebuilds the session list from the session files on disk.
    ///
    /// Keeps the current session name when its file still exists. Returns the
    /// number of sessions found.
    pub fn recover_sessions(&mut self) -> usize {
        self.sessions = self.scan_session_files();
        self.repair_current();
        self.update_current_flags();
        self.persist();
        self.sessions.len()
    }

    /// Adds a session to the list. Fails if the name is not valid.
    pub fn add_session(&mut self, session: Session) -> bool {
        if !self.is_valid_session_name(&session.name) {
            return false;
        }
        self.sessions.push(session);
        self.update_current_flags();
        self.persist();
        true
    }

    /// Marks `name` as the current session and persists the index.
    ///
    /// Names missing from the session list are rejected.
    pub fn set_current_session(&mut self, name: &str) -> bool {
        if self.session(name).is_none() {
            log::debug!("Not making unknown session '{}' current", name);
            return false;
        }
        self.current = name.to_string();
        self.update_current_flags();
        self.persist();
        true
    }

    fn update_current_flags(&mut self) {
        let mut found = false;
        for session in &mut self.sessions {
            session.is_current = !found && session.name == self.current;
            found |= session.is_current;
        }
    }

    /// Updates the cached tab count of a session. Not persisted until the next save.
    pub fn set_tab_count(&mut self, name: &str, count: usize) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.name == name) {
            session.tab_count = i32::try_from(count).unwrap_or(i32::MAX);
        }
    }

    /// Queues the session index for writing.
    pub fn save_sessions(&self) -> Result<()> {
        let index = SessionIndex {
            current_session_name: self.current.clone(),
            sessions: self.sessions.clone(),
        };
        self.queue.submit(SESSIONS_FILE, index.encode()?)
    }

    fn persist(&self) {
        if let Err(err) = self.save_sessions() {
            log::error!("Failed to save sessions: {}", err);
        }
    }

    /// Checks whether `name` can be used for a new or renamed session.
    pub fn is_valid_session_name(&self, name: &str) -> bool {
        if name.trim().is_empty() || name.contains(['/', '\\', '\0']) {
            return false;
        }
        self.sessions.iter().all(|s| s.name != name)
    }

    /// Renames a session and its file. Invalid requests are ignored.
    ///
    /// The index is only persisted once the file has been renamed, so it never
    /// points at a missing file.
    pub fn rename_session(&mut self, old_name: &str, new_name: &str) -> bool {
        log::debug!("Try rename session '{}' to '{}'", old_name, new_name);

        let Some(index) = self.sessions.iter().position(|s| s.name == old_name) else {
            log::debug!("Session rename aborted, no session '{}'", old_name);
            return false;
        };
        if !self.is_valid_session_name(new_name) {
            log::debug!("Session rename aborted, invalid name '{}'", new_name);
            return false;
        }

        if let Err(err) = self.queue.flush() {
            log::warn!("Pending saves not flushed before rename: {}", err);
        }
        let renamed = self.writer().rename(
            &Self::file_name_for_session(old_name),
            &Self::file_name_for_session(new_name),
        );
        if let Err(err) = renamed {
            log::error!("Failed to rename session file: {}", err);
            return false;
        }

        self.sessions[index].name = new_name.to_string();
        if self.current == old_name {
            self.current = new_name.to_string();
        }
        self.update_current_flags();
        self.persist();
        true
    }

    /// Deletes a session and its file. The current session cannot be deleted.
    pub fn delete_session(&mut self, name: &str) -> bool {
        if name == self.current {
            log::debug!("Refusing to delete current session '{}'", name);
            return false;
        }
        let Some(index) = self.sessions.iter().position(|s| s.name == name) else {
            return false;
        };

        if let Err(err) = self.queue.flush() {
            log::warn!("Pending saves not flushed before delete: {}", err);
        }
        if let Err(err) = self.writer().remove(&Self::file_name_for_session(name)) {
            log::error!("Failed to delete session file: {}", err);
            return false;
        }

        self.sessions.remove(index);
        self.persist();
        true
    }

    pub fn file_name_for_session(name: &str) -> String {
        format!("{SESSION_FILE_PREFIX}{name}")
    }

    pub fn session_exists(&self, name: &str) -> bool {
        self.writer().exists(&Self::file_name_for_session(name))
    }

    /// Raw bytes of a session file, including saves still in the queue.
    pub fn read_session_bytes(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.queue.flush()?;
        self.writer().read(&Self::file_name_for_session(name))
    }

    /// Raw bytes of the pre-multi-session tab file, if any.
    pub fn read_legacy_tabs(&self) -> Result<Option<Vec<u8>>> {
        self.writer().read(LEGACY_TABS_FILE)
    }

    /// Queues a session's tabs for writing.
    pub fn save_session_blob(&self, name: &str, blob: &SessionBlob) -> Result<()> {
        self.queue
            .submit(Self::file_name_for_session(name), blob.encode()?)
    }

    /// Removes a session's saved tabs while keeping the session listed.
    pub fn clear_session_tabs(&self, name: &str) -> Result<()> {
        self.queue.flush()?;
        self.writer().remove(&Self::file_name_for_session(name))
    }

    /// Deletes every session file and the index, then empties the cache.
    pub fn clear_all_saved_state(&mut self) {
        log::info!("Clearing all saved sessions");
        if let Err(err) = self.queue.flush() {
            log::warn!("Pending saves not flushed before clearing: {}", err);
        }

        let files = self.writer().list(SESSION_FILE_PREFIX).unwrap_or_else(|err| {
            log::error!("Failed to list session files: {}", err);
            Vec::new()
        });
        for file in files.iter().map(String::as_str).chain([SESSIONS_FILE]) {
            if let Err(err) = self.writer().remove(file) {
                log::warn!("Failed to delete '{}': {}", file, err);
            }
        }

        self.sessions.clear();
        self.current.clear();
    }

    /// Blocks until queued saves are on disk.
    pub fn flush(&self) -> Result<()> {
        self.queue.flush()
    }

    fn writer(&self) -> &AtomicStateWriter {
        self.queue.writer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn open(temp: &TempDir) -> SessionStore {
        SessionStore::open(&StorageConfig::new(temp.path())).unwrap()
    }

    fn store_with(temp: &TempDir, names: &[&str], current: &str) -> SessionStore {
        let mut store = open(temp);
        for name in names {
            assert!(store.add_session(Session::new(*name)));
        }
        assert!(store.set_current_session(current));
        store
    }

    #[test]
    fn empty_directory_gives_empty_store() {
        let temp = tempdir().unwrap();
        let store = open(&temp);
        assert!(store.sessions().is_empty());
        assert_eq!(store.current_session_name(), "");
    }

    #[test]
    fn index_round_trips() {
        let temp = tempdir().unwrap();
        {
            let mut store = store_with(&temp, &["Default", "Work"], "Work");
            store.set_tab_count("Work", 4);
            store.save_sessions().unwrap();
        }

        let store = open(&temp);
        assert_eq!(store.current_session_name(), "Work");
        assert_eq!(store.current_session_index(), Some(1));
        assert_eq!(store.session("Work").unwrap().tab_count, 4);
        let current: Vec<&str> = store
            .sessions()
            .iter()
            .filter(|s| s.is_current)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(current, vec!["Work"]);
    }

    #[test]
    fn unknown_session_cannot_become_current() {
        let temp = tempdir().unwrap();
        let mut store = store_with(&temp, &["Default", "Work"], "Work");

        assert!(!store.set_current_session("Missing"));
        assert_eq!(store.current_session_name(), "Work");
        assert_eq!(store.current_session_index(), Some(1));
        assert_eq!(store.sessions().iter().filter(|s| s.is_current).count(), 1);

        let other = tempdir().unwrap();
        let mut empty = open(&other);
        assert!(!empty.set_current_session("Default"));
        assert_eq!(empty.current_session_name(), "");
    }

    #[test]
    fn lost_index_is_rebuilt_from_session_files() {
        let temp = tempdir().unwrap();
        let writer = AtomicStateWriter::new(temp.path());
        writer.write("SESSION_Work", b"{}").unwrap();
        writer.write("SESSION_Alpha", b"{}").unwrap();
        writer.write("TEMP_SESSION_Ghost", b"{}").unwrap();

        let store = open(&temp);
        let names: Vec<&str> = store.sessions().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Work"]);
        assert!(store.sessions().iter().all(|s| s.tab_count == -1));
        assert_eq!(store.current_session_name(), "Alpha");
        assert!(store.session("Alpha").unwrap().is_current);
    }

    #[test]
    fn corrupted_index_is_rebuilt_from_session_files() {
        let temp = tempdir().unwrap();
        let writer = AtomicStateWriter::new(temp.path());
        writer.write(SESSIONS_FILE, b"\x01\x02garbage").unwrap();
        writer.write("SESSION_Work", b"{}").unwrap();

        let store = open(&temp);
        assert_eq!(store.current_session_name(), "Work");
    }

    #[test]
    fn dangling_current_name_is_repaired() {
        let temp = tempdir().unwrap();
        let index = SessionIndex {
            current_session_name: "Gone".into(),
            sessions: vec![Session::new("Default")],
        };
        AtomicStateWriter::new(temp.path())
            .write(SESSIONS_FILE, &index.encode().unwrap())
            .unwrap();

        let store = open(&temp);
        assert_eq!(store.current_session_name(), "Default");
        assert!(store.session("Default").unwrap().is_current);
    }

    #[test]
    fn session_name_validity() {
        let temp = tempdir().unwrap();
        let mut store = open(&temp);
        assert!(!store.is_valid_session_name(""));
        assert!(!store.is_valid_session_name("   "));
        assert!(store.is_valid_session_name("Work"));

        store.add_session(Session::new("Work"));
        assert!(!store.is_valid_session_name("Work"));
        assert!(store.is_valid_session_name("work"));
        assert!(!store.is_valid_session_name("a/b"));
    }

    #[test]
    fn rename_moves_file_and_current_pointer() {
        let temp = tempdir().unwrap();
        let mut store = store_with(&temp, &["Default", "Work"], "Work");
        store
            .save_session_blob("Work", &SessionBlob::default())
            .unwrap();

        assert!(store.rename_session("Work", "Office"));
        store.flush().unwrap();

        assert_eq!(store.current_session_name(), "Office");
        assert!(store.session_exists("Office"));
        assert!(!store.session_exists("Work"));
        assert!(store.session("Office").unwrap().is_current);

        let reopened = open(&temp);
        assert_eq!(reopened.current_session_name(), "Office");
    }

    #[test]
    fn invalid_rename_is_a_no_op() {
        let temp = tempdir().unwrap();
        let mut store = store_with(&temp, &["Default", "Work"], "Default");

        assert!(!store.rename_session("Work", "Default"));
        assert!(!store.rename_session("Work", " "));
        assert!(!store.rename_session("Missing", "Other"));

        let names: Vec<&str> = store.sessions().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Default", "Work"]);
    }

    #[test]
    fn current_session_cannot_be_deleted() {
        let temp = tempdir().unwrap();
        let mut store = store_with(&temp, &["Default", "Work"], "Default");

        assert!(!store.delete_session("Default"));
        assert_eq!(store.sessions().len(), 2);
    }

    #[test]
    fn delete_removes_file_and_entry() {
        let temp = tempdir().unwrap();
        let mut store = store_with(&temp, &["Default", "Work"], "Default");
        store
            .save_session_blob("Work", &SessionBlob::default())
            .unwrap();

        assert!(store.delete_session("Work"));
        assert!(!store.session_exists("Work"));
        assert!(store.session("Work").is_none());
        assert!(!store.delete_session("Work"));
    }

    #[test]
    fn clear_all_saved_state_removes_everything() {
        let temp = tempdir().unwrap();
        let mut store = store_with(&temp, &["Default", "Work"], "Default");
        store
            .save_session_blob("Work", &SessionBlob::default())
            .unwrap();

        store.clear_all_saved_state();

        assert!(store.sessions().is_empty());
        assert!(!store.session_exists("Work"));
        assert!(open(&temp).sessions().is_empty());
    }
}
