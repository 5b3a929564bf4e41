//! Crash-safe persistence of named blobs.
//!
//! A blob named `N` lives in `<dir>/N`. Writing goes through `TEMP_N` and
//! `BACKUP_N` so that at any instant at least one of `N` or `BACKUP_N` names a
//! complete copy. Renames are atomic on the filesystems we target; plain writes
//! are not.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StorageError};

const TEMP_PREFIX: &str = "TEMP_";
const BACKUP_PREFIX: &str = "BACKUP_";

/// The five steps of a write, in execution order.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum WriteStep {
    WriteTemp,
    DeleteStaleBackup,
    BackupCanonical,
    PromoteTemp,
    DeleteBackup,
}

impl WriteStep {
    pub(crate) const ALL: [WriteStep; 5] = [
        WriteStep::WriteTemp,
        WriteStep::DeleteStaleBackup,
        WriteStep::BackupCanonical,
        WriteStep::PromoteTemp,
        WriteStep::DeleteBackup,
    ];
}

/// Writes, reads and manages named blobs inside one directory.
#[derive(Debug, Clone)]
pub struct AtomicStateWriter {
    dir: PathBuf,
}

impl AtomicStateWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the canonical file for `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn temp_name(name: &str) -> String {
        format!("{TEMP_PREFIX}{name}")
    }

    pub fn backup_name(name: &str) -> String {
        format!("{BACKUP_PREFIX}{name}")
    }

    /// Replaces the blob stored under `name` with `bytes`.
    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.write_steps(name, bytes, None)
    }

    /// Runs the write protocol, stopping after `stop_after` when given.
    pub(crate) fn write_steps(
        &self,
        name: &str,
        bytes: &[u8],
        stop_after: Option<WriteStep>,
    ) -> Result<()> {
        let temp = self.path(&Self::temp_name(name));
        let backup = self.path(&Self::backup_name(name));
        let canonical = self.path(name);

        for step in WriteStep::ALL {
            match step {
                WriteStep::WriteTemp => self.write_fully(&temp, bytes)?,
                WriteStep::DeleteStaleBackup => remove_if_exists(&backup)?,
                WriteStep::BackupCanonical => rename_if_exists(&canonical, &backup)?,
                WriteStep::PromoteTemp => {
                    fs::rename(&temp, &canonical).map_err(|err| StorageError::io(&temp, err))?
                }
                WriteStep::DeleteBackup => remove_if_exists(&backup)?,
            }
            if stop_after == Some(step) {
                return Ok(());
            }
        }

        log::debug!("Wrote state '{}' ({} bytes)", name, bytes.len());
        Ok(())
    }

    fn write_fully(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|err| StorageError::io(&self.dir, err))?;
        let mut file = File::create(path).map_err(|err| StorageError::io(path, err))?;
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|err| StorageError::io(path, err))
    }

    /// Reads the blob stored under `name`.
    ///
    /// Falls back to the backup copy when the canonical file is missing, which
    /// happens if a write was interrupted between its rename steps.
    pub fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if let Some(bytes) = read_if_exists(&self.path(name))? {
            return Ok(Some(bytes));
        }

        let backup = read_if_exists(&self.path(&Self::backup_name(name)))?;
        if backup.is_some() {
            log::warn!("State '{}' missing, using its backup", name);
        }
        Ok(backup)
    }

    /// Deletes the blob and any protocol leftovers. Missing files are ignored.
    pub fn remove(&self, name: &str) -> Result<()> {
        remove_if_exists(&self.path(name))?;
        remove_if_exists(&self.path(&Self::temp_name(name)))?;
        remove_if_exists(&self.path(&Self::backup_name(name)))
    }

    /// Renames the canonical file. Returns `false` if there was nothing to rename.
    pub fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let source = self.path(from);
        match fs::rename(&source, self.path(to)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("Nothing to rename at {:?}", source);
                Ok(false)
            }
            Err(err) => Err(StorageError::io(source, err)),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Names of the canonical files starting with `prefix`, sorted.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::io(&self.dir, err)),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        Ok(names)
    }
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StorageError::io(path, err)),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StorageError::io(path, err)),
    }
}

fn rename_if_exists(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StorageError::io(from, err)),
    }
}
