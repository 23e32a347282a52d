//! Product data file.
//!
//! Single-writer contract: [`ProductStore::open`] creates `<file>.lock` next
//! to the data file and refuses to open while it exists. The lock is removed
//! when the store is dropped. A crashed run leaves the lock behind; it has to
//! be deleted by hand.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use watch_core::{upgrade_legacy_records, PersistedRecord, ProductRecord};
use watch_logging::{watch_info, watch_warn};

use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("product data {path:?} is locked by another run (remove {lock:?} if stale)")]
    Locked { path: PathBuf, lock: PathBuf },
    #[error("cannot read product data {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("product data {path:?} is malformed: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot serialize product data: {0}")]
    Serialize(serde_json::Error),
    #[error("cannot write product data {path:?}: {source}")]
    Write { path: PathBuf, source: PersistError },
    #[error("invalid product data path {0:?}")]
    InvalidPath(PathBuf),
}

#[derive(Debug)]
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(data_path: &Path) -> Result<Self, StoreError> {
        let mut name = data_path
            .file_name()
            .ok_or_else(|| StoreError::InvalidPath(data_path.to_path_buf()))?
            .to_os_string();
        name.push(".lock");
        let path = data_path.with_file_name(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(StoreError::Locked {
                path: data_path.to_path_buf(),
                lock: path,
            }),
            Err(source) => Err(StoreError::Read {
                path: path.clone(),
                source,
            }),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            watch_warn!("Failed to release lock {:?}: {}", self.path, err);
        }
    }
}

/// Exclusive handle on the product data file.
#[derive(Debug)]
pub struct ProductStore {
    path: PathBuf,
    _lock: StoreLock,
}

impl ProductStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let lock = StoreLock::acquire(&path)?;
        Ok(Self { path, _lock: lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all records in file order, upgrading single-price records.
    pub fn load(&self) -> Result<Vec<ProductRecord>, StoreError> {
        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let persisted: Vec<PersistedRecord> =
            serde_json::from_str(&content).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let outcome = upgrade_legacy_records(persisted);
        if outcome.upgraded > 0 {
            watch_info!(
                "Upgraded {} single-price record(s) in {:?}",
                outcome.upgraded,
                self.path
            );
        }
        Ok(outcome.records)
    }

    /// Replaces the file with `records`, pretty-printed with 4-space indents.
    pub fn save(&self, records: &[ProductRecord]) -> Result<(), StoreError> {
        let content = to_pretty_json(records).map_err(StoreError::Serialize)?;
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StoreError::InvalidPath(self.path.clone()))?;

        let writer = AtomicFileWriter::new(parent_dir(&self.path));
        writer
            .write(file_name, &content)
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub(crate) fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
