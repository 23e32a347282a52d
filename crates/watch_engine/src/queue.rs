use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use watch_core::Message;

use crate::persist::{AtomicFileWriter, PersistError};
use crate::store::to_pretty_json;

/// Tag closing every unit file name.
pub const UNIT_SUFFIX: &str = "-vouchers.json";

const NAME_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("cannot list queue directory {path:?}: {source}")]
    List { path: PathBuf, source: io::Error },
    #[error("cannot read queued unit {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("queued unit {path:?} is malformed: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot serialize queued unit: {0}")]
    Serialize(serde_json::Error),
    #[error("cannot write queued unit: {0}")]
    Write(#[from] PersistError),
    #[error("no free unit name in {0:?}")]
    NameExhausted(PathBuf),
    #[error("cannot delete queued unit {path:?}: {source}")]
    Delete { path: PathBuf, source: io::Error },
}

/// Content of one unit: the message plus where it was headed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedNotification {
    #[serde(flatten)]
    pub message: Message,
    pub webhook_url: String,
}

/// Directory of notifications waiting for redelivery, one file per message.
#[derive(Debug, Clone)]
pub struct RetryQueue {
    dir: PathBuf,
}

impl RetryQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists `message` for `destination`, stamping every embed with `now`.
    pub fn push(
        &self,
        message: &Message,
        destination: &str,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, QueueError> {
        let mut message = message.clone();
        message.stamp(&now.to_rfc3339());
        let unit = QueuedNotification {
            message,
            webhook_url: destination.to_string(),
        };
        let content = to_pretty_json(&unit).map_err(QueueError::Serialize)?;

        let name = self.free_name(now)?;
        let writer = AtomicFileWriter::new(self.dir.clone());
        Ok(writer.write(&name, &content)?)
    }

    fn free_name(&self, now: DateTime<Utc>) -> Result<String, QueueError> {
        let mut rng = rand::thread_rng();
        for _ in 0..NAME_ATTEMPTS {
            let name = unit_name(now, rng.gen_range(1000..50000));
            if !self.dir.join(&name).exists() {
                return Ok(name);
            }
        }
        Err(QueueError::NameExhausted(self.dir.clone()))
    }

    /// Unit files in name order (oldest first). A missing directory is an
    /// empty queue.
    pub fn units(&self) -> Result<Vec<PathBuf>, QueueError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(QueueError::List {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut units = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| QueueError::List {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                units.push(path);
            }
        }
        units.sort();
        Ok(units)
    }

    pub fn load(&self, path: &Path) -> Result<QueuedNotification, QueueError> {
        let content = fs::read_to_string(path).map_err(|source| QueueError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| QueueError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn remove(&self, path: &Path) -> Result<(), QueueError> {
        fs::remove_file(path).map_err(|source| QueueError::Delete {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `2026-10-18T09.30.12.123456-4242-vouchers.json`
pub fn unit_name(now: DateTime<Utc>, disambiguator: u32) -> String {
    format!(
        "{}-{}{}",
        now.format("%Y-%m-%dT%H.%M.%S%.6f"),
        disambiguator,
        UNIT_SUFFIX
    )
}
