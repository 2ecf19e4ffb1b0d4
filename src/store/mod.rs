//! Two opaque JSON documents on disk (`config.json`, `state.json`), behind a
//! single process-wide lock with write-then-rename durability.
//!
//! This is the only component that touches the filesystem. It does not
//! interpret document contents — callers hand it `Serialize`/
//! `DeserializeOwned` values and a document name.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ConfigError;

pub struct PersistentStore {
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl PersistentStore {
    /// Creates the data directory if it does not already exist.
    pub fn new(data_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            lock: Mutex::new(()),
        })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.json"))
    }

    /// Load a document, returning `T::default()` if the file does not
    /// exist. Acquires the store lock for the duration of the read.
    pub fn load<T>(&self, name: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        let _guard = self.lock.lock();
        let path = self.path_for(name);
        match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Ok(T::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Serialize and durably persist a document: write to a temp file in the
    /// same directory, `sync_all`, then atomically rename over the target.
    /// A crash mid-write leaves the previous file intact.
    pub fn store<T>(&self, name: &str, doc: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let _guard = self.lock.lock();
        let path = self.path_for(name);
        let bytes = serde_json::to_vec_pretty(doc)?;
        write_atomic(&self.data_dir, &path, &bytes)?;
        Ok(())
    }
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    temp_file.write_all(bytes)?;
    temp_file.as_file().sync_all()?;
    temp_file
        .persist(target)
        .map_err(|persist_err| persist_err.error)?;
    Ok(())
}
