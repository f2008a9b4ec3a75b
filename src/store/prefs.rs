use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::StoreError;

/// Flat string key/value file. Every write replaces the file atomically.
#[derive(Debug)]
pub struct Preferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Preferences {
    /// Load from `path`; a missing file is an empty store.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let values = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), entries = values.len(), "Preferences loaded");
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value)])
    }

    /// Apply several writes as one file replacement.
    pub fn set_many(&mut self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut next = self.values.clone();
        for (key, value) in entries {
            next.insert((*key).to_string(), (*value).to_string());
        }
        write_atomic(&self.path, &next)?;
        self.values = next;
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        if !self.values.contains_key(key) {
            return Ok(false);
        }
        let mut next = self.values.clone();
        next.remove(key);
        write_atomic(&self.path, &next)?;
        self.values = next;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn write_atomic(path: &Path, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
    let bytes =
        serde_json::to_vec_pretty(values).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
