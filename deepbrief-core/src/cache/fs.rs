//! Filesystem cache store: `<root>/<category>/<key>.json`, TTL from mtime.
//!
//! Calls block on disk I/O; async code reaches it through
//! [`CacheGateway::fetch`](super::CacheGateway::fetch) and
//! [`CacheGateway::save`](super::CacheGateway::save).

use super::{CacheEntry, CacheStore};
use crate::budget::ProviderClass;
use crate::error::CacheError;
use crate::persistence::{atomic_write_json, load_json};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, category: ProviderClass, key: &str) -> PathBuf {
        self.root.join(category.as_str()).join(format!("{key}.json"))
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl CacheStore for FsCacheStore {
    fn load(&self, category: ProviderClass, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(category, key);
        let written_at = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path)(e)),
        };
        let payload = load_json::<serde_json::Value>(&path).map_err(io_err(&path))?;
        Ok(payload.map(|payload| CacheEntry {
            key: key.to_string(),
            category,
            payload,
            written_at,
        }))
    }

    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(entry.category, &entry.key);
        atomic_write_json(&path, &entry.payload).map_err(io_err(&path))
    }

    fn remove(&self, category: ProviderClass, key: &str) -> Result<(), CacheError> {
        let path = self.entry_path(category, key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    fn clear(&self, category: Option<ProviderClass>) -> Result<usize, CacheError> {
        let categories: Vec<ProviderClass> = match category {
            Some(c) => vec![c],
            None => ProviderClass::ALL.to_vec(),
        };

        let mut removed = 0;
        for category in categories {
            let dir = self.root.join(category.as_str());
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_err(&dir)(e)),
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    std::fs::remove_file(&path).map_err(io_err(&path))?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}
