// Emit History
//
// Length and content hash of the last output emitted for every file. Kept in
// memory for the life of a process, or persisted under the cache path.

use crate::ngtsc::file_system::FileSystem;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use ts::normalize_path;
use xxhash_rust::xxh3::xxh3_64;

/// Name of the history file inside the cache directory.
pub const EMIT_HISTORY_FILE: &str = "emit-history.bin";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write cache file '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("cache file '{path}' is corrupt: {source}")]
    Decode {
        path: String,
        source: bincode::Error,
    },
    #[error("failed to encode cache file '{path}': {source}")]
    Encode {
        path: String,
        source: bincode::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitRecord {
    pub hash: u64,
    pub length: usize,
}

impl EmitRecord {
    pub fn of(contents: &str) -> Self {
        EmitRecord {
            hash: xxh3_64(contents.as_bytes()),
            length: contents.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmitHistory {
    version: String,
    records: IndexMap<String, EmitRecord>,
}

impl EmitHistory {
    pub fn new() -> Self {
        EmitHistory {
            version: env!("CARGO_PKG_VERSION").to_string(),
            records: IndexMap::new(),
        }
    }

    /// Loads the history stored at `path`. A missing file, or one written by
    /// another version, yields an empty history.
    pub fn load(fs: &dyn FileSystem, path: &str) -> Result<Self, CacheError> {
        if !fs.is_file(path) {
            return Ok(Self::new());
        }
        let bytes = fs.read_file_buffer(path).map_err(|source| CacheError::Read {
            path: path.to_string(),
            source,
        })?;
        let history: EmitHistory =
            bincode::deserialize(&bytes).map_err(|source| CacheError::Decode {
                path: path.to_string(),
                source,
            })?;
        if history.version != env!("CARGO_PKG_VERSION") {
            debug!(path = %path, "ignoring emit history of another version");
            return Ok(Self::new());
        }
        debug!(path = %path, records = history.records.len(), "loaded emit history");
        Ok(history)
    }

    pub fn save(&self, fs: &dyn FileSystem, path: &str) -> Result<(), CacheError> {
        let bytes = bincode::serialize(self).map_err(|source| CacheError::Encode {
            path: path.to_string(),
            source,
        })?;
        fs.ensure_dir(ts::dirname(path))
            .and_then(|_| fs.write_file(path, &bytes))
            .map_err(|source| CacheError::Write {
                path: path.to_string(),
                source,
            })
    }

    pub fn get(&self, file: &str) -> Option<&EmitRecord> {
        self.records.get(&normalize_path(file))
    }

    /// Stores `record` for `file`. Returns false, leaving the history
    /// untouched, when the stored record is identical.
    pub fn update(&mut self, file: &str, record: EmitRecord) -> bool {
        let file = normalize_path(file);
        if self.records.get(&file) == Some(&record) {
            return false;
        }
        self.records.insert(file, record);
        true
    }

    pub fn remove(&mut self, file: &str) -> Option<EmitRecord> {
        self.records.shift_remove(&normalize_path(file))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
