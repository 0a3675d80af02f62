use crate::error::Error;
use dashmap::DashMap;
use rocksdb::{Options, DB};
use std::path::Path;
use tracing::debug;

/// String key-value persistence. Keys are namespaced by the caller.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;
    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    fn get_or(&self, key: &str, default: &str) -> Result<String, Error> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_string()))
    }
}

/// Process-local store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryKv {
    map: DashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.map.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// RocksDB-backed store for state that must survive restarts.
pub struct RocksKv {
    db: DB,
}

impl RocksKv {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path.as_ref())?;
        debug!("Opened key-value store at {}", path.as_ref().display());
        Ok(Self { db })
    }
}

impl KvStore for RocksKv {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| Error::Other(format!("Non UTF-8 value under {}: {}", key, e))),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.db.put(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }
}
