use sled::Db;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Persistent translation cache backed by sled.
pub struct DiskCache {
    db: Db,
}

impl DiskCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        std::fs::create_dir_all(path).map_err(|e| {
            Error::CacheInit(format!(
                "Failed to create cache directory {}: {}",
                path.display(),
                e
            ))
        })?;

        let db = sled::open(path).map_err(|e| {
            let message = e.to_string();
            if message.contains("WouldBlock") || message.contains("lock") {
                Error::CacheInit(format!(
                    "Cache locked at {}: another pdf-relayout process is using it",
                    path.display()
                ))
            } else {
                Error::CacheInit(format!("Failed to open cache at {}: {}", path.display(), e))
            }
        })?;

        debug!("Opened disk cache at {}", path.display());
        Ok(Self { db })
    }

    /// Read errors and undecodable entries count as misses.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(value)) => String::from_utf8(value.to_vec()).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read error: {}", e);
                None
            }
        }
    }

    pub fn insert(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| Error::CacheWrite(e.to_string()))?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::CacheWrite(format!("Flush failed: {e}")))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.db.clear().map_err(|e| Error::CacheWrite(e.to_string()))?;
        self.flush()
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}
