//! Per-block translation cache: a moka memory layer in front of a sled
//! disk layer. Only successful translations are stored.

mod memory;
mod disk;
mod key;

pub use memory::MemoryCache;
pub use disk::DiskCache;
pub use key::CacheKey;

use std::path::PathBuf;
use tracing::warn;

use crate::config::{CacheConfig, xdg_dir};
use crate::error::Result;

/// Combined cache with memory and disk layers
pub struct TranslationCache {
    memory: Option<MemoryCache>,
    disk: Option<DiskCache>,
}

/// `$XDG_CACHE_HOME/pdf-relayout`, falling back to `./.cache/pdf-relayout`
pub fn default_disk_path() -> PathBuf {
    xdg_dir("XDG_CACHE_HOME", ".cache")
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("pdf-relayout")
}

impl TranslationCache {
    /// Create a new translation cache from configuration
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let memory = config
            .memory_enabled
            .then(|| MemoryCache::new(config.memory_max_mb, config.memory_ttl_seconds));

        let disk = if config.disk_enabled {
            let path = config.disk_path.clone().unwrap_or_else(default_disk_path);
            Some(DiskCache::open(path)?)
        } else {
            None
        };

        Ok(Self { memory, disk })
    }

    /// A cache that stores nothing
    pub const fn disabled() -> Self {
        Self {
            memory: None,
            disk: None,
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.memory.is_some() || self.disk.is_some()
    }

    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        if let Some(ref memory) = self.memory
            && let Some(value) = memory.get(key.as_str()).await
        {
            return Some(value);
        }

        if let Some(ref disk) = self.disk
            && let Some(value) = disk.get(key.as_str())
        {
            // Promote disk hits
            if let Some(ref memory) = self.memory {
                memory.insert(key.to_string(), value.clone()).await;
            }
            return Some(value);
        }

        None
    }

    /// Store a translation; disk failures are logged, never propagated.
    pub async fn insert(&self, key: &CacheKey, value: &str) {
        if let Some(ref memory) = self.memory {
            memory.insert(key.to_string(), value.to_string()).await;
        }

        if let Some(ref disk) = self.disk
            && let Err(e) = disk.insert(key.as_str(), value)
        {
            warn!("Failed to persist translation: {}", e);
        }
    }

    /// Write buffered disk entries out.
    pub fn flush(&self) -> Result<()> {
        self.disk.as_ref().map_or(Ok(()), DiskCache::flush)
    }

    /// Drop every entry from both layers.
    pub fn clear(&self) -> Result<()> {
        if let Some(ref memory) = self.memory {
            memory.clear();
        }
        self.disk.as_ref().map_or(Ok(()), DiskCache::clear)
    }
}
