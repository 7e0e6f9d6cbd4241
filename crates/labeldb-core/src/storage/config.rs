//! Storage configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default sled page cache size.
const DEFAULT_CACHE_BYTES: u64 = 64 * 1024 * 1024;

/// Settings for the sled database behind a [`StorageEngine`](super::StorageEngine).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Database directory. Ignored for a temporary database.
    pub path: PathBuf,
    /// Page cache size in bytes.
    pub cache_bytes: u64,
    /// Background flush interval. `None` leaves flushing to explicit
    /// [`flush`](super::StorageEngine::flush) calls.
    pub flush_interval: Option<Duration>,
    /// zstd-compress pages on disk.
    pub compression: bool,
    /// Remove the database when it is dropped.
    pub temporary: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./labeldb_data"),
            cache_bytes: DEFAULT_CACHE_BYTES,
            flush_interval: Some(Duration::from_millis(500)),
            compression: true,
            temporary: false,
        }
    }
}

impl StorageConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// A database that lives only as long as its engine.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::new(),
            temporary: true,
            ..Default::default()
        }
    }

    pub fn with_cache_bytes(mut self, bytes: u64) -> Self {
        self.cache_bytes = bytes;
        self
    }

    pub fn with_flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let config = sled::Config::new()
            .cache_capacity(self.cache_bytes)
            .use_compression(self.compression)
            .flush_every_ms(self.flush_interval.map(|d| d.as_millis() as u64));
        if self.temporary {
            config.temporary(true)
        } else {
            config.path(&self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = StorageConfig::new("/tmp/labels")
            .with_cache_bytes(1024)
            .with_flush_interval(None)
            .with_compression(false);
        assert_eq!(config.path, PathBuf::from("/tmp/labels"));
        assert_eq!(config.cache_bytes, 1024);
        assert!(config.flush_interval.is_none());
        assert!(!config.compression);
        assert!(!config.temporary);
        assert!(StorageConfig::temporary().temporary);
    }
}
