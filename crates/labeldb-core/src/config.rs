//! Database configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::mac::DominanceOrder;
use crate::storage::StorageConfig;

/// Default suffix appended to a restricted schema's name to name its shadow
/// schema.
pub const DEFAULT_SHADOW_SUFFIX: &str = "_SHADOW";

/// Access-control settings.
#[derive(Debug, Clone)]
pub struct MacConfig {
    /// Suffix of shadow schema names.
    pub shadow_suffix: String,
    /// Order deciding which sensitivities a grant implies.
    pub dominance: DominanceOrder,
    /// How long to wait for the system transaction. Waits forever if `None`.
    pub system_lock_timeout: Option<Duration>,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            shadow_suffix: DEFAULT_SHADOW_SUFFIX.to_string(),
            dominance: DominanceOrder::Alphabetical,
            system_lock_timeout: None,
        }
    }
}

impl MacConfig {
    /// Set the shadow schema suffix.
    pub fn with_shadow_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.shadow_suffix = suffix.into();
        self
    }

    /// Set the dominance order.
    pub fn with_dominance(mut self, dominance: DominanceOrder) -> Self {
        self.dominance = dominance;
        self
    }

    /// Bound the wait for the system transaction.
    pub fn with_system_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.system_lock_timeout = timeout;
        self
    }

    /// Name of the shadow schema of a restricted schema.
    pub fn shadow_schema_name(&self, schema: &str) -> String {
        format!("{}{}", schema, self.shadow_suffix)
    }
}

/// Configuration for a [`Database`](crate::Database).
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Access-control settings.
    pub mac: MacConfig,
}

impl DatabaseConfig {
    /// Store the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::new(path),
            mac: MacConfig::default(),
        }
    }

    /// A throwaway database removed when dropped.
    pub fn temporary() -> Self {
        Self {
            storage: StorageConfig::temporary(),
            mac: MacConfig::default(),
        }
    }

    /// Replace the storage settings.
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Replace the access-control settings.
    pub fn with_mac(mut self, mac: MacConfig) -> Self {
        self.mac = mac;
        self
    }
}
