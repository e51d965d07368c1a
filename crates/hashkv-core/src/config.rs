//! Configuration for the HashKV engine
//!
//! Provides table sizing presets and validation. The server binary builds
//! one of these from its command line.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KvError, KvResult};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bucket count of a freshly constructed field store
    pub initial_buckets: usize,
    /// Records a bucket holds before insertion starts evicting
    pub bucket_capacity: usize,
    /// Eviction attempts per insert before the table is doubled
    pub max_displacements: usize,
    /// Table doublings a single insert may trigger before the record overflows its bucket
    pub max_growth_per_insert: usize,
    /// Append-only log location
    pub aof_path: PathBuf,
    /// Background fdatasync cadence for the append-only log
    pub sync_interval: Duration,
}

impl Config {
    /// Server defaults: 100 buckets of 4 records, 1s log sync.
    pub fn server() -> Self {
        Self {
            initial_buckets: 100,
            bucket_capacity: 4,
            max_displacements: 10,
            max_growth_per_insert: 4,
            aof_path: PathBuf::from("database.aof"),
            sync_interval: Duration::from_secs(1),
        }
    }

    /// Tiny single-record buckets. Forces eviction and resizes early; used by tests.
    pub fn small() -> Self {
        Self {
            initial_buckets: 4,
            bucket_capacity: 1,
            max_displacements: 10,
            max_growth_per_insert: 4,
            aof_path: PathBuf::from("database.aof"),
            sync_interval: Duration::from_millis(50),
        }
    }

    /// Replace the log path.
    pub fn with_aof_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.aof_path = path.into();
        self
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> KvResult<()> {
        let fail = |reason: &str| Err(KvError::InvalidConfig { reason: reason.to_string() });

        if self.initial_buckets == 0 {
            return fail("initial_buckets must be > 0");
        }
        if self.bucket_capacity == 0 || self.bucket_capacity > 64 {
            return fail("bucket_capacity must be in [1, 64]");
        }
        if self.max_displacements == 0 {
            return fail("max_displacements must be > 0");
        }
        if self.max_growth_per_insert == 0 {
            return fail("max_growth_per_insert must be > 0");
        }
        if self.sync_interval.as_millis() == 0 {
            return fail("sync_interval must be > 0");
        }
        if self.aof_path.as_os_str().is_empty() {
            return fail("aof_path must not be empty");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self { Self::server() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_valid() {
        assert!(Config::server().validate().is_ok());
        assert!(Config::small().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_buckets() {
        let mut config = Config::default();
        config.initial_buckets = 0;
        assert!(matches!(config.validate(), Err(KvError::InvalidConfig { .. })));
    }

    #[test]
    fn test_rejects_oversized_bucket_capacity() {
        let mut config = Config::default();
        config.bucket_capacity = 65;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_aof_path() {
        let config = Config::small().with_aof_path("/tmp/x.aof");
        assert_eq!(config.aof_path, PathBuf::from("/tmp/x.aof"));
    }
}
