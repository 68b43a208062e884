//! Configuration for revstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// Main configuration for a revstore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the file-backed record store.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── records.log      (append-only content-addressed records)
    ///     └── HEAD             (current revision id)
    pub data_dir: PathBuf,

    /// Sync strategy: when to fsync the record log
    pub sync: SyncStrategy,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Maximum number of entries a page may hold before it splits
    pub max_page_entries: usize,

    /// Minimum number of entries a non-root page may hold before it
    /// borrows from or merges with a sibling
    pub min_page_entries: usize,
}

/// Record log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every record write (safest, slowest)
    EveryWrite,

    /// never fsync implicitly; the caller syncs at commit boundaries
    Manual,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./revstore_data"),
            sync: SyncStrategy::Manual,
            max_page_entries: 64,
            min_page_entries: 32,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validate the fan-out bounds.
    ///
    /// A merge of two minimally-filled pages plus a separator must fit in
    /// one page, so `2 * min <= max + 1` is required.
    pub fn validate(&self) -> Result<()> {
        if self.max_page_entries < 4 {
            return Err(StoreError::Config(format!(
                "max_page_entries must be at least 4, got {}",
                self.max_page_entries
            )));
        }
        if self.min_page_entries < 2 {
            return Err(StoreError::Config(format!(
                "min_page_entries must be at least 2, got {}",
                self.min_page_entries
            )));
        }
        if 2 * self.min_page_entries > self.max_page_entries + 1 {
            return Err(StoreError::Config(format!(
                "fill factor bounds do not admit merging: min={}, max={}",
                self.min_page_entries, self.max_page_entries
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    min_set: bool,
}

impl ConfigBuilder {
    /// Set the data directory (root for the file-backed store)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the record log sync strategy
    pub fn sync(mut self, sync: SyncStrategy) -> Self {
        self.config.sync = sync;
        self
    }

    /// Set the maximum page fan-out; unless overridden, the minimum
    /// fill factor follows as half of it
    pub fn max_page_entries(mut self, max: usize) -> Self {
        self.config.max_page_entries = max;
        if !self.min_set {
            self.config.min_page_entries = max / 2;
        }
        self
    }

    /// Set the minimum page fill factor explicitly
    pub fn min_page_entries(mut self, min: usize) -> Self {
        self.config.min_page_entries = min;
        self.min_set = true;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
