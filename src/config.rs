//! Optimizer configuration

use crate::error::{Error, Result};

/// Java 6, the last version the JVM verifies by type inference when a
/// class carries no stack map frames
pub const DEFAULT_TARGET_MAJOR_VERSION: u16 = 50;

/// Highest version a rewritten class may carry: later versions need stack map frames
pub const MAX_TARGET_MAJOR_VERSION: u16 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Fold constant expressions, propagate known locals and prune constant branches
    pub fold_constants: bool,
    /// Remove stores whose value is never read
    pub eliminate_dead_stores: bool,
    /// Upper bound on dead-store rounds per method
    pub max_dead_store_rounds: usize,
    /// Class major version written for classes with rewritten methods
    pub target_major_version: u16,
    /// File names the batch driver copies without optimizing
    pub exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fold_constants: true,
            eliminate_dead_stores: true,
            max_dead_store_rounds: 64,
            target_major_version: DEFAULT_TARGET_MAJOR_VERSION,
            exclude: Vec::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folding(mut self, enabled: bool) -> Self {
        self.fold_constants = enabled;
        self
    }

    pub fn with_dead_store_elimination(mut self, enabled: bool) -> Self {
        self.eliminate_dead_stores = enabled;
        self
    }

    pub fn with_target_major_version(mut self, version: u16) -> Self {
        self.target_major_version = version;
        self
    }

    /// Skip files with this exact name in batch runs
    pub fn exclude(mut self, file_name: impl Into<String>) -> Self {
        self.exclude.push(file_name.into());
        self
    }

    pub fn is_excluded(&self, file_name: &str) -> bool {
        self.exclude.iter().any(|name| name == file_name)
    }

    /// Reject settings that would produce unverifiable classes
    pub fn validate(&self) -> Result<()> {
        if self.target_major_version > MAX_TARGET_MAJOR_VERSION {
            return Err(Error::config_error(format!(
                "target version {} is above {}, rewritten methods carry no stack map frames",
                self.target_major_version, MAX_TARGET_MAJOR_VERSION
            )));
        }
        Ok(())
    }
}
