//! Configuration module for target config resolution.
//!
//! # Module Structure
//!
//! - `loader`: Loads target override tables and build constants from files
//! - `validator`: Rejects unknown keys, unknown targets and mistyped values
//! - `defaults`: Scans the kernel tree for per-architecture defaults (memoized)
//! - `resolver`: Layers explicit overrides over the computed defaults
//!
//! # Configuration Flow
//!
//! 1. `ConfigManager` loads the override table (or starts empty)
//! 2. Validator checks targets and keys, reporting every violation at once
//! 3. `DefaultsProvider` scans the kernel tree once per pass
//! 4. Resolver produces one immutable `TargetConfig` per architecture

pub mod defaults;
pub mod loader;
pub mod resolver;
pub mod validator;

pub use defaults::{ArchDefaults, DefaultsProvider};
pub use loader::TargetTable;
pub use resolver::{resolve, resolve_all};

use crate::error::ConfigError;
use crate::models::{Arch, TargetConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the build constants file at the root of the kernel tree.
pub const BUILD_CONSTANTS_FILE: &str = "build.config.constants";

/// Owns the inputs of one resolution pass.
pub struct ConfigManager {
    table: TargetTable,
    provider: DefaultsProvider,
    constants: BTreeMap<String, String>,
}

impl ConfigManager {
    /// Create a manager for `kernel_dir`, optionally loading an override table.
    pub fn new(kernel_dir: impl Into<PathBuf>, table_path: Option<&Path>) -> Result<Self, ConfigError> {
        let kernel_dir = kernel_dir.into();
        let table = match table_path {
            Some(path) => loader::load_target_table(path)?,
            None => TargetTable::new(),
        };
        let constants = loader::load_build_constants(&kernel_dir.join(BUILD_CONSTANTS_FILE))?;

        Ok(ConfigManager {
            table,
            provider: DefaultsProvider::new(kernel_dir),
            constants,
        })
    }

    /// Build a manager from in-memory inputs (no file access besides probing).
    pub fn from_parts(
        table: TargetTable,
        provider: DefaultsProvider,
        constants: BTreeMap<String, String>,
    ) -> Self {
        ConfigManager {
            table,
            provider,
            constants,
        }
    }

    /// Resolve every architecture target.
    pub fn resolve_all(&self) -> Result<Vec<(Arch, TargetConfig)>, ConfigError> {
        resolver::resolve_all(&self.table, &self.provider)
    }

    /// `BRANCH` from the build constants, if set.
    pub fn branch(&self) -> Option<&str> {
        self.constants.get("BRANCH").map(String::as_str).filter(|b| !b.is_empty())
    }

    /// `CLANG_VERSION` from the build constants, if set.
    pub fn clang_version(&self) -> Option<&str> {
        self.constants
            .get(crate::toolchain::CLANG_VERSION_KEY)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn provider(&self) -> &DefaultsProvider {
        &self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_manager_reads_constants() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(BUILD_CONSTANTS_FILE),
            "BRANCH=android15-6.6\nCLANG_VERSION=r510928\n",
        )
        .unwrap();

        let manager = ConfigManager::new(dir.path(), None).unwrap();
        assert_eq!(manager.branch(), Some("android15-6.6"));
        assert_eq!(manager.clang_version(), Some("r510928"));
        assert_eq!(manager.resolve_all().unwrap().len(), Arch::ALL.len());
        assert_eq!(manager.provider().scan_count(), 1);
    }
}
