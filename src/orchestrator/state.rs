//! Build Phase Ordering
//!
//! Every graph node belongs to one phase. Phases are totally ordered
//! (sources -> config -> compile -> install modules -> package -> distribute)
//! and a node may only depend on nodes of its own or an earlier phase.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Build phase enumeration - discrete stages of the derived-target pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    /// Kernel source trees and build config files
    Sources,

    /// Derived configuration inputs (symbol list unions)
    Config,

    /// Kernel compilation and its direct by-products
    Compile,

    /// Module installation into a staging directory
    InstallModules,

    /// Images, archives and ABI artifacts
    Package,

    /// Distribution bundles
    Distribute,
}

impl BuildPhase {
    pub const ALL: [BuildPhase; 6] = [
        BuildPhase::Sources,
        BuildPhase::Config,
        BuildPhase::Compile,
        BuildPhase::InstallModules,
        BuildPhase::Package,
        BuildPhase::Distribute,
    ];

    /// Get the human-readable name for this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhase::Sources => "sources",
            BuildPhase::Config => "config",
            BuildPhase::Compile => "compile",
            BuildPhase::InstallModules => "install_modules",
            BuildPhase::Package => "package",
            BuildPhase::Distribute => "distribute",
        }
    }

    /// The phase that follows this one, if any.
    pub fn next(&self) -> Option<BuildPhase> {
        let idx = Self::ALL.iter().position(|p| p == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Check if a node in this phase may depend on a node in `dependency`.
    pub fn can_depend_on(&self, dependency: BuildPhase) -> bool {
        dependency <= *self
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
