//! Trim (non-listed KMI) propagation.
//!
//! Every graph node that declares the `trim_nonlisted_kmi` capability carries a
//! requested [`TrimState`]. The value a node actually builds with is computed
//! from that request and the invocation-wide [`GlobalOverrides`], which are
//! threaded explicitly through composition instead of living in globals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tri-state trim setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimState {
    Enabled,
    Disabled,
    Unknown,
}

impl TrimState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrimState::Enabled => "enabled",
            TrimState::Disabled => "disabled",
            TrimState::Unknown => "unknown",
        }
    }
}

impl From<Option<bool>> for TrimState {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => TrimState::Enabled,
            Some(false) => TrimState::Disabled,
            None => TrimState::Unknown,
        }
    }
}

impl fmt::Display for TrimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invocation-wide settings that take precedence over per-node attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalOverrides {
    /// Forces trimming off on every node, whatever the node requested.
    pub force_disable_trim: bool,
    /// Branch name used for the dist directory (`out/<branch>/dist`).
    pub branch: Option<String>,
    /// Compiler toolchain version of the execution platform, if known.
    pub exec_toolchain_version: Option<String>,
}

/// Trim value a node builds with.
pub fn effective_trim(requested: TrimState, overrides: &GlobalOverrides) -> TrimState {
    if overrides.force_disable_trim {
        TrimState::Disabled
    } else {
        requested
    }
}
