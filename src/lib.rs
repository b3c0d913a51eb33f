//! Kernel build-graph engine
//!
//! Resolves per-target build configuration, composes the dependency graph of
//! derived kernel targets, substitutes prebuilt artifacts and maps build
//! output directories to fingerprinted cache slots.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Architectures, config keys and resolved target configs
//! - **config**: Override tables, default probing and the Config Resolver
//! - **graph**: Build graph and the Dependency Graph Composer
//! - **orchestrator**: Resolution pass driver and build phases
//! - **prebuilt**: Prebuilt Resolver
//! - **download**: Download Orchestrator and generated descriptors
//! - **cache**: Artifact Cache Director
//! - **abi**: Trim propagation and KMI symbol lists
//! - **toolchain**: Toolchain version agreement
//! - **log_collector**: `log` backend writing per-run log files
//! - **cli**: Command-line definitions

// Core foundational modules
pub mod error;
pub mod models;

pub mod abi;
pub mod config;
pub mod graph;
pub mod orchestrator;

pub mod cache;
pub mod download;
pub mod prebuilt;
pub mod toolchain;

pub mod cli;
pub mod log_collector;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    AppError, CacheError, ConfigError, ConfigValidationError, DeferredResolutionFailure,
    DownloadError, GraphError, Result, SymbolListError, ToolchainMismatchError,
};

pub use models::{Arch, ConfigKey, ConfigValue, TargetConfig, ValueSource};

pub use abi::{GlobalOverrides, TrimState};
pub use cache::{CacheDirector, CacheOptions};
pub use config::ConfigManager;
pub use download::{DownloadOrchestrator, DownloadSpec, Mode, Outcome, RepositoryDescriptor};
pub use graph::{BuildGraph, GraphNode};
pub use orchestrator::{BuildPhase, Orchestrator, Plan};
pub use prebuilt::{select, ArtifactRef, PrebuiltResolver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
