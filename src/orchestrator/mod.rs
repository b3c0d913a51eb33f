//! Build Orchestration: config resolution -> toolchain check -> graph composition.
//!
//! The orchestrator owns one resolution pass. It threads a single
//! [`GlobalOverrides`] value through composition, and hands the composed
//! graph to the prebuilt, download and cache layers.

pub mod state;

pub use state::BuildPhase;

use crate::abi::trim::{GlobalOverrides, TrimState};
use crate::cache::{CacheDirector, PreparedSlot};
use crate::config::ConfigManager;
use crate::download::{DownloadOrchestrator, DownloadSpec, Fetcher, Mode, RepositoryDescriptor};
use crate::error::{GraphError, Result};
use crate::graph::{compose_all, BuildGraph};
use crate::models::{Arch, TargetConfig};
use crate::prebuilt::{ArtifactRef, ModuleOutsSource, PrebuiltResolver};
use crate::toolchain;
use serde::Serialize;
use std::collections::BTreeMap;

/// Package of the common kernel targets; used for cache labels.
pub const COMMON_PACKAGE: &str = "common";

/// Result of a planning pass.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub overrides: GlobalOverrides,
    pub configs: Vec<(Arch, TargetConfig)>,
    pub graph: BuildGraph,
    /// Node names in a valid build order.
    pub order: Vec<String>,
}

impl Plan {
    /// Node count per build phase.
    pub fn phase_summary(&self) -> BTreeMap<BuildPhase, usize> {
        let mut summary = BTreeMap::new();
        for node in self.graph.nodes() {
            *summary.entry(node.phase).or_insert(0) += 1;
        }
        summary
    }

    /// Effective trim value for every node with the trim capability.
    pub fn trim_report(&self) -> Result<Vec<(String, TrimState)>> {
        let mut report = Vec::new();
        for node in self.graph.nodes() {
            if let Some(state) = self.graph.effective_trim(&node.name, &self.overrides)? {
                report.push((node.name.clone(), state));
            }
        }
        Ok(report)
    }

    pub fn config(&self, arch: Arch) -> Option<&TargetConfig> {
        self.configs.iter().find(|(a, _)| *a == arch).map(|(_, c)| c)
    }
}

/// Drives one resolution pass.
pub struct Orchestrator {
    config: ConfigManager,
    overrides: GlobalOverrides,
}

impl Orchestrator {
    /// The branch comes from the build constants unless already overridden.
    pub fn new(config: ConfigManager, mut overrides: GlobalOverrides) -> Self {
        if overrides.branch.is_none() {
            overrides.branch = config.branch().map(str::to_string);
        }
        Orchestrator { config, overrides }
    }

    pub fn overrides(&self) -> &GlobalOverrides {
        &self.overrides
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    /// Resolve every target, check the toolchain and compose the graph.
    pub fn plan(&self) -> Result<Plan> {
        log::info!(target: "parsed", "[Orchestrator] Resolving target configs");
        let configs = self.config.resolve_all()?;

        toolchain::check_optional(
            self.config.clang_version(),
            self.overrides.exec_toolchain_version.as_deref(),
        )?;

        let graph = compose_all(&configs, &self.overrides)?;
        let order: Vec<String> = graph
            .topological_order()?
            .into_iter()
            .map(str::to_string)
            .collect();

        log::info!(
            target: "parsed",
            "[Orchestrator] Planned {} nodes (force_disable_trim={})",
            order.len(),
            self.overrides.force_disable_trim
        );
        Ok(Plan {
            overrides: self.overrides.clone(),
            configs,
            graph,
            order,
        })
    }

    /// Resolve a prebuilt repository and write its descriptor.
    pub async fn fetch_prebuilts<F: Fetcher>(
        &self,
        downloader: &DownloadOrchestrator<F>,
        spec: &DownloadSpec,
        mode: &Mode,
    ) -> Result<RepositoryDescriptor> {
        log::info!(
            target: "parsed",
            "[Orchestrator] Resolving @{} ({} files)",
            downloader.repo_name(),
            spec.len()
        );
        Ok(downloader.resolve_and_write(spec, mode).await?)
    }

    /// Prepare a cache slot for every planned architecture.
    pub fn prepare_cache(&self, plan: &Plan, director: &CacheDirector) -> Result<Vec<(Arch, PreparedSlot)>> {
        plan.configs
            .iter()
            .map(|(arch, _)| -> Result<(Arch, PreparedSlot)> {
                let label = format!("//{}:{}", COMMON_PACKAGE, arch.name());
                let prepared = director.prepare(&label, COMMON_PACKAGE, arch.name(), None)?;
                Ok((*arch, prepared))
            })
            .collect()
    }

    /// Artifact references for one planned node.
    pub fn resolve_artifacts(
        &self,
        plan: &Plan,
        resolver: &PrebuiltResolver,
        node: &str,
        descriptor: Option<&RepositoryDescriptor>,
    ) -> Result<BTreeMap<String, ArtifactRef>> {
        if !plan.graph.contains(node) {
            return Err(GraphError::NotFound(node.to_string()).into());
        }
        resolver.resolve_outputs(&plan.graph, node, descriptor)
    }

    /// Module-outs file source for every kernel build node, in build order.
    pub fn module_outs_files(
        &self,
        plan: &Plan,
        resolver: &PrebuiltResolver,
        repo_name: &str,
    ) -> Result<Vec<(String, ModuleOutsSource)>> {
        let mut sources = Vec::new();
        for name in &plan.order {
            if let Some(source) = resolver.module_outs_file(&plan.graph, name, repo_name)? {
                sources.push((name.clone(), source));
            }
        }
        Ok(sources)
    }
}
