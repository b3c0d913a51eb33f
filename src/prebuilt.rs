//! Prebuilt Resolver
//!
//! Chooses, per artifact, between a graph node's built output and a
//! downloaded file, and hands consumers the same [`ArtifactRef`] shape either
//! way.

use crate::download::RepositoryDescriptor;
use crate::error::{AppError, GraphError};
use crate::graph::{BuildGraph, NodeKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Suffix of the remote module-outs file: `<target>_modules`.
pub const MODULE_OUTS_FILE_SUFFIX: &str = "_modules";

/// Output group carrying the module-outs file of a local build.
pub const MODULE_OUTS_FILE_OUTPUT_GROUP: &str = "module_outs_file";

/// A file consumers can read, whatever produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ArtifactRef {
    /// Output of a graph node.
    Built { node: String, path: PathBuf },
    /// File materialized by the download orchestrator.
    Downloaded { path: PathBuf },
}

impl ArtifactRef {
    pub fn path(&self) -> &Path {
        match self {
            ArtifactRef::Built { path, .. } | ArtifactRef::Downloaded { path } => path,
        }
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    pub fn is_prebuilt(&self) -> bool {
        matches!(self, ArtifactRef::Downloaded { .. })
    }
}

/// Pure selection on the flag.
pub fn select(use_prebuilt: bool, built: ArtifactRef, downloaded: ArtifactRef) -> ArtifactRef {
    if use_prebuilt {
        downloaded
    } else {
        built
    }
}

/// Where the module-outs file comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ModuleOutsSource {
    /// File in the prebuilt repository.
    Remote { label: String },
    /// Output group of the locally built node.
    OutputGroup { node: String, group: String },
}

pub fn select_module_outs_file(use_prebuilt: bool, repo_name: &str, target: &str) -> ModuleOutsSource {
    if use_prebuilt {
        ModuleOutsSource::Remote {
            label: format!("@{}//:{}{}", repo_name, target, MODULE_OUTS_FILE_SUFFIX),
        }
    } else {
        ModuleOutsSource::OutputGroup {
            node: target.to_string(),
            group: MODULE_OUTS_FILE_OUTPUT_GROUP.to_string(),
        }
    }
}

/// Builds uniform output maps for graph nodes.
#[derive(Debug, Clone)]
pub struct PrebuiltResolver {
    use_prebuilt: bool,
    out_root: PathBuf,
}

impl PrebuiltResolver {
    /// `out_root` is where built nodes place their outputs, one directory per node.
    pub fn new(use_prebuilt: bool, out_root: impl Into<PathBuf>) -> Self {
        PrebuiltResolver {
            use_prebuilt,
            out_root: out_root.into(),
        }
    }

    pub fn use_prebuilt(&self) -> bool {
        self.use_prebuilt
    }

    pub fn built_ref(&self, node: &str, output: &str) -> ArtifactRef {
        ArtifactRef::Built {
            node: node.to_string(),
            path: self.out_root.join(node).join(output),
        }
    }

    /// Module-outs file of `node`; `None` unless it is a kernel build.
    pub fn module_outs_file(
        &self,
        graph: &BuildGraph,
        node: &str,
        repo_name: &str,
    ) -> Result<Option<ModuleOutsSource>, GraphError> {
        let graph_node = graph
            .get(node)
            .ok_or_else(|| GraphError::NotFound(node.to_string()))?;
        if graph_node.kind != NodeKind::KernelBuild {
            return Ok(None);
        }
        Ok(Some(select_module_outs_file(self.use_prebuilt, repo_name, node)))
    }

    /// Map every output of `node` to a reference.
    ///
    /// With prebuilts enabled each output is realized from `descriptor`;
    /// skipped optional files are left out and deferred failures surface
    /// here. Without prebuilts the descriptor is never consulted.
    pub fn resolve_outputs(
        &self,
        graph: &BuildGraph,
        node: &str,
        descriptor: Option<&RepositoryDescriptor>,
    ) -> Result<BTreeMap<String, ArtifactRef>, AppError> {
        let graph_node = graph
            .get(node)
            .ok_or_else(|| GraphError::NotFound(node.to_string()))?;

        let mut refs = BTreeMap::new();
        for output in &graph_node.outputs {
            let built = self.built_ref(node, output);
            let chosen = match (self.use_prebuilt, descriptor) {
                (true, Some(descriptor)) => match descriptor.realize(output)? {
                    Some(path) => select(
                        true,
                        built,
                        ArtifactRef::Downloaded {
                            path: path.to_path_buf(),
                        },
                    ),
                    None => continue,
                },
                _ => built,
            };
            refs.insert(output.clone(), chosen);
        }

        log::debug!(
            "[Prebuilt] {} -> {} refs (prebuilt={})",
            node,
            refs.len(),
            self.use_prebuilt
        );
        Ok(refs)
    }
}
