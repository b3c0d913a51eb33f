//! Dependency graph composition for the common kernel architectures.
//!
//! One top-to-bottom pass per architecture. Each node only names nodes
//! declared earlier in the same pass, so composition order doubles as a valid
//! build order.

use crate::abi::trim::{GlobalOverrides, TrimState};
use crate::error::GraphError;
use crate::graph::{BuildGraph, GraphNode, NodeKind};
use crate::models::{Arch, TargetConfig};
use crate::orchestrator::state::BuildPhase;

/// Files produced by every kernel build besides the images.
const KERNEL_BUILD_OUTS: [&str; 5] = [
    "vmlinux",
    "System.map",
    "modules.builtin",
    "modules.builtin.modinfo",
    "vmlinux.symvers",
];

const UAPI_HEADERS_OUT: &str = "kernel-uapi-headers.tar.gz";
const TOOLCHAIN_VERSION_OUT: &str = "toolchain_version";

/// Outputs that device kernels override downstream; never part of the
/// aggregated artifact groups.
const AGGREGATE_EXCLUDES: [&str; 2] = [UAPI_HEADERS_OUT, TOOLCHAIN_VERSION_OUT];

/// Compose the graph for every resolved architecture into one graph.
pub fn compose_all(
    configs: &[(Arch, TargetConfig)],
    overrides: &GlobalOverrides,
) -> Result<BuildGraph, GraphError> {
    let mut graph = BuildGraph::new();
    for (arch, config) in configs {
        compose(&mut graph, *arch, config, overrides)?;
    }
    log::info!(
        target: "parsed",
        "[Compose] Composed {} nodes for {} architectures",
        graph.len(),
        configs.len()
    );
    Ok(graph)
}

/// Declare the nodes for one architecture into `graph`.
pub fn compose(
    graph: &mut BuildGraph,
    arch: Arch,
    config: &TargetConfig,
    overrides: &GlobalOverrides,
) -> Result<(), GraphError> {
    let name = arch.name();
    let n = |suffix: &str| format!("{}{}", name, suffix);
    let requested_trim = TrimState::from(config.trim_nonlisted_kmi());

    log::debug!(
        "[Compose] {}: trim requested {}, effective {}",
        name,
        requested_trim,
        crate::abi::trim::effective_trim(requested_trim, overrides)
    );

    // Sources
    graph.declare(
        GraphNode::new(n("_sources"), NodeKind::Sources, BuildPhase::Sources)
            .outputs([arch.build_config()])
            .attr("build_config", arch.build_config()),
    )?;

    // Config: additional lists first, then the primary list.
    graph.declare(
        GraphNode::new(n("_all_kmi_symbol_lists"), NodeKind::SymbolLists, BuildPhase::Config)
            .deps([n("_sources")])
            .outputs(config.all_kmi_symbol_lists()),
    )?;

    // Compile
    let mut build_outs: Vec<String> = KERNEL_BUILD_OUTS.iter().map(|s| s.to_string()).collect();
    build_outs.extend(arch.image_outputs().iter().map(|s| s.to_string()));
    build_outs.extend(config.module_implicit_outs().iter().cloned());
    let mut build = GraphNode::new(name, NodeKind::KernelBuild, BuildPhase::Compile)
        .deps([n("_sources"), n("_all_kmi_symbol_lists")])
        .outputs(build_outs)
        .trim(requested_trim)
        .attr("page_size", arch.page_size());
    if let Some(strict) = config.kmi_symbol_list_strict_mode() {
        build = build.attr("kmi_symbol_list_strict_mode", strict.to_string());
    }
    if arch.is_debug() {
        build = build.attr("debug", "true");
    }
    graph.declare(build)?;

    graph.declare(
        GraphNode::new(n("_toolchain_version"), NodeKind::ToolchainVersion, BuildPhase::Compile)
            .deps([name])
            .outputs([TOOLCHAIN_VERSION_OUT]),
    )?;
    graph.declare(
        GraphNode::new(n("_uapi_headers"), NodeKind::UapiHeaders, BuildPhase::Compile)
            .deps([name])
            .outputs([UAPI_HEADERS_OUT]),
    )?;
    graph.declare(
        GraphNode::new(n("_headers"), NodeKind::Headers, BuildPhase::Compile)
            .deps([name])
            .outputs(["kernel-headers.tar.gz"]),
    )?;
    graph.declare(
        GraphNode::new(n("_modules_prepare"), NodeKind::ModulesPrepare, BuildPhase::Compile)
            .deps([name])
            .outputs(["modules_prepare_outdir.tar.gz"]),
    )?;

    // ABI targets only exist with a primary symbol list.
    let mut abi_nodes = Vec::new();
    if config.build_abi_targets() {
        graph.declare(
            GraphNode::new(n("_abi_symbollist"), NodeKind::AbiSymbolList, BuildPhase::Compile)
                .deps([name.to_string(), n("_all_kmi_symbol_lists")])
                .outputs(["abi_symbollist", "abi_symbollist.report"]),
        )?;
        abi_nodes.push(n("_abi_symbollist"));

        if let Some(definition) = config.abi_definition() {
            graph.declare(
                GraphNode::new(n("_abi_dump"), NodeKind::AbiDump, BuildPhase::Package)
                    .deps([name.to_string(), n("_abi_symbollist")])
                    .outputs(["abi.stg", "abi_diff.report"])
                    .attr("abi_definition", definition)
                    .attr("kmi_enforced", config.kmi_enforced().unwrap_or(false).to_string()),
            )?;
            abi_nodes.push(n("_abi_dump"));
        }

        declare_union(graph, &n("_abi"), &abi_nodes, &[])?;
    }

    // Install modules
    graph.declare(
        GraphNode::new(n("_modules_install"), NodeKind::ModulesInstall, BuildPhase::InstallModules)
            .deps([name])
            .outputs(["modules_staging_dir"])
            .trim(requested_trim),
    )?;

    // Package
    graph.declare(
        GraphNode::new(
            n("_unstripped_modules_archive"),
            NodeKind::UnstrippedModulesArchive,
            BuildPhase::Package,
        )
        .deps([n("_modules_install")])
        .outputs(["unstripped_modules.tar.gz"]),
    )?;
    graph.declare(
        GraphNode::new(n("_images"), NodeKind::Images, BuildPhase::Package)
            .deps([name.to_string(), n("_modules_install")])
            .outputs(["system_dlkm.img", "system_dlkm.modules.load"])
            .trim(requested_trim),
    )?;

    // Declared even when disabled so dependents can rely on it.
    let gki_outs = if config.build_gki_artifacts() {
        boot_image_outputs(config)
    } else {
        Vec::new()
    };
    graph.declare(
        GraphNode::new(n("_gki_artifacts"), NodeKind::GkiArtifacts, BuildPhase::Package)
            .deps([name])
            .outputs(gki_outs)
            .attr("enabled", config.build_gki_artifacts().to_string()),
    )?;

    declare_union(
        graph,
        &n("_additional_artifacts"),
        &[
            n("_headers"),
            n("_images"),
            n("_gki_artifacts"),
            n("_unstripped_modules_archive"),
            n("_all_kmi_symbol_lists"),
        ],
        &AGGREGATE_EXCLUDES,
    )?;
    declare_union(
        graph,
        &n("_ddk_artifacts"),
        &[n("_modules_prepare"), n("_headers")],
        &AGGREGATE_EXCLUDES,
    )?;

    // Distribute
    let dist_dir = dist_dir(overrides.branch.as_deref(), "out");
    let mut dist_deps = vec![
        name.to_string(),
        n("_uapi_headers"),
        n("_toolchain_version"),
        n("_additional_artifacts"),
        n("_ddk_artifacts"),
    ];
    if config.build_abi_targets() {
        dist_deps.push(n("_abi"));
    }
    declare_dist(graph, &n("_dist"), dist_deps, &dist_dir)?;

    if config.build_abi_targets() {
        let abi_dist_dir = dist_dir_for_abi(overrides.branch.as_deref());
        declare_dist(graph, &n("_abi_dist"), vec![n("_abi"), n("_dist")], &abi_dist_dir)?;
    }

    Ok(())
}

/// `boot.img` for the uncompressed size entry, `boot-<compression>.img` otherwise.
fn boot_image_outputs(config: &TargetConfig) -> Vec<String> {
    match config.gki_boot_img_sizes() {
        Some(sizes) if !sizes.is_empty() => sizes
            .keys()
            .map(|compression| {
                if compression.is_empty() {
                    "boot.img".to_string()
                } else {
                    format!("boot-{}.img", compression)
                }
            })
            .collect(),
        _ => vec!["boot.img".to_string()],
    }
}

/// A filegroup whose outputs are the ordered union of `members`' outputs,
/// minus `excludes`.
fn declare_union(
    graph: &mut BuildGraph,
    name: &str,
    members: &[String],
    excludes: &[&str],
) -> Result<(), GraphError> {
    let outputs: Vec<String> = graph
        .union_outputs(members)?
        .into_iter()
        .filter(|out| !excludes.contains(&out.as_str()))
        .collect();
    let phase = members
        .iter()
        .filter_map(|m| graph.get(m).map(|node| node.phase))
        .max()
        .unwrap_or(BuildPhase::Package);

    graph.declare(
        GraphNode::new(name, NodeKind::Filegroup, phase)
            .deps(members.iter().cloned())
            .outputs(outputs),
    )?;
    Ok(())
}

fn declare_dist(
    graph: &mut BuildGraph,
    name: &str,
    deps: Vec<String>,
    dist_dir: &str,
) -> Result<(), GraphError> {
    let outputs = graph.union_outputs(&deps)?;
    graph.declare(
        GraphNode::new(name, NodeKind::Dist, BuildPhase::Distribute)
            .deps(deps)
            .outputs(outputs)
            .attr("dist_dir", dist_dir)
            .attr("flat", "true"),
    )?;
    Ok(())
}

/// `<root>/<branch>/dist`, or `<root>/dist` when the branch is unknown.
pub fn dist_dir(branch: Option<&str>, root: &str) -> String {
    match branch {
        Some(branch) if !branch.is_empty() => format!("{}/{}/dist", root, branch),
        _ => format!("{}/dist", root),
    }
}

fn dist_dir_for_abi(branch: Option<&str>) -> String {
    dist_dir(branch, "out_abi")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::ArchDefaults;
    use crate::config::resolver::resolve;
    use crate::models::{ConfigKey, ConfigValue, PartialConfig, RawOverrides};
    use std::collections::BTreeMap;

    fn aarch64_config(overrides: RawOverrides) -> TargetConfig {
        let mut defaults = PartialConfig::new();
        defaults.insert(ConfigKey::KmiSymbolList, ConfigValue::from("android/abi_gki_aarch64"));
        defaults.insert(
            ConfigKey::AdditionalKmiSymbolLists,
            ConfigValue::List(vec!["android/abi_gki_aarch64_other".to_string()]),
        );
        defaults.insert(ConfigKey::TrimNonlistedKmi, ConfigValue::Bool(true));
        defaults.insert(ConfigKey::BuildGkiArtifacts, ConfigValue::Bool(true));
        let mut table = BTreeMap::new();
        table.insert(Arch::Aarch64, defaults);
        resolve("kernel_aarch64", &overrides, &ArchDefaults::from_table(table)).unwrap()
    }

    #[test]
    fn test_symbol_lists_node_order() {
        let mut graph = BuildGraph::new();
        compose(&mut graph, Arch::Aarch64, &aarch64_config(RawOverrides::new()), &GlobalOverrides::default())
            .unwrap();
        let lists = graph.get("kernel_aarch64_all_kmi_symbol_lists").unwrap();
        assert_eq!(
            lists.outputs,
            vec!["android/abi_gki_aarch64_other", "android/abi_gki_aarch64"]
        );
    }

    #[test]
    fn test_gki_node_declared_empty_when_disabled() {
        let mut overrides = RawOverrides::new();
        overrides.insert("build_gki_artifacts".to_string(), ConfigValue::Bool(false));
        let mut graph = BuildGraph::new();
        compose(&mut graph, Arch::Aarch64, &aarch64_config(overrides), &GlobalOverrides::default()).unwrap();

        let gki = graph.get("kernel_aarch64_gki_artifacts").unwrap();
        assert!(gki.outputs.is_empty());
        assert_eq!(gki.attrs["enabled"], "false");
    }

    #[test]
    fn test_abi_nodes_absent_without_symbol_list() {
        let mut overrides = RawOverrides::new();
        overrides.insert("kmi_symbol_list".to_string(), ConfigValue::Null);
        let mut graph = BuildGraph::new();
        compose(&mut graph, Arch::Aarch64, &aarch64_config(overrides), &GlobalOverrides::default()).unwrap();

        assert!(!graph.contains("kernel_aarch64_abi"));
        assert!(!graph.contains("kernel_aarch64_abi_dist"));
        assert!(graph.contains("kernel_aarch64_dist"));
    }

    #[test]
    fn test_abi_dump_only_with_definition() {
        let mut overrides = RawOverrides::new();
        overrides.insert(
            "abi_definition".to_string(),
            ConfigValue::from("android/abi_gki_aarch64.stg"),
        );
        overrides.insert("kmi_enforced".to_string(), ConfigValue::Bool(true));
        let mut graph = BuildGraph::new();
        compose(&mut graph, Arch::Aarch64, &aarch64_config(overrides), &GlobalOverrides::default()).unwrap();

        let dump = graph.get("kernel_aarch64_abi_dump").unwrap();
        assert_eq!(dump.attrs["kmi_enforced"], "true");
        let abi = graph.get("kernel_aarch64_abi").unwrap();
        assert_eq!(abi.deps, vec!["kernel_aarch64_abi_symbollist", "kernel_aarch64_abi_dump"]);
    }

    #[test]
    fn test_aggregates_exclude_uapi_and_toolchain() {
        let mut graph = BuildGraph::new();
        compose(&mut graph, Arch::Aarch64, &aarch64_config(RawOverrides::new()), &GlobalOverrides::default())
            .unwrap();
        for group in ["kernel_aarch64_additional_artifacts", "kernel_aarch64_ddk_artifacts"] {
            let node = graph.get(group).unwrap();
            assert!(!node.outputs.iter().any(|o| o == UAPI_HEADERS_OUT));
            assert!(!node.outputs.iter().any(|o| o == TOOLCHAIN_VERSION_OUT));
        }
        let dist = graph.get("kernel_aarch64_dist").unwrap();
        assert!(dist.outputs.iter().any(|o| o == UAPI_HEADERS_OUT));
    }

    #[test]
    fn test_dist_dir_from_branch() {
        let overrides = GlobalOverrides {
            branch: Some("android-mainline".to_string()),
            ..Default::default()
        };
        let mut graph = BuildGraph::new();
        compose(&mut graph, Arch::Aarch64, &aarch64_config(RawOverrides::new()), &overrides).unwrap();
        assert_eq!(
            graph.get("kernel_aarch64_dist").unwrap().attrs["dist_dir"],
            "out/android-mainline/dist"
        );
        assert_eq!(
            graph.get("kernel_aarch64_abi_dist").unwrap().attrs["dist_dir"],
            "out_abi/android-mainline/dist"
        );
        assert_eq!(dist_dir(None, "out"), "out/dist");
    }

    #[test]
    fn test_boot_images_follow_sizes() {
        let mut overrides = RawOverrides::new();
        let mut sizes = BTreeMap::new();
        sizes.insert(String::new(), "67108864".to_string());
        sizes.insert("lz4".to_string(), "53862400".to_string());
        overrides.insert("gki_boot_img_sizes".to_string(), ConfigValue::Map(sizes));
        let mut graph = BuildGraph::new();
        compose(&mut graph, Arch::Aarch64, &aarch64_config(overrides), &GlobalOverrides::default()).unwrap();
        assert_eq!(
            graph.get("kernel_aarch64_gki_artifacts").unwrap().outputs,
            vec!["boot.img", "boot-lz4.img"]
        );
    }
}
