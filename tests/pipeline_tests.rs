//! End-to-end tests: kernel tree -> plan -> prebuilt substitution.

use futures::future::{BoxFuture, FutureExt};
use kbuild_graph::abi::{flatten_symbol_list, GlobalOverrides, TrimState};
use kbuild_graph::cache::CacheDirector;
use kbuild_graph::config::ConfigManager;
use kbuild_graph::download::{
    DownloadEntry, DownloadOrchestrator, DownloadSpec, FetchStatus, Fetcher, Mode,
};
use kbuild_graph::error::{AppError, DownloadError};
use kbuild_graph::models::Arch;
use kbuild_graph::orchestrator::{BuildPhase, Orchestrator};
use kbuild_graph::prebuilt::{ModuleOutsSource, PrebuiltResolver};
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Serves every URL with its own text.
struct EchoFetcher;

impl Fetcher for EchoFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<FetchStatus, DownloadError>> {
        async move {
            tokio::fs::write(dest, url).await?;
            Ok(FetchStatus::Fetched)
        }
        .boxed()
    }
}

fn kernel_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let android = dir.path().join("android");
    fs::create_dir_all(&android).unwrap();
    fs::write(
        android.join("abi_gki_aarch64"),
        "[abi_symbol_list]\n  __tracepoint_foo\n  __traceiter_foo\n  kmalloc\n",
    )
    .unwrap();
    fs::write(android.join("abi_gki_aarch64_pixel"), "[abi_symbol_list]\n  kfree\n").unwrap();
    fs::write(
        dir.path().join("build.config.constants"),
        "BRANCH=android15-6.6\nCLANG_VERSION=r510928\n",
    )
    .unwrap();
    dir
}

fn orchestrator(tree: &TempDir, overrides: GlobalOverrides) -> Orchestrator {
    Orchestrator::new(ConfigManager::new(tree.path(), None).unwrap(), overrides)
}

#[test]
fn test_plan_from_kernel_tree() {
    let tree = kernel_tree();
    let plan = orchestrator(
        &tree,
        GlobalOverrides {
            exec_toolchain_version: Some("r510928".to_string()),
            ..Default::default()
        },
    )
    .plan()
    .unwrap();

    assert!(plan.graph.contains("kernel_aarch64_abi_symbollist"));
    assert!(!plan.graph.contains("kernel_x86_64_abi_symbollist"));
    assert_eq!(
        plan.graph.get("kernel_aarch64_all_kmi_symbol_lists").unwrap().outputs,
        vec!["android/abi_gki_aarch64_pixel", "android/abi_gki_aarch64"]
    );
    assert_eq!(
        plan.graph.get("kernel_aarch64_dist").unwrap().attrs["dist_dir"],
        "out/android15-6.6/dist"
    );

    let report = plan.trim_report().unwrap();
    let aarch64 = report.iter().find(|(n, _)| n == "kernel_aarch64").unwrap();
    assert_eq!(aarch64.1, TrimState::Enabled);
    let x86 = report.iter().find(|(n, _)| n == "kernel_x86_64").unwrap();
    assert_eq!(x86.1, TrimState::Unknown);

    // Build order respects phases within each architecture.
    let position = |name: &str| plan.order.iter().position(|n| n == name).unwrap();
    assert!(position("kernel_aarch64_sources") < position("kernel_aarch64"));
    assert!(position("kernel_aarch64") < position("kernel_aarch64_images"));
    assert!(position("kernel_aarch64_images") < position("kernel_aarch64_dist"));
    assert_eq!(plan.phase_summary()[&BuildPhase::Sources], Arch::ALL.len());
}

#[test]
fn test_toolchain_mismatch_is_fatal() {
    let tree = kernel_tree();
    let err = orchestrator(
        &tree,
        GlobalOverrides {
            exec_toolchain_version: Some("r487747c".to_string()),
            ..Default::default()
        },
    )
    .plan()
    .unwrap_err();
    let AppError::Toolchain(mismatch) = err else {
        panic!("expected toolchain mismatch");
    };
    assert_eq!(mismatch.expected, "r510928");
    assert_eq!(mismatch.actual, "r487747c");
}

#[tokio::test]
async fn test_prebuilt_substitution_is_uniform() {
    let tree = kernel_tree();
    let orch = orchestrator(&tree, GlobalOverrides::default());
    let plan = orch.plan().unwrap();

    let repo = TempDir::new().unwrap();
    let downloader = DownloadOrchestrator::new(EchoFetcher, "gki_prebuilts", repo.path());
    let spec = DownloadSpec::new(
        plan.graph
            .get("kernel_aarch64_headers")
            .unwrap()
            .outputs
            .iter()
            .map(|out| DownloadEntry {
                local_id: out.clone(),
                remote_filename_fmt: out.clone(),
                mandatory: true,
            })
            .collect(),
    )
    .unwrap();
    let mode = Mode::RemoteDownload {
        url_fmt: "https://ci.example/{build_number}/{target}/{filename}".to_string(),
        build_number: Some("42".to_string()),
        target: "kernel_aarch64".to_string(),
    };
    let descriptor = orch.fetch_prebuilts(&downloader, &spec, &mode).await.unwrap();

    let prebuilt = orch
        .resolve_artifacts(
            &plan,
            &PrebuiltResolver::new(true, "out"),
            "kernel_aarch64_headers",
            Some(&descriptor),
        )
        .unwrap();
    let built = orch
        .resolve_artifacts(
            &plan,
            &PrebuiltResolver::new(false, "out"),
            "kernel_aarch64_headers",
            Some(&descriptor),
        )
        .unwrap();

    assert_eq!(
        prebuilt.keys().collect::<Vec<_>>(),
        built.keys().collect::<Vec<_>>()
    );
    let header = &prebuilt["kernel-headers.tar.gz"];
    assert!(header.is_prebuilt());
    assert!(header.exists());
    assert_eq!(
        fs::read_to_string(header.path()).unwrap(),
        "https://ci.example/42/kernel_aarch64/kernel-headers.tar.gz"
    );
    assert!(!built["kernel-headers.tar.gz"].is_prebuilt());
}

#[test]
fn test_cache_slots_for_plan() {
    let tree = kernel_tree();
    let orch = orchestrator(&tree, GlobalOverrides::default());
    let plan = orch.plan().unwrap();

    let cache = TempDir::new().unwrap();
    let director = CacheDirector::new(cache.path(), json!({})).unwrap();
    let slots = orch.prepare_cache(&plan, &director).unwrap();

    assert_eq!(slots.len(), Arch::ALL.len());
    let mut fingerprints: Vec<&str> = slots.iter().map(|(_, p)| p.slot.fingerprint.as_str()).collect();
    fingerprints.sort();
    fingerprints.dedup();
    assert_eq!(fingerprints.len(), Arch::ALL.len());
}

#[test]
fn test_flatten_scanned_symbol_list() {
    let tree = kernel_tree();
    let content = fs::read_to_string(tree.path().join("android/abi_gki_aarch64")).unwrap();
    assert_eq!(
        flatten_symbol_list(&content).unwrap(),
        vec!["__traceiter_foo", "__tracepoint_foo", "kmalloc"]
    );
}

#[test]
fn test_module_outs_source_follows_prebuilt_flag() {
    let tree = kernel_tree();
    let orch = orchestrator(&tree, GlobalOverrides::default());
    let plan = orch.plan().unwrap();

    let prebuilt = orch
        .module_outs_files(&plan, &PrebuiltResolver::new(true, "out"), "gki_prebuilts")
        .unwrap();
    assert_eq!(prebuilt.len(), Arch::ALL.len());
    let (node, source) = prebuilt.iter().find(|(n, _)| n == "kernel_aarch64").unwrap();
    assert_eq!(node, "kernel_aarch64");
    assert_eq!(
        *source,
        ModuleOutsSource::Remote {
            label: "@gki_prebuilts//:kernel_aarch64_modules".to_string()
        }
    );

    let built = orch
        .module_outs_files(&plan, &PrebuiltResolver::new(false, "out"), "gki_prebuilts")
        .unwrap();
    assert!(built.iter().all(|(node, source)| matches!(
        source,
        ModuleOutsSource::OutputGroup { node: n, group } if n == node && group == "module_outs_file"
    )));
}
