use anyhow::{Context, Result};
use clap::Parser;
use std::fs;

use kbuild_graph::abi::flatten_symbol_list;
use kbuild_graph::cache::{load_base_tags, CacheDirector, PreparedSlot};
use kbuild_graph::cli::{CachePrepareArgs, Cli, Command, FetchArgs, FlattenArgs, PlanArgs};
use kbuild_graph::config::ConfigManager;
use kbuild_graph::download::{
    resolve_build_number, DownloadOrchestrator, DownloadSpec, HttpFetcher, Mode, BUILD_NUMBER_ENV,
};
use kbuild_graph::log_collector::{default_log_dir, LogCollector};
use kbuild_graph::orchestrator::{Orchestrator, Plan};
use kbuild_graph::prebuilt::{ModuleOutsSource, PrebuiltResolver};
use kbuild_graph::AppError;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Fatal before anything else runs.
    cli.cache_options()
        .validate()
        .map_err(|e| anyhow::anyhow!(AppError::from(e).user_message()))?;

    let log_dir = cli.log_dir.clone().unwrap_or_else(default_log_dir);
    let collector = LogCollector::new(&log_dir, log::LevelFilter::Debug, cli.console_level())
        .with_context(|| format!("failed to initialize logging in {}", log_dir.display()))?;
    let flusher = collector.clone();
    if let Err(e) = collector.install() {
        eprintln!("warning: failed to install logger: {}", e);
    }
    log::info!("[Main] kbuild-graph {}", kbuild_graph::VERSION);

    let result = match &cli.command {
        Command::Plan(args) => cmd_plan(&cli, args),
        Command::Fetch(args) => cmd_fetch(args).await,
        Command::CachePrepare(args) => cmd_cache_prepare(&cli, args),
        Command::FlattenSymbolList(args) => cmd_flatten(args),
    };

    if let Err(e) = &result {
        log::error!("{}", e.user_message());
    }
    let _ = flusher.wait_for_empty();

    result.map_err(|e| anyhow::anyhow!(e.user_message()))
}

fn orchestrator(cli: &Cli) -> kbuild_graph::Result<Orchestrator> {
    let manager = ConfigManager::new(&cli.kernel_dir, cli.target_configs.as_deref())?;
    Ok(Orchestrator::new(manager, cli.global_overrides()))
}

fn cmd_plan(cli: &Cli, args: &PlanArgs) -> kbuild_graph::Result<()> {
    let orch = orchestrator(cli)?;
    let plan = orch.plan()?;

    if args.json {
        let json = serde_json::to_string_pretty(&plan).map_err(kbuild_graph::ConfigError::from)?;
        println!("{}", json);
        return Ok(());
    }
    print_plan(&plan)?;

    let resolver = PrebuiltResolver::new(args.use_prebuilt, "out");
    for (node, source) in orch.module_outs_files(&plan, &resolver, &args.prebuilt_repo)? {
        match source {
            ModuleOutsSource::Remote { label } => println!("{:<16} {} <- {}", "module_outs", node, label),
            ModuleOutsSource::OutputGroup { group, .. } => {
                println!("{:<16} {} <- output group {}", "module_outs", node, group)
            }
        }
    }
    Ok(())
}

fn print_plan(plan: &Plan) -> kbuild_graph::Result<()> {
    let trims: std::collections::HashMap<String, _> = plan.trim_report()?.into_iter().collect();
    for name in &plan.order {
        let Some(node) = plan.graph.get(name) else {
            continue;
        };
        match trims.get(name) {
            Some(trim) => println!("{:<16} {} (trim: {})", node.phase, name, trim),
            None => println!("{:<16} {}", node.phase, name),
        }
    }
    for (phase, count) in plan.phase_summary() {
        log::info!(target: "parsed", "[Main] {}: {} nodes", phase, count);
    }
    Ok(())
}

async fn cmd_fetch(args: &FetchArgs) -> kbuild_graph::Result<()> {
    let spec = DownloadSpec::from_file(&args.download_config)?;
    let mode = match &args.local_artifact_path {
        Some(root) => Mode::LocalSymlink { root: root.clone() },
        None => {
            let env_value = std::env::var(BUILD_NUMBER_ENV).ok();
            Mode::RemoteDownload {
                url_fmt: args.url_fmt.clone(),
                build_number: resolve_build_number(
                    env_value.as_deref(),
                    &args.repo_name,
                    args.build_number.as_deref(),
                )?,
                target: args.target.clone(),
            }
        }
    };

    let downloader = DownloadOrchestrator::new(HttpFetcher::new(), &args.repo_name, &args.repo_dir);
    let descriptor = downloader.resolve_and_write(&spec, &mode).await?;
    println!(
        "{}",
        args.repo_dir
            .join(kbuild_graph::download::DESCRIPTOR_FILE)
            .display()
    );
    log::info!(
        target: "parsed",
        "[Main] @{}: {} files declared",
        descriptor.repo_name(),
        descriptor.files().len()
    );
    Ok(())
}

fn cmd_cache_prepare(cli: &Cli, args: &CachePrepareArgs) -> kbuild_graph::Result<()> {
    let base_tags = load_base_tags(args.cache_tags.as_deref())?;
    let Some(director) = CacheDirector::from_options(&cli.cache_options(), base_tags)? else {
        println!("# output cache disabled; pass --config=local --cache_dir=<dir>");
        return Ok(());
    };

    let prepared: Vec<(String, PreparedSlot)> = match &args.label {
        Some(label) => {
            let fragments = (!args.defconfig_fragments.is_empty())
                .then_some(args.defconfig_fragments.as_slice());
            let slot = director.prepare(label, &args.target_dir, &args.scope, fragments)?;
            vec![(label.clone(), slot)]
        }
        None => {
            let orch = orchestrator(cli)?;
            let plan = orch.plan()?;
            orch.prepare_cache(&plan, &director)?
                .into_iter()
                .map(|(arch, slot)| (arch.name().to_string(), slot))
                .collect()
        }
    };

    for (label, prepared) in &prepared {
        println!("### {} ({})", label, prepared.slot.fingerprint);
        println!("## setup");
        print!("{}", prepared.setup_script);
        println!("## cleanup");
        print!("{}", prepared.cleanup_script);
        if args.update_last {
            director.ensure_out_dir(&prepared.slot)?;
            director.update_last_link(&prepared.slot)?;
        }
    }
    Ok(())
}

fn cmd_flatten(args: &FlattenArgs) -> kbuild_graph::Result<()> {
    let content = fs::read_to_string(&args.input)?;
    let symbols = flatten_symbol_list(&content)?;
    let mut text = symbols.join("\n");
    text.push('\n');

    match &args.output {
        Some(path) => fs::write(path, text)?,
        None => print!("{}", text),
    }
    log::info!(target: "parsed", "[Main] flattened {} symbols", symbols.len());
    Ok(())
}
