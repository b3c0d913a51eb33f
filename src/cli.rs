//! Command-line interface definitions for kbuild-graph.

use crate::abi::trim::GlobalOverrides;
use crate::cache::CacheOptions;
use crate::download::DEFAULT_URL_FMT;
use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

/// Kernel build-graph planner.
#[derive(Parser, Debug)]
#[command(name = "kbuild-graph", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Root directory for cached build output directories.
    #[arg(long = "cache_dir", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Named configs; `--config=local` enables the output cache.
    #[arg(long = "config", global = true)]
    pub config: Vec<String>,

    /// Common kernel source tree.
    #[arg(long = "kernel_dir", global = true, default_value = "common")]
    pub kernel_dir: PathBuf,

    /// Per-target override table (.json or .toml).
    #[arg(long = "target_configs", global = true)]
    pub target_configs: Option<PathBuf>,

    /// Disable trimming of non-listed KMI symbols everywhere.
    #[arg(long = "force_disable_trim", global = true)]
    pub force_disable_trim: bool,

    /// Toolchain version of the execution platform.
    #[arg(long = "exec_toolchain_version", global = true)]
    pub exec_toolchain_version: Option<String>,

    /// Log directory (defaults to the user cache directory).
    #[arg(long = "log_dir", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Increase console verbosity (-v, -vv).
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve target configs and print the composed build graph.
    Plan(PlanArgs),
    /// Resolve a prebuilt repository and write its build descriptor.
    Fetch(FetchArgs),
    /// Compute cache slots and print their setup and cleanup scripts.
    CachePrepare(CachePrepareArgs),
    /// Flatten a KMI symbol list into a sorted raw list.
    FlattenSymbolList(FlattenArgs),
}

#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,

    /// Take kernel build outputs from the prebuilt repository.
    #[arg(long = "use_prebuilt_gki")]
    pub use_prebuilt: bool,

    /// Prebuilt repository consulted with --use_prebuilt_gki.
    #[arg(long = "prebuilt_repo", default_value = "gki_prebuilts")]
    pub prebuilt_repo: String,
}

#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Repository name; also the key in the build number list.
    #[arg(long = "repo_name", default_value = "gki_prebuilts")]
    pub repo_name: String,

    /// Download spec (JSON).
    #[arg(long = "download_config")]
    pub download_config: PathBuf,

    /// Directory the repository is materialized into.
    #[arg(long = "repo_dir")]
    pub repo_dir: PathBuf,

    /// Remote build target.
    #[arg(long = "target", default_value = "kernel_aarch64")]
    pub target: String,

    /// Remote URL template.
    #[arg(long = "url_fmt", default_value = DEFAULT_URL_FMT)]
    pub url_fmt: String,

    /// Symlink from this directory instead of downloading.
    #[arg(long = "local_artifact_path")]
    pub local_artifact_path: Option<PathBuf>,

    /// Build number used when the environment list has no entry.
    #[arg(long = "build_number")]
    pub build_number: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CachePrepareArgs {
    /// Common cache tags (JSON object).
    #[arg(long = "cache_tags")]
    pub cache_tags: Option<PathBuf>,

    /// Single target label; defaults to every planned architecture.
    #[arg(long)]
    pub label: Option<String>,

    /// Subdirectory of the slot used as the output directory.
    #[arg(long = "target_dir", default_value = "common")]
    pub target_dir: String,

    /// Scope of the `last_<scope>` link when `--label` is given.
    #[arg(long, default_value = "build")]
    pub scope: String,

    /// Defconfig fragments recorded in the tags of `--label`.
    #[arg(long = "defconfig_fragment")]
    pub defconfig_fragments: Vec<PathBuf>,

    /// Also create the output directories and update the `last_` links.
    #[arg(long = "update_last")]
    pub update_last: bool,
}

#[derive(Parser, Debug)]
pub struct FlattenArgs {
    /// Symbol list in libabigail format.
    pub input: PathBuf,

    /// Output file (stdout if omitted).
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

impl Cli {
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            cache_dir: self.cache_dir.clone(),
            local: self.config.iter().any(|c| c == "local"),
        }
    }

    pub fn global_overrides(&self) -> GlobalOverrides {
        GlobalOverrides {
            force_disable_trim: self.force_disable_trim,
            branch: None,
            exec_toolchain_version: self.exec_toolchain_version.clone(),
        }
    }

    pub fn console_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
