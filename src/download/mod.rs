//! Download Orchestrator
//!
//! Materializes the files a prebuilt repository declares, either by
//! symlinking from a local artifact store or by fetching a templated remote
//! URL. Each file resolves independently; the outcomes are joined in
//! declaration order into a [`RepositoryDescriptor`].
//!
//! Mandatory failures abort the resolution. Optional failures degrade to an
//! empty placeholder. A missing build number for a template that needs one
//! is deferred: the placeholder only fails when the file is consumed.

pub mod build_number;
pub mod descriptor;
pub mod transport;

pub use build_number::{parse_build_number_map, resolve_build_number, BUILD_NUMBER_ENV};
pub use descriptor::{FileOutcome, Outcome, RepositoryDescriptor, DESCRIPTOR_FILE, FAIL_RULE_FILE};
pub use transport::{FetchStatus, Fetcher, HttpFetcher};

use crate::error::DownloadError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Default remote artifact location; placeholders are filled per file.
pub const DEFAULT_URL_FMT: &str = "https://androidbuildinternal.googleapis.com/android/internal/build/v3/builds/{build_number}/{target}/attempts/latest/artifacts/{filename}/url?redirect=true";

const SENTINEL_A: &str = "__kbuild_graph_sentinel_a__";
const SENTINEL_B: &str = "__kbuild_graph_sentinel_b__";

/// One declared file of a prebuilt repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadEntry {
    pub local_id: String,
    /// Remote file name; may use `{build_number}` and `{target}`.
    pub remote_filename_fmt: String,
    #[serde(default = "default_mandatory")]
    pub mandatory: bool,
}

fn default_mandatory() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct EntryBody {
    remote_filename_fmt: String,
    #[serde(default = "default_mandatory")]
    mandatory: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpecFile {
    List(Vec<DownloadEntry>),
    Map(BTreeMap<String, EntryBody>),
}

/// Ordered, duplicate-free set of declared files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSpec {
    entries: Vec<DownloadEntry>,
}

impl DownloadSpec {
    pub fn new(entries: Vec<DownloadEntry>) -> Result<Self, DownloadError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.local_id.as_str()) {
                return Err(DownloadError::InvalidSpec(format!(
                    "local file '{}' declared more than once",
                    entry.local_id
                )));
            }
        }
        Ok(DownloadSpec { entries })
    }

    /// Parse either an array of entries or an object keyed by local id.
    /// Object form is ordered by key.
    pub fn from_json(text: &str) -> Result<Self, DownloadError> {
        let parsed: SpecFile = serde_json::from_str(text)
            .map_err(|e| DownloadError::InvalidSpec(e.to_string()))?;
        let entries = match parsed {
            SpecFile::List(entries) => entries,
            SpecFile::Map(map) => map
                .into_iter()
                .map(|(local_id, body)| DownloadEntry {
                    local_id,
                    remote_filename_fmt: body.remote_filename_fmt,
                    mandatory: body.mandatory,
                })
                .collect(),
        };
        Self::new(entries)
    }

    pub fn from_file(path: &Path) -> Result<Self, DownloadError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn entries(&self) -> &[DownloadEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Symlink `<root>/<local_id>` into the repository.
    LocalSymlink { root: PathBuf },
    /// Fetch from a URL template.
    RemoteDownload {
        url_fmt: String,
        build_number: Option<String>,
        target: String,
    },
}

/// Fill `{build_number}`, `{target}` and `{filename}`.
pub fn expand(fmt: &str, build_number: &str, target: &str, filename: &str) -> String {
    fmt.replace("{build_number}", build_number)
        .replace("{target}", target)
        .replace("{filename}", filename)
}

/// Whether the final URL for `entry` changes with the build number.
pub fn depends_on_build_number(url_fmt: &str, entry: &DownloadEntry, target: &str) -> bool {
    let with = |sentinel: &str| {
        let filename = expand(&entry.remote_filename_fmt, sentinel, target, &entry.local_id);
        expand(url_fmt, sentinel, target, &filename)
    };
    with(SENTINEL_A) != with(SENTINEL_B)
}

/// Resolves one repository's files into `repo_dir`.
pub struct DownloadOrchestrator<F: Fetcher> {
    fetcher: F,
    repo_name: String,
    repo_dir: PathBuf,
}

impl<F: Fetcher> DownloadOrchestrator<F> {
    pub fn new(fetcher: F, repo_name: impl Into<String>, repo_dir: impl Into<PathBuf>) -> Self {
        DownloadOrchestrator {
            fetcher,
            repo_name: repo_name.into(),
            repo_dir: repo_dir.into(),
        }
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Materialize a single file.
    pub async fn materialize(&self, entry: &DownloadEntry, mode: &Mode) -> Outcome {
        match mode {
            Mode::LocalSymlink { root } => self.link_local(entry, root).await,
            Mode::RemoteDownload {
                url_fmt,
                build_number,
                target,
            } => {
                self.download_remote(entry, url_fmt, build_number.as_deref(), target)
                    .await
            }
        }
    }

    async fn link_local(&self, entry: &DownloadEntry, root: &Path) -> Outcome {
        let source = root.join(&entry.local_id);
        if !source.exists() {
            let message = format!(
                "{} not found under local artifact path {}",
                entry.local_id,
                root.display()
            );
            return self.unavailable(entry, source.display().to_string(), message);
        }

        let dest = self.repo_dir.join(&entry.local_id);
        match symlink_replace(&source, &dest).await {
            Ok(()) => {
                log::debug!("[Download] linked {} -> {}", dest.display(), source.display());
                Outcome::Success { path: dest }
            }
            Err(e) => self.unavailable(
                entry,
                source.display().to_string(),
                format!("cannot link {}: {}", dest.display(), e),
            ),
        }
    }

    async fn download_remote(
        &self,
        entry: &DownloadEntry,
        url_fmt: &str,
        build_number: Option<&str>,
        target: &str,
    ) -> Outcome {
        if build_number.is_none() && depends_on_build_number(url_fmt, entry, target) {
            let message = format!(
                "ERROR: No build_number specified for @{repo}//:{file}. Fix by setting {env}=\"{repo}=<build_number>\"",
                repo = self.repo_name,
                file = entry.local_id,
                env = BUILD_NUMBER_ENV,
            );
            log::debug!("[Download] deferring {}: no build number", entry.local_id);
            return Outcome::FailLater { message };
        }

        let build_number = build_number.unwrap_or_default();
        let filename = expand(&entry.remote_filename_fmt, build_number, target, &entry.local_id);
        let url = expand(url_fmt, build_number, target, &filename);
        let dest = self.repo_dir.join(&entry.local_id);

        match self.fetcher.fetch(&url, &dest).await {
            Ok(FetchStatus::Fetched) => Outcome::Success { path: dest },
            Ok(FetchStatus::NotFound) => {
                let message = format!("{} not found at {}", entry.local_id, url);
                self.unavailable(entry, url, message)
            }
            Err(e) => {
                let message = format!("failed to download {} from {}: {}", entry.local_id, url, e);
                self.unavailable(entry, url, message)
            }
        }
    }

    /// `source` is the expanded URL or local path that was tried.
    fn unavailable(&self, entry: &DownloadEntry, source: String, message: String) -> Outcome {
        if entry.mandatory {
            log::warn!("[Download] mandatory file unavailable: {}", message);
            Outcome::FailNow { message, source }
        } else {
            log::info!("[Download] skipping optional file: {}", message);
            Outcome::Skipped { reason: message }
        }
    }

    /// Materialize every file concurrently and join in declaration order.
    pub async fn resolve_repository(
        &self,
        spec: &DownloadSpec,
        mode: &Mode,
    ) -> Result<RepositoryDescriptor, DownloadError> {
        tokio::fs::create_dir_all(&self.repo_dir).await?;

        let outcomes = futures::future::join_all(
            spec.entries().iter().map(|entry| self.materialize(entry, mode)),
        )
        .await;

        let files: Vec<FileOutcome> = spec
            .entries()
            .iter()
            .zip(outcomes)
            .map(|(entry, outcome)| FileOutcome {
                local_id: entry.local_id.clone(),
                outcome,
            })
            .collect();

        let failed = files.iter().find_map(|f| match &f.outcome {
            Outcome::FailNow { message, source } => Some((f, message, source)),
            _ => None,
        });
        if let Some((failed, message, source)) = failed {
            return Err(match mode {
                Mode::LocalSymlink { root } => DownloadError::LocalMissing {
                    file: failed.local_id.clone(),
                    root: root.clone(),
                },
                Mode::RemoteDownload { .. } => DownloadError::Failed {
                    file: failed.local_id.clone(),
                    source_url: source.clone(),
                    reason: message.clone(),
                },
            });
        }

        log::info!(
            target: "parsed",
            "[Download] resolved @{}: {} files",
            self.repo_name,
            files.len()
        );
        Ok(RepositoryDescriptor::new(self.repo_name.clone(), files))
    }

    /// Resolve and write the descriptor into the repository directory.
    pub async fn resolve_and_write(
        &self,
        spec: &DownloadSpec,
        mode: &Mode,
    ) -> Result<RepositoryDescriptor, DownloadError> {
        let descriptor = self.resolve_repository(spec, mode).await?;
        descriptor.write_to(&self.repo_dir)?;
        Ok(descriptor)
    }
}

async fn symlink_replace(source: &Path, dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::symlink_metadata(dest).await.is_ok() {
        tokio::fs::remove_file(dest).await?;
    }
    tokio::fs::symlink(source, dest).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{BoxFuture, FutureExt};
    use std::collections::HashMap;

    /// Serves canned statuses keyed by URL; unknown URLs are 404.
    struct FakeFetcher {
        responses: HashMap<String, bool>,
    }

    impl Fetcher for FakeFetcher {
        fn fetch<'a>(
            &'a self,
            url: &'a str,
            dest: &'a Path,
        ) -> BoxFuture<'a, Result<FetchStatus, DownloadError>> {
            async move {
                match self.responses.get(url) {
                    Some(true) => {
                        tokio::fs::write(dest, url.as_bytes()).await?;
                        Ok(FetchStatus::Fetched)
                    }
                    Some(false) => Err(DownloadError::InvalidSpec("boom".to_string())),
                    None => Ok(FetchStatus::NotFound),
                }
            }
            .boxed()
        }
    }

    fn entry(local_id: &str, fmt: &str, mandatory: bool) -> DownloadEntry {
        DownloadEntry {
            local_id: local_id.to_string(),
            remote_filename_fmt: fmt.to_string(),
            mandatory,
        }
    }

    #[test]
    fn test_spec_rejects_duplicates() {
        let err = DownloadSpec::new(vec![entry("a", "a", true), entry("a", "b", false)]);
        assert!(matches!(err, Err(DownloadError::InvalidSpec(_))));
    }

    #[test]
    fn test_spec_from_json_forms() {
        let list = DownloadSpec::from_json(
            r#"[{"local_id": "b", "remote_filename_fmt": "b"}, {"local_id": "a", "remote_filename_fmt": "a", "mandatory": false}]"#,
        )
        .unwrap();
        assert_eq!(list.entries()[0].local_id, "b");
        assert!(list.entries()[0].mandatory);
        assert!(!list.entries()[1].mandatory);

        let map = DownloadSpec::from_json(
            r#"{"vmlinux": {"remote_filename_fmt": "vmlinux", "mandatory": true}}"#,
        )
        .unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_build_number_dependence() {
        let plain = entry("boot.img", "boot.img", true);
        assert!(depends_on_build_number(DEFAULT_URL_FMT, &plain, "kernel_aarch64"));
        assert!(!depends_on_build_number(
            "https://mirror/{target}/{filename}",
            &plain,
            "kernel_aarch64"
        ));
        let numbered = entry("manifest.xml", "manifest_{build_number}.xml", true);
        assert!(depends_on_build_number(
            "https://mirror/{filename}",
            &numbered,
            "kernel_aarch64"
        ));
    }

    #[tokio::test]
    async fn test_remote_outcomes() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut responses = HashMap::new();
        responses.insert("https://mirror/t/boot.img".to_string(), true);
        responses.insert("https://mirror/t/broken".to_string(), false);
        let orchestrator =
            DownloadOrchestrator::new(FakeFetcher { responses }, "gki_prebuilts", dir.path());
        let mode = Mode::RemoteDownload {
            url_fmt: "https://mirror/{target}/{filename}".to_string(),
            build_number: None,
            target: "t".to_string(),
        };

        let ok = orchestrator.materialize(&entry("boot.img", "boot.img", true), &mode).await;
        assert_eq!(
            ok,
            Outcome::Success {
                path: dir.path().join("boot.img")
            }
        );
        let skipped = orchestrator.materialize(&entry("x", "x", false), &mode).await;
        assert!(matches!(skipped, Outcome::Skipped { .. }));
        let failed = orchestrator.materialize(&entry("broken", "broken", true), &mode).await;
        assert!(matches!(failed, Outcome::FailNow { .. }));
    }

    #[tokio::test]
    async fn test_mandatory_failure_aborts_resolution() {
        let dir = tempfile::TempDir::new().unwrap();
        let orchestrator = DownloadOrchestrator::new(
            FakeFetcher {
                responses: HashMap::new(),
            },
            "gki_prebuilts",
            dir.path().join("repo"),
        );
        let spec = DownloadSpec::new(vec![entry("vmlinux", "vmlinux", true)]).unwrap();
        let mode = Mode::RemoteDownload {
            url_fmt: "https://mirror/{build_number}/{filename}".to_string(),
            build_number: Some("1".to_string()),
            target: "t".to_string(),
        };
        let err = orchestrator.resolve_repository(&spec, &mode).await.unwrap_err();
        let DownloadError::Failed { file, source_url, .. } = err else {
            panic!("expected download failure");
        };
        assert_eq!(file, "vmlinux");
        assert_eq!(source_url, "https://mirror/1/vmlinux");
    }

    #[tokio::test]
    async fn test_local_symlink_mode() {
        let store = tempfile::TempDir::new().unwrap();
        let repo = tempfile::TempDir::new().unwrap();
        fs::write(store.path().join("Image"), b"kernel").unwrap();

        let orchestrator = DownloadOrchestrator::new(
            FakeFetcher {
                responses: HashMap::new(),
            },
            "gki_prebuilts",
            repo.path(),
        );
        let spec = DownloadSpec::new(vec![
            entry("Image", "Image", true),
            entry("abi_symbollist", "abi_symbollist", false),
        ])
        .unwrap();
        let mode = Mode::LocalSymlink {
            root: store.path().to_path_buf(),
        };

        let descriptor = orchestrator.resolve_repository(&spec, &mode).await.unwrap();
        let linked = repo.path().join("Image");
        assert!(fs::symlink_metadata(&linked).unwrap().file_type().is_symlink());
        assert_eq!(fs::read(&linked).unwrap(), b"kernel");
        assert!(matches!(
            descriptor.get("abi_symbollist"),
            Some(Outcome::Skipped { .. })
        ));

        // Re-running replaces the existing link.
        orchestrator.resolve_repository(&spec, &mode).await.unwrap();

        let missing = DownloadSpec::new(vec![entry("vmlinux", "vmlinux", true)]).unwrap();
        assert!(matches!(
            orchestrator.resolve_repository(&missing, &mode).await,
            Err(DownloadError::LocalMissing { .. })
        ));
    }
}
