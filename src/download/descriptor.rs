//! Generated build descriptor for a resolved artifact repository.
//!
//! Each local file becomes one of three shapes that consumers pattern-match:
//! an exported file, an empty filegroup (skipped optional file), or a failing
//! placeholder carrying the deferred error message.

use crate::error::DeferredResolutionFailure;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the descriptor written into the repository directory.
pub const DESCRIPTOR_FILE: &str = "BUILD.bazel";

/// Rule file written next to the descriptor; defines `fail_rule`.
pub const FAIL_RULE_FILE: &str = "fail.bzl";

const FAIL_RULE_LOAD: &str = r#"load("//:fail.bzl", "fail_rule")"#;

/// Fails at analysis time, so only targets that consume it break.
const FAIL_RULE_BZL: &str = r#"# Generated. Do not edit.

def _fail_rule_impl(ctx):
    fail(ctx.attr.message)

fail_rule = rule(
    implementation = _fail_rule_impl,
    attrs = {
        "message": attr.string(mandatory = True),
    },
)
"#;

/// Result of materializing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The file is available at `path`.
    Success { path: PathBuf },
    /// Optional file unavailable; consumers see an empty file set.
    Skipped { reason: String },
    /// Error raised only when the file is consumed.
    FailLater { message: String },
    /// Mandatory file unavailable; fails the whole resolution. `source` is
    /// the URL or path that was tried.
    FailNow { message: String, source: String },
}

/// One declared file and how it resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub local_id: String,
    pub outcome: Outcome,
}

/// Joined outcomes of a repository, in file-declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    repo_name: String,
    files: Vec<FileOutcome>,
}

impl RepositoryDescriptor {
    pub fn new(repo_name: impl Into<String>, files: Vec<FileOutcome>) -> Self {
        RepositoryDescriptor {
            repo_name: repo_name.into(),
            files,
        }
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn files(&self) -> &[FileOutcome] {
        &self.files
    }

    pub fn get(&self, local_id: &str) -> Option<&Outcome> {
        self.files
            .iter()
            .find(|f| f.local_id == local_id)
            .map(|f| &f.outcome)
    }

    /// Consume a file: `Some(path)` when present, `None` for an empty
    /// placeholder, or the deferred error.
    pub fn realize(&self, local_id: &str) -> Result<Option<&Path>, DeferredResolutionFailure> {
        let target = format!("@{}//:{}", self.repo_name, local_id);
        match self.get(local_id) {
            Some(Outcome::Success { path }) => Ok(Some(path.as_path())),
            Some(Outcome::Skipped { .. }) => Ok(None),
            Some(Outcome::FailLater { message }) | Some(Outcome::FailNow { message, .. }) => {
                Err(DeferredResolutionFailure {
                    target,
                    message: message.clone(),
                })
            }
            None => Err(DeferredResolutionFailure {
                target,
                message: "no such file declared in the repository".to_string(),
            }),
        }
    }

    /// Render the descriptor text. Output order follows declaration order.
    pub fn render(&self) -> String {
        self.to_string()
    }

    fn needs_fail_rule(&self) -> bool {
        self.files
            .iter()
            .any(|f| matches!(f.outcome, Outcome::FailLater { .. } | Outcome::FailNow { .. }))
    }

    /// Write the rule file and the rendered descriptor into `repo_dir`.
    /// Each file is replaced in one step.
    pub fn write_to(&self, repo_dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(repo_dir)?;
        write_replace(&repo_dir.join(FAIL_RULE_FILE), FAIL_RULE_BZL)?;
        let path = repo_dir.join(DESCRIPTOR_FILE);
        write_replace(&path, &self.render())?;
        Ok(path)
    }
}

impl fmt::Display for RepositoryDescriptor {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(out, "# Generated for repository \"{}\". Do not edit.", self.repo_name)?;
        if self.needs_fail_rule() {
            writeln!(out, "\n{}", FAIL_RULE_LOAD)?;
        }

        for file in &self.files {
            let name = quote(&file.local_id);
            writeln!(out)?;
            match &file.outcome {
                Outcome::Success { .. } => {
                    writeln!(out, "exports_files(")?;
                    writeln!(out, "    [{}],", name)?;
                }
                Outcome::Skipped { reason } => {
                    writeln!(out, "# {}", reason.replace('\n', " "))?;
                    writeln!(out, "filegroup(")?;
                    writeln!(out, "    name = {},", name)?;
                    writeln!(out, "    srcs = [],")?;
                }
                Outcome::FailLater { message } | Outcome::FailNow { message, .. } => {
                    writeln!(out, "fail_rule(")?;
                    writeln!(out, "    name = {},", name)?;
                    writeln!(out, "    message = {},", quote(message))?;
                }
            }
            writeln!(out, "    visibility = [\"//visibility:public\"],")?;
            writeln!(out, ")")?;
        }
        Ok(())
    }
}

fn write_replace(path: &Path, content: &str) -> io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, path)
}

/// Double-quoted string literal with escapes.
fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
