//! Artifact Cache Director
//!
//! Maps a target's config tags to a slot under `--cache_dir`. The slot is
//! named by the first 8 hex digits of the SHA-256 of the canonical tag
//! document; the document itself is kept in the slot and reconciled on each
//! use so operators can tell what a slot was built for.
//!
//! The `last_<scope>` link is advisory. It is replaced without locking and
//! concurrent builds simply race on it.

use crate::error::{CacheError, ConfigError};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Tag document stored in each slot.
pub const CONFIG_TAGS_FILE: &str = "kleaf_config_tags.json";

/// Variable the setup script exports.
pub const OUT_DIR_VAR: &str = "OUT_DIR";

const TARGET_TAG: &str = "_target";
const DEFCONFIG_FRAGMENTS_TAG: &str = "_defconfig_fragments";
const FINGERPRINT_LEN: usize = 8;

/// Caching flags from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub cache_dir: Option<PathBuf>,
    /// `--config=local`
    pub local: bool,
}

impl CacheOptions {
    /// Local mode needs a cache root. Checked at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local && self.cache_dir.is_none() {
            return Err(ConfigError::CacheMisconfigured);
        }
        Ok(())
    }

    /// Cache root when local caching is active.
    pub fn active_root(&self) -> Result<Option<&Path>, ConfigError> {
        self.validate()?;
        Ok(if self.local {
            self.cache_dir.as_deref()
        } else {
            None
        })
    }
}

/// A resolved cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheSlot {
    pub fingerprint: String,
    /// `<cache_root>/<fingerprint>`
    pub dir: PathBuf,
    /// `<cache_root>/<fingerprint>/<target_dir>`
    pub out_dir: PathBuf,
    /// `<cache_root>/last_<scope>`
    pub last_link: PathBuf,
}

/// Result of [`CacheDirector::prepare`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedSlot {
    pub slot: CacheSlot,
    pub setup_script: String,
    pub cleanup_script: String,
}

/// Owns the cache root and the common base tags.
#[derive(Debug, Clone)]
pub struct CacheDirector {
    root: PathBuf,
    base_tags: Map<String, Value>,
}

impl CacheDirector {
    pub fn new(root: impl Into<PathBuf>, base_tags: Value) -> Result<Self, CacheError> {
        match base_tags {
            Value::Object(base_tags) => Ok(CacheDirector {
                root: root.into(),
                base_tags,
            }),
            other => Err(CacheError::NotAnObject(other.to_string())),
        }
    }

    /// Director for the active options, or `None` when caching is off.
    pub fn from_options(options: &CacheOptions, base_tags: Value) -> crate::Result<Option<Self>> {
        match options.active_root()? {
            Some(root) => Ok(Some(Self::new(root, base_tags)?)),
            None => Ok(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tag set for `label`: base tags plus `_target` and, if given,
    /// `_defconfig_fragments`.
    pub fn config_tags(
        &self,
        label: &str,
        defconfig_fragments: Option<&[PathBuf]>,
    ) -> Result<Map<String, Value>, CacheError> {
        let mut tags = self.base_tags.clone();
        tags.insert(TARGET_TAG.to_string(), Value::String(label.to_string()));

        if let Some(fragments) = defconfig_fragments {
            if tags.contains_key(DEFCONFIG_FRAGMENTS_TAG) {
                return Err(CacheError::DuplicateTag(DEFCONFIG_FRAGMENTS_TAG.to_string()));
            }
            let list = fragments
                .iter()
                .map(|p| Value::String(p.display().to_string()))
                .collect();
            tags.insert(DEFCONFIG_FRAGMENTS_TAG.to_string(), Value::Array(list));
        }
        Ok(tags)
    }

    /// Slot paths for a fingerprint.
    pub fn slot(&self, fingerprint: &str, target_dir: &str, scope: &str) -> CacheSlot {
        let dir = self.root.join(fingerprint);
        CacheSlot {
            fingerprint: fingerprint.to_string(),
            out_dir: dir.join(target_dir),
            dir,
            last_link: self.root.join(format!("last_{}", scope)),
        }
    }

    /// Fingerprint the target, reconcile the slot's tag file and emit the
    /// setup and cleanup scripts.
    pub fn prepare(
        &self,
        label: &str,
        target_dir: &str,
        scope: &str,
        defconfig_fragments: Option<&[PathBuf]>,
    ) -> Result<PreparedSlot, CacheError> {
        let tags = self.config_tags(label, defconfig_fragments)?;
        let fp = fingerprint(&tags)?;
        let slot = self.slot(&fp, target_dir, scope);

        fs::create_dir_all(&slot.dir)?;
        reconcile_tags(&slot.dir.join(CONFIG_TAGS_FILE), &tags)?;

        let header = comment_json(&tags)?;
        let setup_script = format!(
            "{header}\nexport {var}={out_dir}\nmkdir -p \"${{{var}}}\"\n",
            header = header,
            var = OUT_DIR_VAR,
            out_dir = shell_quote(&slot.out_dir.display().to_string()),
        );
        let cleanup_script = format!(
            "ln -sfn {} {}\n",
            shell_quote(&slot.dir.display().to_string()),
            shell_quote(&slot.last_link.display().to_string()),
        );

        log::info!(
            target: "parsed",
            "[Cache] {} -> slot {} ({})",
            label,
            fp,
            slot.out_dir.display()
        );
        Ok(PreparedSlot {
            slot,
            setup_script,
            cleanup_script,
        })
    }

    /// Create the slot's output directory. Idempotent.
    pub fn ensure_out_dir(&self, slot: &CacheSlot) -> io::Result<()> {
        fs::create_dir_all(&slot.out_dir)
    }

    /// Point `last_<scope>` at the slot, replacing any previous link.
    pub fn update_last_link(&self, slot: &CacheSlot) -> io::Result<()> {
        let tmp = slot.last_link.with_file_name(format!(
            ".{}.tmp.{}",
            slot.last_link
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            std::process::id()
        ));
        if fs::symlink_metadata(&tmp).is_ok() {
            fs::remove_file(&tmp)?;
        }
        std::os::unix::fs::symlink(&slot.dir, &tmp)?;
        fs::rename(&tmp, &slot.last_link)?;
        log::debug!(
            "[Cache] {} -> {}",
            slot.last_link.display(),
            slot.dir.display()
        );
        Ok(())
    }
}

/// Read a base tag file; a missing file is an empty tag set.
pub fn load_base_tags(path: Option<&Path>) -> Result<Value, CacheError> {
    let Some(path) = path else {
        return Ok(Value::Object(Map::new()));
    };
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text).map_err(|source| CacheError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if !value.is_object() {
        return Err(CacheError::NotAnObject(value.to_string()));
    }
    Ok(value)
}

/// Sorted keys, 4-space indent.
pub fn canonical_json(tags: &Map<String, Value>) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    tags.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// First 8 hex digits of the SHA-256 of the canonical document.
pub fn fingerprint(tags: &Map<String, Value>) -> Result<String, CacheError> {
    let json = canonical_json(tags).map_err(|source| CacheError::Json {
        path: PathBuf::new(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    Ok(digest[..FINGERPRINT_LEN].to_string())
}

/// Merge `tags` into the document at `path`; current values win.
///
/// Written via tmp + rename. Divergent concurrent writers may lose keys.
pub fn reconcile_tags(path: &Path, tags: &Map<String, Value>) -> Result<Map<String, Value>, CacheError> {
    let existing = if path.is_file() {
        let text = fs::read_to_string(path)?;
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Some(map),
            Ok(other) => return Err(CacheError::NotAnObject(other.to_string())),
            Err(source) => {
                return Err(CacheError::Json {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    } else {
        None
    };

    let mut merged = existing.clone().unwrap_or_default();
    for (key, value) in tags {
        merged.insert(key.clone(), value.clone());
    }

    if existing.as_ref() != Some(&merged) {
        if existing.is_some() {
            log::warn!("[Cache] reconciling divergent tags in {}", path.display());
        }
        let json = canonical_json(&merged).map_err(|source| CacheError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let tmp_path = path.with_extension(format!("json.tmp.{}", std::process::id()));
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, path)?;
    }
    Ok(merged)
}

fn comment_json(tags: &Map<String, Value>) -> Result<String, CacheError> {
    let json = canonical_json(tags).map_err(|source| CacheError::Json {
        path: PathBuf::new(),
        source,
    })?;
    Ok(json
        .lines()
        .map(|line| format!("# {}", line))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
