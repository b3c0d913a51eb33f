//! Architecture defaults derived from the kernel source tree.
//!
//! Probing reads the `android/` directory of the common kernel to find KMI
//! symbol lists and ABI definitions. The scan touches the filesystem, so a
//! [`DefaultsProvider`] runs it at most once per resolution pass no matter how
//! many targets ask for defaults.

use crate::error::ConfigError;
use crate::models::{Arch, ConfigKey, ConfigValue, PartialConfig};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Directory under the kernel tree holding symbol lists and ABI definitions.
const ANDROID_DIR: &str = "android";

/// Computed defaults per architecture target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchDefaults {
    table: BTreeMap<Arch, PartialConfig>,
}

impl ArchDefaults {
    /// Build defaults from an explicit table (no probing).
    pub fn from_table(table: BTreeMap<Arch, PartialConfig>) -> Self {
        ArchDefaults { table }
    }

    /// Defaults for a target name; `None` for targets without defaults.
    pub fn get(&self, target: &str) -> Option<&PartialConfig> {
        let arch = target.parse::<Arch>().ok()?;
        self.table.get(&arch)
    }

    /// Scan `kernel_dir` and compute defaults for every architecture.
    pub fn scan(kernel_dir: &Path) -> Result<Self, ConfigError> {
        let android_dir = kernel_dir.join(ANDROID_DIR);
        let listing = list_android_dir(&android_dir)?;

        let mut table = BTreeMap::new();
        for arch in Arch::ALL {
            table.insert(arch, defaults_for(arch, &listing));
        }

        log::debug!(
            "[Defaults] Scanned {} ({} entries)",
            android_dir.display(),
            listing.len()
        );
        Ok(ArchDefaults { table })
    }
}

/// File names under `android/`, sorted. Missing directory means no files.
fn list_android_dir(dir: &Path) -> Result<Vec<String>, ConfigError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::IoError(e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(ConfigError::IoError)?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn defaults_for(arch: Arch, listing: &[String]) -> PartialConfig {
    let mut config = PartialConfig::new();
    let primary = format!("abi_gki_{}", arch.family());
    let definition = format!("{}.stg", primary);
    let additional_prefix = format!("{}_", primary);

    if listing.contains(&primary) {
        let additional: Vec<String> = listing
            .iter()
            .filter(|name| name.starts_with(&additional_prefix) && !name.ends_with(".stg"))
            .map(|name| format!("{}/{}", ANDROID_DIR, name))
            .collect();

        config.insert(
            ConfigKey::KmiSymbolList,
            ConfigValue::Str(format!("{}/{}", ANDROID_DIR, primary)),
        );
        config.insert(ConfigKey::AdditionalKmiSymbolLists, ConfigValue::List(additional));
        config.insert(ConfigKey::TrimNonlistedKmi, ConfigValue::Bool(true));
        config.insert(ConfigKey::KmiSymbolListStrictMode, ConfigValue::Bool(true));
    }

    if listing.contains(&definition) {
        config.insert(
            ConfigKey::AbiDefinition,
            ConfigValue::Str(format!("{}/{}", ANDROID_DIR, definition)),
        );
        config.insert(ConfigKey::KmiEnforced, ConfigValue::Bool(true));
    }

    let gki = matches!(arch, Arch::Aarch64 | Arch::X86_64);
    config.insert(ConfigKey::BuildGkiArtifacts, ConfigValue::Bool(gki));
    if gki {
        config.insert(ConfigKey::GkiBootImgSizes, ConfigValue::Map(boot_img_sizes(arch)));
    }

    config
}

/// Boot image partition sizes in bytes, keyed by kernel compression.
fn boot_img_sizes(arch: Arch) -> BTreeMap<String, String> {
    let mut sizes = BTreeMap::new();
    sizes.insert(String::new(), "67108864".to_string());
    if arch.family() == "aarch64" {
        sizes.insert("lz4".to_string(), "53862400".to_string());
        sizes.insert("gz".to_string(), "47185920".to_string());
    }
    sizes
}

/// Memoizing source of [`ArchDefaults`] for one resolution pass.
pub struct DefaultsProvider {
    kernel_dir: PathBuf,
    cell: OnceCell<ArchDefaults>,
    scans: AtomicUsize,
}

impl DefaultsProvider {
    pub fn new(kernel_dir: impl Into<PathBuf>) -> Self {
        DefaultsProvider {
            kernel_dir: kernel_dir.into(),
            cell: OnceCell::new(),
            scans: AtomicUsize::new(0),
        }
    }

    /// Provider that never scans and always returns `defaults`.
    pub fn with_defaults(defaults: ArchDefaults) -> Self {
        DefaultsProvider {
            kernel_dir: PathBuf::new(),
            cell: OnceCell::with_value(defaults),
            scans: AtomicUsize::new(0),
        }
    }

    /// Defaults, probing the filesystem on first call only.
    pub fn get(&self) -> Result<&ArchDefaults, ConfigError> {
        self.cell.get_or_try_init(|| {
            self.scans.fetch_add(1, Ordering::SeqCst);
            ArchDefaults::scan(&self.kernel_dir)
        })
    }

    /// How many times the filesystem has been scanned.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn kernel_dir(&self) -> &Path {
        &self.kernel_dir
    }
}
