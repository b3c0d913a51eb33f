//! Config file loader.

use crate::error::ConfigError;
use crate::models::RawOverrides;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Per-target override table: target name -> raw `target_config` overrides.
pub type TargetTable = BTreeMap<String, RawOverrides>;

/// Load a target override table from a `.json` or `.toml` file.
pub fn load_target_table(path: &Path) -> Result<TargetTable, ConfigError> {
    validate_config_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(format!(
                "Configuration file not found at: {}",
                path.display()
            ))
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let table: TargetTable = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };

    log::debug!(
        "[Config] Loaded target table from {} ({} targets)",
        path.display(),
        table.len()
    );
    Ok(table)
}

/// Read a `KEY=VALUE` build constants file (e.g. `build.config.constants`).
///
/// Blank lines and `#` comments are skipped; surrounding quotes are stripped.
/// A missing file yields an empty map.
pub fn load_build_constants(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(ConfigError::IoError(e)),
    };

    let mut constants = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            constants.insert(key.trim().to_string(), value.to_string());
        }
    }
    Ok(constants)
}

/// Validate config path (.json or .toml extension required).
pub fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "Configuration path cannot be empty".to_string(),
        ));
    }

    match path.extension() {
        Some(ext) if ext == "json" || ext == "toml" => Ok(()),
        Some(ext) => Err(ConfigError::ValidationFailed(format!(
            "Configuration file must have .json or .toml extension, got .{}",
            ext.to_string_lossy()
        ))),
        None => Err(ConfigError::ValidationFailed(
            "Configuration file must have .json or .toml extension".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfigValue;
    use tempfile::TempDir;

    #[test]
    fn test_load_json_table_keeps_explicit_null() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("targets.json");
        fs::write(
            &path,
            r#"{"kernel_aarch64": {"kmi_symbol_list": null, "trim_nonlisted_kmi": false}}"#,
        )
        .unwrap();

        let table = load_target_table(&path).unwrap();
        let aarch64 = &table["kernel_aarch64"];
        assert_eq!(aarch64["kmi_symbol_list"], ConfigValue::Null);
        assert_eq!(aarch64["trim_nonlisted_kmi"], ConfigValue::Bool(false));
    }

    #[test]
    fn test_load_toml_table() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("targets.toml");
        fs::write(
            &path,
            "[kernel_x86_64]\nmodule_implicit_outs = [\"foo.ko\"]\nbuild_gki_artifacts = false\n",
        )
        .unwrap();

        let table = load_target_table(&path).unwrap();
        assert_eq!(
            table["kernel_x86_64"]["module_implicit_outs"],
            ConfigValue::List(vec!["foo.ko".to_string()])
        );
    }

    #[test]
    fn test_missing_file_reports_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_target_table(&temp_dir.path().join("nope.json"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_config_path_rejects_extension() {
        assert!(validate_config_path(Path::new("targets.yaml")).is_err());
        assert!(validate_config_path(Path::new("")).is_err());
        assert!(validate_config_path(Path::new("targets.toml")).is_ok());
    }

    #[test]
    fn test_build_constants() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("build.config.constants");
        fs::write(
            &path,
            "# constants\nBRANCH=android-mainline\nexport CLANG_VERSION=\"r487747c\"\n",
        )
        .unwrap();

        let constants = load_build_constants(&path).unwrap();
        assert_eq!(constants["BRANCH"], "android-mainline");
        assert_eq!(constants["CLANG_VERSION"], "r487747c");
        assert!(load_build_constants(&temp_dir.path().join("missing"))
            .unwrap()
            .is_empty());
    }
}
