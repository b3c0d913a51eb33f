//! Config validation.
//!
//! Every check collects all violations before failing, so a single run reports
//! the complete list of problems.

use crate::config::loader::TargetTable;
use crate::error::{ConfigError, ConfigValidationError};
use crate::models::{Arch, ConfigKey, ConfigValue, PartialConfig, RawOverrides};

/// Filter raw overrides to the valid key set.
///
/// Fails with every unknown key found, plus the accepted key set.
pub fn validate_keys(
    target: &str,
    overrides: &RawOverrides,
) -> Result<PartialConfig, ConfigValidationError> {
    let mut valid = PartialConfig::new();
    let mut invalid_keys = Vec::new();

    for (name, value) in overrides {
        match name.parse::<ConfigKey>() {
            Ok(key) => {
                valid.insert(key, value.clone());
            }
            Err(_) => invalid_keys.push(name.clone()),
        }
    }

    if !invalid_keys.is_empty() {
        return Err(ConfigValidationError {
            target: target.to_string(),
            invalid_keys,
            valid_keys: ConfigKey::valid_names(),
        });
    }

    Ok(valid)
}

/// Check each value against the kind its key accepts. `Null` is always accepted.
pub fn validate_kinds(target: &str, config: &PartialConfig) -> Result<(), ConfigError> {
    let mismatches: Vec<String> = config
        .iter()
        .filter(|(key, value)| !value.is_null() && value.kind() != key.kind())
        .map(|(key, value)| {
            format!(
                "{} expects {}, got {}",
                key,
                key.kind().as_str(),
                value.kind().as_str()
            )
        })
        .collect();

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::TypeMismatch {
            target: target.to_string(),
            mismatches,
        })
    }
}

/// Every target in the table must be one of the known architectures.
pub fn validate_targets(table: &TargetTable) -> Result<(), ConfigError> {
    let unknown: Vec<String> = table
        .keys()
        .filter(|name| name.parse::<Arch>().is_err())
        .cloned()
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::UnknownTarget {
            unknown,
            known: Arch::names(),
        })
    }
}

/// Gki boot image sizes must be decimal byte counts.
pub fn validate_boot_img_sizes(target: &str, config: &PartialConfig) -> Result<(), ConfigError> {
    let Some(ConfigValue::Map(sizes)) = config.get(&ConfigKey::GkiBootImgSizes) else {
        return Ok(());
    };

    let bad: Vec<String> = sizes
        .iter()
        .filter(|(_, size)| size.is_empty() || !size.chars().all(|c| c.is_ascii_digit()))
        .map(|(compression, size)| format!("gki_boot_img_sizes[{:?}] = {:?} is not a byte count", compression, size))
        .collect();

    if bad.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::TypeMismatch {
            target: target.to_string(),
            mismatches: bad,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_unknown_keys_all_reported() {
        let mut overrides = RawOverrides::new();
        overrides.insert("bogus_key".to_string(), ConfigValue::Bool(true));
        overrides.insert("also_bogus".to_string(), ConfigValue::Null);
        overrides.insert("kmi_enforced".to_string(), ConfigValue::Bool(true));

        let err = validate_keys("kernel_aarch64", &overrides).unwrap_err();
        assert_eq!(err.invalid_keys, vec!["also_bogus", "bogus_key"]);
        assert_eq!(err.valid_keys.len(), ConfigKey::ALL.len());
        assert!(err.to_string().contains("bogus_key"));
    }

    #[test]
    fn test_valid_keys_filtered() {
        let mut overrides = RawOverrides::new();
        overrides.insert("kmi_enforced".to_string(), ConfigValue::Bool(true));
        let valid = validate_keys("kernel_aarch64", &overrides).unwrap();
        assert_eq!(valid[&ConfigKey::KmiEnforced], ConfigValue::Bool(true));
    }

    #[test]
    fn test_kind_mismatches_collected() {
        let mut config = PartialConfig::new();
        config.insert(ConfigKey::TrimNonlistedKmi, ConfigValue::from("yes"));
        config.insert(ConfigKey::ModuleImplicitOuts, ConfigValue::Bool(true));
        config.insert(ConfigKey::KmiSymbolList, ConfigValue::Null);

        match validate_kinds("kernel_x86_64", &config) {
            Err(ConfigError::TypeMismatch { mismatches, .. }) => assert_eq!(mismatches.len(), 2),
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut table = TargetTable::new();
        table.insert("kernel_aarch64".to_string(), RawOverrides::new());
        table.insert("kernel_riscv64".to_string(), RawOverrides::new());
        match validate_targets(&table) {
            Err(ConfigError::UnknownTarget { unknown, .. }) => {
                assert_eq!(unknown, vec!["kernel_riscv64"])
            }
            other => panic!("expected UnknownTarget, got {:?}", other),
        }
    }

    #[test]
    fn test_boot_img_sizes_must_be_numeric() {
        let mut sizes = BTreeMap::new();
        sizes.insert("lz4".to_string(), "53862400".to_string());
        sizes.insert("gz".to_string(), "big".to_string());
        let mut config = PartialConfig::new();
        config.insert(ConfigKey::GkiBootImgSizes, ConfigValue::Map(sizes));
        assert!(validate_boot_img_sizes("kernel_aarch64", &config).is_err());
    }
}
