//! Target config resolution: explicit overrides layered over arch defaults.
//!
//! Precedence per key:
//! 1. key present in the overrides (even as `null`) -> override value
//! 2. key absent from the overrides -> arch default, if any
//! 3. otherwise unset (`Null`)

use crate::config::defaults::{ArchDefaults, DefaultsProvider};
use crate::config::loader::TargetTable;
use crate::config::validator;
use crate::error::ConfigError;
use crate::models::{Arch, ConfigKey, ConfigValue, RawOverrides, TargetConfig, ValueSource};
use std::collections::BTreeMap;

/// Resolve the final configuration for one target.
pub fn resolve(
    target: &str,
    overrides: &RawOverrides,
    defaults: &ArchDefaults,
) -> Result<TargetConfig, ConfigError> {
    let explicit = validator::validate_keys(target, overrides)?;
    validator::validate_kinds(target, &explicit)?;
    validator::validate_boot_img_sizes(target, &explicit)?;

    let arch_defaults = defaults.get(target);
    let mut values = BTreeMap::new();

    for key in ConfigKey::ALL {
        let entry = if let Some(value) = explicit.get(&key) {
            (value.clone(), ValueSource::Override)
        } else if let Some(value) = arch_defaults.and_then(|d| d.get(&key)) {
            (value.clone(), ValueSource::Default)
        } else {
            (ConfigValue::Null, ValueSource::Unset)
        };
        values.insert(key, entry);
    }

    log::debug!(
        "[Resolver] {}: {} overridden, {} defaulted",
        target,
        values.values().filter(|(_, s)| *s == ValueSource::Override).count(),
        values.values().filter(|(_, s)| *s == ValueSource::Default).count()
    );

    Ok(TargetConfig::new(target.to_string(), values))
}

/// Resolve every architecture target, in composition order.
///
/// Targets missing from `table` resolve with no overrides. Defaults are
/// scanned at most once through `provider`.
pub fn resolve_all(
    table: &TargetTable,
    provider: &DefaultsProvider,
) -> Result<Vec<(Arch, TargetConfig)>, ConfigError> {
    validator::validate_targets(table)?;
    let defaults = provider.get()?;
    let empty = RawOverrides::new();

    Arch::ALL
        .iter()
        .map(|arch| {
            let overrides = table.get(arch.name()).unwrap_or(&empty);
            resolve(arch.name(), overrides, defaults).map(|config| (*arch, config))
        })
        .collect()
}
