//! Core data types for the build-graph engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Common kernel architectures with a pre-wired build graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "kernel_aarch64")]
    Aarch64,
    #[serde(rename = "kernel_aarch64_16k")]
    Aarch64_16k,
    #[serde(rename = "kernel_aarch64_debug")]
    Aarch64Debug,
    #[serde(rename = "kernel_x86_64")]
    X86_64,
    #[serde(rename = "kernel_x86_64_debug")]
    X86_64Debug,
}

impl Arch {
    /// All architectures in composition order.
    pub const ALL: [Arch; 5] = [
        Arch::Aarch64,
        Arch::Aarch64_16k,
        Arch::Aarch64Debug,
        Arch::X86_64,
        Arch::X86_64Debug,
    ];

    /// Target name, e.g. `kernel_aarch64`.
    pub fn name(&self) -> &'static str {
        match self {
            Arch::Aarch64 => "kernel_aarch64",
            Arch::Aarch64_16k => "kernel_aarch64_16k",
            Arch::Aarch64Debug => "kernel_aarch64_debug",
            Arch::X86_64 => "kernel_x86_64",
            Arch::X86_64Debug => "kernel_x86_64_debug",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|a| a.name()).collect()
    }

    /// CPU family used for symbol list file names (`abi_gki_<family>`).
    pub fn family(&self) -> &'static str {
        match self {
            Arch::Aarch64 | Arch::Aarch64_16k | Arch::Aarch64Debug => "aarch64",
            Arch::X86_64 | Arch::X86_64Debug => "x86_64",
        }
    }

    pub fn is_debug(&self) -> bool {
        matches!(self, Arch::Aarch64Debug | Arch::X86_64Debug)
    }

    pub fn page_size(&self) -> &'static str {
        match self {
            Arch::Aarch64_16k => "16k",
            _ => "4k",
        }
    }

    /// Build config file under the common kernel tree.
    pub fn build_config(&self) -> String {
        let mut name = format!("build.config.gki.{}", self.family());
        if self.page_size() == "16k" {
            name.push_str(".16k");
        }
        name
    }

    /// Kernel image files produced by the primary build.
    pub fn image_outputs(&self) -> &'static [&'static str] {
        match self.family() {
            "aarch64" => &["Image", "Image.lz4", "Image.gz"],
            _ => &["bzImage"],
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Arch::ALL
            .iter()
            .copied()
            .find(|a| a.name() == s)
            .ok_or_else(|| format!("Unknown architecture target: {}", s))
    }
}

/// The closed set of valid `target_config` keys.
///
/// Adding a key here is a change to the public contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    KmiSymbolList,
    AdditionalKmiSymbolLists,
    TrimNonlistedKmi,
    KmiSymbolListStrictMode,
    AbiDefinition,
    KmiEnforced,
    ModuleImplicitOuts,
    BuildGkiArtifacts,
    GkiBootImgSizes,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 9] = [
        ConfigKey::KmiSymbolList,
        ConfigKey::AdditionalKmiSymbolLists,
        ConfigKey::TrimNonlistedKmi,
        ConfigKey::KmiSymbolListStrictMode,
        ConfigKey::AbiDefinition,
        ConfigKey::KmiEnforced,
        ConfigKey::ModuleImplicitOuts,
        ConfigKey::BuildGkiArtifacts,
        ConfigKey::GkiBootImgSizes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::KmiSymbolList => "kmi_symbol_list",
            ConfigKey::AdditionalKmiSymbolLists => "additional_kmi_symbol_lists",
            ConfigKey::TrimNonlistedKmi => "trim_nonlisted_kmi",
            ConfigKey::KmiSymbolListStrictMode => "kmi_symbol_list_strict_mode",
            ConfigKey::AbiDefinition => "abi_definition",
            ConfigKey::KmiEnforced => "kmi_enforced",
            ConfigKey::ModuleImplicitOuts => "module_implicit_outs",
            ConfigKey::BuildGkiArtifacts => "build_gki_artifacts",
            ConfigKey::GkiBootImgSizes => "gki_boot_img_sizes",
        }
    }

    /// Accepted key names, for error messages.
    pub fn valid_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_str()).collect()
    }

    /// The value kind this key accepts besides [`ConfigValue::Null`].
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigKey::KmiSymbolList | ConfigKey::AbiDefinition => ValueKind::Str,
            ConfigKey::AdditionalKmiSymbolLists | ConfigKey::ModuleImplicitOuts => ValueKind::List,
            ConfigKey::TrimNonlistedKmi
            | ConfigKey::KmiSymbolListStrictMode
            | ConfigKey::KmiEnforced
            | ConfigKey::BuildGkiArtifacts => ValueKind::Bool,
            ConfigKey::GkiBootImgSizes => ValueKind::Map,
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Unknown target_config key: {}", s))
    }
}

/// Kind tag for [`ConfigValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    Str,
    List,
    Map,
    Other,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::Str => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Other => "structured value",
        }
    }
}

/// A single `target_config` value.
///
/// `Null` is the explicit absence marker: an override of `Null` still beats
/// an architecture default.
///
/// No key accepts `Number` or `Other`. They exist so a table with such values
/// still loads and the offending keys are reported by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Str(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
    Other(serde_json::Value),
}

impl ConfigValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Null => ValueKind::Null,
            ConfigValue::Bool(_) => ValueKind::Bool,
            ConfigValue::Number(_) => ValueKind::Number,
            ConfigValue::Str(_) => ValueKind::Str,
            ConfigValue::List(_) => ValueKind::List,
            ConfigValue::Map(_) => ValueKind::Map,
            ConfigValue::Other(_) => ValueKind::Other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ConfigValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Str(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Str(s)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(l: Vec<String>) -> Self {
        ConfigValue::List(l)
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    /// Explicitly set in the target's overrides (possibly to `Null`).
    Override,
    /// Taken from the computed architecture defaults.
    Default,
    /// Neither overridden nor defaulted.
    Unset,
}

/// Unvalidated overrides for one target, as read from a config table.
pub type RawOverrides = BTreeMap<String, ConfigValue>;

/// Validated partial configuration (defaults, or filtered overrides).
pub type PartialConfig = BTreeMap<ConfigKey, ConfigValue>;

/// Final configuration record for one target. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetConfig {
    target: String,
    values: BTreeMap<ConfigKey, (ConfigValue, ValueSource)>,
}

impl TargetConfig {
    pub(crate) fn new(target: String, values: BTreeMap<ConfigKey, (ConfigValue, ValueSource)>) -> Self {
        TargetConfig { target, values }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Resolved value for `key`; `Null` when neither overridden nor defaulted.
    pub fn get(&self, key: ConfigKey) -> &ConfigValue {
        static NULL: ConfigValue = ConfigValue::Null;
        self.values.get(&key).map(|(v, _)| v).unwrap_or(&NULL)
    }

    pub fn source(&self, key: ConfigKey) -> ValueSource {
        self.values
            .get(&key)
            .map(|(_, s)| *s)
            .unwrap_or(ValueSource::Unset)
    }

    pub fn kmi_symbol_list(&self) -> Option<&str> {
        self.get(ConfigKey::KmiSymbolList).as_str()
    }

    pub fn additional_kmi_symbol_lists(&self) -> &[String] {
        self.get(ConfigKey::AdditionalKmiSymbolLists)
            .as_list()
            .unwrap_or(&[])
    }

    pub fn trim_nonlisted_kmi(&self) -> Option<bool> {
        self.get(ConfigKey::TrimNonlistedKmi).as_bool()
    }

    pub fn kmi_symbol_list_strict_mode(&self) -> Option<bool> {
        self.get(ConfigKey::KmiSymbolListStrictMode).as_bool()
    }

    pub fn abi_definition(&self) -> Option<&str> {
        self.get(ConfigKey::AbiDefinition).as_str()
    }

    pub fn kmi_enforced(&self) -> Option<bool> {
        self.get(ConfigKey::KmiEnforced).as_bool()
    }

    pub fn module_implicit_outs(&self) -> &[String] {
        self.get(ConfigKey::ModuleImplicitOuts)
            .as_list()
            .unwrap_or(&[])
    }

    pub fn build_gki_artifacts(&self) -> bool {
        self.get(ConfigKey::BuildGkiArtifacts)
            .as_bool()
            .unwrap_or(false)
    }

    pub fn gki_boot_img_sizes(&self) -> Option<&BTreeMap<String, String>> {
        self.get(ConfigKey::GkiBootImgSizes).as_map()
    }

    /// ABI targets exist only when a primary symbol list is configured.
    pub fn build_abi_targets(&self) -> bool {
        self.kmi_symbol_list().map_or(false, |s| !s.is_empty())
    }

    /// Additional lists first, then the primary list if it is set.
    ///
    /// Downstream tooling depends on this ordering.
    pub fn all_kmi_symbol_lists(&self) -> Vec<String> {
        let mut lists = self.additional_kmi_symbol_lists().to_vec();
        if let Some(primary) = self.kmi_symbol_list().filter(|s| !s.is_empty()) {
            lists.push(primary.to_string());
        }
        lists
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_round_trip_names() {
        for arch in Arch::ALL {
            assert_eq!(arch.name().parse::<Arch>(), Ok(arch));
        }
        assert!("kernel_riscv64".parse::<Arch>().is_err());
    }

    #[test]
    fn test_arch_build_config() {
        assert_eq!(Arch::Aarch64.build_config(), "build.config.gki.aarch64");
        assert_eq!(Arch::Aarch64_16k.build_config(), "build.config.gki.aarch64.16k");
        assert_eq!(Arch::X86_64Debug.build_config(), "build.config.gki.x86_64");
    }

    #[test]
    fn test_config_value_json_shapes() {
        let v: BTreeMap<String, ConfigValue> = serde_json::from_str(
            r#"{"a": null, "b": true, "c": "x", "d": ["y"], "e": {"lz4": "1"}}"#,
        )
        .unwrap();
        assert_eq!(v["a"], ConfigValue::Null);
        assert_eq!(v["b"], ConfigValue::Bool(true));
        assert_eq!(v["c"].as_str(), Some("x"));
        assert_eq!(v["d"].as_list(), Some(&["y".to_string()][..]));
        assert_eq!(v["e"].kind(), ValueKind::Map);
    }

    #[test]
    fn test_all_kmi_symbol_lists_order() {
        let mut values = BTreeMap::new();
        values.insert(
            ConfigKey::KmiSymbolList,
            (ConfigValue::from("abi_gki_aarch64"), ValueSource::Default),
        );
        values.insert(
            ConfigKey::AdditionalKmiSymbolLists,
            (
                ConfigValue::List(vec!["abi_gki_aarch64_other".to_string()]),
                ValueSource::Default,
            ),
        );
        let config = TargetConfig::new("kernel_aarch64".to_string(), values);
        assert_eq!(
            config.all_kmi_symbol_lists(),
            vec!["abi_gki_aarch64_other", "abi_gki_aarch64"]
        );
        assert!(config.build_abi_targets());
    }

    #[test]
    fn test_empty_primary_list_is_not_appended() {
        let mut values = BTreeMap::new();
        values.insert(ConfigKey::KmiSymbolList, (ConfigValue::from(""), ValueSource::Override));
        let config = TargetConfig::new("kernel_x86_64".to_string(), values);
        assert!(config.all_kmi_symbol_lists().is_empty());
        assert!(!config.build_abi_targets());
        assert_eq!(config.source(ConfigKey::KmiEnforced), ValueSource::Unset);
    }
}
