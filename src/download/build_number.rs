//! Build number lookup from the `repo=value,repo2=value2` environment list.

use crate::error::ConfigError;

/// Environment variable holding the build number list.
pub const BUILD_NUMBER_ENV: &str = "KLEAF_DOWNLOAD_BUILD_NUMBER_MAP";

/// Parse `key1=value1,key2=value2` into ordered pairs.
///
/// Empty segments are ignored; a segment without `=` is a hard error.
pub fn parse_build_number_map(value: &str) -> Result<Vec<(String, String)>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| ConfigError::MalformedBuildNumber(segment.to_string()))
        })
        .collect()
}

/// Build number for `apparent_name`: first non-empty matching entry wins,
/// then `default`.
///
/// An empty entry (`repo=`) does not shadow later entries or the default.
pub fn resolve_build_number(
    env_value: Option<&str>,
    apparent_name: &str,
    default: Option<&str>,
) -> Result<Option<String>, ConfigError> {
    let pairs = match env_value {
        Some(value) => parse_build_number_map(value)?,
        None => Vec::new(),
    };

    let found = pairs
        .into_iter()
        .find(|(key, value)| key == apparent_name && !value.is_empty())
        .map(|(_, value)| value)
        .or_else(|| default.filter(|d| !d.is_empty()).map(str::to_string));

    log::debug!(
        "[Download] build number for {}: {}",
        apparent_name,
        found.as_deref().unwrap_or("<unset>")
    );
    Ok(found)
}
