//! Compiler toolchain version agreement between execution and target platforms.

use crate::error::ToolchainMismatchError;

/// Build-constants key naming the target platform's toolchain.
pub const CLANG_VERSION_KEY: &str = "CLANG_VERSION";

/// Both platforms must resolve the same toolchain.
pub fn check_toolchain(expected: &str, actual: &str) -> Result<(), ToolchainMismatchError> {
    if expected.trim() == actual.trim() {
        log::debug!("[Toolchain] {} matches", expected);
        return Ok(());
    }
    Err(ToolchainMismatchError {
        expected: expected.trim().to_string(),
        actual: actual.trim().to_string(),
    })
}

/// Check only when both sides are known.
pub fn check_optional(
    expected: Option<&str>,
    actual: Option<&str>,
) -> Result<(), ToolchainMismatchError> {
    match (expected, actual) {
        (Some(expected), Some(actual)) => check_toolchain(expected, actual),
        _ => {
            log::debug!("[Toolchain] skipping check: version unknown");
            Ok(())
        }
    }
}
