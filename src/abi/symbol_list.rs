//! KMI symbol list flattening.
//!
//! Converts a libabigail-format symbol list into a raw, sorted list of symbol
//! names. Only sections whose name ends with `whitelist` or `symbol_list`
//! contribute symbols.

use crate::error::SymbolListError;
use std::collections::BTreeSet;

const TRACE_POINT: &str = "__tracepoint_";
const TRACE_ITER: &str = "__traceiter_";

/// Flatten a libabigail symbol list into sorted, unique symbol names.
///
/// Every `__tracepoint_X` must be accompanied by `__traceiter_X` and vice versa.
pub fn flatten_symbol_list(content: &str) -> Result<Vec<String>, SymbolListError> {
    let mut symbols = BTreeSet::new();
    let mut in_section: Option<bool> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| SymbolListError::Parse {
                line: idx + 1,
                reason: format!("unterminated section header '{}'", line),
            })?;
            in_section = Some(name.ends_with("whitelist") || name.ends_with("symbol_list"));
            continue;
        }

        match in_section {
            None => {
                return Err(SymbolListError::Parse {
                    line: idx + 1,
                    reason: "symbol outside of any section".to_string(),
                })
            }
            Some(false) => continue,
            Some(true) => {
                // Values are allowed but ignored; only the key is the symbol.
                let key = line
                    .split(|c| c == '=' || c == ':')
                    .next()
                    .unwrap_or(line)
                    .trim();
                if !key.is_empty() {
                    symbols.insert(key.to_string());
                }
            }
        }
    }

    for symbol in &symbols {
        let partner = if let Some(name) = symbol.strip_prefix(TRACE_POINT) {
            format!("{}{}", TRACE_ITER, name)
        } else if let Some(name) = symbol.strip_prefix(TRACE_ITER) {
            format!("{}{}", TRACE_POINT, name)
        } else {
            continue;
        };
        if !symbols.contains(&partner) {
            return Err(SymbolListError::MissingSymbol(partner));
        }
    }

    Ok(symbols.into_iter().collect())
}
