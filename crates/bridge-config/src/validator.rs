use crate::{ConfigError, HandlerManifest, Result};
use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("static pattern is valid"))
}

/// An identifier is well-formed if it matches `[a-z_][a-z0-9_]*` in full — used both for module
/// names and function names, since the allow-list check downstream depends on exact equality
/// and a malformed identifier can never legitimately appear in a manifest.
pub fn is_well_formed_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

/// Validate a manifest before it is handed to the daemon: no duplicate module names, and every
/// module/function name is a well-formed identifier.
pub fn validate_manifest(manifest: &HandlerManifest) -> Result<()> {
    let mut seen = HashSet::new();
    for module in manifest.modules() {
        if !is_well_formed_identifier(&module.name) {
            return Err(ConfigError::MalformedIdentifier(module.name.clone()));
        }
        if !seen.insert(module.name.as_str()) {
            return Err(ConfigError::DuplicateModule(module.name.clone()));
        }
        for function in &module.functions {
            if !is_well_formed_identifier(function) {
                return Err(ConfigError::MalformedIdentifier(function.clone()));
            }
        }
    }
    Ok(())
}
