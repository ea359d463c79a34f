//! Request Validator (§4.D): size check, well-formed identifier check, whole-identifier
//! allow-list lookup. Substring matching is forbidden here on purpose — see the
//! `execute_immediate`-vs-`exec` example in the module table.

use crate::envelope::{Request, MAX_MESSAGE_BYTES};
use crate::error::{Error, Result};
use bridge_config::{is_well_formed_identifier, HandlerManifest};

pub struct Validator<'a> {
    manifest: &'a HandlerManifest,
}

impl<'a> Validator<'a> {
    pub fn new(manifest: &'a HandlerManifest) -> Self {
        Self { manifest }
    }

    /// Validate a raw message size before it is even parsed as JSON.
    pub fn check_size(&self, byte_len: usize) -> Result<()> {
        if byte_len > MAX_MESSAGE_BYTES {
            return Err(Error::Protocol(format!(
                "message of {byte_len} bytes exceeds the {MAX_MESSAGE_BYTES}-byte limit"
            )));
        }
        Ok(())
    }

    /// Validate a parsed request: identifiers are well-formed and the `(module, function)`
    /// pair is allow-listed. Returns `Error::Security` on any failure — the validator never
    /// distinguishes "malformed name" from "not allow-listed" to the client, since both are
    /// the same rejection in the wire contract.
    pub fn validate(&self, request: &Request) -> Result<()> {
        if !is_well_formed_identifier(&request.module) || !is_well_formed_identifier(&request.function) {
            return Err(Error::Security(format!(
                "malformed module/function name: {}/{}",
                request.module, request.function
            )));
        }

        if !self.manifest.allows(&request.module, &request.function) {
            return Err(Error::Security(format!(
                "{}::{} is not in the allow-list",
                request.module, request.function
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_config::ModuleManifest;

    fn manifest() -> HandlerManifest {
        HandlerManifest::new(vec![ModuleManifest::new(
            "database",
            ["exec".to_string(), "query".to_string()],
        )])
    }

    fn request(module: &str, function: &str) -> Request {
        Request {
            module: module.to_string(),
            function: function.to_string(),
            params: serde_json::Map::new(),
            request_id: None,
        }
    }

    #[test]
    fn allow_listed_pair_passes() {
        let manifest = manifest();
        let validator = Validator::new(&manifest);
        assert!(validator.validate(&request("database", "exec")).is_ok());
    }

    #[test]
    fn unlisted_function_rejected_by_allowlist_not_substring() {
        let manifest = manifest();
        let validator = Validator::new(&manifest);
        let result = validator.validate(&request("database", "execute_immediate"));
        assert!(matches!(result, Err(Error::Security(_))));
    }

    #[test]
    fn execute_immediate_passes_once_allow_listed() {
        let manifest = HandlerManifest::new(vec![ModuleManifest::new(
            "database",
            ["exec".to_string(), "execute_immediate".to_string()],
        )]);
        let validator = Validator::new(&manifest);
        assert!(validator
            .validate(&request("database", "execute_immediate"))
            .is_ok());
    }

    #[test]
    fn malformed_name_is_rejected() {
        let manifest = manifest();
        let validator = Validator::new(&manifest);
        let result = validator.validate(&request("Database", "exec"));
        assert!(matches!(result, Err(Error::Security(_))));
    }

    #[test]
    fn oversize_message_is_rejected_before_parsing() {
        let manifest = manifest();
        let validator = Validator::new(&manifest);
        let result = validator.check_size(MAX_MESSAGE_BYTES + 1);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
