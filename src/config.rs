//! Session configuration.
//!
//! `SessionConfig` is plain serde data so hosts can load it from whatever
//! format they already use; every field has a default, so partial documents
//! are accepted.

use serde::{Deserialize, Serialize};

use crate::types::{EngineVersion, ExecutionMode, Location, ValueType};

/// Longest zone or variable name accepted, in bytes.
pub const MAX_NAME_LEN: usize = 128;

/// Configuration for a [`Session`](crate::session::Session) and the
/// in-memory engine it creates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Batch (in-process) or connected (remote) execution.
    pub mode: ExecutionMode,
    /// Version the in-memory engine advertises for capability checks.
    pub engine_version: EngineVersion,
    /// Longest accepted zone/variable name.
    pub max_name_len: usize,
    /// Value type used when a caller does not specify one.
    pub default_value_type: ValueType,
    /// Location used when a caller does not specify one.
    pub default_location: Location,
    /// Validate engine invariants after every structural mutation.
    pub check_invariants: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Batch,
            engine_version: EngineVersion::CURRENT,
            max_name_len: MAX_NAME_LEN,
            default_value_type: ValueType::Float,
            default_location: Location::Nodal,
            check_invariants: cfg!(feature = "check-invariants"),
        }
    }
}

impl SessionConfig {
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_engine_version(mut self, version: EngineVersion) -> Self {
        self.engine_version = version;
        self
    }

    pub fn with_default_value_type(mut self, value_type: ValueType) -> Self {
        self.default_value_type = value_type;
        self
    }

    pub fn with_default_location(mut self, location: Location) -> Self {
        self.default_location = location;
        self
    }

    pub fn with_check_invariants(mut self, on: bool) -> Self {
        self.check_invariants = on;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: SessionConfig = serde_json::from_str(r#"{ "mode": "Connected" }"#).unwrap();
        assert_eq!(cfg.mode, ExecutionMode::Connected);
        assert_eq!(cfg.max_name_len, MAX_NAME_LEN);
        assert_eq!(cfg.default_value_type, ValueType::Float);
    }

    #[test]
    fn json_roundtrip() {
        let cfg = SessionConfig::default()
            .with_engine_version(EngineVersion::new(1, 1, 0))
            .with_default_location(Location::CellCentered);
        let s = serde_json::to_string(&cfg).unwrap();
        let back: SessionConfig = serde_json::from_str(&s).unwrap();
        assert_eq!(back, cfg);
    }
}
