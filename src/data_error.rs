//! DataError: unified error type for the zonal-data public API.
//!
//! Every fallible operation returns `Result<_, DataError>`. Variants are
//! specific so callers can match on them; [`DataError::kind`] folds them into
//! the coarse taxonomy callers usually branch on (logic, index, system,
//! not-supported, type/value).

use std::fmt;

use thiserror::Error;

use crate::handle::{DatasetId, VariableId, ZoneId};
use crate::types::{EngineVersion, ValueType, ZoneType};

/// Coarse error classes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// A usage contract was violated; never recoverable automatically.
    Logic,
    /// An index, id or pattern failed to resolve; retry with a corrected value.
    Index,
    /// The engine rejected a well-formed request; nothing was applied.
    System,
    /// The engine version lacks the requested capability.
    NotSupported,
    /// Wrong argument type.
    Type,
    /// Malformed argument value or shape.
    Value,
}

/// Which catalog item a message is about.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ItemKind {
    Zone,
    Variable,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemKind::Zone => "zone",
            ItemKind::Variable => "variable",
        })
    }
}

/// Unified error type for dataset, array and connectivity operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    // ----- logic -----
    #[error("dataset has no variables; add a variable before adding zones")]
    NoVariables,
    #[error("cannot delete every {0} of a dataset; at least one must remain")]
    LastItem(ItemKind),
    #[error("{op} is only valid inside an open assignment")]
    NotInAssignment { op: &'static str },
    #[error("an assignment is already open on zone {zone}")]
    AssignmentOpen { zone: ZoneId },
    #[error("{op} called out of order in facemap assignment: {detail}")]
    PhaseOrder { op: &'static str, detail: &'static str },
    #[error("handle belongs to dataset {found}, expected dataset {expected}")]
    DatasetMismatch {
        expected: DatasetId,
        found: DatasetId,
    },
    #[error("zone {zone} is {found:?}; {op} requires {expected}")]
    WrongZoneType {
        zone: ZoneId,
        found: ZoneType,
        expected: &'static str,
        op: &'static str,
    },
    #[error("variable {variable} is locked against {op}")]
    VariableLocked {
        variable: VariableId,
        op: &'static str,
    },
    #[error("direct raw views require batch execution mode")]
    RequiresBatchMode,
    #[error("{0} is not allocated")]
    NotAllocated(&'static str),
    #[error("storage is held by an outstanding raw view")]
    StorageInUse,

    // ----- index -----
    #[error("dataset {0} does not exist")]
    DatasetNotFound(DatasetId),
    #[error("no {kind} matches `{pattern}`")]
    NotFound { kind: ItemKind, pattern: String },
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: i64,
        len: usize,
    },

    // ----- system -----
    #[error("sharing rejected: {0}")]
    SharingInvalid(String),
    #[error("{structure} commit rejected: {reason}")]
    CommitRejected {
        structure: &'static str,
        reason: String,
    },

    // ----- not supported -----
    #[error("{feature} requires engine {required} or newer (running {found})")]
    NotSupported {
        feature: &'static str,
        required: EngineVersion,
        found: EngineVersion,
    },

    // ----- type / value -----
    #[error("{what} has {found} bytes; the limit is {max}")]
    NameTooLong {
        what: ItemKind,
        found: usize,
        max: usize,
    },
    #[error("length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("value {value} is not representable as {value_type}")]
    ValueOutOfRange { value: f64, value_type: ValueType },
    #[error("value type mismatch: expected {expected}, found {found}")]
    ValueTypeMismatch {
        expected: ValueType,
        found: ValueType,
    },
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    #[error("invalid slice: {0}")]
    InvalidSlice(String),
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl DataError {
    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        use DataError::*;
        match self {
            NoVariables
            | LastItem(_)
            | NotInAssignment { .. }
            | AssignmentOpen { .. }
            | PhaseOrder { .. }
            | DatasetMismatch { .. }
            | WrongZoneType { .. }
            | VariableLocked { .. }
            | RequiresBatchMode
            | NotAllocated(_)
            | StorageInUse => ErrorKind::Logic,
            DatasetNotFound(_) | NotFound { .. } | IndexOutOfRange { .. } => ErrorKind::Index,
            SharingInvalid(_) | CommitRejected { .. } => ErrorKind::System,
            NotSupported { .. } => ErrorKind::NotSupported,
            ValueTypeMismatch { .. } => ErrorKind::Type,
            NameTooLong { .. }
            | LengthMismatch { .. }
            | ValueOutOfRange { .. }
            | InvalidShape(_)
            | InvalidSlice(_)
            | InvalidPattern { .. }
            | InvalidArgument(_) => ErrorKind::Value,
        }
    }

    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        DataError::IndexOutOfRange {
            what,
            index: i64::try_from(index).unwrap_or(i64::MAX),
            len,
        }
    }

    pub(crate) fn commit(structure: &'static str, reason: impl Into<String>) -> Self {
        DataError::CommitRejected {
            structure,
            reason: reason.into(),
        }
    }
}

/// Fail with `IndexOutOfRange` unless `index < len`.
#[inline]
pub(crate) fn check_index(what: &'static str, index: usize, len: usize) -> Result<(), DataError> {
    if index < len {
        Ok(())
    } else {
        Err(DataError::out_of_range(what, index, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(DataError::NoVariables.kind(), ErrorKind::Logic);
        assert_eq!(DataError::LastItem(ItemKind::Zone).kind(), ErrorKind::Logic);
        assert_eq!(
            DataError::out_of_range("node", 9, 4).kind(),
            ErrorKind::Index
        );
        assert_eq!(
            DataError::commit("nodemap", "node 9 >= 4").kind(),
            ErrorKind::System
        );
        assert_eq!(
            DataError::LengthMismatch {
                expected: 3,
                found: 2
            }
            .kind(),
            ErrorKind::Value
        );
    }

    #[test]
    fn not_supported_names_versions() {
        let e = DataError::NotSupported {
            feature: "zone mirroring",
            required: EngineVersion::new(1, 3, 0),
            found: EngineVersion::new(1, 0, 0),
        };
        assert_eq!(e.kind(), ErrorKind::NotSupported);
        assert_eq!(
            e.to_string(),
            "zone mirroring requires engine 1.3.0 or newer (running 1.0.0)"
        );
    }

    #[test]
    fn check_index_bounds() {
        assert!(check_index("element", 1, 2).is_ok());
        assert!(matches!(
            check_index("element", 2, 2),
            Err(DataError::IndexOutOfRange { index: 2, len: 2, .. })
        ));
    }
}
