//! Self-checks for engine records.
//!
//! Engines built with `SessionConfig::check_invariants` (or with the
//! `check-invariants` feature) re-validate a dataset after each structural
//! mutation and a nodemap or facemap after each commit. A violation is
//! always logged. It panics in debug builds and with `strict-invariants`;
//! release builds without that feature keep running.

use crate::data_error::DataError;

/// Internal consistency of a record that outlives a single engine call.
pub trait DebugInvariants {
    /// First broken invariant, if any.
    fn validate_invariants(&self) -> Result<(), DataError>;

    /// Validate and report under `context`; returns whether the record is sound.
    fn check_invariants(&self, context: &str) -> bool {
        match self.validate_invariants() {
            Ok(()) => true,
            Err(err) => {
                violation(context, &err);
                false
            }
        }
    }
}

fn violation(context: &str, err: &DataError) {
    log::error!("invariant violated ({context}): {err}");
    if cfg!(any(debug_assertions, feature = "strict-invariants")) {
        panic!("invariant violated ({context}): {err}");
    }
}
