//! Dataset, zone, variable and array handles.
//!
//! Handles are small `Copy` views: a session reference plus ids. They hold no
//! cached state and re-resolve positional indices on every call, so a handle
//! stays valid across deletions of *other* items and fails cleanly once its
//! own item is gone.

pub mod array;
pub mod dataset;
pub mod index;
pub mod pattern;
pub mod variable;
pub mod zone;

pub use array::{Array, RawView};
pub use dataset::{CopyOptions, Dataset, ShareSelection, VariableIter, VariableOptions, ZoneIter, ZoneOptions};
pub use index::{ArraySlice, IndexRange, PerItem, ResolvedSlice};
pub use pattern::ItemRef;
pub use variable::Variable;
pub use zone::{ClassicFEZone, OrderedZone, PolyFEZone, Zone, ZoneKind};
