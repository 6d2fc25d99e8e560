//! Opaque identity handles for datasets, zones and variables.
//!
//! Every dataset, zone and variable created by an engine receives a unique,
//! non-zero `u64` id. Ids are never reused, so a handle keeps naming the same
//! item even after deletions shift positional indices. A stale id (its item
//! was deleted) simply fails to resolve.
//!
//! The handles are `repr(transparent)` newtypes around [`NonZeroU64`], which
//! keeps them the size of a `u64` and gives `Option<Handle>` the same layout.

use std::{fmt, num::NonZeroU64};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
        )]
        #[repr(transparent)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Wraps a raw id, returning `None` for the reserved value 0.
            #[inline]
            pub fn new(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map(Self)
            }

            /// Returns the raw `u64` value.
            #[inline]
            pub const fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.get()).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.get())
            }
        }
    };
}

define_id!(
    /// Identity of a dataset owned by an engine.
    DatasetId,
    "dataset"
);
define_id!(
    /// Stable identity of a zone; survives index shifts caused by deletions.
    ZoneId,
    "zone"
);
define_id!(
    /// Stable identity of a variable; survives index shifts caused by deletions.
    VariableId,
    "variable"
);

/// Monotonic id source shared by all items of one engine.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: NonZeroU64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            next: NonZeroU64::MIN,
        }
    }
}

impl IdAllocator {
    fn bump(&mut self) -> NonZeroU64 {
        let id = self.next;
        self.next = id.saturating_add(1);
        id
    }

    pub(crate) fn dataset(&mut self) -> DatasetId {
        DatasetId(self.bump())
    }

    pub(crate) fn zone(&mut self) -> ZoneId {
        ZoneId(self.bump())
    }

    pub(crate) fn variable(&mut self) -> VariableId {
        VariableId(self.bump())
    }
}

/// Address of one array: the (zone, variable) intersection inside a dataset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayKey {
    pub dataset: DatasetId,
    pub zone: ZoneId,
    pub variable: VariableId,
}

#[cfg(test)]
mod layout_tests {
    use super::*;
    use static_assertions::assert_eq_size;

    assert_eq_size!(ZoneId, u64);
    assert_eq_size!(Option<VariableId>, u64);
    assert_eq_size!(Option<DatasetId>, u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert!(ZoneId::new(0).is_none());
        assert_eq!(VariableId::new(3).map(VariableId::get), Some(3));
    }

    #[test]
    fn allocator_never_repeats_across_kinds() {
        let mut ids = IdAllocator::default();
        let d = ids.dataset();
        let z = ids.zone();
        let v = ids.variable();
        assert_eq!((d.get(), z.get(), v.get()), (1, 2, 3));
    }

    #[test]
    fn debug_and_display() {
        let z = ZoneId::new(7).unwrap();
        assert_eq!(format!("{z:?}"), "ZoneId(7)");
        assert_eq!(format!("{z}"), "zone#7");
    }

    #[test]
    fn json_roundtrip() {
        let v = VariableId::new(123).unwrap();
        let s = serde_json::to_string(&v).unwrap();
        let back: VariableId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, v);
    }
}
