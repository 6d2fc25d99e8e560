//! Soft caches and their invalidation.
//!
//! Two kinds of derived data live outside the engine's source of truth: the
//! reverse node lookup of a nodemap, rebuilt lazily after each commit, and
//! the session's array metadata cache, filled only while notifications are
//! suspended. Both implement [`InvalidateCache`].
//!
//! The metadata cache records an [`Invalidation`] for every entry it adds or
//! every dataset that goes away while suspended; the list is replayed when
//! the outermost suspend scope ends, and anything it missed is cleared too.

use hashbrown::HashMap;

use crate::handle::{ArrayKey, DatasetId};
use crate::session::ArrayMeta;

/// Anything holding data derived from committed state.
pub trait InvalidateCache {
    /// Drop every cached value so the next query recomputes it.
    fn invalidate_cache(&mut self);
}

/// One deferred removal from [`MetaCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Invalidation {
    Array(ArrayKey),
    Dataset(DatasetId),
}

/// Array metadata memoized while the session is suspended.
#[derive(Debug, Default)]
pub(crate) struct MetaCache {
    entries: HashMap<ArrayKey, ArrayMeta>,
    pending: Vec<Invalidation>,
}

impl MetaCache {
    pub(crate) fn get(&self, key: &ArrayKey) -> Option<ArrayMeta> {
        self.entries.get(key).copied()
    }

    /// Memoize `meta` and schedule its removal.
    pub(crate) fn insert(&mut self, key: ArrayKey, meta: ArrayMeta) {
        self.entries.insert(key, meta);
        self.pending.push(Invalidation::Array(key));
    }

    /// Forget every entry of `ds`, now or when the scope ends.
    pub(crate) fn forget_dataset(&mut self, ds: DatasetId, deferred: bool) {
        if deferred {
            self.pending.push(Invalidation::Dataset(ds));
        } else {
            self.entries.retain(|k, _| k.dataset != ds);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Replay the scheduled invalidations; returns how many ran.
    pub(crate) fn run_invalidations(&mut self) -> usize {
        let count = self.pending.len();
        for inv in std::mem::take(&mut self.pending) {
            match inv {
                Invalidation::Array(key) => {
                    self.entries.remove(&key);
                }
                Invalidation::Dataset(ds) => self.entries.retain(|k, _| k.dataset != ds),
            }
        }
        // Anything left was inserted without a matching invalidation.
        if !self.entries.is_empty() {
            log::warn!("{} cached array entries had no invalidation", self.entries.len());
            self.invalidate_cache();
        }
        count
    }
}

impl InvalidateCache for MetaCache {
    fn invalidate_cache(&mut self) {
        self.entries.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{VariableId, ZoneId};
    use crate::types::{Location, ValueType};

    fn key(ds: u64, zone: u64) -> ArrayKey {
        ArrayKey {
            dataset: DatasetId::new(ds).unwrap(),
            zone: ZoneId::new(zone).unwrap(),
            variable: VariableId::new(1).unwrap(),
        }
    }

    fn meta() -> ArrayMeta {
        ArrayMeta {
            len: 4,
            value_type: ValueType::Float,
            location: Location::Nodal,
        }
    }

    #[test]
    fn invalidations_empty_the_cache() {
        let mut cache = MetaCache::default();
        cache.insert(key(1, 1), meta());
        cache.insert(key(2, 1), meta());
        cache.forget_dataset(DatasetId::new(2).unwrap(), true);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.run_invalidations(), 3);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get(&key(1, 1)), None);
    }

    #[test]
    fn immediate_dataset_removal() {
        let mut cache = MetaCache::default();
        cache.insert(key(1, 1), meta());
        cache.insert(key(1, 2), meta());
        cache.insert(key(3, 1), meta());
        cache.forget_dataset(DatasetId::new(1).unwrap(), false);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(3, 1)), Some(meta()));
    }
}
