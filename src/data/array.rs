//! `Array`: the values of one variable in one zone.
//!
//! Reads and writes go through the engine one call at a time. Contiguous
//! slices take the bulk path (`get_values`/`set_values`); stepped slices fall
//! back to element-wise access. Values cross the API as `f64` and are
//! converted to the array's storage type on the way in.

use std::fmt;

use parking_lot::RawRwLock;
use parking_lot::lock_api::ArcRwLockWriteGuard;

use super::index::{ArraySlice, resolve_index};
use super::variable::Variable;
use super::zone::Zone;
use crate::data_error::DataError;
use crate::engine::{ChangeEvent, Scalar, ValueBuffer};
use crate::handle::ArrayKey;
use crate::session::{ArrayMeta, Session};
use crate::types::{Location, ValueType};

/// Handle on one (zone, variable) array.
#[derive(Clone, Copy)]
pub struct Array<'s> {
    session: &'s Session,
    key: ArrayKey,
}

impl fmt::Debug for Array<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Array").field(&self.key).finish()
    }
}

impl<'s> Array<'s> {
    pub(crate) fn new(session: &'s Session, key: ArrayKey) -> Self {
        Self { session, key }
    }

    pub fn key(&self) -> ArrayKey {
        self.key
    }

    pub fn zone(&self) -> Zone<'s> {
        Zone::new(self.session, self.key.dataset, self.key.zone)
    }

    pub fn variable(&self) -> Variable<'s> {
        Variable::new(self.session, self.key.dataset, self.key.variable)
    }

    fn meta(&self) -> Result<ArrayMeta, DataError> {
        self.session.array_meta(self.key)
    }

    pub fn len(&self) -> Result<usize, DataError> {
        Ok(self.meta()?.len)
    }

    pub fn is_empty(&self) -> Result<bool, DataError> {
        Ok(self.len()? == 0)
    }

    pub fn value_type(&self) -> Result<ValueType, DataError> {
        Ok(self.meta()?.value_type)
    }

    pub fn location(&self) -> Result<Location, DataError> {
        Ok(self.meta()?.location)
    }

    /// True while the array has no storage and reads as zeros.
    pub fn is_passive(&self) -> Result<bool, DataError> {
        Ok(self.session.with_engine(|e| e.array_info(self.key))?.passive)
    }

    /// Value at `index`; negative counts from the end.
    pub fn get(&self, index: i64) -> Result<f64, DataError> {
        let offset = resolve_index("array", index, self.len()?)?;
        self.session.with_engine(|e| e.get_value(self.key, offset))
    }

    pub fn get_slice(&self, slice: impl Into<ArraySlice>) -> Result<Vec<f64>, DataError> {
        let s = slice.into().resolve(self.len()?)?;
        if s.count == 0 {
            return Ok(Vec::new());
        }
        self.session.with_engine(|e| {
            if s.is_contiguous() {
                let mut out = vec![0.0; s.count];
                e.get_values(self.key, s.start, &mut out)?;
                Ok(out)
            } else {
                s.indices().map(|i| e.get_value(self.key, i)).collect()
            }
        })
    }

    pub fn to_vec(&self) -> Result<Vec<f64>, DataError> {
        self.get_slice(..)
    }

    pub fn set(&self, index: i64, value: f64) -> Result<(), DataError> {
        let offset = resolve_index("array", index, self.len()?)?;
        self.session
            .with_engine(|e| e.set_value(self.key, offset, value))?;
        self.mark_altered();
        Ok(())
    }

    /// Write `values` into the selected positions. Nothing is written unless
    /// the lengths agree and every value is representable.
    pub fn set_slice(&self, slice: impl Into<ArraySlice>, values: &[f64]) -> Result<(), DataError> {
        let meta = self.meta()?;
        let s = slice.into().resolve(meta.len)?;
        if values.len() != s.count {
            return Err(DataError::LengthMismatch {
                expected: s.count,
                found: values.len(),
            });
        }
        if s.count == 0 {
            return Ok(());
        }
        if s.is_contiguous() {
            self.session
                .with_engine(|e| e.set_values(self.key, s.start, values))?;
        } else {
            ValueBuffer::from_values(meta.value_type, values)?;
            self.session.with_engine(|e| {
                s.indices()
                    .zip(values)
                    .try_for_each(|(i, &v)| e.set_value(self.key, i, v))
            })?;
        }
        self.mark_altered();
        Ok(())
    }

    pub fn set_all(&self, values: &[f64]) -> Result<(), DataError> {
        self.set_slice(.., values)
    }

    /// Copy every value of `other` into this array. Arrays of the same
    /// dataset are copied inside the engine.
    pub fn assign(&self, other: &Array<'_>) -> Result<(), DataError> {
        let same_engine = std::ptr::eq(self.session, other.session);
        if same_engine && other.key.dataset == self.key.dataset {
            self.session
                .with_engine(|e| e.copy_array(other.key, self.key))?;
            self.mark_altered();
            return Ok(());
        }
        let values = other.to_vec()?;
        let len = self.len()?;
        if values.len() != len {
            return Err(DataError::LengthMismatch {
                expected: len,
                found: values.len(),
            });
        }
        self.set_all(&values)
    }

    pub fn min(&self) -> Result<f64, DataError> {
        Ok(self.minmax()?.0)
    }

    pub fn max(&self) -> Result<f64, DataError> {
        Ok(self.minmax()?.1)
    }

    /// Engine-side reduction; `(0, 0)` for passive or empty arrays.
    pub fn minmax(&self) -> Result<(f64, f64), DataError> {
        self.session.with_engine(|e| e.min_max(self.key))
    }

    /// Zones whose array for this variable aliases the same storage,
    /// this one included.
    pub fn shared_zones(&self) -> Result<Vec<Zone<'s>>, DataError> {
        let ids = self.session.with_engine(|e| e.shared_zones(self.key))?;
        Ok(ids
            .into_iter()
            .map(|z| Zone::new(self.session, self.key.dataset, z))
            .collect())
    }

    /// Announce that values changed; writes through a direct raw view do
    /// not announce themselves.
    pub fn mark_altered(&self) {
        self.session.emit(ChangeEvent::DataAltered {
            dataset: self.key.dataset,
            zone: self.key.zone,
            variable: self.key.variable,
        });
    }

    /// View of `size` values starting at `offset` (`None` = to the end).
    ///
    /// With `copy = true` the view owns a snapshot. With `copy = false` it
    /// holds the engine's storage directly (batch mode only); until the view
    /// is dropped every other access to that storage fails with
    /// `StorageInUse`.
    pub fn as_raw_view(&self, offset: usize, size: Option<usize>, copy: bool) -> Result<RawView, DataError> {
        let meta = self.meta()?;
        let len = size.unwrap_or(meta.len.saturating_sub(offset));
        match offset.checked_add(len) {
            Some(end) if end <= meta.len => {}
            _ => return Err(DataError::out_of_range("array offset", offset.saturating_add(len), meta.len)),
        }
        if copy {
            let mut values = vec![0.0; len];
            self.session
                .with_engine(|e| e.get_values(self.key, offset, &mut values))?;
            let buffer = ValueBuffer::from_values(meta.value_type, &values)?;
            return Ok(RawView {
                inner: RawInner::Owned(buffer),
                offset: 0,
                len,
            });
        }
        let shared = self.session.with_engine(|e| e.raw_array(self.key))?;
        let guard = shared.try_write_arc().ok_or(DataError::StorageInUse)?;
        log::trace!("direct raw view on {:?} [{offset}, {})", self.key, offset + len);
        Ok(RawView {
            inner: RawInner::Direct(guard),
            offset,
            len,
        })
    }
}

enum RawInner {
    Owned(ValueBuffer),
    Direct(ArcRwLockWriteGuard<RawRwLock, ValueBuffer>),
}

/// Window onto array values returned by [`Array::as_raw_view`].
pub struct RawView {
    inner: RawInner,
    offset: usize,
    len: usize,
}

impl fmt::Debug for RawView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawView")
            .field("direct", &self.is_direct())
            .field("value_type", &self.value_type())
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

impl RawView {
    fn buffer(&self) -> &ValueBuffer {
        match &self.inner {
            RawInner::Owned(b) => b,
            RawInner::Direct(g) => g,
        }
    }

    fn buffer_mut(&mut self) -> &mut ValueBuffer {
        match &mut self.inner {
            RawInner::Owned(b) => b,
            RawInner::Direct(g) => &mut *g,
        }
    }

    /// True when writes go straight into engine storage.
    pub fn is_direct(&self) -> bool {
        matches!(self.inner, RawInner::Direct(_))
    }

    pub fn value_type(&self) -> ValueType {
        self.buffer().value_type()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        if index >= self.len {
            return None;
        }
        self.buffer().get(self.offset + index)
    }

    pub fn set(&mut self, index: usize, value: f64) -> Result<(), DataError> {
        if index >= self.len {
            return Err(DataError::out_of_range("raw view", index, self.len));
        }
        let at = self.offset + index;
        self.buffer_mut().set(at, value)
    }

    /// Typed slice; `None` unless `T` is the storage type.
    pub fn as_slice<T: Scalar>(&self) -> Option<&[T]> {
        let (start, end) = (self.offset, self.offset + self.len);
        T::slice(self.buffer()).map(|s| &s[start..end])
    }

    pub fn as_mut_slice<T: Scalar>(&mut self) -> Option<&mut [T]> {
        let (start, end) = (self.offset, self.offset + self.len);
        T::slice_mut(self.buffer_mut()).map(|s| &mut s[start..end])
    }

    /// Raw bytes in the storage type's native layout.
    pub fn as_bytes(&self) -> Result<&[u8], DataError> {
        self.buffer().bytes(self.offset, self.len)
    }

    pub fn to_vec(&self) -> Vec<f64> {
        (0..self.len).filter_map(|i| self.get(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SessionConfig;
    use crate::data_error::DataError;
    use crate::session::Session;
    use crate::types::{ExecutionMode, ValueType};

    #[test]
    fn stepped_slices_read_and_write_element_wise() {
        let session = Session::default();
        let ds = session.create_dataset("t");
        ds.add_variable("x").unwrap();
        let z = ds.add_ordered_zone("z", (6, 1, 1)).unwrap();
        let a = z.values("x").unwrap();
        a.set_all(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let s = crate::data::ArraySlice::FULL.step_by(2);
        assert_eq!(a.get_slice(s).unwrap(), vec![0.0, 2.0, 4.0]);
        a.set_slice(s, &[10.0, 12.0, 14.0]).unwrap();
        assert_eq!(a.to_vec().unwrap(), vec![10.0, 1.0, 12.0, 3.0, 14.0, 5.0]);
        assert_eq!(a.get(-1).unwrap(), 5.0);
    }

    #[test]
    fn direct_view_blocks_engine_access_until_dropped() {
        let session = Session::default();
        let ds = session.create_dataset("t");
        ds.add_variable("x").unwrap();
        let z = ds.add_ordered_zone("z", (3, 1, 1)).unwrap();
        let a = z.values(0).unwrap();
        {
            let mut view = a.as_raw_view(0, None, false).unwrap();
            assert!(view.is_direct());
            view.as_mut_slice::<f32>().unwrap()[1] = 7.0;
            assert_eq!(a.get(1), Err(DataError::StorageInUse));
        }
        assert_eq!(a.get(1).unwrap(), 7.0);
    }

    #[test]
    fn copied_view_is_a_snapshot() {
        let session = Session::default();
        let ds = session.create_dataset("t");
        ds.add_variable("x").unwrap();
        let z = ds.add_ordered_zone("z", (4, 1, 1)).unwrap();
        let a = z.values(0).unwrap();
        a.set_all(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut view = a.as_raw_view(1, Some(2), true).unwrap();
        assert_eq!(view.to_vec(), vec![2.0, 3.0]);
        assert_eq!(view.value_type(), ValueType::Float);
        view.set(0, 9.0).unwrap();
        assert_eq!(a.get(1).unwrap(), 2.0);
        assert!(a.as_raw_view(3, Some(2), true).is_err());
    }

    #[test]
    fn connected_mode_refuses_direct_views() {
        let session = Session::new(SessionConfig::default().with_mode(ExecutionMode::Connected));
        let ds = session.create_dataset("t");
        ds.add_variable("x").unwrap();
        let z = ds.add_ordered_zone("z", (2, 1, 1)).unwrap();
        let a = z.values(0).unwrap();
        assert_eq!(a.as_raw_view(0, None, false).unwrap_err(), DataError::RequiresBatchMode);
        assert!(a.as_raw_view(0, None, true).is_ok());
    }
}
