//! Typed value storage for arrays.
//!
//! `ValueBuffer` is a tagged, type-erased vector over the five storage types.
//! Values cross the public API as `f64` and are converted on the way in; a
//! conversion that cannot represent the value fails before anything is
//! written, so bulk writes are all-or-nothing.

use std::sync::Arc;

use num_traits::{NumCast, ToPrimitive};
use parking_lot::RwLock;

use crate::data_error::DataError;
use crate::types::ValueType;

/// Storage shared by every aliasing (zone, variable) cell.
pub type SharedBuffer = Arc<RwLock<ValueBuffer>>;

/// Storage scalar with a fixed [`ValueType`] tag.
pub trait Scalar: Copy + NumCast + ToPrimitive + bytemuck::Pod + PartialOrd + 'static {
    /// Tag for this concrete type.
    const VALUE_TYPE: ValueType;

    /// Convert a host value, or `None` if it is not representable.
    fn from_f64(v: f64) -> Option<Self>;

    /// Widen to the host value type.
    fn to_host(self) -> f64;

    /// Borrow a typed slice if the tag matches.
    fn slice(buf: &ValueBuffer) -> Option<&[Self]>;

    /// Mutably borrow a typed slice if the tag matches.
    fn slice_mut(buf: &mut ValueBuffer) -> Option<&mut [Self]>;
}

macro_rules! impl_scalar {
    ($ty:ty, $variant:ident, |$v:ident| $convert:expr) => {
        impl Scalar for $ty {
            const VALUE_TYPE: ValueType = ValueType::$variant;

            #[inline]
            fn from_f64($v: f64) -> Option<Self> {
                $convert
            }

            #[inline]
            fn to_host(self) -> f64 {
                self.to_f64().unwrap_or(f64::NAN)
            }

            fn slice(buf: &ValueBuffer) -> Option<&[Self]> {
                if let ValueBuffer::$variant(data) = buf {
                    Some(data)
                } else {
                    None
                }
            }

            fn slice_mut(buf: &mut ValueBuffer) -> Option<&mut [Self]> {
                if let ValueBuffer::$variant(data) = buf {
                    Some(data)
                } else {
                    None
                }
            }
        }
    };
}

impl_scalar!(f32, Float, |v| {
    if v.is_finite() && v.abs() > f32::MAX as f64 {
        None
    } else {
        Some(v as f32)
    }
});
impl_scalar!(f64, Double, |v| Some(v));
impl_scalar!(i32, Int32, |v| <i32 as NumCast>::from(v.round()));
impl_scalar!(i16, Int16, |v| <i16 as NumCast>::from(v.round()));
impl_scalar!(u8, Bit, |v| if v.is_nan() {
    None
} else {
    Some((v != 0.0) as u8)
});

/// Typed flat storage for one array.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueBuffer {
    Float(Vec<f32>),
    Double(Vec<f64>),
    Int32(Vec<i32>),
    Int16(Vec<i16>),
    /// One byte per value, each 0 or 1.
    Bit(Vec<u8>),
}

/// Run `$body` with `$data` bound to the typed vector and `$t` to its scalar type.
macro_rules! with_typed {
    ($buf:expr, $data:ident => $body:expr) => {
        match $buf {
            ValueBuffer::Float($data) => $body,
            ValueBuffer::Double($data) => $body,
            ValueBuffer::Int32($data) => $body,
            ValueBuffer::Int16($data) => $body,
            ValueBuffer::Bit($data) => $body,
        }
    };
}

fn convert<T: Scalar>(v: f64) -> Result<T, DataError> {
    T::from_f64(v).ok_or(DataError::ValueOutOfRange {
        value: v,
        value_type: T::VALUE_TYPE,
    })
}

fn span(offset: usize, len: usize, total: usize) -> Result<std::ops::Range<usize>, DataError> {
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= total)
        .ok_or_else(|| DataError::out_of_range("array offset", offset.saturating_add(len), total))?;
    Ok(offset..end)
}

impl ValueBuffer {
    /// Zero-filled buffer of `len` values.
    pub fn zeroed(value_type: ValueType, len: usize) -> Self {
        match value_type {
            ValueType::Float => ValueBuffer::Float(vec![0.0; len]),
            ValueType::Double => ValueBuffer::Double(vec![0.0; len]),
            ValueType::Int32 => ValueBuffer::Int32(vec![0; len]),
            ValueType::Int16 => ValueBuffer::Int16(vec![0; len]),
            ValueType::Bit => ValueBuffer::Bit(vec![0; len]),
        }
    }

    /// Buffer of `value_type` holding `values`, converted.
    pub fn from_values(value_type: ValueType, values: &[f64]) -> Result<Self, DataError> {
        let mut buf = Self::zeroed(value_type, values.len());
        buf.write_from(0, values)?;
        Ok(buf)
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            ValueBuffer::Float(_) => ValueType::Float,
            ValueBuffer::Double(_) => ValueType::Double,
            ValueBuffer::Int32(_) => ValueType::Int32,
            ValueBuffer::Int16(_) => ValueType::Int16,
            ValueBuffer::Bit(_) => ValueType::Bit,
        }
    }

    pub fn len(&self) -> usize {
        with_typed!(self, data => data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index`, widened to `f64`.
    pub fn get(&self, index: usize) -> Option<f64> {
        with_typed!(self, data => data.get(index).map(|v| v.to_host()))
    }

    /// Store `value` at `index`.
    pub fn set(&mut self, index: usize, value: f64) -> Result<(), DataError> {
        let len = self.len();
        with_typed!(self, data => {
            let slot = data
                .get_mut(index)
                .ok_or_else(|| DataError::out_of_range("array", index, len))?;
            *slot = convert(value)?;
        });
        Ok(())
    }

    /// Read `dst.len()` values starting at `offset`.
    pub fn read_into(&self, offset: usize, dst: &mut [f64]) -> Result<(), DataError> {
        let range = span(offset, dst.len(), self.len())?;
        with_typed!(self, data => {
            for (d, s) in dst.iter_mut().zip(&data[range]) {
                *d = s.to_host();
            }
        });
        Ok(())
    }

    /// Write `src` starting at `offset`. Nothing is written if any value fails
    /// to convert.
    pub fn write_from(&mut self, offset: usize, src: &[f64]) -> Result<(), DataError> {
        let range = span(offset, src.len(), self.len())?;
        with_typed!(self, data => {
            let converted = src.iter().map(|&v| convert(v)).collect::<Result<Vec<_>, _>>()?;
            data[range].copy_from_slice(&converted);
        });
        Ok(())
    }

    /// Copy every value of `other` into `self`, converting types.
    pub fn copy_from(&mut self, other: &ValueBuffer) -> Result<(), DataError> {
        if other.len() != self.len() {
            return Err(DataError::LengthMismatch {
                expected: self.len(),
                found: other.len(),
            });
        }
        if other.value_type() == self.value_type() {
            *self = other.clone();
            return Ok(());
        }
        self.write_from(0, &other.to_host_vec())
    }

    /// Every value widened to `f64`.
    pub fn to_host_vec(&self) -> Vec<f64> {
        with_typed!(self, data => data.iter().map(|v| v.to_host()).collect())
    }

    /// New buffer of the same type holding the values at `indices`.
    pub fn gather(&self, indices: &[usize]) -> Result<ValueBuffer, DataError> {
        let len = self.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
            return Err(DataError::out_of_range("array", bad, len));
        }
        Ok(match self {
            ValueBuffer::Float(d) => ValueBuffer::Float(indices.iter().map(|&i| d[i]).collect()),
            ValueBuffer::Double(d) => ValueBuffer::Double(indices.iter().map(|&i| d[i]).collect()),
            ValueBuffer::Int32(d) => ValueBuffer::Int32(indices.iter().map(|&i| d[i]).collect()),
            ValueBuffer::Int16(d) => ValueBuffer::Int16(indices.iter().map(|&i| d[i]).collect()),
            ValueBuffer::Bit(d) => ValueBuffer::Bit(indices.iter().map(|&i| d[i]).collect()),
        })
    }

    /// Negate every value in place. Bit values are left unchanged.
    pub fn negate(&mut self) {
        match self {
            ValueBuffer::Float(d) => d.iter_mut().for_each(|v| *v = -*v),
            ValueBuffer::Double(d) => d.iter_mut().for_each(|v| *v = -*v),
            ValueBuffer::Int32(d) => d.iter_mut().for_each(|v| *v = v.wrapping_neg()),
            ValueBuffer::Int16(d) => d.iter_mut().for_each(|v| *v = v.wrapping_neg()),
            ValueBuffer::Bit(_) => {}
        }
    }

    /// Minimum and maximum, ignoring NaN. `None` when empty or all-NaN.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        with_typed!(self, data => {
            data.iter()
                .map(|v| v.to_host())
                .filter(|v| !v.is_nan())
                .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                    None => Some((v, v)),
                    Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                })
        })
    }

    /// Raw bytes of the values `[offset .. offset + len)`.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], DataError> {
        let range = span(offset, len, self.len())?;
        Ok(with_typed!(self, data => bytemuck::cast_slice(&data[range])))
    }
}
