//! Slice and range arguments for arrays and ordered-zone copies.

use std::ops::{Range, RangeFrom, RangeFull, RangeInclusive, RangeTo, RangeToInclusive};

use crate::data_error::DataError;

/// Resolve a possibly negative index against `len`.
pub(crate) fn resolve_index(what: &'static str, index: i64, len: usize) -> Result<usize, DataError> {
    let signed_len = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { index + signed_len } else { index };
    if (0..signed_len).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(DataError::IndexOutOfRange { what, index, len })
    }
}

/// Half-open `start..stop` selection with a positive step. Negative bounds
/// count from the end and out-of-range bounds are clamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArraySlice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: i64,
}

impl Default for ArraySlice {
    fn default() -> Self {
        Self::FULL
    }
}

impl ArraySlice {
    pub const FULL: Self = Self {
        start: None,
        stop: None,
        step: 1,
    };

    pub fn new(start: Option<i64>, stop: Option<i64>, step: i64) -> Self {
        Self { start, stop, step }
    }

    pub fn step_by(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    pub fn resolve(&self, len: usize) -> Result<ResolvedSlice, DataError> {
        if self.step < 1 {
            return Err(DataError::InvalidSlice(format!(
                "step must be >= 1, got {}",
                self.step
            )));
        }
        let n = i64::try_from(len).unwrap_or(i64::MAX);
        let clamp = |bound: Option<i64>, default: i64| -> i64 {
            match bound {
                None => default,
                Some(b) if b < 0 => (b + n).max(0),
                Some(b) => b.min(n),
            }
        };
        let start = clamp(self.start, 0);
        let stop = clamp(self.stop, n);
        // Both bounds lie in [0, n], so the span is non-negative.
        let count = if stop > start {
            ((stop - start) as u64).div_ceil(self.step as u64)
        } else {
            0
        };
        Ok(ResolvedSlice {
            start: start as usize,
            step: self.step as usize,
            count: count as usize,
        })
    }
}

fn signed(v: usize) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

impl From<Range<usize>> for ArraySlice {
    fn from(r: Range<usize>) -> Self {
        Self::new(Some(signed(r.start)), Some(signed(r.end)), 1)
    }
}

impl From<RangeInclusive<usize>> for ArraySlice {
    fn from(r: RangeInclusive<usize>) -> Self {
        Self::new(Some(signed(*r.start())), Some(signed(*r.end()).saturating_add(1)), 1)
    }
}

impl From<RangeFrom<usize>> for ArraySlice {
    fn from(r: RangeFrom<usize>) -> Self {
        Self::new(Some(signed(r.start)), None, 1)
    }
}

impl From<RangeTo<usize>> for ArraySlice {
    fn from(r: RangeTo<usize>) -> Self {
        Self::new(None, Some(signed(r.end)), 1)
    }
}

impl From<RangeToInclusive<usize>> for ArraySlice {
    fn from(r: RangeToInclusive<usize>) -> Self {
        Self::new(None, Some(signed(r.end).saturating_add(1)), 1)
    }
}

impl From<RangeFull> for ArraySlice {
    fn from(_: RangeFull) -> Self {
        Self::FULL
    }
}

/// A slice resolved against a concrete length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedSlice {
    pub start: usize,
    pub step: usize,
    pub count: usize,
}

impl ResolvedSlice {
    pub fn is_contiguous(&self) -> bool {
        self.step == 1
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.count).map(move |n| self.start + n * self.step)
    }
}

/// Inclusive `(min, max, step)` selection along one ordered axis. Negative
/// bounds count from the end; `max = None` means the last index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexRange {
    pub min: i64,
    pub max: Option<i64>,
    pub step: usize,
}

impl Default for IndexRange {
    fn default() -> Self {
        Self::ALL
    }
}

impl IndexRange {
    pub const ALL: Self = Self {
        min: 0,
        max: None,
        step: 1,
    };

    pub fn new(min: i64, max: i64, step: usize) -> Self {
        Self {
            min,
            max: Some(max),
            step,
        }
    }

    /// Node indices selected along an axis of `dim` nodes.
    pub fn resolve(&self, dim: usize) -> Result<Vec<usize>, DataError> {
        if self.step == 0 {
            return Err(DataError::InvalidSlice("range step must be >= 1".into()));
        }
        let min = resolve_index("range min", self.min, dim)?;
        let max = match self.max {
            None => dim.saturating_sub(1),
            Some(m) => resolve_index("range max", m, dim)?,
        };
        if min > max {
            return Err(DataError::InvalidSlice(format!(
                "range min {min} exceeds max {max}"
            )));
        }
        Ok((min..=max).step_by(self.step).collect())
    }
}

/// A value given once for every item, per item, or left to the default.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum PerItem<T> {
    #[default]
    Default,
    All(T),
    Each(Vec<T>),
}

impl<T: Clone> PerItem<T> {
    /// One value per item.
    pub fn expand(&self, count: usize, default: T) -> Result<Vec<T>, DataError> {
        match self {
            PerItem::Default => Ok(vec![default; count]),
            PerItem::All(v) => Ok(vec![v.clone(); count]),
            PerItem::Each(values) if values.len() == count => Ok(values.clone()),
            PerItem::Each(values) => Err(DataError::LengthMismatch {
                expected: count,
                found: values.len(),
            }),
        }
    }
}

impl<T> From<T> for PerItem<T> {
    fn from(v: T) -> Self {
        PerItem::All(v)
    }
}
