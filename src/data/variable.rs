use std::fmt;

use super::array::Array;
use super::dataset::Dataset;
use super::pattern::ItemRef;
use crate::data_error::{DataError, ItemKind};
use crate::handle::{ArrayKey, DatasetId, VariableId, ZoneId};
use crate::session::Session;
use crate::types::VariableLockMode;

/// Handle on one variable of a dataset.
#[derive(Clone, Copy)]
pub struct Variable<'s> {
    session: &'s Session,
    dataset: DatasetId,
    id: VariableId,
}

impl fmt::Debug for Variable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("dataset", &self.dataset)
            .field("id", &self.id)
            .finish()
    }
}

impl PartialEq for Variable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.dataset == other.dataset && std::ptr::eq(self.session, other.session)
    }
}

impl Eq for Variable<'_> {}

impl<'a> From<Variable<'_>> for ItemRef<'a, VariableId> {
    fn from(v: Variable<'_>) -> Self {
        ItemRef::Handle {
            dataset: Some(v.dataset),
            id: v.id,
        }
    }
}

impl<'a> From<&Variable<'_>> for ItemRef<'a, VariableId> {
    fn from(v: &Variable<'_>) -> Self {
        (*v).into()
    }
}

impl<'s> Variable<'s> {
    pub(crate) fn new(session: &'s Session, dataset: DatasetId, id: VariableId) -> Self {
        Self {
            session,
            dataset,
            id,
        }
    }

    pub fn id(&self) -> VariableId {
        self.id
    }

    pub fn dataset(&self) -> Dataset<'s> {
        Dataset::new(self.session, self.dataset)
    }

    pub fn index(&self) -> Result<usize, DataError> {
        self.session
            .with_engine(|e| e.variable_index(self.dataset, self.id))
    }

    pub fn name(&self) -> Result<String, DataError> {
        self.session
            .with_engine(|e| e.variable_name(self.dataset, self.id))
    }

    pub fn set_name(&self, name: &str) -> Result<(), DataError> {
        self.dataset().check_name(ItemKind::Variable, name)?;
        self.session
            .with_engine(|e| e.set_variable_name(self.dataset, self.id, name))
    }

    pub fn lock_mode(&self) -> Result<VariableLockMode, DataError> {
        self.session
            .with_engine(|e| e.variable_lock(self.dataset, self.id))
    }

    /// Lock held on behalf of other engine subsystems; `ValueLocked`
    /// variables refuse writes and branching.
    pub fn set_lock_mode(&self, lock: VariableLockMode) -> Result<(), DataError> {
        self.session
            .with_engine(|e| e.set_variable_lock(self.dataset, self.id, lock))
    }

    /// Array of this variable in `zone`.
    pub fn values<'a>(&self, zone: impl Into<ItemRef<'a, ZoneId>>) -> Result<Array<'s>, DataError> {
        let zone = self.dataset().resolve_zone(&zone.into())?;
        self.index()?;
        Ok(Array::new(
            self.session,
            ArrayKey {
                dataset: self.dataset,
                zone,
                variable: self.id,
            },
        ))
    }
}
