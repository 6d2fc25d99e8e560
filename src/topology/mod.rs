//! Connectivity handles: nodemaps, facemaps and face neighbors.
//!
//! All three are edited through transactions. An explicit transaction is an
//! RAII guard returned by `assignment()`: stage writes on it, then call
//! `finish()` to validate and commit. A guard dropped without `finish()`
//! still commits, but can only log a failure. Single writes outside a guard
//! open and close an implicit transaction around themselves; inside an open
//! guard they only stage.
//!
//! A failed commit discards the staged data and leaves the previously
//! committed content (or the unallocated state) in place. So does a single
//! write that fails inside its implicit transaction.

pub mod face_neighbors;
pub mod facemap;
pub mod nodemap;

pub use face_neighbors::{FaceNeighborAssignment, FaceNeighbors};
pub use facemap::{Facemap, FacemapAssignment};
pub use nodemap::{Nodemap, NodemapAssignment};

use crate::data::Zone;
use crate::data_error::DataError;
use crate::engine::{ChangeEvent, Engine};
use crate::handle::{DatasetId, ZoneId};
use crate::session::Session;

/// Which connectivity structure a transaction edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Structure {
    Nodemap,
    Facemap,
    FaceNeighbors,
}

impl Structure {
    fn as_str(self) -> &'static str {
        match self {
            Structure::Nodemap => "nodemap",
            Structure::Facemap => "facemap",
            Structure::FaceNeighbors => "face neighbors",
        }
    }

    fn in_assignment(self, e: &dyn Engine, ds: DatasetId, zone: ZoneId) -> Result<bool, DataError> {
        match self {
            Structure::Nodemap => e.nodemap_in_assignment(ds, zone),
            Structure::Facemap => e.facemap_in_assignment(ds, zone),
            Structure::FaceNeighbors => e.face_neighbors_in_assignment(ds, zone),
        }
    }

    fn begin(self, e: &mut dyn Engine, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        match self {
            Structure::Nodemap => e.nodemap_begin_assign(ds, zone),
            Structure::Facemap => e.facemap_begin_assign(ds, zone),
            Structure::FaceNeighbors => e.face_neighbors_begin_assign(ds, zone),
        }
    }

    fn end(self, e: &mut dyn Engine, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        match self {
            Structure::Nodemap => e.nodemap_end_assign(ds, zone),
            Structure::Facemap => e.facemap_end_assign(ds, zone),
            Structure::FaceNeighbors => e.face_neighbors_end_assign(ds, zone),
        }
    }

    fn abort(self, e: &mut dyn Engine, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        match self {
            Structure::Nodemap => e.nodemap_abort_assign(ds, zone),
            Structure::Facemap => e.facemap_abort_assign(ds, zone),
            Structure::FaceNeighbors => e.face_neighbors_abort_assign(ds, zone),
        }
    }
}

/// The zone a connectivity handle edits.
#[derive(Clone, Copy)]
pub(crate) struct Target<'s> {
    pub(crate) session: &'s Session,
    pub(crate) dataset: DatasetId,
    pub(crate) zone: ZoneId,
}

impl std::fmt::Debug for Target<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.dataset, self.zone)
    }
}

impl<'s> Target<'s> {
    pub(crate) fn new(session: &'s Session, dataset: DatasetId, zone: ZoneId) -> Self {
        Self {
            session,
            dataset,
            zone,
        }
    }

    pub(crate) fn zone(&self) -> Zone<'s> {
        Zone::new(self.session, self.dataset, self.zone)
    }

    pub(crate) fn altered(&self) {
        self.session.emit(ChangeEvent::ConnectivityAltered {
            dataset: self.dataset,
            zone: self.zone,
        });
    }

    pub(crate) fn begin(&self, structure: Structure) -> Result<OpenAssignment<'s>, DataError> {
        self.session
            .with_engine(|e| structure.begin(e, self.dataset, self.zone))?;
        Ok(OpenAssignment {
            target: *self,
            structure,
            open: true,
        })
    }

    /// Run `stage` inside the open transaction, or inside an implicit one
    /// committed before returning. An implicit transaction whose `stage`
    /// fails is aborted: nothing is committed and no event is sent.
    pub(crate) fn stage<F>(&self, structure: Structure, stage: F) -> Result<(), DataError>
    where
        F: FnOnce(&mut dyn Engine, DatasetId, ZoneId) -> Result<(), DataError>,
    {
        let (ds, zone) = (self.dataset, self.zone);
        let committed = self.session.with_engine(|e| {
            if structure.in_assignment(&*e, ds, zone)? {
                stage(&mut *e, ds, zone)?;
                return Ok::<_, DataError>(false);
            }
            structure.begin(&mut *e, ds, zone)?;
            if let Err(err) = stage(&mut *e, ds, zone) {
                if let Err(abort) = structure.abort(&mut *e, ds, zone) {
                    log::warn!("{} of {zone}: abort failed: {abort}", structure.as_str());
                }
                return Err(err);
            }
            structure.end(&mut *e, ds, zone)?;
            Ok(true)
        })?;
        if committed {
            self.altered();
        }
        Ok(())
    }
}

/// Open transaction shared by the public guards.
#[derive(Debug)]
pub(crate) struct OpenAssignment<'s> {
    pub(crate) target: Target<'s>,
    structure: Structure,
    open: bool,
}

impl OpenAssignment<'_> {
    pub(crate) fn finish(&mut self) -> Result<(), DataError> {
        if !std::mem::take(&mut self.open) {
            return Ok(());
        }
        let Target { dataset, zone, .. } = self.target;
        self.target
            .session
            .with_engine(|e| self.structure.end(e, dataset, zone))?;
        self.target.altered();
        Ok(())
    }
}

impl Drop for OpenAssignment<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            log::warn!(
                "{} assignment on {} dropped without finish() and failed to commit: {err}",
                self.structure.as_str(),
                self.target.zone
            );
        }
    }
}
