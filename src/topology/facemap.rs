//! Face-based connectivity of polygonal and polyhedral zones.
//!
//! A facemap transaction runs three phases in order: face nodes, then the
//! left/right elements of every face, then (optionally) boundary
//! connections to elements of other zones. Phases may be repeated but never
//! revisited once a later one has started.

use std::sync::Arc;

use itertools::Itertools;

use super::{OpenAssignment, Structure, Target};
use crate::data::Zone;
use crate::data_error::{DataError, check_index};
use crate::engine::{BoundaryConnection, BoundaryFace, FacemapCapacity, FacemapData};
use crate::handle::{DatasetId, ZoneId};
use crate::session::Session;
use crate::types::ExecutionMode;

/// Handle on the facemap of one polytope zone.
#[derive(Clone, Copy, Debug)]
pub struct Facemap<'s> {
    target: Target<'s>,
}

impl<'s> Facemap<'s> {
    pub(crate) fn new(session: &'s Session, dataset: DatasetId, zone: ZoneId) -> Self {
        Self {
            target: Target::new(session, dataset, zone),
        }
    }

    pub fn zone(&self) -> Zone<'s> {
        self.target.zone()
    }

    fn committed(&self) -> Result<Option<Arc<FacemapData>>, DataError> {
        let Target { dataset, zone, .. } = self.target;
        self.target
            .session
            .with_engine(|e| e.facemap_data(dataset, zone))
    }

    fn data(&self) -> Result<Arc<FacemapData>, DataError> {
        self.committed()?.ok_or(DataError::NotAllocated("facemap"))
    }

    /// True once a facemap has been committed.
    pub fn is_allocated(&self) -> Result<bool, DataError> {
        Ok(self.committed()?.is_some())
    }

    /// Reserve capacity for the next transaction. Inside an open assignment
    /// this restarts staging with the new capacity.
    pub fn alloc(&self, capacity: FacemapCapacity) -> Result<(), DataError> {
        let Target { dataset, zone, .. } = self.target;
        self.target
            .session
            .with_engine(|e| e.facemap_alloc(dataset, zone, capacity))
    }

    /// Open an explicit transaction; needs a prior `alloc` or a committed facemap.
    pub fn assignment(&self) -> Result<FacemapAssignment<'s>, DataError> {
        Ok(FacemapAssignment {
            inner: self.target.begin(Structure::Facemap)?,
        })
    }

    /// Allocate, stage every phase and commit in one step.
    ///
    /// `faces[f]` lists the nodes of face `f`, `elements[f]` its left and
    /// right element, and `boundary` any connections to other zones. Inside
    /// an open assignment the data is only staged.
    pub fn set_mapping(
        &self,
        faces: &[Vec<usize>],
        elements: &[[Option<usize>; 2]],
        boundary: &[BoundaryFace],
    ) -> Result<(), DataError> {
        if elements.len() != faces.len() {
            return Err(DataError::LengthMismatch {
                expected: faces.len(),
                found: elements.len(),
            });
        }
        let counts = faces.iter().map(Vec::len).collect_vec();
        let nodes = faces.iter().flatten().copied().collect_vec();
        let connections = boundary.iter().map(|b| b.connections.len()).sum();
        let capacity =
            FacemapCapacity::new(faces.len(), nodes.len()).with_boundary(boundary.len(), connections);
        let left = elements.iter().map(|[l, _]| *l).collect_vec();
        let right = elements.iter().map(|[_, r]| *r).collect_vec();

        self.alloc(capacity)?;
        self.target.stage(Structure::Facemap, |e, ds, z| {
            e.facemap_set_nodes(ds, z, &counts, &nodes)?;
            e.facemap_set_elements(ds, z, &left, &right)?;
            if !boundary.is_empty() {
                e.facemap_set_boundary_connections(ds, z, boundary)?;
            }
            Ok(())
        })
    }

    pub fn num_faces(&self) -> Result<usize, DataError> {
        Ok(self.data()?.num_faces())
    }

    pub fn num_face_nodes(&self) -> Result<usize, DataError> {
        Ok(self.data()?.num_face_nodes())
    }

    fn face_data(&self, face: usize) -> Result<Arc<FacemapData>, DataError> {
        let data = self.data()?;
        check_index("face", face, data.num_faces())?;
        Ok(data)
    }

    pub fn num_nodes(&self, face: usize) -> Result<usize, DataError> {
        Ok(self.nodes(face)?.len())
    }

    pub fn nodes(&self, face: usize) -> Result<Vec<usize>, DataError> {
        let data = self.face_data(face)?;
        Ok(data.nodes(face).map(<[usize]>::to_vec).unwrap_or_default())
    }

    pub fn node(&self, face: usize, k: usize) -> Result<usize, DataError> {
        let nodes = self.nodes(face)?;
        nodes
            .get(k)
            .copied()
            .ok_or_else(|| DataError::out_of_range("face node", k, nodes.len()))
    }

    /// Element on the left of `face`; `None` on a boundary.
    pub fn left_element(&self, face: usize) -> Result<Option<usize>, DataError> {
        Ok(self.face_data(face)?.left_element(face).flatten())
    }

    pub fn right_element(&self, face: usize) -> Result<Option<usize>, DataError> {
        Ok(self.face_data(face)?.right_element(face).flatten())
    }

    pub fn num_boundary_faces(&self) -> Result<usize, DataError> {
        Ok(self.data()?.num_boundary_faces())
    }

    pub fn num_boundary_connections(&self, face: usize) -> Result<usize, DataError> {
        Ok(self.face_data(face)?.num_boundary_connections(face))
    }

    pub fn boundary_connections(&self, face: usize) -> Result<Vec<BoundaryConnection>, DataError> {
        Ok(self.face_data(face)?.boundary_connections(face).to_vec())
    }

    /// Faces bounding `element`, ascending.
    pub fn element_faces(&self, element: usize) -> Result<Vec<usize>, DataError> {
        let num_elements = self.zone().num_elements()?;
        check_index("element", element, num_elements)?;
        Ok(self.data()?.element_faces(element))
    }

    /// Committed content without copying. Batch mode only.
    pub fn raw_view(&self) -> Result<Arc<FacemapData>, DataError> {
        if self.target.session.mode() != ExecutionMode::Batch {
            return Err(DataError::RequiresBatchMode);
        }
        self.data()
    }

    /// Zones whose facemap is this one, this zone included.
    pub fn shared_zones(&self) -> Result<Vec<Zone<'s>>, DataError> {
        let Target { session, dataset, zone } = self.target;
        let ids = session.with_engine(|e| e.connectivity_shared_zones(dataset, zone))?;
        Ok(ids.into_iter().map(|z| Zone::new(session, dataset, z)).collect())
    }
}

/// Explicit facemap transaction from [`Facemap::assignment`].
#[must_use = "an assignment commits when finished or dropped"]
#[derive(Debug)]
pub struct FacemapAssignment<'s> {
    inner: OpenAssignment<'s>,
}

impl FacemapAssignment<'_> {
    /// Phase one, as per-face node counts plus the concatenated node list.
    pub fn set_nodes(&self, counts: &[usize], nodes: &[usize]) -> Result<(), DataError> {
        let Target { session, dataset, zone } = self.inner.target;
        session.with_engine(|e| e.facemap_set_nodes(dataset, zone, counts, nodes))
    }

    /// Phase one, one node list per face.
    pub fn set_faces(&self, faces: &[Vec<usize>]) -> Result<(), DataError> {
        let counts = faces.iter().map(Vec::len).collect_vec();
        let nodes = faces.iter().flatten().copied().collect_vec();
        self.set_nodes(&counts, &nodes)
    }

    /// Phase two: left and right element of every face.
    pub fn set_elements(&self, left: &[Option<usize>], right: &[Option<usize>]) -> Result<(), DataError> {
        let Target { session, dataset, zone } = self.inner.target;
        session.with_engine(|e| e.facemap_set_elements(dataset, zone, left, right))
    }

    /// Phase three: connections from boundary faces to other zones.
    pub fn set_boundary_connections(&self, faces: &[BoundaryFace]) -> Result<(), DataError> {
        let Target { session, dataset, zone } = self.inner.target;
        session.with_engine(|e| e.facemap_set_boundary_connections(dataset, zone, faces))
    }

    /// Validate and commit; on failure the prior facemap is kept.
    pub fn finish(mut self) -> Result<(), DataError> {
        self.inner.finish()
    }
}
