//! Face-neighbor stitching for ordered and classic FE zones.
//!
//! Neighbors are addressed by (element, face). In a local mode every
//! neighbor is an element of the same zone; in a global mode each neighbor
//! also names a zone, given by its dataset index. Starting an assignment
//! discards the current neighbors; the new set replaces them on commit.

use std::sync::Arc;

use itertools::Itertools;

use super::{OpenAssignment, Structure, Target};
use crate::data::Zone;
use crate::data_error::{DataError, check_index};
use crate::engine::{FaceNeighborData, Neighbor};
use crate::handle::{DatasetId, ZoneId};
use crate::session::Session;
use crate::types::{FaceNeighborMode, Feature};

/// Handle on the face neighbors of one zone.
#[derive(Clone, Copy, Debug)]
pub struct FaceNeighbors<'s> {
    target: Target<'s>,
}

impl<'s> FaceNeighbors<'s> {
    pub(crate) fn new(session: &'s Session, dataset: DatasetId, zone: ZoneId) -> Self {
        Self {
            target: Target::new(session, dataset, zone),
        }
    }

    pub fn zone(&self) -> Zone<'s> {
        self.target.zone()
    }

    fn data(&self) -> Result<Arc<FaceNeighborData>, DataError> {
        let Target { dataset, zone, .. } = self.target;
        self.target
            .session
            .with_engine(|e| e.face_neighbors(dataset, zone))
    }

    pub fn mode(&self) -> Result<FaceNeighborMode, DataError> {
        Ok(self.data()?.mode())
    }

    /// `(num_elements, faces_per_element)` of the owning zone.
    fn extent(&self) -> Result<(usize, usize), DataError> {
        let shape = self.zone().shape()?;
        Ok((shape.num_elements(), shape.num_faces_per_element().unwrap_or(0)))
    }

    fn check_face(&self, element: usize, face: usize) -> Result<(), DataError> {
        let (ne, fpe) = self.extent()?;
        check_index("element", element, ne)?;
        check_index("face", face, fpe)
    }

    pub fn neighbors(&self, element: usize, face: usize) -> Result<Vec<Neighbor>, DataError> {
        self.check_face(element, face)?;
        Ok(self.data()?.neighbors(element, face).to_vec())
    }

    pub fn num_neighbors(&self, element: usize, face: usize) -> Result<usize, DataError> {
        self.check_face(element, face)?;
        Ok(self.data()?.num_neighbors(element, face))
    }

    /// Whether `face` of `element` is hidden by a neighbor. With
    /// `active_zones`, only neighbors in those zones count.
    pub fn is_obscured(
        &self,
        element: usize,
        face: usize,
        active_zones: Option<&[ZoneId]>,
    ) -> Result<bool, DataError> {
        self.check_face(element, face)?;
        Ok(self
            .data()?
            .is_obscured(element, face, self.target.zone, active_zones))
    }

    /// Open an explicit transaction. The current neighbors are cleared from
    /// staging; they stay visible until the commit replaces them.
    pub fn assignment(&self) -> Result<FaceNeighborAssignment<'s>, DataError> {
        self.target.session.require(Feature::FaceNeighborAssignment)?;
        Ok(FaceNeighborAssignment {
            inner: self.target.begin(Structure::FaceNeighbors)?,
        })
    }

    /// Replace every neighbor from a dense element × face table.
    ///
    /// `neighbors[e][f]` lists the neighbor elements across face `f` of
    /// element `e` (empty for none). Global modes pass `zones` with the same
    /// shape holding dataset zone indices. The table is checked in full
    /// before anything is staged.
    pub fn set_neighbors(
        &self,
        neighbors: &[Vec<Vec<usize>>],
        zones: Option<&[Vec<Vec<usize>>]>,
        obscures: bool,
    ) -> Result<(), DataError> {
        self.target.session.require(Feature::FaceNeighborAssignment)?;
        self.check_table(neighbors, zones)?;
        let entries = neighbors
            .iter()
            .enumerate()
            .flat_map(|(e, row)| row.iter().enumerate().map(move |(f, n)| (e, f, n)))
            .filter(|(_, _, n)| !n.is_empty())
            .collect_vec();
        self.target.stage(Structure::FaceNeighbors, |eng, ds, z| {
            for &(e, f, list) in &entries {
                let zone_list = zones.map(|zs| zs[e][f].as_slice());
                eng.face_neighbors_add(ds, z, e, f, list, zone_list, obscures)?;
            }
            Ok(())
        })
    }

    /// Replace every neighbor from a flat one-to-one local table,
    /// `flat[e * faces_per_element + f]`.
    pub fn set_local_neighbors(&self, flat: &[Option<usize>]) -> Result<(), DataError> {
        self.target.session.require(Feature::FaceNeighborAssignment)?;
        let (ne, fpe) = self.extent()?;
        if flat.len() != ne * fpe {
            return Err(DataError::LengthMismatch {
                expected: ne * fpe,
                found: flat.len(),
            });
        }
        if let Some(&bad) = flat.iter().flatten().find(|&&n| n >= ne) {
            return Err(DataError::out_of_range("neighbor element", bad, ne));
        }
        self.target.stage(Structure::FaceNeighbors, |eng, ds, z| {
            eng.face_neighbors_add_local(ds, z, flat)
        })
    }

    fn check_table(
        &self,
        neighbors: &[Vec<Vec<usize>>],
        zones: Option<&[Vec<Vec<usize>>]>,
    ) -> Result<(), DataError> {
        let (ne, fpe) = self.extent()?;
        let shape_err = |expected: usize, found: usize| DataError::LengthMismatch { expected, found };
        if neighbors.len() != ne {
            return Err(shape_err(ne, neighbors.len()));
        }
        if let Some(row) = neighbors.iter().find(|r| r.len() != fpe) {
            return Err(shape_err(fpe, row.len()));
        }
        let global = self.mode()?.is_global();
        match (global, zones) {
            (false, None) => {
                if let Some(&bad) = neighbors.iter().flatten().flatten().find(|&&n| n >= ne) {
                    return Err(DataError::out_of_range("neighbor element", bad, ne));
                }
            }
            (true, Some(zones)) => {
                let zone_sizes = self.target.session.with_engine(|e| {
                    let ds = self.target.dataset;
                    (0..e.num_zones(ds)?)
                        .map(|i| -> Result<usize, DataError> {
                            Ok(e.zone_info(ds, e.zone_id(ds, i)?)?.shape.num_elements())
                        })
                        .collect::<Result<Vec<_>, _>>()
                })?;
                if zones.len() != ne {
                    return Err(shape_err(ne, zones.len()));
                }
                for (nrow, zrow) in neighbors.iter().zip(zones) {
                    if zrow.len() != fpe {
                        return Err(shape_err(fpe, zrow.len()));
                    }
                    for (ns, zs) in nrow.iter().zip(zrow) {
                        if ns.len() != zs.len() {
                            return Err(shape_err(ns.len(), zs.len()));
                        }
                        for (&n, &zi) in ns.iter().zip(zs) {
                            check_index("neighbor zone", zi, zone_sizes.len())?;
                            check_index("neighbor element", n, zone_sizes[zi])?;
                        }
                    }
                }
            }
            (true, None) => {
                return Err(DataError::InvalidArgument(
                    "global face neighbors need a zone for every neighbor".into(),
                ));
            }
            (false, Some(_)) => {
                return Err(DataError::InvalidArgument(
                    "local face neighbors cannot name zones".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Explicit face-neighbor transaction from [`FaceNeighbors::assignment`].
#[must_use = "an assignment commits when finished or dropped"]
#[derive(Debug)]
pub struct FaceNeighborAssignment<'s> {
    inner: OpenAssignment<'s>,
}

impl FaceNeighborAssignment<'_> {
    /// Add neighbors across one face. `zones` (dataset zone indices) is
    /// required in global modes and refused in local ones.
    pub fn add_neighbors(
        &self,
        element: usize,
        face: usize,
        neighbors: &[usize],
        zones: Option<&[usize]>,
        obscures: bool,
    ) -> Result<(), DataError> {
        let Target { session, dataset, zone } = self.inner.target;
        session.with_engine(|e| {
            e.face_neighbors_add(dataset, zone, element, face, neighbors, zones, obscures)
        })
    }

    /// Add one-to-one local neighbors for every face at once; each
    /// neighbor obscures its face.
    pub fn add_local_neighbors(&self, flat: &[Option<usize>]) -> Result<(), DataError> {
        let Target { session, dataset, zone } = self.inner.target;
        session.with_engine(|e| e.face_neighbors_add_local(dataset, zone, flat))
    }

    /// Validate and commit; on failure the prior neighbors are kept.
    pub fn finish(mut self) -> Result<(), DataError> {
        self.inner.finish()
    }
}
