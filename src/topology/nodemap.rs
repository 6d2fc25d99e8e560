//! Element-to-node connectivity of classic finite-element zones.

use std::sync::Arc;

use itertools::Itertools;

use super::{OpenAssignment, Structure, Target};
use crate::data::Zone;
use crate::data_error::{DataError, check_index};
use crate::engine::NodemapData;
use crate::handle::{DatasetId, ZoneId};
use crate::session::Session;
use crate::types::ExecutionMode;

/// Handle on the nodemap of one classic FE zone.
#[derive(Clone, Copy, Debug)]
pub struct Nodemap<'s> {
    target: Target<'s>,
}

impl<'s> Nodemap<'s> {
    pub(crate) fn new(session: &'s Session, dataset: DatasetId, zone: ZoneId) -> Self {
        Self {
            target: Target::new(session, dataset, zone),
        }
    }

    pub fn zone(&self) -> Zone<'s> {
        self.target.zone()
    }

    fn data(&self) -> Result<Arc<NodemapData>, DataError> {
        let Target { dataset, zone, .. } = self.target;
        self.target
            .session
            .with_engine(|e| e.nodemap_data(dataset, zone))?
            .ok_or(DataError::NotAllocated("nodemap"))
    }

    pub fn is_allocated(&self) -> Result<bool, DataError> {
        let Target { dataset, zone, .. } = self.target;
        Ok(self
            .target
            .session
            .with_engine(|e| e.nodemap_data(dataset, zone))?
            .is_some())
    }

    /// Allocate zero-filled storage; a no-op once allocated.
    pub fn alloc(&self) -> Result<(), DataError> {
        let Target { dataset, zone, .. } = self.target;
        self.target
            .session
            .with_engine(|e| e.nodemap_alloc(dataset, zone))
    }

    /// `(num_elements, num_points_per_element)`.
    pub fn shape(&self) -> Result<(usize, usize), DataError> {
        let z = self.zone().as_classic_fe()?;
        Ok((z.num_elements()?, z.num_points_per_element()?))
    }

    pub fn num_elements(&self) -> Result<usize, DataError> {
        Ok(self.shape()?.0)
    }

    pub fn num_points_per_element(&self) -> Result<usize, DataError> {
        Ok(self.shape()?.1)
    }

    /// Nodes of `element`.
    pub fn get(&self, element: usize) -> Result<Vec<usize>, DataError> {
        let data = self.data()?;
        data.element(element)
            .map(<[usize]>::to_vec)
            .ok_or_else(|| DataError::out_of_range("element", element, data.num_elements()))
    }

    pub fn node(&self, element: usize, k: usize) -> Result<usize, DataError> {
        let data = self.data()?;
        check_index("element", element, data.num_elements())?;
        check_index("element node", k, data.num_points_per_element())?;
        data.node(element, k)
            .ok_or_else(|| DataError::out_of_range("element node", k, data.num_points_per_element()))
    }

    /// One row of nodes per element.
    pub fn to_vec(&self) -> Result<Vec<Vec<usize>>, DataError> {
        Ok(self.data()?.rows().map(<[usize]>::to_vec).collect())
    }

    /// Element-major flat node list.
    pub fn to_flat(&self) -> Result<Vec<usize>, DataError> {
        Ok(self.data()?.as_flat().to_vec())
    }

    /// Open an explicit transaction.
    pub fn assignment(&self) -> Result<NodemapAssignment<'s>, DataError> {
        Ok(NodemapAssignment {
            inner: self.target.begin(Structure::Nodemap)?,
        })
    }

    fn check_nodes(&self, nodes: &[usize]) -> Result<(), DataError> {
        let num_points = self.zone().num_points()?;
        match nodes.iter().find(|&&n| n >= num_points) {
            Some(&bad) => Err(DataError::out_of_range("node", bad, num_points)),
            None => Ok(()),
        }
    }

    /// Set the nodes of one element. Outside an assignment this commits
    /// immediately; batch many writes into one `assignment()` instead.
    pub fn set(&self, element: usize, nodes: &[usize]) -> Result<(), DataError> {
        let (ne, ppe) = self.shape()?;
        check_index("element", element, ne)?;
        if nodes.len() != ppe {
            return Err(DataError::LengthMismatch {
                expected: ppe,
                found: nodes.len(),
            });
        }
        self.check_nodes(nodes)?;
        self.target.stage(Structure::Nodemap, |e, ds, z| e.nodemap_set(ds, z, element, nodes))
    }

    /// Replace every element from one row per element.
    pub fn set_all(&self, rows: &[Vec<usize>]) -> Result<(), DataError> {
        let (ne, ppe) = self.shape()?;
        if rows.len() != ne {
            return Err(DataError::LengthMismatch {
                expected: ne,
                found: rows.len(),
            });
        }
        if let Some(row) = rows.iter().find(|r| r.len() != ppe) {
            return Err(DataError::LengthMismatch {
                expected: ppe,
                found: row.len(),
            });
        }
        self.set_flat(&rows.iter().flatten().copied().collect_vec())
    }

    /// Replace every element from an element-major flat list.
    pub fn set_flat(&self, flat: &[usize]) -> Result<(), DataError> {
        let (ne, ppe) = self.shape()?;
        if flat.len() != ne * ppe {
            return Err(DataError::LengthMismatch {
                expected: ne * ppe,
                found: flat.len(),
            });
        }
        self.check_nodes(flat)?;
        self.target.stage(Structure::Nodemap, |e, ds, z| e.nodemap_set_all(ds, z, flat))
    }

    /// Elements referencing `node`, ascending.
    pub fn elements_using_node(&self, node: usize) -> Result<Vec<usize>, DataError> {
        let Target { dataset, zone, .. } = self.target;
        self.target
            .session
            .with_engine(|e| e.nodemap_elements_using_node(dataset, zone, node))
    }

    pub fn num_elements_using_node(&self, node: usize) -> Result<usize, DataError> {
        Ok(self.elements_using_node(node)?.len())
    }

    /// The `k`-th element (ascending) referencing `node`.
    pub fn element(&self, node: usize, k: usize) -> Result<usize, DataError> {
        let elements = self.elements_using_node(node)?;
        elements
            .get(k)
            .copied()
            .ok_or_else(|| DataError::out_of_range("element of node", k, elements.len()))
    }

    /// Committed content without copying. Batch mode only.
    pub fn raw_view(&self) -> Result<Arc<NodemapData>, DataError> {
        if self.target.session.mode() != ExecutionMode::Batch {
            return Err(DataError::RequiresBatchMode);
        }
        self.data()
    }

    /// Zones whose nodemap is this one, this zone included.
    pub fn shared_zones(&self) -> Result<Vec<Zone<'s>>, DataError> {
        let Target { session, dataset, zone } = self.target;
        let ids = session.with_engine(|e| e.connectivity_shared_zones(dataset, zone))?;
        Ok(ids.into_iter().map(|z| Zone::new(session, dataset, z)).collect())
    }
}

/// Explicit nodemap transaction from [`Nodemap::assignment`].
#[must_use = "an assignment commits when finished or dropped"]
#[derive(Debug)]
pub struct NodemapAssignment<'s> {
    inner: OpenAssignment<'s>,
}

impl NodemapAssignment<'_> {
    pub fn set(&self, element: usize, nodes: &[usize]) -> Result<(), DataError> {
        let Target { session, dataset, zone } = self.inner.target;
        session.with_engine(|e| e.nodemap_set(dataset, zone, element, nodes))
    }

    pub fn set_flat(&self, flat: &[usize]) -> Result<(), DataError> {
        let Target { session, dataset, zone } = self.inner.target;
        session.with_engine(|e| e.nodemap_set_all(dataset, zone, flat))
    }

    pub fn set_all(&self, rows: &[Vec<usize>]) -> Result<(), DataError> {
        self.set_flat(&rows.iter().flatten().copied().collect_vec())
    }

    /// Validate and commit; on failure the prior content is kept.
    pub fn finish(mut self) -> Result<(), DataError> {
        self.inner.finish()
    }
}
