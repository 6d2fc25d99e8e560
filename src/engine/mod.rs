//! Engine boundary: the primitive operations the data model consumes.
//!
//! The host engine owns all storage. The data-model handles in
//! [`crate::data`] and [`crate::topology`] only ever talk to it through the
//! traits below, grouped the way the engine groups its primitives:
//!
//! - [`Catalog`]: datasets, identity resolution (index ↔ id), zone and
//!   variable lifecycle, change notification.
//! - [`ArrayAccess`]: scalar and bulk value access, reductions, aliasing.
//! - [`ConnectivityAccess`]: nodemap and facemap allocation and assignment.
//! - [`NeighborAccess`]: face-neighbor assignment and queries.
//!
//! [`InMemoryEngine`] implements all four in-process. Every call is made
//! while the session lock is held, so implementations need not be
//! reentrant.

pub mod buffer;
pub mod connectivity;
pub mod memory;
pub mod neighbors;

use std::sync::Arc;

use crate::data_error::DataError;
use crate::handle::{ArrayKey, DatasetId, VariableId, ZoneId};
use crate::types::{
    EngineVersion, ExecutionMode, FaceNeighborMode, Location, ValueType, VariableLockMode,
    ZoneShape,
};

pub use buffer::{Scalar, SharedBuffer, ValueBuffer};
pub use connectivity::{BoundaryConnection, BoundaryFace, FacemapCapacity, FacemapData, NodemapData};
pub use memory::InMemoryEngine;
pub use neighbors::{FaceNeighborData, Neighbor};

/// Storage request for one array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArraySpec {
    pub value_type: ValueType,
    pub location: Location,
    /// Create without storage; reads as zeros until first written.
    pub passive: bool,
}

impl ArraySpec {
    pub fn new(value_type: ValueType, location: Location) -> Self {
        Self {
            value_type,
            location,
            passive: false,
        }
    }
}

/// Everything the engine needs to create a zone.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneSpec {
    pub name: String,
    pub shape: ZoneShape,
    pub parent: Option<ZoneId>,
    pub solution_time: f64,
    pub strand_id: i32,
    pub face_neighbor_mode: FaceNeighborMode,
    /// Replace the zone at this position instead of appending.
    pub index: Option<usize>,
}

/// Snapshot of a zone's metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneInfo {
    pub id: ZoneId,
    pub name: String,
    /// Shape with the deferred polytope face count resolved from the facemap.
    pub shape: ZoneShape,
    pub solution_time: f64,
    pub strand_id: i32,
    pub parent: Option<ZoneId>,
    pub face_neighbor_mode: FaceNeighborMode,
    pub enabled: bool,
}

/// Mutable zone attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum ZoneUpdate {
    Name(String),
    SolutionTime(f64),
    Strand(i32),
    Enabled(bool),
}

/// Metadata of one array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrayInfo {
    pub value_type: ValueType,
    pub location: Location,
    pub len: usize,
    pub passive: bool,
}

/// How `Catalog::copy_zones` builds one copy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CopyPlan {
    /// Name of the copy; `None` reuses the source name.
    pub name: Option<String>,
    /// Ordered node indices kept along i, j and k; `None` keeps everything.
    pub ranges: Option<[Vec<usize>; 3]>,
    /// Variables aliased to the source instead of copied.
    pub shared: Vec<VariableId>,
    /// Variables copied with every value negated.
    pub negated: Vec<VariableId>,
}

/// Change notifications emitted after mutations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    /// Values of one (zone, variable) array changed.
    DataAltered {
        dataset: DatasetId,
        zone: ZoneId,
        variable: VariableId,
    },
    /// Nodemap, facemap or face neighbors of a zone changed.
    ConnectivityAltered { dataset: DatasetId, zone: ZoneId },
    /// Zones or variables were added, deleted or re-aliased.
    StructureAltered { dataset: DatasetId },
}

impl ChangeEvent {
    pub fn dataset(&self) -> DatasetId {
        match *self {
            ChangeEvent::DataAltered { dataset, .. }
            | ChangeEvent::ConnectivityAltered { dataset, .. }
            | ChangeEvent::StructureAltered { dataset } => dataset,
        }
    }
}

/// Datasets, identity resolution and lifecycle.
pub trait Catalog {
    fn mode(&self) -> ExecutionMode;
    fn version(&self) -> EngineVersion;

    fn create_dataset(&mut self, title: &str) -> DatasetId;
    fn destroy_dataset(&mut self, ds: DatasetId) -> Result<(), DataError>;
    fn dataset_ids(&self) -> Vec<DatasetId>;
    fn dataset_title(&self, ds: DatasetId) -> Result<String, DataError>;
    fn set_dataset_title(&mut self, ds: DatasetId, title: &str) -> Result<(), DataError>;

    fn num_variables(&self, ds: DatasetId) -> Result<usize, DataError>;
    fn variable_id(&self, ds: DatasetId, index: usize) -> Result<VariableId, DataError>;
    fn variable_index(&self, ds: DatasetId, id: VariableId) -> Result<usize, DataError>;
    fn variable_name(&self, ds: DatasetId, id: VariableId) -> Result<String, DataError>;
    fn set_variable_name(&mut self, ds: DatasetId, id: VariableId, name: &str)
    -> Result<(), DataError>;
    fn variable_lock(&self, ds: DatasetId, id: VariableId) -> Result<VariableLockMode, DataError>;
    fn set_variable_lock(
        &mut self,
        ds: DatasetId,
        id: VariableId,
        lock: VariableLockMode,
    ) -> Result<(), DataError>;
    /// Append a variable; `arrays` holds one spec per existing zone.
    fn add_variable(
        &mut self,
        ds: DatasetId,
        name: &str,
        arrays: &[ArraySpec],
    ) -> Result<VariableId, DataError>;
    fn delete_variables(&mut self, ds: DatasetId, ids: &[VariableId]) -> Result<(), DataError>;

    fn num_zones(&self, ds: DatasetId) -> Result<usize, DataError>;
    fn zone_id(&self, ds: DatasetId, index: usize) -> Result<ZoneId, DataError>;
    fn zone_index(&self, ds: DatasetId, id: ZoneId) -> Result<usize, DataError>;
    fn zone_info(&self, ds: DatasetId, id: ZoneId) -> Result<ZoneInfo, DataError>;
    fn update_zone(&mut self, ds: DatasetId, id: ZoneId, update: ZoneUpdate)
    -> Result<(), DataError>;
    /// Add (or replace) a zone; `arrays` holds one spec per existing variable.
    fn add_zone(
        &mut self,
        ds: DatasetId,
        spec: &ZoneSpec,
        arrays: &[ArraySpec],
    ) -> Result<ZoneId, DataError>;
    fn delete_zones(&mut self, ds: DatasetId, ids: &[ZoneId]) -> Result<(), DataError>;
    /// Append one copy per `(source, plan)` pair, in order. Every copy is
    /// built before any is added, so a failure leaves the dataset unchanged.
    fn copy_zones(
        &mut self,
        ds: DatasetId,
        copies: &[(ZoneId, CopyPlan)],
    ) -> Result<Vec<ZoneId>, DataError>;

    /// Hook through which the host learns about data or connectivity changes.
    fn notify(&mut self, event: &ChangeEvent);
}

/// Value access and aliasing for arrays.
pub trait ArrayAccess {
    fn array_info(&self, key: ArrayKey) -> Result<ArrayInfo, DataError>;
    fn get_value(&self, key: ArrayKey, offset: usize) -> Result<f64, DataError>;
    fn get_values(&self, key: ArrayKey, offset: usize, dst: &mut [f64]) -> Result<(), DataError>;
    fn set_value(&mut self, key: ArrayKey, offset: usize, value: f64) -> Result<(), DataError>;
    fn set_values(&mut self, key: ArrayKey, offset: usize, src: &[f64]) -> Result<(), DataError>;
    /// Engine-side reduction; `(0, 0)` for passive arrays.
    fn min_max(&self, key: ArrayKey) -> Result<(f64, f64), DataError>;
    /// Copy every value of `src` into `dst` without leaving the engine.
    fn copy_array(&mut self, src: ArrayKey, dst: ArrayKey) -> Result<(), DataError>;
    /// Direct handle on the backing storage. Batch mode only.
    fn raw_array(&mut self, key: ArrayKey) -> Result<SharedBuffer, DataError>;
    /// Zones whose array for the same variable aliases this storage.
    fn shared_zones(&self, key: ArrayKey) -> Result<Vec<ZoneId>, DataError>;
    /// Give every (zone, variable) cell independent storage.
    fn branch_arrays(
        &mut self,
        ds: DatasetId,
        zones: &[ZoneId],
        variables: &[VariableId],
        copy_data: bool,
    ) -> Result<(), DataError>;
    /// Alias the destination cells to the source zone's storage. All
    /// destinations are validated before any is changed.
    fn share_arrays(
        &mut self,
        ds: DatasetId,
        source: ZoneId,
        destinations: &[ZoneId],
        variables: &[VariableId],
    ) -> Result<(), DataError>;
}

/// Nodemap and facemap primitives.
pub trait ConnectivityAccess {
    fn branch_connectivity(&mut self, ds: DatasetId, zones: &[ZoneId]) -> Result<(), DataError>;
    fn share_connectivity(
        &mut self,
        ds: DatasetId,
        source: ZoneId,
        destinations: &[ZoneId],
    ) -> Result<(), DataError>;
    fn connectivity_shared_zones(&self, ds: DatasetId, zone: ZoneId)
    -> Result<Vec<ZoneId>, DataError>;

    fn nodemap_alloc(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError>;
    /// Committed content; `None` while unallocated.
    fn nodemap_data(&self, ds: DatasetId, zone: ZoneId)
    -> Result<Option<Arc<NodemapData>>, DataError>;
    fn nodemap_begin_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError>;
    fn nodemap_in_assignment(&self, ds: DatasetId, zone: ZoneId) -> Result<bool, DataError>;
    fn nodemap_set(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        element: usize,
        nodes: &[usize],
    ) -> Result<(), DataError>;
    fn nodemap_set_all(&mut self, ds: DatasetId, zone: ZoneId, flat: &[usize])
    -> Result<(), DataError>;
    /// Validate and commit. On failure the prior content is retained.
    fn nodemap_end_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError>;
    /// Close the assignment and drop everything it staged.
    fn nodemap_abort_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError>;
    /// Elements referencing `node`, in ascending order.
    fn nodemap_elements_using_node(
        &self,
        ds: DatasetId,
        zone: ZoneId,
        node: usize,
    ) -> Result<Vec<usize>, DataError>;

    fn facemap_alloc(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        capacity: FacemapCapacity,
    ) -> Result<(), DataError>;
    fn facemap_data(&self, ds: DatasetId, zone: ZoneId)
    -> Result<Option<Arc<FacemapData>>, DataError>;
    fn facemap_begin_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError>;
    fn facemap_in_assignment(&self, ds: DatasetId, zone: ZoneId) -> Result<bool, DataError>;
    fn facemap_set_nodes(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        counts: &[usize],
        nodes: &[usize],
    ) -> Result<(), DataError>;
    fn facemap_set_elements(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        left: &[Option<usize>],
        right: &[Option<usize>],
    ) -> Result<(), DataError>;
    fn facemap_set_boundary_connections(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        faces: &[BoundaryFace],
    ) -> Result<(), DataError>;
    fn facemap_end_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError>;
    fn facemap_abort_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError>;
}

/// Face-neighbor primitives.
pub trait NeighborAccess {
    fn face_neighbors_begin_assign(&mut self, ds: DatasetId, zone: ZoneId)
    -> Result<(), DataError>;
    fn face_neighbors_in_assignment(&self, ds: DatasetId, zone: ZoneId) -> Result<bool, DataError>;
    fn face_neighbors_add(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        element: usize,
        face: usize,
        neighbors: &[usize],
        zones: Option<&[usize]>,
        obscures: bool,
    ) -> Result<(), DataError>;
    /// `flat[element * faces_per_element + face]` is the neighbor element, if any.
    fn face_neighbors_add_local(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        flat: &[Option<usize>],
    ) -> Result<(), DataError>;
    fn face_neighbors_end_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError>;
    fn face_neighbors_abort_assign(&mut self, ds: DatasetId, zone: ZoneId)
    -> Result<(), DataError>;
    fn face_neighbors(&self, ds: DatasetId, zone: ZoneId)
    -> Result<Arc<FaceNeighborData>, DataError>;
}

/// The full primitive set a session drives.
pub trait Engine: Catalog + ArrayAccess + ConnectivityAccess + NeighborAccess + Send {}

impl<T> Engine for T where T: Catalog + ArrayAccess + ConnectivityAccess + NeighborAccess + Send {}
