//! In-process engine: owns every dataset, array buffer and connectivity store.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::buffer::{SharedBuffer, ValueBuffer};
use super::connectivity::{FacemapStore, NodemapStore, SharedFacemap, SharedNodemap};
use super::neighbors::FaceNeighborStore;
use super::{
    ArrayAccess, ArrayInfo, ArraySpec, Catalog, ChangeEvent, CopyPlan, ZoneInfo, ZoneSpec,
    ZoneUpdate,
};
use crate::config::SessionConfig;
use crate::data_error::{DataError, ItemKind, check_index};
use crate::debug_invariants::DebugInvariants;
use crate::handle::{ArrayKey, DatasetId, IdAllocator, VariableId, ZoneId};
use crate::types::{EngineVersion, ExecutionMode, Location, ValueType, VariableLockMode, ZoneShape};

pub(crate) fn read_storage(
    storage: &SharedBuffer,
) -> Result<RwLockReadGuard<'_, ValueBuffer>, DataError> {
    storage.try_read().ok_or(DataError::StorageInUse)
}

pub(crate) fn write_storage(
    storage: &SharedBuffer,
) -> Result<RwLockWriteGuard<'_, ValueBuffer>, DataError> {
    storage.try_write().ok_or(DataError::StorageInUse)
}

#[derive(Clone, Debug)]
pub(crate) struct VariableRecord {
    pub(crate) id: VariableId,
    pub(crate) name: String,
    pub(crate) lock: VariableLockMode,
}

/// One (zone, variable) cell. `storage == None` means passive.
#[derive(Clone, Debug)]
pub(crate) struct ArraySlot {
    pub(crate) value_type: ValueType,
    pub(crate) location: Location,
    pub(crate) storage: Option<SharedBuffer>,
}

impl ArraySlot {
    fn new(spec: ArraySpec, len: usize) -> Self {
        let storage = (!spec.passive)
            .then(|| Arc::new(RwLock::new(ValueBuffer::zeroed(spec.value_type, len))));
        Self {
            value_type: spec.value_type,
            location: spec.location,
            storage,
        }
    }

    /// Independent storage holding the same values.
    fn deep_copy(&self) -> Result<Self, DataError> {
        let storage = match &self.storage {
            Some(s) => Some(Arc::new(RwLock::new(read_storage(s)?.clone()))),
            None => None,
        };
        Ok(Self {
            value_type: self.value_type,
            location: self.location,
            storage,
        })
    }

    /// Allocate zero-filled storage if passive and return it.
    fn materialize(&mut self, len: usize) -> &SharedBuffer {
        let value_type = self.value_type;
        self.storage
            .get_or_insert_with(|| Arc::new(RwLock::new(ValueBuffer::zeroed(value_type, len))))
    }

    fn aliases(&self, other: &ArraySlot) -> bool {
        match (&self.storage, &other.storage) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Connectivity attached to a finite-element zone.
#[derive(Clone, Debug)]
pub(crate) enum Connectivity {
    None,
    Nodemap(SharedNodemap),
    Facemap(SharedFacemap),
}

impl Connectivity {
    fn for_shape(shape: &ZoneShape) -> Self {
        match *shape {
            ZoneShape::Ordered { .. } => Connectivity::None,
            ZoneShape::ClassicFE { .. } => {
                Connectivity::Nodemap(Arc::new(RwLock::new(NodemapStore::new(shape))))
            }
            ZoneShape::PolyFE { .. } => {
                Connectivity::Facemap(Arc::new(RwLock::new(FacemapStore::new(shape))))
            }
        }
    }

    /// Eager deep copy of the committed content.
    pub(crate) fn branched(&self) -> Self {
        match self {
            Connectivity::None => Connectivity::None,
            Connectivity::Nodemap(store) => {
                Connectivity::Nodemap(Arc::new(RwLock::new(store.read().branched())))
            }
            Connectivity::Facemap(store) => {
                Connectivity::Facemap(Arc::new(RwLock::new(store.read().branched())))
            }
        }
    }

    pub(crate) fn aliases(&self, other: &Connectivity) -> bool {
        match (self, other) {
            (Connectivity::Nodemap(a), Connectivity::Nodemap(b)) => Arc::ptr_eq(a, b),
            (Connectivity::Facemap(a), Connectivity::Facemap(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ZoneRecord {
    pub(crate) id: ZoneId,
    pub(crate) name: String,
    pub(crate) shape: ZoneShape,
    pub(crate) solution_time: f64,
    pub(crate) strand_id: i32,
    pub(crate) parent: Option<ZoneId>,
    pub(crate) enabled: bool,
    /// One slot per variable, in variable order.
    pub(crate) arrays: Vec<ArraySlot>,
    pub(crate) connectivity: Connectivity,
    pub(crate) neighbors: FaceNeighborStore,
}

impl ZoneRecord {
    /// Shape with a deferred polytope face count taken from the facemap.
    pub(crate) fn resolved_shape(&self) -> ZoneShape {
        match (self.shape, &self.connectivity) {
            (
                ZoneShape::PolyFE {
                    kind,
                    num_points,
                    num_elements,
                    num_faces: 0,
                },
                Connectivity::Facemap(store),
            ) => ZoneShape::PolyFE {
                kind,
                num_points,
                num_elements,
                num_faces: store.read().committed_faces(),
            },
            (shape, _) => shape,
        }
    }

    fn info(&self) -> ZoneInfo {
        ZoneInfo {
            id: self.id,
            name: self.name.clone(),
            shape: self.resolved_shape(),
            solution_time: self.solution_time,
            strand_id: self.strand_id,
            parent: self.parent,
            face_neighbor_mode: self.neighbors.mode(),
            enabled: self.enabled,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct DatasetRecord {
    pub(crate) id: DatasetId,
    pub(crate) title: String,
    pub(crate) variables: Vec<VariableRecord>,
    pub(crate) zones: Vec<ZoneRecord>,
}

impl DatasetRecord {
    pub(crate) fn zone_pos(&self, id: ZoneId) -> Result<usize, DataError> {
        self.zones
            .iter()
            .position(|z| z.id == id)
            .ok_or_else(|| DataError::NotFound {
                kind: ItemKind::Zone,
                pattern: id.to_string(),
            })
    }

    pub(crate) fn var_pos(&self, id: VariableId) -> Result<usize, DataError> {
        self.variables
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| DataError::NotFound {
                kind: ItemKind::Variable,
                pattern: id.to_string(),
            })
    }

    pub(crate) fn zone(&self, id: ZoneId) -> Result<&ZoneRecord, DataError> {
        Ok(&self.zones[self.zone_pos(id)?])
    }

    pub(crate) fn zone_mut(&mut self, id: ZoneId) -> Result<&mut ZoneRecord, DataError> {
        let pos = self.zone_pos(id)?;
        Ok(&mut self.zones[pos])
    }

    fn slot(&self, zone: ZoneId, variable: VariableId) -> Result<(&ZoneRecord, &ArraySlot), DataError> {
        let vpos = self.var_pos(variable)?;
        let z = self.zone(zone)?;
        Ok((z, &z.arrays[vpos]))
    }

    fn check_writable(&self, variable: VariableId) -> Result<usize, DataError> {
        let vpos = self.var_pos(variable)?;
        if self.variables[vpos].lock == VariableLockMode::ValueLocked {
            return Err(DataError::VariableLocked {
                variable,
                op: "value changes",
            });
        }
        Ok(vpos)
    }

    /// Storage of a writable cell, materializing a passive one.
    fn writable_storage(&mut self, key: ArrayKey) -> Result<SharedBuffer, DataError> {
        let vpos = self.check_writable(key.variable)?;
        let zone = self.zone_mut(key.zone)?;
        let len = zone.shape.array_len(zone.arrays[vpos].location);
        Ok(zone.arrays[vpos].materialize(len).clone())
    }
}

impl DebugInvariants for DatasetRecord {
    fn validate_invariants(&self) -> Result<(), DataError> {
        let mut zone_ids = BTreeSet::new();
        for z in &self.zones {
            if !zone_ids.insert(z.id) {
                return Err(DataError::InvalidArgument(format!("duplicate zone id {}", z.id)));
            }
            if z.arrays.len() != self.variables.len() {
                return Err(DataError::LengthMismatch {
                    expected: self.variables.len(),
                    found: z.arrays.len(),
                });
            }
            for slot in &z.arrays {
                let expected = z.shape.array_len(slot.location);
                // Storage held by a raw view is skipped rather than waited on.
                if let Some(buf) = slot.storage.as_ref().and_then(|s| s.try_read()) {
                    if buf.len() != expected {
                        return Err(DataError::LengthMismatch {
                            expected,
                            found: buf.len(),
                        });
                    }
                }
            }
        }
        let var_ids: BTreeSet<_> = self.variables.iter().map(|v| v.id).collect();
        if var_ids.len() != self.variables.len() {
            return Err(DataError::InvalidArgument("duplicate variable id".into()));
        }
        Ok(())
    }
}

/// Engine keeping every dataset in process memory.
///
/// Reports the execution mode it was built with; in [`ExecutionMode::Connected`]
/// it behaves exactly like a remote engine would from the caller's side and
/// refuses direct raw access.
#[derive(Debug)]
pub struct InMemoryEngine {
    mode: ExecutionMode,
    version: EngineVersion,
    check_invariants: bool,
    ids: IdAllocator,
    pub(crate) datasets: Vec<DatasetRecord>,
    notifications: Vec<ChangeEvent>,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::with_config(&SessionConfig::default())
    }
}

impl InMemoryEngine {
    /// Batch-mode engine at the current version.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &SessionConfig) -> Self {
        Self {
            mode: config.mode,
            version: config.engine_version,
            check_invariants: config.check_invariants,
            ids: IdAllocator::default(),
            datasets: Vec::new(),
            notifications: Vec::new(),
        }
    }

    /// Every notification received so far, oldest first.
    pub fn notifications(&self) -> &[ChangeEvent] {
        &self.notifications
    }

    pub(crate) fn dataset(&self, ds: DatasetId) -> Result<&DatasetRecord, DataError> {
        self.datasets
            .iter()
            .find(|d| d.id == ds)
            .ok_or(DataError::DatasetNotFound(ds))
    }

    pub(crate) fn dataset_mut(&mut self, ds: DatasetId) -> Result<&mut DatasetRecord, DataError> {
        self.datasets
            .iter_mut()
            .find(|d| d.id == ds)
            .ok_or(DataError::DatasetNotFound(ds))
    }

    pub(crate) fn zone(&self, ds: DatasetId, zone: ZoneId) -> Result<&ZoneRecord, DataError> {
        self.dataset(ds)?.zone(zone)
    }

    pub(crate) fn zone_mut(&mut self, ds: DatasetId, zone: ZoneId) -> Result<&mut ZoneRecord, DataError> {
        self.dataset_mut(ds)?.zone_mut(zone)
    }

    pub(crate) fn checks_invariants(&self) -> bool {
        self.check_invariants
    }

    fn after_mutation(&self, ds: DatasetId) {
        if self.check_invariants {
            if let Ok(record) = self.dataset(ds) {
                record.check_invariants("dataset after mutation");
            }
        }
    }

    fn build_copy(&mut self, ds: DatasetId, source: ZoneId, plan: &CopyPlan) -> Result<ZoneRecord, DataError> {
        let id = self.ids.zone();
        let record = self.dataset_mut(ds)?;
        let shared: Vec<usize> = plan
            .shared
            .iter()
            .map(|&v| record.var_pos(v))
            .collect::<Result<_, _>>()?;
        let negated: Vec<usize> = plan
            .negated
            .iter()
            .map(|&v| record.var_pos(v))
            .collect::<Result<_, _>>()?;
        let src = record.zone_mut(source)?;

        let (shape, gather) = match (&plan.ranges, src.shape) {
            (None, shape) => (shape, None),
            (Some(ranges), ZoneShape::Ordered { dims }) => {
                let new_dims = [ranges[0].len(), ranges[1].len(), ranges[2].len()];
                if new_dims.contains(&0) {
                    return Err(DataError::InvalidShape("copy range selects no nodes".into()));
                }
                let identity = new_dims == dims
                    && ranges
                        .iter()
                        .all(|r| r.iter().enumerate().all(|(n, &i)| n == i));
                if identity {
                    (src.shape, None)
                } else {
                    let nodal = ordered_gather_nodal(dims, ranges);
                    let cells = ordered_gather_cells(dims, ranges);
                    (ZoneShape::Ordered { dims: new_dims }, Some((nodal, cells)))
                }
            }
            (Some(_), _) => {
                return Err(DataError::InvalidArgument(
                    "index ranges only apply to ordered zones".into(),
                ));
            }
        };

        if gather.is_some() && !shared.is_empty() {
            return Err(DataError::SharingInvalid(
                "a ranged copy cannot alias the source's arrays".into(),
            ));
        }

        let src_shape = src.shape;
        let mut arrays = Vec::with_capacity(src.arrays.len());
        for (vpos, slot) in src.arrays.iter_mut().enumerate() {
            if shared.contains(&vpos) {
                let len = src_shape.array_len(slot.location);
                slot.materialize(len);
                arrays.push(slot.clone());
                continue;
            }
            let copy = match (&gather, &slot.storage) {
                (Some((nodal, cells)), Some(storage)) => {
                    let indices = match slot.location {
                        Location::Nodal => nodal,
                        Location::CellCentered => cells,
                    };
                    let buf = read_storage(storage)?.gather(indices)?;
                    ArraySlot {
                        value_type: slot.value_type,
                        location: slot.location,
                        storage: Some(Arc::new(RwLock::new(buf))),
                    }
                }
                _ => slot.deep_copy()?,
            };
            if negated.contains(&vpos) {
                if let Some(storage) = &copy.storage {
                    write_storage(storage)?.negate();
                }
            }
            arrays.push(copy);
        }

        let connectivity = src.connectivity.branched();
        let neighbors = if gather.is_some() {
            FaceNeighborStore::new(src.neighbors.mode())
        } else {
            src.neighbors.branched()
        };
        Ok(ZoneRecord {
            id,
            name: plan.name.clone().unwrap_or_else(|| src.name.clone()),
            shape,
            solution_time: src.solution_time,
            strand_id: src.strand_id,
            parent: src.parent,
            enabled: src.enabled,
            arrays,
            connectivity,
            neighbors,
        })
    }
}

fn element_extent(dim: usize) -> usize {
    if dim > 1 { dim - 1 } else { 1 }
}

/// Linear node indices selected by per-axis node ranges.
fn ordered_gather_nodal(dims: [usize; 3], ranges: &[Vec<usize>; 3]) -> Vec<usize> {
    let mut out = Vec::with_capacity(ranges.iter().map(Vec::len).product());
    for &k in &ranges[2] {
        for &j in &ranges[1] {
            for &i in &ranges[0] {
                out.push(i + dims[0] * (j + dims[1] * k));
            }
        }
    }
    out
}

/// Linear element indices: each new cell takes the source cell at its lower
/// corner node.
fn ordered_gather_cells(dims: [usize; 3], ranges: &[Vec<usize>; 3]) -> Vec<usize> {
    let ext = dims.map(element_extent);
    let axis = |a: usize| -> Vec<usize> {
        let r = &ranges[a];
        if r.len() > 1 {
            r[..r.len() - 1].to_vec()
        } else {
            vec![r[0].min(ext[a] - 1)]
        }
    };
    let (ri, rj, rk) = (axis(0), axis(1), axis(2));
    let mut out = Vec::with_capacity(ri.len() * rj.len() * rk.len());
    for &k in &rk {
        for &j in &rj {
            for &i in &ri {
                out.push(i + ext[0] * (j + ext[1] * k));
            }
        }
    }
    out
}

fn dedup_positions<I, F>(ids: I, mut pos: F) -> Result<Vec<usize>, DataError>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Result<usize, DataError>,
{
    let set: BTreeSet<usize> = ids.into_iter().map(&mut pos).collect::<Result<_, _>>()?;
    Ok(set.into_iter().collect())
}

impl Catalog for InMemoryEngine {
    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn version(&self) -> EngineVersion {
        self.version
    }

    fn create_dataset(&mut self, title: &str) -> DatasetId {
        let id = self.ids.dataset();
        self.datasets.push(DatasetRecord {
            id,
            title: title.to_owned(),
            variables: Vec::new(),
            zones: Vec::new(),
        });
        log::debug!("created {id} `{title}`");
        id
    }

    fn destroy_dataset(&mut self, ds: DatasetId) -> Result<(), DataError> {
        let pos = self
            .datasets
            .iter()
            .position(|d| d.id == ds)
            .ok_or(DataError::DatasetNotFound(ds))?;
        self.datasets.remove(pos);
        log::debug!("destroyed {ds}");
        Ok(())
    }

    fn dataset_ids(&self) -> Vec<DatasetId> {
        self.datasets.iter().map(|d| d.id).collect()
    }

    fn dataset_title(&self, ds: DatasetId) -> Result<String, DataError> {
        Ok(self.dataset(ds)?.title.clone())
    }

    fn set_dataset_title(&mut self, ds: DatasetId, title: &str) -> Result<(), DataError> {
        self.dataset_mut(ds)?.title = title.to_owned();
        Ok(())
    }

    fn num_variables(&self, ds: DatasetId) -> Result<usize, DataError> {
        Ok(self.dataset(ds)?.variables.len())
    }

    fn variable_id(&self, ds: DatasetId, index: usize) -> Result<VariableId, DataError> {
        let record = self.dataset(ds)?;
        check_index("variable", index, record.variables.len())?;
        Ok(record.variables[index].id)
    }

    fn variable_index(&self, ds: DatasetId, id: VariableId) -> Result<usize, DataError> {
        self.dataset(ds)?.var_pos(id)
    }

    fn variable_name(&self, ds: DatasetId, id: VariableId) -> Result<String, DataError> {
        let record = self.dataset(ds)?;
        Ok(record.variables[record.var_pos(id)?].name.clone())
    }

    fn set_variable_name(&mut self, ds: DatasetId, id: VariableId, name: &str) -> Result<(), DataError> {
        let record = self.dataset_mut(ds)?;
        let pos = record.var_pos(id)?;
        record.variables[pos].name = name.to_owned();
        Ok(())
    }

    fn variable_lock(&self, ds: DatasetId, id: VariableId) -> Result<VariableLockMode, DataError> {
        let record = self.dataset(ds)?;
        Ok(record.variables[record.var_pos(id)?].lock)
    }

    fn set_variable_lock(
        &mut self,
        ds: DatasetId,
        id: VariableId,
        lock: VariableLockMode,
    ) -> Result<(), DataError> {
        let record = self.dataset_mut(ds)?;
        let pos = record.var_pos(id)?;
        record.variables[pos].lock = lock;
        Ok(())
    }

    fn add_variable(
        &mut self,
        ds: DatasetId,
        name: &str,
        arrays: &[ArraySpec],
    ) -> Result<VariableId, DataError> {
        let id = self.ids.variable();
        let record = self.dataset_mut(ds)?;
        if arrays.len() != record.zones.len() {
            return Err(DataError::LengthMismatch {
                expected: record.zones.len(),
                found: arrays.len(),
            });
        }
        record.variables.push(VariableRecord {
            id,
            name: name.to_owned(),
            lock: VariableLockMode::None,
        });
        for (zone, &spec) in record.zones.iter_mut().zip(arrays) {
            let len = zone.shape.array_len(spec.location);
            zone.arrays.push(ArraySlot::new(spec, len));
        }
        log::debug!("{ds}: added {id} `{name}` to {} zone(s)", arrays.len());
        self.after_mutation(ds);
        Ok(id)
    }

    fn delete_variables(&mut self, ds: DatasetId, ids: &[VariableId]) -> Result<(), DataError> {
        let record = self.dataset_mut(ds)?;
        let positions = dedup_positions(ids.iter().copied(), |id| record.var_pos(id))?;
        if positions.is_empty() {
            return Ok(());
        }
        if positions.len() >= record.variables.len() {
            return Err(DataError::LastItem(ItemKind::Variable));
        }
        if let Some(&pos) = positions
            .iter()
            .find(|&&p| record.variables[p].lock == VariableLockMode::DeleteLocked)
        {
            return Err(DataError::VariableLocked {
                variable: record.variables[pos].id,
                op: "deletion",
            });
        }
        for &pos in positions.iter().rev() {
            record.variables.remove(pos);
            for zone in &mut record.zones {
                zone.arrays.remove(pos);
            }
        }
        log::debug!("{ds}: deleted {} variable(s)", positions.len());
        self.after_mutation(ds);
        Ok(())
    }

    fn num_zones(&self, ds: DatasetId) -> Result<usize, DataError> {
        Ok(self.dataset(ds)?.zones.len())
    }

    fn zone_id(&self, ds: DatasetId, index: usize) -> Result<ZoneId, DataError> {
        let record = self.dataset(ds)?;
        check_index("zone", index, record.zones.len())?;
        Ok(record.zones[index].id)
    }

    fn zone_index(&self, ds: DatasetId, id: ZoneId) -> Result<usize, DataError> {
        self.dataset(ds)?.zone_pos(id)
    }

    fn zone_info(&self, ds: DatasetId, id: ZoneId) -> Result<ZoneInfo, DataError> {
        Ok(self.zone(ds, id)?.info())
    }

    fn update_zone(&mut self, ds: DatasetId, id: ZoneId, update: ZoneUpdate) -> Result<(), DataError> {
        let zone = self.zone_mut(ds, id)?;
        match update {
            ZoneUpdate::Name(name) => zone.name = name,
            ZoneUpdate::SolutionTime(t) => zone.solution_time = t,
            ZoneUpdate::Strand(s) => zone.strand_id = s,
            ZoneUpdate::Enabled(on) => zone.enabled = on,
        }
        Ok(())
    }

    fn add_zone(
        &mut self,
        ds: DatasetId,
        spec: &ZoneSpec,
        arrays: &[ArraySpec],
    ) -> Result<ZoneId, DataError> {
        spec.shape.validate()?;
        let id = self.ids.zone();
        let record = self.dataset_mut(ds)?;
        if record.variables.is_empty() {
            return Err(DataError::NoVariables);
        }
        if arrays.len() != record.variables.len() {
            return Err(DataError::LengthMismatch {
                expected: record.variables.len(),
                found: arrays.len(),
            });
        }
        if let Some(parent) = spec.parent {
            record.zone_pos(parent)?;
        }
        if let Some(index) = spec.index {
            check_index("zone", index, record.zones.len() + 1)?;
        }
        let zone = ZoneRecord {
            id,
            name: spec.name.clone(),
            shape: spec.shape,
            solution_time: spec.solution_time,
            strand_id: spec.strand_id,
            parent: spec.parent,
            enabled: true,
            arrays: arrays
                .iter()
                .map(|&a| ArraySlot::new(a, spec.shape.array_len(a.location)))
                .collect(),
            connectivity: Connectivity::for_shape(&spec.shape),
            neighbors: FaceNeighborStore::new(spec.face_neighbor_mode),
        };
        match spec.index {
            Some(index) if index < record.zones.len() => {
                let old = std::mem::replace(&mut record.zones[index], zone);
                log::debug!("{ds}: {id} replaced {} at index {index}", old.id);
            }
            _ => {
                record.zones.push(zone);
                log::debug!("{ds}: added {id} `{}`", spec.name);
            }
        }
        self.after_mutation(ds);
        Ok(id)
    }

    fn delete_zones(&mut self, ds: DatasetId, ids: &[ZoneId]) -> Result<(), DataError> {
        let record = self.dataset_mut(ds)?;
        let positions = dedup_positions(ids.iter().copied(), |id| record.zone_pos(id))?;
        if positions.is_empty() {
            return Ok(());
        }
        if positions.len() >= record.zones.len() {
            return Err(DataError::LastItem(ItemKind::Zone));
        }
        let gone: Vec<ZoneId> = positions.iter().map(|&pos| record.zones[pos].id).collect();
        for &pos in positions.iter().rev() {
            record.zones.remove(pos);
        }
        // References into deleted zones are dropped, never left dangling.
        let mut purged = 0;
        for zone in &mut record.zones {
            if zone.parent.is_some_and(|p| gone.contains(&p)) {
                zone.parent = None;
            }
            if let Connectivity::Facemap(store) = &zone.connectivity {
                purged += store.write().forget_zones(&gone);
            }
            purged += zone.neighbors.forget_zones(&gone);
        }
        log::debug!(
            "{ds}: deleted {} zone(s), dropped {purged} connection(s) into them",
            positions.len()
        );
        self.after_mutation(ds);
        Ok(())
    }

    fn copy_zones(
        &mut self,
        ds: DatasetId,
        copies: &[(ZoneId, CopyPlan)],
    ) -> Result<Vec<ZoneId>, DataError> {
        let built = copies
            .iter()
            .map(|(source, plan)| self.build_copy(ds, *source, plan))
            .collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<ZoneId> = built.iter().map(|z| z.id).collect();
        self.dataset_mut(ds)?.zones.extend(built);
        log::debug!("{ds}: copied {} zone(s) into {ids:?}", ids.len());
        self.after_mutation(ds);
        Ok(ids)
    }

    fn notify(&mut self, event: &ChangeEvent) {
        log::trace!("engine notified: {event:?}");
        self.notifications.push(*event);
    }
}

impl ArrayAccess for InMemoryEngine {
    fn array_info(&self, key: ArrayKey) -> Result<ArrayInfo, DataError> {
        let (zone, slot) = self.dataset(key.dataset)?.slot(key.zone, key.variable)?;
        Ok(ArrayInfo {
            value_type: slot.value_type,
            location: slot.location,
            len: zone.shape.array_len(slot.location),
            passive: slot.storage.is_none(),
        })
    }

    fn get_value(&self, key: ArrayKey, offset: usize) -> Result<f64, DataError> {
        let (zone, slot) = self.dataset(key.dataset)?.slot(key.zone, key.variable)?;
        let len = zone.shape.array_len(slot.location);
        check_index("array", offset, len)?;
        match &slot.storage {
            Some(s) => read_storage(s)?
                .get(offset)
                .ok_or_else(|| DataError::out_of_range("array", offset, len)),
            None => Ok(0.0),
        }
    }

    fn get_values(&self, key: ArrayKey, offset: usize, dst: &mut [f64]) -> Result<(), DataError> {
        let (zone, slot) = self.dataset(key.dataset)?.slot(key.zone, key.variable)?;
        match &slot.storage {
            Some(s) => read_storage(s)?.read_into(offset, dst),
            None => {
                let len = zone.shape.array_len(slot.location);
                match offset.checked_add(dst.len()) {
                    Some(end) if end <= len => {
                        dst.fill(0.0);
                        Ok(())
                    }
                    _ => Err(DataError::out_of_range("array offset", offset.saturating_add(dst.len()), len)),
                }
            }
        }
    }

    fn set_value(&mut self, key: ArrayKey, offset: usize, value: f64) -> Result<(), DataError> {
        let storage = self.dataset_mut(key.dataset)?.writable_storage(key)?;
        write_storage(&storage)?.set(offset, value)
    }

    fn set_values(&mut self, key: ArrayKey, offset: usize, src: &[f64]) -> Result<(), DataError> {
        let storage = self.dataset_mut(key.dataset)?.writable_storage(key)?;
        write_storage(&storage)?.write_from(offset, src)
    }

    fn min_max(&self, key: ArrayKey) -> Result<(f64, f64), DataError> {
        let (_, slot) = self.dataset(key.dataset)?.slot(key.zone, key.variable)?;
        match &slot.storage {
            Some(s) => Ok(read_storage(s)?.min_max().unwrap_or((0.0, 0.0))),
            None => Ok((0.0, 0.0)),
        }
    }

    fn copy_array(&mut self, src: ArrayKey, dst: ArrayKey) -> Result<(), DataError> {
        if src.dataset != dst.dataset {
            return Err(DataError::DatasetMismatch {
                expected: dst.dataset,
                found: src.dataset,
            });
        }
        let record = self.dataset_mut(dst.dataset)?;
        let (src_len, src_storage) = {
            let (zone, slot) = record.slot(src.zone, src.variable)?;
            (zone.shape.array_len(slot.location), slot.storage.clone())
        };
        let dst_len = {
            let (zone, slot) = record.slot(dst.zone, dst.variable)?;
            zone.shape.array_len(slot.location)
        };
        if src_len != dst_len {
            return Err(DataError::LengthMismatch {
                expected: dst_len,
                found: src_len,
            });
        }
        let target = record.writable_storage(dst)?;
        match src_storage {
            Some(source) if Arc::ptr_eq(&source, &target) => Ok(()),
            Some(source) => {
                let from = read_storage(&source)?;
                write_storage(&target)?.copy_from(&from)
            }
            None => {
                let mut to = write_storage(&target)?;
                let zeros = ValueBuffer::zeroed(to.value_type(), dst_len);
                *to = zeros;
                Ok(())
            }
        }
    }

    fn raw_array(&mut self, key: ArrayKey) -> Result<SharedBuffer, DataError> {
        if self.mode != ExecutionMode::Batch {
            return Err(DataError::RequiresBatchMode);
        }
        self.dataset_mut(key.dataset)?.writable_storage(key)
    }

    fn shared_zones(&self, key: ArrayKey) -> Result<Vec<ZoneId>, DataError> {
        let record = self.dataset(key.dataset)?;
        let vpos = record.var_pos(key.variable)?;
        let this = &record.zone(key.zone)?.arrays[vpos];
        if this.storage.is_none() {
            return Ok(vec![key.zone]);
        }
        Ok(record
            .zones
            .iter()
            .filter(|z| z.arrays[vpos].aliases(this))
            .map(|z| z.id)
            .collect())
    }

    fn branch_arrays(
        &mut self,
        ds: DatasetId,
        zones: &[ZoneId],
        variables: &[VariableId],
        copy_data: bool,
    ) -> Result<(), DataError> {
        let record = self.dataset_mut(ds)?;
        let zpos = dedup_positions(zones.iter().copied(), |z| record.zone_pos(z))?;
        let vpos = dedup_positions(variables.iter().copied(), |v| record.var_pos(v))?;
        if !copy_data {
            for &v in &vpos {
                record.check_writable(record.variables[v].id)?;
            }
        }
        // Build every copy before swapping any in.
        let mut replacements = Vec::with_capacity(zpos.len() * vpos.len());
        for &z in &zpos {
            for &v in &vpos {
                let slot = &record.zones[z].arrays[v];
                let branched = if copy_data {
                    slot.deep_copy()?
                } else {
                    ArraySlot {
                        storage: None,
                        ..slot.clone()
                    }
                };
                replacements.push((z, v, branched));
            }
        }
        for (z, v, slot) in replacements {
            record.zones[z].arrays[v] = slot;
        }
        log::debug!(
            "{ds}: branched {} variable(s) in {} zone(s), copy_data={copy_data}",
            vpos.len(),
            zpos.len()
        );
        self.after_mutation(ds);
        Ok(())
    }

    fn share_arrays(
        &mut self,
        ds: DatasetId,
        source: ZoneId,
        destinations: &[ZoneId],
        variables: &[VariableId],
    ) -> Result<(), DataError> {
        let record = self.dataset_mut(ds)?;
        let src = record.zone_pos(source)?;
        let dsts = dedup_positions(destinations.iter().copied(), |z| record.zone_pos(z))?;
        let vpos = dedup_positions(variables.iter().copied(), |v| record.var_pos(v))?;

        for &v in &vpos {
            record.check_writable(record.variables[v].id)?;
            let location = record.zones[src].arrays[v].location;
            let src_len = record.zones[src].shape.array_len(location);
            for &d in &dsts {
                let dst_len = record.zones[d].shape.array_len(location);
                if dst_len != src_len {
                    return Err(DataError::SharingInvalid(format!(
                        "variable `{}`: zone {} holds {src_len} values but zone {} would need {dst_len}",
                        record.variables[v].name, record.zones[src].id, record.zones[d].id
                    )));
                }
            }
        }

        for &v in &vpos {
            let src_zone = &mut record.zones[src];
            let len = src_zone.shape.array_len(src_zone.arrays[v].location);
            src_zone.arrays[v].materialize(len);
            let slot = src_zone.arrays[v].clone();
            for &d in dsts.iter().filter(|&&d| d != src) {
                record.zones[d].arrays[v] = slot.clone();
            }
        }
        log::debug!(
            "{ds}: shared {} variable(s) from {source} into {} zone(s)",
            vpos.len(),
            dsts.len()
        );
        self.after_mutation(ds);
        Ok(())
    }
}
