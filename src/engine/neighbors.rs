//! Face-neighbor storage: per (element, face) neighbor lists and obscure flags.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::NeighborAccess;
use super::memory::{InMemoryEngine, ZoneRecord};
use crate::data_error::{DataError, check_index};
use crate::handle::{DatasetId, ZoneId};
use crate::types::{FaceNeighborMode, ZoneShape};

/// One neighbor across a face. `zone == None` means the owning zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Neighbor {
    pub element: usize,
    pub zone: Option<ZoneId>,
}

impl Neighbor {
    pub fn local(element: usize) -> Self {
        Self {
            element,
            zone: None,
        }
    }

    pub fn global(element: usize, zone: ZoneId) -> Self {
        Self {
            element,
            zone: Some(zone),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct FaceEntry {
    neighbors: Vec<Neighbor>,
    obscures: bool,
}

/// Committed face neighbors of one zone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FaceNeighborData {
    mode: FaceNeighborMode,
    entries: BTreeMap<(usize, usize), FaceEntry>,
}

impl FaceNeighborData {
    pub fn mode(&self) -> FaceNeighborMode {
        self.mode
    }

    /// Neighbors across `face` of `element`; empty when none were assigned.
    pub fn neighbors(&self, element: usize, face: usize) -> &[Neighbor] {
        self.entries
            .get(&(element, face))
            .map(|e| e.neighbors.as_slice())
            .unwrap_or(&[])
    }

    pub fn num_neighbors(&self, element: usize, face: usize) -> usize {
        self.neighbors(element, face).len()
    }

    /// Raw obscure flag as assigned.
    pub fn obscures(&self, element: usize, face: usize) -> bool {
        self.entries
            .get(&(element, face))
            .is_some_and(|e| e.obscures)
    }

    /// Whether `face` of `element` is hidden by a neighbor. With `active`
    /// given, only neighbors in one of those zones count; local neighbors
    /// belong to `owner`.
    pub fn is_obscured(
        &self,
        element: usize,
        face: usize,
        owner: ZoneId,
        active: Option<&[ZoneId]>,
    ) -> bool {
        let Some(entry) = self.entries.get(&(element, face)) else {
            return false;
        };
        if !entry.obscures {
            return false;
        }
        match active {
            None => true,
            Some(zones) => entry
                .neighbors
                .iter()
                .any(|n| zones.contains(&n.zone.unwrap_or(owner))),
        }
    }

    /// Every assigned (element, face), ascending.
    pub fn faces(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.entries.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn prune_zones(entries: &mut BTreeMap<(usize, usize), FaceEntry>, gone: &[ZoneId]) -> usize {
    let mut removed = 0;
    for entry in entries.values_mut() {
        let before = entry.neighbors.len();
        entry.neighbors.retain(|n| n.zone.is_none_or(|z| !gone.contains(&z)));
        removed += before - entry.neighbors.len();
    }
    entries.retain(|_, entry| !entry.neighbors.is_empty());
    removed
}

/// Face-neighbor state owned by a zone record.
#[derive(Clone, Debug)]
pub(crate) struct FaceNeighborStore {
    committed: Arc<FaceNeighborData>,
    staging: Option<BTreeMap<(usize, usize), FaceEntry>>,
}

impl FaceNeighborStore {
    pub(crate) fn new(mode: FaceNeighborMode) -> Self {
        Self {
            committed: Arc::new(FaceNeighborData {
                mode,
                entries: BTreeMap::new(),
            }),
            staging: None,
        }
    }

    pub(crate) fn mode(&self) -> FaceNeighborMode {
        self.committed.mode
    }

    /// Remove neighbors in any of `gone`, committed and staged; returns how
    /// many were removed.
    pub(crate) fn forget_zones(&mut self, gone: &[ZoneId]) -> usize {
        let mut removed = 0;
        if let Some(staging) = &mut self.staging {
            removed += prune_zones(staging, gone);
        }
        let mut entries = self.committed.entries.clone();
        let committed = prune_zones(&mut entries, gone);
        if committed > 0 {
            self.committed = Arc::new(FaceNeighborData {
                mode: self.mode(),
                entries,
            });
        }
        removed + committed
    }

    /// Independent copy of the committed content.
    pub(crate) fn branched(&self) -> Self {
        Self {
            committed: Arc::new((*self.committed).clone()),
            staging: None,
        }
    }

    fn staging_mut(
        &mut self,
        op: &'static str,
    ) -> Result<&mut BTreeMap<(usize, usize), FaceEntry>, DataError> {
        self.staging
            .as_mut()
            .ok_or(DataError::NotInAssignment { op })
    }

    fn end(&mut self) -> Result<(), DataError> {
        let entries = self.staging.take().ok_or(DataError::NotInAssignment {
            op: "face neighbor end_assign",
        })?;
        let mode = self.mode();
        if mode.is_one_to_one() {
            if let Some(((e, f), entry)) = entries.iter().find(|(_, v)| v.neighbors.len() > 1) {
                return Err(DataError::commit(
                    "face neighbors",
                    format!(
                        "element {e} face {f} has {} neighbors in one-to-one mode",
                        entry.neighbors.len()
                    ),
                ));
            }
        }
        log::debug!("face neighbors committed ({} faces)", entries.len());
        self.committed = Arc::new(FaceNeighborData { mode, entries });
        Ok(())
    }
}

fn faces_per_element(zone: &ZoneRecord) -> Result<usize, DataError> {
    match zone.shape {
        ZoneShape::PolyFE { .. } => Err(DataError::WrongZoneType {
            zone: zone.id,
            found: zone.shape.zone_type(),
            expected: "an ordered or classic finite-element zone",
            op: "face neighbor access",
        }),
        shape => Ok(shape.num_faces_per_element().unwrap_or(0)),
    }
}

impl InMemoryEngine {
    fn neighbor_zone(&self, ds: DatasetId, zone: ZoneId) -> Result<&ZoneRecord, DataError> {
        let z = self.zone(ds, zone)?;
        faces_per_element(z)?;
        Ok(z)
    }

    fn neighbor_zone_mut(&mut self, ds: DatasetId, zone: ZoneId) -> Result<&mut ZoneRecord, DataError> {
        let z = self.zone_mut(ds, zone)?;
        faces_per_element(z)?;
        Ok(z)
    }
}

impl NeighborAccess for InMemoryEngine {
    fn face_neighbors_begin_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        let store = &mut self.neighbor_zone_mut(ds, zone)?.neighbors;
        if store.staging.is_some() {
            return Err(DataError::AssignmentOpen { zone });
        }
        store.staging = Some(BTreeMap::new());
        Ok(())
    }

    fn face_neighbors_in_assignment(&self, ds: DatasetId, zone: ZoneId) -> Result<bool, DataError> {
        Ok(self.neighbor_zone(ds, zone)?.neighbors.staging.is_some())
    }

    fn face_neighbors_add(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        element: usize,
        face: usize,
        neighbors: &[usize],
        zones: Option<&[usize]>,
        obscures: bool,
    ) -> Result<(), DataError> {
        let record = self.dataset(ds)?;
        let owner = record.zone(zone)?;
        let fpe = faces_per_element(owner)?;
        let num_elements = owner.shape.num_elements();
        check_index("element", element, num_elements)?;
        check_index("face", face, fpe)?;

        let global = owner.neighbors.mode().is_global();
        let resolved: Vec<Neighbor> = match (global, zones) {
            (false, None) => {
                for &n in neighbors {
                    check_index("neighbor element", n, num_elements)?;
                }
                neighbors.iter().map(|&n| Neighbor::local(n)).collect()
            }
            (true, Some(zone_indices)) => {
                if zone_indices.len() != neighbors.len() {
                    return Err(DataError::LengthMismatch {
                        expected: neighbors.len(),
                        found: zone_indices.len(),
                    });
                }
                let mut out = Vec::with_capacity(neighbors.len());
                for (&n, &zi) in neighbors.iter().zip(zone_indices) {
                    check_index("neighbor zone", zi, record.zones.len())?;
                    let target = &record.zones[zi];
                    check_index("neighbor element", n, target.shape.num_elements())?;
                    out.push(Neighbor::global(n, target.id));
                }
                out
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
        };

        let staging = self
            .neighbor_zone_mut(ds, zone)?
            .neighbors
            .staging_mut("add_neighbors")?;
        let entry = staging.entry((element, face)).or_default();
        entry.neighbors.extend(resolved);
        entry.obscures |= obscures;
        Ok(())
    }

    fn face_neighbors_add_local(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        flat: &[Option<usize>],
    ) -> Result<(), DataError> {
        let z = self.neighbor_zone_mut(ds, zone)?;
        let fpe = faces_per_element(z)?;
        let num_elements = z.shape.num_elements();
        let expected = num_elements * fpe;
        if flat.len() != expected {
            return Err(DataError::LengthMismatch {
                expected,
                found: flat.len(),
            });
        }
        if let Some(&bad) = flat.iter().flatten().find(|&&n| n >= num_elements) {
            return Err(DataError::out_of_range("neighbor element", bad, num_elements));
        }
        let staging = z.neighbors.staging_mut("add_local_neighbors")?;
        for (i, n) in flat.iter().enumerate() {
            if let Some(n) = *n {
                let entry = staging.entry((i / fpe, i % fpe)).or_default();
                entry.neighbors.push(Neighbor::local(n));
                entry.obscures = true;
            }
        }
        Ok(())
    }

    fn face_neighbors_end_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        self.neighbor_zone_mut(ds, zone)?.neighbors.end()
    }

    fn face_neighbors_abort_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        self.neighbor_zone_mut(ds, zone)?.neighbors.staging = None;
        Ok(())
    }

    fn face_neighbors(&self, ds: DatasetId, zone: ZoneId) -> Result<Arc<FaceNeighborData>, DataError> {
        Ok(self.neighbor_zone(ds, zone)?.neighbors.committed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zid(n: u64) -> ZoneId {
        ZoneId::new(n).unwrap()
    }

    #[test]
    fn one_to_one_commit_rejects_multiple_neighbors() {
        let mut store = FaceNeighborStore::new(FaceNeighborMode::LOCAL_ONE_TO_ONE);
        store.staging = Some(BTreeMap::new());
        let staging = store.staging_mut("test").unwrap();
        staging.insert(
            (0, 0),
            FaceEntry {
                neighbors: vec![Neighbor::local(1), Neighbor::local(2)],
                obscures: false,
            },
        );
        assert!(matches!(store.end(), Err(DataError::CommitRejected { .. })));
        assert!(store.committed.is_empty());
        assert!(store.staging.is_none());
    }

    #[test]
    fn active_zones_filter_obscuring_neighbors() {
        let mut entries = BTreeMap::new();
        entries.insert(
            (0, 1),
            FaceEntry {
                neighbors: vec![Neighbor::global(3, zid(5))],
                obscures: true,
            },
        );
        let data = FaceNeighborData {
            mode: FaceNeighborMode::GLOBAL_ONE_TO_ONE,
            entries,
        };
        let owner = zid(1);
        assert!(data.is_obscured(0, 1, owner, None));
        assert!(data.is_obscured(0, 1, owner, Some(&[zid(5)])));
        assert!(!data.is_obscured(0, 1, owner, Some(&[owner])));
        assert!(!data.is_obscured(0, 0, owner, None));
        assert_eq!(data.num_neighbors(0, 1), 1);
    }
}
