//! Nodemap and facemap storage with staged, all-or-nothing commits.
//!
//! Both stores keep the committed content behind an `Arc` and stage writes in
//! a separate buffer while an assignment is open. `end_assign` validates the
//! staged content and swaps it in; a rejected commit drops the staging buffer
//! and leaves the committed content untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::ConnectivityAccess;
use super::memory::{Connectivity, InMemoryEngine};
use crate::cache::InvalidateCache;
use crate::data_error::{DataError, check_index};
use crate::debug_invariants::DebugInvariants;
use crate::handle::{DatasetId, ZoneId};
use crate::types::{PolytopeKind, ZoneShape};

pub(crate) type SharedNodemap = Arc<RwLock<NodemapStore>>;
pub(crate) type SharedFacemap = Arc<RwLock<FacemapStore>>;

/// Committed element → node table of a classic finite-element zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodemapData {
    points_per_element: usize,
    nodes: Vec<usize>,
}

impl NodemapData {
    pub fn num_elements(&self) -> usize {
        self.nodes.len() / self.points_per_element.max(1)
    }

    pub fn num_points_per_element(&self) -> usize {
        self.points_per_element
    }

    /// Nodes of element `e`.
    pub fn element(&self, e: usize) -> Option<&[usize]> {
        let ppe = self.points_per_element;
        self.nodes.get(e * ppe..(e + 1) * ppe)
    }

    pub fn node(&self, e: usize, k: usize) -> Option<usize> {
        if k >= self.points_per_element {
            return None;
        }
        self.nodes.get(e * self.points_per_element + k).copied()
    }

    /// Row-major `[num_elements * points_per_element]` table.
    pub fn as_flat(&self) -> &[usize] {
        &self.nodes
    }

    pub fn rows(&self) -> impl Iterator<Item = &[usize]> {
        self.nodes.chunks(self.points_per_element.max(1))
    }
}

/// Nodemap of one or more zones (several when shared).
#[derive(Debug)]
pub struct NodemapStore {
    num_points: usize,
    num_elements: usize,
    points_per_element: usize,
    committed: Option<Arc<NodemapData>>,
    staging: Option<Vec<usize>>,
    /// node → ascending elements; rebuilt lazily after each commit.
    reverse: OnceCell<Vec<Vec<usize>>>,
}

impl NodemapStore {
    pub(crate) fn new(shape: &ZoneShape) -> Self {
        Self {
            num_points: shape.num_points(),
            num_elements: shape.num_elements(),
            points_per_element: shape.num_points_per_element().unwrap_or(0),
            committed: None,
            staging: None,
            reverse: OnceCell::new(),
        }
    }

    /// Independent store holding the committed content.
    pub(crate) fn branched(&self) -> Self {
        Self {
            num_points: self.num_points,
            num_elements: self.num_elements,
            points_per_element: self.points_per_element,
            committed: self.committed.as_deref().cloned().map(Arc::new),
            staging: None,
            reverse: OnceCell::new(),
        }
    }

    fn zeros(&self) -> Vec<usize> {
        vec![0; self.num_elements * self.points_per_element]
    }

    pub(crate) fn alloc(&mut self) {
        if self.committed.is_none() {
            self.committed = Some(Arc::new(NodemapData {
                points_per_element: self.points_per_element,
                nodes: self.zeros(),
            }));
            self.invalidate_cache();
        }
    }

    pub(crate) fn data(&self) -> Option<Arc<NodemapData>> {
        self.committed.clone()
    }

    pub(crate) fn in_assignment(&self) -> bool {
        self.staging.is_some()
    }

    pub(crate) fn abort(&mut self) {
        self.staging = None;
    }

    pub(crate) fn begin(&mut self, zone: ZoneId) -> Result<(), DataError> {
        if self.staging.is_some() {
            return Err(DataError::AssignmentOpen { zone });
        }
        self.staging = Some(match &self.committed {
            Some(data) => data.nodes.clone(),
            None => self.zeros(),
        });
        Ok(())
    }

    fn staging_mut(&mut self, op: &'static str) -> Result<&mut Vec<usize>, DataError> {
        self.staging
            .as_mut()
            .ok_or(DataError::NotInAssignment { op })
    }

    pub(crate) fn set(&mut self, element: usize, nodes: &[usize]) -> Result<(), DataError> {
        let (ne, ppe) = (self.num_elements, self.points_per_element);
        let staging = self.staging_mut("nodemap element write")?;
        check_index("element", element, ne)?;
        if nodes.len() != ppe {
            return Err(DataError::LengthMismatch {
                expected: ppe,
                found: nodes.len(),
            });
        }
        staging[element * ppe..(element + 1) * ppe].copy_from_slice(nodes);
        Ok(())
    }

    pub(crate) fn set_all(&mut self, flat: &[usize]) -> Result<(), DataError> {
        let expected = self.num_elements * self.points_per_element;
        let staging = self.staging_mut("nodemap bulk write")?;
        if flat.len() != expected {
            return Err(DataError::LengthMismatch {
                expected,
                found: flat.len(),
            });
        }
        staging.copy_from_slice(flat);
        Ok(())
    }

    pub(crate) fn end(&mut self) -> Result<(), DataError> {
        let nodes = self.staging.take().ok_or(DataError::NotInAssignment {
            op: "nodemap end_assign",
        })?;
        let ppe = self.points_per_element.max(1);
        if let Some((pos, &bad)) = nodes
            .iter()
            .enumerate()
            .find(|&(_, &n)| n >= self.num_points)
        {
            return Err(DataError::commit(
                "nodemap",
                format!(
                    "element {} references node {bad}, zone has {} points",
                    pos / ppe,
                    self.num_points
                ),
            ));
        }
        self.committed = Some(Arc::new(NodemapData {
            points_per_element: self.points_per_element,
            nodes,
        }));
        self.invalidate_cache();
        log::debug!("nodemap committed ({} elements)", self.num_elements);
        Ok(())
    }

    pub(crate) fn elements_using_node(&self, node: usize) -> Result<Vec<usize>, DataError> {
        check_index("node", node, self.num_points)?;
        let data = self.committed.as_ref().ok_or(DataError::NotAllocated("nodemap"))?;
        let reverse = self.reverse.get_or_init(|| {
            let mut table = vec![Vec::new(); self.num_points];
            for (e, row) in data.rows().enumerate() {
                for &n in row {
                    if let Some(list) = table.get_mut(n) {
                        if list.last() != Some(&e) {
                            list.push(e);
                        }
                    }
                }
            }
            table
        });
        Ok(reverse[node].clone())
    }
}

impl InvalidateCache for NodemapStore {
    fn invalidate_cache(&mut self) {
        self.reverse = OnceCell::new();
    }
}

impl DebugInvariants for NodemapStore {
    fn validate_invariants(&self) -> Result<(), DataError> {
        let Some(data) = &self.committed else {
            return Ok(());
        };
        let expected = self.num_elements * self.points_per_element;
        if data.nodes.len() != expected {
            return Err(DataError::LengthMismatch {
                expected,
                found: data.nodes.len(),
            });
        }
        if let Some(&bad) = data.nodes.iter().find(|&&n| n >= self.num_points) {
            return Err(DataError::out_of_range("node", bad, self.num_points));
        }
        Ok(())
    }
}

/// Sizes a facemap is allocated with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacemapCapacity {
    pub num_faces: usize,
    /// Sum of the node counts of every face.
    pub num_face_nodes: usize,
    pub num_boundary_faces: usize,
    /// Total boundary connections over all boundary faces.
    pub num_boundary_connections: usize,
}

impl FacemapCapacity {
    pub fn new(num_faces: usize, num_face_nodes: usize) -> Self {
        Self {
            num_faces,
            num_face_nodes,
            ..Self::default()
        }
    }

    pub fn with_boundary(mut self, faces: usize, connections: usize) -> Self {
        self.num_boundary_faces = faces;
        self.num_boundary_connections = connections;
        self
    }
}

/// Boundary connections of one face as given by callers: `(element, zone index)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundaryFace {
    pub face: usize,
    pub connections: Vec<(usize, usize)>,
}

/// Committed connection from a boundary face into an element of another zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundaryConnection {
    pub element: usize,
    pub zone: ZoneId,
}

/// Committed face connectivity of a polytope zone.
#[derive(Clone, Debug, PartialEq)]
pub struct FacemapData {
    capacity: FacemapCapacity,
    /// `face_offsets[f]..face_offsets[f + 1]` indexes `face_nodes`.
    face_offsets: Vec<usize>,
    face_nodes: Vec<usize>,
    left: Vec<Option<usize>>,
    right: Vec<Option<usize>>,
    boundary: BTreeMap<usize, Vec<BoundaryConnection>>,
}

impl FacemapData {
    pub fn capacity(&self) -> FacemapCapacity {
        self.capacity
    }

    pub fn num_faces(&self) -> usize {
        self.left.len()
    }

    pub fn num_face_nodes(&self) -> usize {
        self.face_nodes.len()
    }

    pub fn nodes(&self, face: usize) -> Option<&[usize]> {
        let start = *self.face_offsets.get(face)?;
        let end = *self.face_offsets.get(face + 1)?;
        self.face_nodes.get(start..end)
    }

    pub fn num_nodes(&self, face: usize) -> Option<usize> {
        self.nodes(face).map(<[usize]>::len)
    }

    pub fn node(&self, face: usize, k: usize) -> Option<usize> {
        self.nodes(face)?.get(k).copied()
    }

    /// Element on the left of `face`; the inner `None` means no element.
    pub fn left_element(&self, face: usize) -> Option<Option<usize>> {
        self.left.get(face).copied()
    }

    pub fn right_element(&self, face: usize) -> Option<Option<usize>> {
        self.right.get(face).copied()
    }

    pub fn num_boundary_faces(&self) -> usize {
        self.boundary.len()
    }

    /// Connections of `face`; empty when it is not a boundary face.
    pub fn boundary_connections(&self, face: usize) -> &[BoundaryConnection] {
        self.boundary.get(&face).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_boundary_connections(&self, face: usize) -> usize {
        self.boundary_connections(face).len()
    }

    /// Faces bounding `element`, ascending.
    pub fn element_faces(&self, element: usize) -> Vec<usize> {
        self.left
            .iter()
            .zip(&self.right)
            .enumerate()
            .filter(|(_, (l, r))| **l == Some(element) || **r == Some(element))
            .map(|(f, _)| f)
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum FacemapPhase {
    Allocated,
    Nodes,
    Elements,
    Boundary,
}

#[derive(Debug)]
struct FacemapStaging {
    capacity: FacemapCapacity,
    phase: FacemapPhase,
    counts: Vec<usize>,
    nodes: Vec<usize>,
    left: Vec<Option<usize>>,
    right: Vec<Option<usize>>,
    boundary: Vec<BoundaryFace>,
}

impl FacemapStaging {
    fn new(capacity: FacemapCapacity) -> Self {
        Self {
            capacity,
            phase: FacemapPhase::Allocated,
            counts: Vec::new(),
            nodes: Vec::new(),
            left: Vec::new(),
            right: Vec::new(),
            boundary: Vec::new(),
        }
    }

    fn enter(
        &mut self,
        op: &'static str,
        from: FacemapPhase,
        to: FacemapPhase,
        detail: &'static str,
    ) -> Result<(), DataError> {
        if self.phase < from || self.phase > to {
            return Err(DataError::PhaseOrder { op, detail });
        }
        Ok(())
    }
}

/// Facemap of one or more polytope zones (several when shared).
#[derive(Debug)]
pub struct FacemapStore {
    kind: PolytopeKind,
    num_points: usize,
    num_elements: usize,
    /// Face count fixed at zone creation; 0 when deferred.
    declared_faces: usize,
    pending: Option<FacemapCapacity>,
    committed: Option<Arc<FacemapData>>,
    staging: Option<FacemapStaging>,
}

impl FacemapStore {
    pub(crate) fn new(shape: &ZoneShape) -> Self {
        let (kind, declared_faces) = match *shape {
            ZoneShape::PolyFE {
                kind, num_faces, ..
            } => (kind, num_faces),
            _ => (PolytopeKind::Polygon, 0),
        };
        Self {
            kind,
            num_points: shape.num_points(),
            num_elements: shape.num_elements(),
            declared_faces,
            pending: None,
            committed: None,
            staging: None,
        }
    }

    pub(crate) fn branched(&self) -> Self {
        Self {
            kind: self.kind,
            num_points: self.num_points,
            num_elements: self.num_elements,
            declared_faces: self.declared_faces,
            pending: self.pending,
            committed: self.committed.as_deref().cloned().map(Arc::new),
            staging: None,
        }
    }

    pub(crate) fn committed_faces(&self) -> usize {
        self.committed.as_ref().map_or(0, |d| d.num_faces())
    }

    pub(crate) fn data(&self) -> Option<Arc<FacemapData>> {
        self.committed.clone()
    }

    pub(crate) fn in_assignment(&self) -> bool {
        self.staging.is_some()
    }

    pub(crate) fn alloc(&mut self, capacity: FacemapCapacity) -> Result<(), DataError> {
        if self.declared_faces > 0 && capacity.num_faces != self.declared_faces {
            return Err(DataError::InvalidArgument(format!(
                "zone declares {} faces, allocation asks for {}",
                self.declared_faces, capacity.num_faces
            )));
        }
        if capacity.num_boundary_connections < capacity.num_boundary_faces {
            return Err(DataError::InvalidArgument(
                "every boundary face needs at least one connection slot".into(),
            ));
        }
        self.pending = Some(capacity);
        if let Some(staging) = &mut self.staging {
            *staging = FacemapStaging::new(capacity);
        }
        Ok(())
    }

    pub(crate) fn begin(&mut self, zone: ZoneId) -> Result<(), DataError> {
        if self.staging.is_some() {
            return Err(DataError::AssignmentOpen { zone });
        }
        let capacity = self
            .pending
            .or_else(|| self.committed.as_ref().map(|d| d.capacity))
            .ok_or(DataError::NotAllocated("facemap"))?;
        self.staging = Some(FacemapStaging::new(capacity));
        Ok(())
    }

    /// Drop the staged phases; the pending capacity stays for the next try.
    pub(crate) fn abort(&mut self) {
        self.staging = None;
    }

    /// Remove committed boundary connections into any of `gone`. A face
    /// left without connections stops being a boundary face. Returns how
    /// many connections were removed.
    pub(crate) fn forget_zones(&mut self, gone: &[ZoneId]) -> usize {
        let Some(data) = &self.committed else {
            return 0;
        };
        let before: usize = data.boundary.values().map(Vec::len).sum();
        let mut boundary = data.boundary.clone();
        for connections in boundary.values_mut() {
            connections.retain(|c| !gone.contains(&c.zone));
        }
        boundary.retain(|_, connections| !connections.is_empty());
        let after: usize = boundary.values().map(Vec::len).sum();
        if after != before {
            let updated = FacemapData {
                boundary,
                ..(**data).clone()
            };
            self.committed = Some(Arc::new(updated));
        }
        before - after
    }

    fn staging_mut(&mut self, op: &'static str) -> Result<&mut FacemapStaging, DataError> {
        self.staging
            .as_mut()
            .ok_or(DataError::NotInAssignment { op })
    }

    pub(crate) fn set_nodes(&mut self, counts: &[usize], nodes: &[usize]) -> Result<(), DataError> {
        let kind = self.kind;
        let staging = self.staging_mut("facemap set_nodes")?;
        staging.enter(
            "set_nodes",
            FacemapPhase::Allocated,
            FacemapPhase::Nodes,
            "face nodes must be set before elements and boundary connections",
        )?;
        let cap = staging.capacity;
        if counts.len() != cap.num_faces {
            return Err(DataError::LengthMismatch {
                expected: cap.num_faces,
                found: counts.len(),
            });
        }
        let total: usize = counts.iter().sum();
        if total != cap.num_face_nodes || nodes.len() != cap.num_face_nodes {
            return Err(DataError::LengthMismatch {
                expected: cap.num_face_nodes,
                found: if total != cap.num_face_nodes { total } else { nodes.len() },
            });
        }
        let bad_arity = match kind {
            PolytopeKind::Polygon => counts.iter().position(|&c| c != 2),
            PolytopeKind::Polyhedron => counts.iter().position(|&c| c < 3),
        };
        if let Some(face) = bad_arity {
            return Err(DataError::InvalidArgument(format!(
                "face {face} has {} nodes; {kind:?} faces need {}",
                counts[face],
                match kind {
                    PolytopeKind::Polygon => "exactly 2",
                    PolytopeKind::Polyhedron => "at least 3",
                }
            )));
        }
        staging.counts = counts.to_vec();
        staging.nodes = nodes.to_vec();
        staging.phase = FacemapPhase::Nodes;
        Ok(())
    }

    pub(crate) fn set_elements(
        &mut self,
        left: &[Option<usize>],
        right: &[Option<usize>],
    ) -> Result<(), DataError> {
        let staging = self.staging_mut("facemap set_elements")?;
        staging.enter(
            "set_elements",
            FacemapPhase::Nodes,
            FacemapPhase::Elements,
            "elements follow face nodes and precede boundary connections",
        )?;
        let faces = staging.capacity.num_faces;
        for side in [left, right] {
            if side.len() != faces {
                return Err(DataError::LengthMismatch {
                    expected: faces,
                    found: side.len(),
                });
            }
        }
        staging.left = left.to_vec();
        staging.right = right.to_vec();
        staging.phase = FacemapPhase::Elements;
        Ok(())
    }

    pub(crate) fn set_boundary(&mut self, faces: &[BoundaryFace]) -> Result<(), DataError> {
        let staging = self.staging_mut("facemap set_boundary_connections")?;
        staging.enter(
            "set_boundary_connections",
            FacemapPhase::Elements,
            FacemapPhase::Boundary,
            "boundary connections follow elements",
        )?;
        let cap = staging.capacity;
        if faces.len() > cap.num_boundary_faces {
            return Err(DataError::InvalidArgument(format!(
                "{} boundary faces exceed the allocated {}",
                faces.len(),
                cap.num_boundary_faces
            )));
        }
        let connections: usize = faces.iter().map(|f| f.connections.len()).sum();
        if connections > cap.num_boundary_connections {
            return Err(DataError::InvalidArgument(format!(
                "{connections} boundary connections exceed the allocated {}",
                cap.num_boundary_connections
            )));
        }
        staging.boundary = faces.to_vec();
        staging.phase = FacemapPhase::Boundary;
        Ok(())
    }

    /// Validate and commit. `zones` lists every zone of the dataset in order
    /// with its element count, for boundary connections.
    pub(crate) fn end(&mut self, zones: &[(ZoneId, usize)]) -> Result<(), DataError> {
        let staging = self.staging.take().ok_or(DataError::NotInAssignment {
            op: "facemap end_assign",
        })?;
        let data = self.validate(staging, zones)?;
        log::debug!(
            "facemap committed ({} faces, {} boundary faces)",
            data.num_faces(),
            data.num_boundary_faces()
        );
        self.committed = Some(Arc::new(data));
        self.pending = None;
        Ok(())
    }

    fn validate(&self, s: FacemapStaging, zones: &[(ZoneId, usize)]) -> Result<FacemapData, DataError> {
        if s.phase < FacemapPhase::Elements {
            return Err(DataError::commit(
                "facemap",
                "face nodes and elements must both be set before committing",
            ));
        }
        if let Some(&bad) = s.nodes.iter().find(|&&n| n >= self.num_points) {
            return Err(DataError::commit(
                "facemap",
                format!("node {bad} out of range, zone has {} points", self.num_points),
            ));
        }
        if let Some(bad) = s
            .left
            .iter()
            .chain(&s.right)
            .flatten()
            .find(|&&e| e >= self.num_elements)
        {
            return Err(DataError::commit(
                "facemap",
                format!("element {bad} out of range, zone has {} elements", self.num_elements),
            ));
        }
        let mut boundary = BTreeMap::new();
        for bf in &s.boundary {
            if bf.face >= s.capacity.num_faces {
                return Err(DataError::commit(
                    "facemap",
                    format!("boundary face {} out of range ({} faces)", bf.face, s.capacity.num_faces),
                ));
            }
            let mut resolved = Vec::with_capacity(bf.connections.len());
            for &(element, zone_index) in &bf.connections {
                let &(zone, num_elements) = zones.get(zone_index).ok_or_else(|| {
                    DataError::commit(
                        "facemap",
                        format!("zone index {zone_index} out of range ({} zones)", zones.len()),
                    )
                })?;
                if element >= num_elements {
                    return Err(DataError::commit(
                        "facemap",
                        format!("boundary element {element} out of range in {zone}"),
                    ));
                }
                resolved.push(BoundaryConnection { element, zone });
            }
            if boundary.insert(bf.face, resolved).is_some() {
                return Err(DataError::commit(
                    "facemap",
                    format!("boundary face {} listed twice", bf.face),
                ));
            }
        }
        let mut face_offsets = Vec::with_capacity(s.counts.len() + 1);
        face_offsets.push(0);
        for &c in &s.counts {
            face_offsets.push(face_offsets[face_offsets.len() - 1] + c);
        }
        Ok(FacemapData {
            capacity: s.capacity,
            face_offsets,
            face_nodes: s.nodes,
            left: s.left,
            right: s.right,
            boundary,
        })
    }
}

impl DebugInvariants for FacemapStore {
    fn validate_invariants(&self) -> Result<(), DataError> {
        let Some(data) = &self.committed else {
            return Ok(());
        };
        let cap = data.capacity;
        if data.face_nodes.len() != cap.num_face_nodes {
            return Err(DataError::LengthMismatch {
                expected: cap.num_face_nodes,
                found: data.face_nodes.len(),
            });
        }
        if data.face_offsets.last() != Some(&data.face_nodes.len()) {
            return Err(DataError::InvalidArgument("face offsets do not cover face nodes".into()));
        }
        let connections: usize = data.boundary.values().map(Vec::len).sum();
        if data.boundary.len() > cap.num_boundary_faces
            || connections > cap.num_boundary_connections
        {
            return Err(DataError::InvalidArgument(
                "boundary data exceeds allocated capacity".into(),
            ));
        }
        Ok(())
    }
}

impl InMemoryEngine {
    fn nodemap_store(&self, ds: DatasetId, zone: ZoneId) -> Result<SharedNodemap, DataError> {
        let z = self.zone(ds, zone)?;
        match &z.connectivity {
            Connectivity::Nodemap(store) => Ok(store.clone()),
            _ => Err(DataError::WrongZoneType {
                zone,
                found: z.shape.zone_type(),
                expected: "a classic finite-element zone",
                op: "nodemap access",
            }),
        }
    }

    fn facemap_store(&self, ds: DatasetId, zone: ZoneId) -> Result<SharedFacemap, DataError> {
        let z = self.zone(ds, zone)?;
        match &z.connectivity {
            Connectivity::Facemap(store) => Ok(store.clone()),
            _ => Err(DataError::WrongZoneType {
                zone,
                found: z.shape.zone_type(),
                expected: "a polytope zone",
                op: "facemap access",
            }),
        }
    }

    fn check_connectivity(&self, store: &impl DebugInvariants) {
        if self.checks_invariants() {
            store.check_invariants("connectivity after commit");
        }
    }
}

impl ConnectivityAccess for InMemoryEngine {
    fn branch_connectivity(&mut self, ds: DatasetId, zones: &[ZoneId]) -> Result<(), DataError> {
        let record = self.dataset_mut(ds)?;
        let mut replacements = Vec::with_capacity(zones.len());
        for &zone in zones {
            let pos = record.zone_pos(zone)?;
            replacements.push((pos, record.zones[pos].connectivity.branched()));
        }
        for (pos, connectivity) in replacements {
            record.zones[pos].connectivity = connectivity;
        }
        log::debug!("{ds}: branched connectivity of {} zone(s)", zones.len());
        Ok(())
    }

    fn share_connectivity(
        &mut self,
        ds: DatasetId,
        source: ZoneId,
        destinations: &[ZoneId],
    ) -> Result<(), DataError> {
        let record = self.dataset_mut(ds)?;
        let src = record.zone(source)?;
        if matches!(src.connectivity, Connectivity::None) {
            return Err(DataError::SharingInvalid(format!(
                "{source} is ordered and has no connectivity to share"
            )));
        }
        let shared = src.connectivity.clone();
        let src_shape = src.shape;
        let mut targets = Vec::with_capacity(destinations.len());
        for &dst in destinations {
            let pos = record.zone_pos(dst)?;
            let z = &record.zones[pos];
            if !z.shape.same_topology(&src_shape) {
                return Err(DataError::SharingInvalid(format!(
                    "{dst} ({:?}) does not match the topology of {source} ({:?})",
                    z.shape, src_shape
                )));
            }
            let busy = match &z.connectivity {
                Connectivity::Nodemap(s) => s.read().in_assignment(),
                Connectivity::Facemap(s) => s.read().in_assignment(),
                Connectivity::None => false,
            };
            if busy && !z.connectivity.aliases(&shared) {
                return Err(DataError::AssignmentOpen { zone: dst });
            }
            targets.push(pos);
        }
        for pos in targets {
            record.zones[pos].connectivity = shared.clone();
        }
        log::debug!(
            "{ds}: shared connectivity of {source} into {} zone(s)",
            destinations.len()
        );
        Ok(())
    }

    fn connectivity_shared_zones(&self, ds: DatasetId, zone: ZoneId) -> Result<Vec<ZoneId>, DataError> {
        let record = self.dataset(ds)?;
        let this = &record.zone(zone)?.connectivity;
        if matches!(this, Connectivity::None) {
            return Ok(vec![zone]);
        }
        Ok(record
            .zones
            .iter()
            .filter(|z| z.connectivity.aliases(this))
            .map(|z| z.id)
            .collect())
    }

    fn nodemap_alloc(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        self.nodemap_store(ds, zone)?.write().alloc();
        Ok(())
    }

    fn nodemap_data(&self, ds: DatasetId, zone: ZoneId) -> Result<Option<Arc<NodemapData>>, DataError> {
        Ok(self.nodemap_store(ds, zone)?.read().data())
    }

    fn nodemap_begin_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        self.nodemap_store(ds, zone)?.write().begin(zone)
    }

    fn nodemap_in_assignment(&self, ds: DatasetId, zone: ZoneId) -> Result<bool, DataError> {
        Ok(self.nodemap_store(ds, zone)?.read().in_assignment())
    }

    fn nodemap_set(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        element: usize,
        nodes: &[usize],
    ) -> Result<(), DataError> {
        self.nodemap_store(ds, zone)?.write().set(element, nodes)
    }

    fn nodemap_set_all(&mut self, ds: DatasetId, zone: ZoneId, flat: &[usize]) -> Result<(), DataError> {
        self.nodemap_store(ds, zone)?.write().set_all(flat)
    }

    fn nodemap_end_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        let store = self.nodemap_store(ds, zone)?;
        let mut guard = store.write();
        guard.end()?;
        self.check_connectivity(&*guard);
        Ok(())
    }

    fn nodemap_abort_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        self.nodemap_store(ds, zone)?.write().abort();
        Ok(())
    }

    fn nodemap_elements_using_node(
        &self,
        ds: DatasetId,
        zone: ZoneId,
        node: usize,
    ) -> Result<Vec<usize>, DataError> {
        self.nodemap_store(ds, zone)?.read().elements_using_node(node)
    }

    fn facemap_alloc(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        capacity: FacemapCapacity,
    ) -> Result<(), DataError> {
        self.facemap_store(ds, zone)?.write().alloc(capacity)
    }

    fn facemap_data(&self, ds: DatasetId, zone: ZoneId) -> Result<Option<Arc<FacemapData>>, DataError> {
        Ok(self.facemap_store(ds, zone)?.read().data())
    }

    fn facemap_begin_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        self.facemap_store(ds, zone)?.write().begin(zone)
    }

    fn facemap_in_assignment(&self, ds: DatasetId, zone: ZoneId) -> Result<bool, DataError> {
        Ok(self.facemap_store(ds, zone)?.read().in_assignment())
    }

    fn facemap_set_nodes(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        counts: &[usize],
        nodes: &[usize],
    ) -> Result<(), DataError> {
        self.facemap_store(ds, zone)?.write().set_nodes(counts, nodes)
    }

    fn facemap_set_elements(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        left: &[Option<usize>],
        right: &[Option<usize>],
    ) -> Result<(), DataError> {
        self.facemap_store(ds, zone)?.write().set_elements(left, right)
    }

    fn facemap_set_boundary_connections(
        &mut self,
        ds: DatasetId,
        zone: ZoneId,
        faces: &[BoundaryFace],
    ) -> Result<(), DataError> {
        self.facemap_store(ds, zone)?.write().set_boundary(faces)
    }

    fn facemap_end_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        let store = self.facemap_store(ds, zone)?;
        let zones: Vec<(ZoneId, usize)> = self
            .dataset(ds)?
            .zones
            .iter()
            .map(|z| (z.id, z.shape.num_elements()))
            .collect();
        let mut guard = store.write();
        guard.end(&zones)?;
        self.check_connectivity(&*guard);
        Ok(())
    }

    fn facemap_abort_assign(&mut self, ds: DatasetId, zone: ZoneId) -> Result<(), DataError> {
        self.facemap_store(ds, zone)?.write().abort();
        Ok(())
    }
}
