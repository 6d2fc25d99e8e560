//! Descriptors shared by every layer: storage types, value placement, zone
//! topologies and engine capabilities.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data_error::DataError;

/// Numeric storage type of an array.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, Default)]
pub enum ValueType {
    /// 32-bit IEEE float.
    #[default]
    Float,
    /// 64-bit IEEE float.
    Double,
    /// 32-bit signed integer.
    Int32,
    /// 16-bit signed integer.
    Int16,
    /// 1-bit value, stored one value per byte.
    Bit,
}

impl ValueType {
    /// Returns a stable string label for the value type.
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Int32 => "int32",
            ValueType::Int16 => "int16",
            ValueType::Bit => "bit",
        }
    }

    /// Parse a value type from its label (case-insensitive).
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "float" => Some(ValueType::Float),
            "double" => Some(ValueType::Double),
            "int32" => Some(ValueType::Int32),
            "int16" => Some(ValueType::Int16),
            "bit" => Some(ValueType::Bit),
            _ => None,
        }
    }

    /// True for the two floating-point storage types.
    pub fn is_floating(self) -> bool {
        matches!(self, ValueType::Float | ValueType::Double)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where array values live on the mesh.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, Default)]
pub enum Location {
    /// One value per node.
    #[default]
    Nodal,
    /// One value per element.
    CellCentered,
}

/// Fixed-arity element types of classic finite-element zones.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum ElementType {
    LineSeg,
    Triangle,
    Quad,
    Tetra,
    Brick,
}

impl ElementType {
    /// Number of nodes referenced by every element of this type.
    pub fn points_per_element(self) -> usize {
        match self {
            ElementType::LineSeg => 2,
            ElementType::Triangle => 3,
            ElementType::Quad => 4,
            ElementType::Tetra => 4,
            ElementType::Brick => 8,
        }
    }

    /// Number of faces each element exposes to face-neighbor stitching.
    pub fn faces_per_element(self) -> usize {
        match self {
            ElementType::LineSeg => 1,
            ElementType::Triangle => 3,
            ElementType::Quad => 4,
            ElementType::Tetra => 4,
            ElementType::Brick => 6,
        }
    }

    /// Topological dimension of the element.
    pub fn dimension(self) -> u8 {
        match self {
            ElementType::LineSeg => 1,
            ElementType::Triangle | ElementType::Quad => 2,
            ElementType::Tetra | ElementType::Brick => 3,
        }
    }
}

/// Variable-arity element kinds of polytope zones.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum PolytopeKind {
    Polygon,
    Polyhedron,
}

/// Flat classification of a zone's topology.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum ZoneType {
    Ordered,
    FELineSeg,
    FETriangle,
    FEQuad,
    FETetra,
    FEBrick,
    FEPolygon,
    FEPolyhedron,
}

/// Shape and topology of a zone, fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneShape {
    /// Logically structured (i, j, k) block.
    Ordered { dims: [usize; 3] },
    /// Finite-element zone whose elements all share one element type.
    ClassicFE {
        element: ElementType,
        num_points: usize,
        num_elements: usize,
    },
    /// Polygonal or polyhedral zone; `num_faces == 0` defers the face count
    /// until the facemap is committed.
    PolyFE {
        kind: PolytopeKind,
        num_points: usize,
        num_elements: usize,
        num_faces: usize,
    },
}

impl ZoneShape {
    /// Ordered shape from (i, j, k).
    pub fn ordered(i: usize, j: usize, k: usize) -> Self {
        ZoneShape::Ordered { dims: [i, j, k] }
    }

    /// Classic FE shape.
    pub fn classic_fe(element: ElementType, num_points: usize, num_elements: usize) -> Self {
        ZoneShape::ClassicFE {
            element,
            num_points,
            num_elements,
        }
    }

    /// Polytope shape; pass `num_faces = 0` to defer.
    pub fn poly_fe(
        kind: PolytopeKind,
        num_points: usize,
        num_elements: usize,
        num_faces: usize,
    ) -> Self {
        ZoneShape::PolyFE {
            kind,
            num_points,
            num_elements,
            num_faces,
        }
    }

    /// Reject degenerate shapes.
    pub fn validate(&self) -> Result<(), DataError> {
        match *self {
            ZoneShape::Ordered { dims } => {
                if dims.contains(&0) {
                    return Err(DataError::InvalidShape(format!(
                        "ordered dimensions must be >= 1, got {dims:?}"
                    )));
                }
            }
            ZoneShape::ClassicFE {
                num_points,
                num_elements,
                ..
            }
            | ZoneShape::PolyFE {
                num_points,
                num_elements,
                ..
            } => {
                if num_points == 0 || num_elements == 0 {
                    return Err(DataError::InvalidShape(format!(
                        "finite-element zones need at least one point and one element \
                         (points={num_points}, elements={num_elements})"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Flat zone type.
    pub fn zone_type(&self) -> ZoneType {
        match *self {
            ZoneShape::Ordered { .. } => ZoneType::Ordered,
            ZoneShape::ClassicFE { element, .. } => match element {
                ElementType::LineSeg => ZoneType::FELineSeg,
                ElementType::Triangle => ZoneType::FETriangle,
                ElementType::Quad => ZoneType::FEQuad,
                ElementType::Tetra => ZoneType::FETetra,
                ElementType::Brick => ZoneType::FEBrick,
            },
            ZoneShape::PolyFE { kind, .. } => match kind {
                PolytopeKind::Polygon => ZoneType::FEPolygon,
                PolytopeKind::Polyhedron => ZoneType::FEPolyhedron,
            },
        }
    }

    /// Number of dimensions greater than one (ordered zones only; 0 otherwise).
    pub fn rank(&self) -> usize {
        match self {
            ZoneShape::Ordered { dims } => dims.iter().filter(|&&d| d > 1).count(),
            _ => 0,
        }
    }

    pub fn num_points(&self) -> usize {
        match *self {
            ZoneShape::Ordered { dims } => dims.iter().product(),
            ZoneShape::ClassicFE { num_points, .. } | ZoneShape::PolyFE { num_points, .. } => {
                num_points
            }
        }
    }

    pub fn num_elements(&self) -> usize {
        match *self {
            ZoneShape::Ordered { dims } => dims.iter().filter(|&&d| d > 1).map(|d| d - 1).product(),
            ZoneShape::ClassicFE { num_elements, .. } | ZoneShape::PolyFE { num_elements, .. } => {
                num_elements
            }
        }
    }

    /// Points per element; `None` for polytope zones, whose arity varies.
    pub fn num_points_per_element(&self) -> Option<usize> {
        match *self {
            ZoneShape::Ordered { .. } => Some(1 << self.rank()),
            ZoneShape::ClassicFE { element, .. } => Some(element.points_per_element()),
            ZoneShape::PolyFE { .. } => None,
        }
    }

    /// Faces per element; `None` for polytope zones.
    pub fn num_faces_per_element(&self) -> Option<usize> {
        match *self {
            ZoneShape::Ordered { .. } => Some([0, 1, 4, 6][self.rank()]),
            ZoneShape::ClassicFE { element, .. } => Some(element.faces_per_element()),
            ZoneShape::PolyFE { .. } => None,
        }
    }

    /// Number of values an array at `location` holds.
    pub fn array_len(&self, location: Location) -> usize {
        match location {
            Location::Nodal => self.num_points(),
            Location::CellCentered => self.num_elements(),
        }
    }

    /// Same topology and cardinalities (the deferred poly face count is ignored).
    pub fn same_topology(&self, other: &ZoneShape) -> bool {
        match (*self, *other) {
            (
                ZoneShape::PolyFE {
                    kind: a,
                    num_points: pa,
                    num_elements: ea,
                    ..
                },
                ZoneShape::PolyFE {
                    kind: b,
                    num_points: pb,
                    num_elements: eb,
                    ..
                },
            ) => a == b && pa == pb && ea == eb,
            (a, b) => a == b,
        }
    }
}

/// Whether neighbors live in the same zone or in any zone.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, Default)]
pub enum NeighborScope {
    #[default]
    Local,
    Global,
}

/// Whether a face connects to one neighbor element or to several.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, Default)]
pub enum NeighborArity {
    #[default]
    OneToOne,
    OneToMany,
}

/// Face-neighbor mode of a zone, fixed at zone creation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, Default)]
pub struct FaceNeighborMode {
    pub scope: NeighborScope,
    pub arity: NeighborArity,
}

impl FaceNeighborMode {
    pub const LOCAL_ONE_TO_ONE: Self = Self::new(NeighborScope::Local, NeighborArity::OneToOne);
    pub const LOCAL_ONE_TO_MANY: Self = Self::new(NeighborScope::Local, NeighborArity::OneToMany);
    pub const GLOBAL_ONE_TO_ONE: Self = Self::new(NeighborScope::Global, NeighborArity::OneToOne);
    pub const GLOBAL_ONE_TO_MANY: Self =
        Self::new(NeighborScope::Global, NeighborArity::OneToMany);

    pub const fn new(scope: NeighborScope, arity: NeighborArity) -> Self {
        Self { scope, arity }
    }

    pub fn is_global(self) -> bool {
        self.scope == NeighborScope::Global
    }

    pub fn is_one_to_one(self) -> bool {
        self.arity == NeighborArity::OneToOne
    }
}

/// Lock placed on a variable by other engine subsystems.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, Default)]
pub enum VariableLockMode {
    #[default]
    None,
    /// Values may not be written.
    ValueLocked,
    /// The variable may not be deleted.
    DeleteLocked,
}

/// How the engine is reached.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, Default)]
pub enum ExecutionMode {
    /// In-process engine; zero-copy raw views are available.
    #[default]
    Batch,
    /// Engine reached through remote procedure calls; raw views are refused.
    Connected,
}

/// Engine release version used for capability checks.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl EngineVersion {
    /// Version advertised by [`InMemoryEngine`](crate::engine::InMemoryEngine) by default.
    pub const CURRENT: Self = Self::new(1, 4, 0);

    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Default for EngineVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Operations gated on the engine version.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Feature {
    FaceNeighborAssignment,
    BranchConnectivity,
    ShareConnectivity,
    ZoneMirroring,
    RangedZoneCopy,
}

impl Feature {
    /// Earliest engine version providing the feature.
    pub fn required_version(self) -> EngineVersion {
        match self {
            Feature::FaceNeighborAssignment => EngineVersion::new(1, 1, 0),
            Feature::BranchConnectivity | Feature::ShareConnectivity => EngineVersion::new(1, 2, 0),
            Feature::ZoneMirroring | Feature::RangedZoneCopy => EngineVersion::new(1, 3, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Feature::FaceNeighborAssignment => "face neighbor assignment",
            Feature::BranchConnectivity => "connectivity branching",
            Feature::ShareConnectivity => "connectivity sharing",
            Feature::ZoneMirroring => "zone mirroring",
            Feature::RangedZoneCopy => "ranged zone copy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_counts_follow_rank() {
        let s = ZoneShape::ordered(3, 3, 3);
        assert_eq!(s.rank(), 3);
        assert_eq!(s.num_points(), 27);
        assert_eq!(s.num_elements(), 8);
        assert_eq!(s.num_points_per_element(), Some(8));
        assert_eq!(s.num_faces_per_element(), Some(6));

        let line = ZoneShape::ordered(5, 1, 1);
        assert_eq!(line.rank(), 1);
        assert_eq!(line.num_elements(), 4);
        assert_eq!(line.num_faces_per_element(), Some(1));

        let point = ZoneShape::ordered(1, 1, 1);
        assert_eq!(point.rank(), 0);
        assert_eq!(point.num_elements(), 1);
        assert_eq!(point.num_points_per_element(), Some(1));
    }

    #[test]
    fn array_len_depends_on_location() {
        let s = ZoneShape::classic_fe(ElementType::Triangle, 4, 2);
        assert_eq!(s.array_len(Location::Nodal), 4);
        assert_eq!(s.array_len(Location::CellCentered), 2);
        assert_eq!(s.zone_type(), ZoneType::FETriangle);
    }

    #[test]
    fn degenerate_shapes_are_rejected() {
        assert!(ZoneShape::ordered(0, 1, 1).validate().is_err());
        assert!(ZoneShape::classic_fe(ElementType::Quad, 4, 0).validate().is_err());
        assert!(ZoneShape::poly_fe(PolytopeKind::Polygon, 3, 1, 0).validate().is_ok());
    }

    #[test]
    fn poly_topology_ignores_deferred_faces() {
        let a = ZoneShape::poly_fe(PolytopeKind::Polygon, 6, 2, 0);
        let b = ZoneShape::poly_fe(PolytopeKind::Polygon, 6, 2, 7);
        assert!(a.same_topology(&b));
        assert!(!a.same_topology(&ZoneShape::poly_fe(PolytopeKind::Polyhedron, 6, 2, 7)));
    }

    #[test]
    fn value_type_labels_roundtrip() {
        for ty in [
            ValueType::Float,
            ValueType::Double,
            ValueType::Int32,
            ValueType::Int16,
            ValueType::Bit,
        ] {
            assert_eq!(ValueType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(ValueType::parse("INT16"), Some(ValueType::Int16));
        assert_eq!(ValueType::parse("u8"), None);
    }

    #[test]
    fn versions_order_and_print() {
        assert!(EngineVersion::new(1, 2, 0) < EngineVersion::CURRENT);
        assert_eq!(EngineVersion::new(1, 3, 2).to_string(), "1.3.2");
        assert!(Feature::RangedZoneCopy.required_version() <= EngineVersion::CURRENT);
    }
}
