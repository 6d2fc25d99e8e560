//! `Zone` and its typed views for the three topologies.

use std::fmt;
use std::ops::Deref;

use super::array::Array;
use super::dataset::{CopyOptions, Dataset};
use super::index::IndexRange;
use super::pattern::ItemRef;
use crate::data_error::{DataError, ItemKind};
use crate::engine::{ChangeEvent, CopyPlan, ZoneInfo, ZoneUpdate};
use crate::handle::{ArrayKey, DatasetId, VariableId, ZoneId};
use crate::session::Session;
use crate::topology::{FaceNeighbors, Facemap, Nodemap};
use crate::types::{ElementType, Feature, PolytopeKind, ZoneShape, ZoneType};

/// Handle on one zone.
#[derive(Clone, Copy)]
pub struct Zone<'s> {
    session: &'s Session,
    dataset: DatasetId,
    id: ZoneId,
}

impl fmt::Debug for Zone<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("dataset", &self.dataset)
            .field("id", &self.id)
            .finish()
    }
}

impl PartialEq for Zone<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.dataset == other.dataset && std::ptr::eq(self.session, other.session)
    }
}

impl Eq for Zone<'_> {}

impl<'a> From<Zone<'_>> for ItemRef<'a, ZoneId> {
    fn from(z: Zone<'_>) -> Self {
        ItemRef::Handle {
            dataset: Some(z.dataset),
            id: z.id,
        }
    }
}

impl<'a> From<&Zone<'_>> for ItemRef<'a, ZoneId> {
    fn from(z: &Zone<'_>) -> Self {
        (*z).into()
    }
}

impl<'s> Zone<'s> {
    pub(crate) fn new(session: &'s Session, dataset: DatasetId, id: ZoneId) -> Self {
        Self {
            session,
            dataset,
            id,
        }
    }

    pub fn id(&self) -> ZoneId {
        self.id
    }

    pub fn dataset(&self) -> Dataset<'s> {
        Dataset::new(self.session, self.dataset)
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    pub(crate) fn info(&self) -> Result<ZoneInfo, DataError> {
        self.session.with_engine(|e| e.zone_info(self.dataset, self.id))
    }

    fn update(&self, update: ZoneUpdate) -> Result<(), DataError> {
        self.session
            .with_engine(|e| e.update_zone(self.dataset, self.id, update))
    }

    /// Current position; shifts when earlier zones are deleted.
    pub fn index(&self) -> Result<usize, DataError> {
        self.session.with_engine(|e| e.zone_index(self.dataset, self.id))
    }

    pub fn name(&self) -> Result<String, DataError> {
        Ok(self.info()?.name)
    }

    pub fn set_name(&self, name: &str) -> Result<(), DataError> {
        self.dataset().check_name(ItemKind::Zone, name)?;
        self.update(ZoneUpdate::Name(name.to_owned()))
    }

    pub fn solution_time(&self) -> Result<f64, DataError> {
        Ok(self.info()?.solution_time)
    }

    pub fn set_solution_time(&self, t: f64) -> Result<(), DataError> {
        self.update(ZoneUpdate::SolutionTime(t))
    }

    pub fn strand(&self) -> Result<i32, DataError> {
        Ok(self.info()?.strand_id)
    }

    pub fn set_strand(&self, strand: i32) -> Result<(), DataError> {
        self.update(ZoneUpdate::Strand(strand))
    }

    /// Parent zone, if one was given and still exists.
    pub fn parent(&self) -> Result<Option<Zone<'s>>, DataError> {
        let Some(parent) = self.info()?.parent else {
            return Ok(None);
        };
        let exists = self
            .session
            .with_engine(|e| e.zone_index(self.dataset, parent))
            .is_ok();
        Ok(exists.then(|| Zone::new(self.session, self.dataset, parent)))
    }

    pub fn is_enabled(&self) -> Result<bool, DataError> {
        Ok(self.info()?.enabled)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), DataError> {
        self.update(ZoneUpdate::Enabled(enabled))
    }

    pub fn shape(&self) -> Result<ZoneShape, DataError> {
        Ok(self.info()?.shape)
    }

    pub fn zone_type(&self) -> Result<ZoneType, DataError> {
        Ok(self.shape()?.zone_type())
    }

    pub fn num_points(&self) -> Result<usize, DataError> {
        Ok(self.shape()?.num_points())
    }

    pub fn num_elements(&self) -> Result<usize, DataError> {
        Ok(self.shape()?.num_elements())
    }

    pub fn num_variables(&self) -> Result<usize, DataError> {
        self.dataset().num_variables()
    }

    /// Array of `variable` in this zone.
    pub fn values<'a>(&self, variable: impl Into<ItemRef<'a, VariableId>>) -> Result<Array<'s>, DataError> {
        let variable = self.dataset().resolve_variable(&variable.into())?;
        self.session.with_engine(|e| e.zone_index(self.dataset, self.id))?;
        Ok(Array::new(
            self.session,
            ArrayKey {
                dataset: self.dataset,
                zone: self.id,
                variable,
            },
        ))
    }

    /// Append a copy with every variable in independent storage.
    pub fn copy(&self) -> Result<Zone<'s>, DataError> {
        self.copy_with(&CopyOptions::default())
    }

    pub fn copy_with(&self, options: &CopyOptions) -> Result<Zone<'s>, DataError> {
        let copies = self.dataset().copy_zones([*self], options)?;
        copies
            .into_iter()
            .next()
            .ok_or_else(|| DataError::InvalidArgument("zone copy produced nothing".into()))
    }

    /// Append a copy whose listed variables are negated copies and whose
    /// other variables alias this zone's storage.
    pub fn mirror<'a, I, R>(&self, variables: I) -> Result<Zone<'s>, DataError>
    where
        I: IntoIterator<Item = R>,
        R: Into<ItemRef<'a, VariableId>>,
    {
        self.session.require(Feature::ZoneMirroring)?;
        let ds = self.dataset();
        let negated = variables
            .into_iter()
            .map(|v| ds.resolve_variable(&v.into()))
            .collect::<Result<Vec<_>, _>>()?;
        let shared = ds
            .variable_ids()?
            .into_iter()
            .filter(|v| !negated.contains(v))
            .collect();
        let plan = CopyPlan {
            name: None,
            ranges: None,
            shared,
            negated,
        };
        let ids = self
            .session
            .with_engine(|e| e.copy_zones(self.dataset, &[(self.id, plan)]))?;
        let id = ids
            .first()
            .copied()
            .ok_or_else(|| DataError::InvalidArgument("zone mirror produced nothing".into()))?;
        self.session.emit(ChangeEvent::StructureAltered {
            dataset: self.dataset,
        });
        Ok(Zone::new(self.session, self.dataset, id))
    }

    pub(crate) fn resolve_ranges(&self, ranges: &[IndexRange; 3]) -> Result<[Vec<usize>; 3], DataError> {
        match self.shape()? {
            ZoneShape::Ordered { dims } => Ok([
                ranges[0].resolve(dims[0])?,
                ranges[1].resolve(dims[1])?,
                ranges[2].resolve(dims[2])?,
            ]),
            shape => Err(self.wrong_type(shape, "an ordered zone", "ranged copy")),
        }
    }

    fn wrong_type(&self, shape: ZoneShape, expected: &'static str, op: &'static str) -> DataError {
        DataError::WrongZoneType {
            zone: self.id,
            found: shape.zone_type(),
            expected,
            op,
        }
    }

    /// Typed view matching this zone's topology.
    pub fn kind(&self) -> Result<ZoneKind<'s>, DataError> {
        Ok(match self.shape()? {
            ZoneShape::Ordered { .. } => ZoneKind::Ordered(OrderedZone(*self)),
            ZoneShape::ClassicFE { .. } => ZoneKind::ClassicFE(ClassicFEZone(*self)),
            ZoneShape::PolyFE { .. } => ZoneKind::PolyFE(PolyFEZone(*self)),
        })
    }

    pub fn as_ordered(&self) -> Result<OrderedZone<'s>, DataError> {
        match self.kind()? {
            ZoneKind::Ordered(z) => Ok(z),
            _ => Err(self.wrong_type(self.shape()?, "an ordered zone", "ordered view")),
        }
    }

    pub fn as_classic_fe(&self) -> Result<ClassicFEZone<'s>, DataError> {
        match self.kind()? {
            ZoneKind::ClassicFE(z) => Ok(z),
            _ => Err(self.wrong_type(self.shape()?, "a classic finite-element zone", "classic FE view")),
        }
    }

    pub fn as_poly_fe(&self) -> Result<PolyFEZone<'s>, DataError> {
        match self.kind()? {
            ZoneKind::PolyFE(z) => Ok(z),
            _ => Err(self.wrong_type(self.shape()?, "a polytope zone", "polytope view")),
        }
    }

    /// Face neighbors; available on ordered and classic FE zones.
    pub fn face_neighbors(&self) -> Result<FaceNeighbors<'s>, DataError> {
        match self.shape()? {
            ZoneShape::PolyFE { .. } => Err(self.wrong_type(
                self.shape()?,
                "an ordered or classic finite-element zone",
                "face neighbors",
            )),
            _ => Ok(FaceNeighbors::new(self.session, self.dataset, self.id)),
        }
    }
}

/// Zone dispatched on topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoneKind<'s> {
    Ordered(OrderedZone<'s>),
    ClassicFE(ClassicFEZone<'s>),
    PolyFE(PolyFEZone<'s>),
}

impl<'s> ZoneKind<'s> {
    pub fn zone(&self) -> Zone<'s> {
        match self {
            ZoneKind::Ordered(z) => z.0,
            ZoneKind::ClassicFE(z) => z.0,
            ZoneKind::PolyFE(z) => z.0,
        }
    }
}

macro_rules! zone_view {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub struct $name<'s>(Zone<'s>);

        impl<'s> Deref for $name<'s> {
            type Target = Zone<'s>;

            fn deref(&self) -> &Zone<'s> {
                &self.0
            }
        }

        impl<'s> $name<'s> {
            /// The untyped handle.
            pub fn zone(&self) -> Zone<'s> {
                self.0
            }
        }

        impl<'a> From<$name<'_>> for ItemRef<'a, ZoneId> {
            fn from(z: $name<'_>) -> Self {
                z.0.into()
            }
        }

        impl<'a> From<&$name<'_>> for ItemRef<'a, ZoneId> {
            fn from(z: &$name<'_>) -> Self {
                z.0.into()
            }
        }
    };
}

zone_view!(
    /// Logically structured (i, j, k) zone.
    OrderedZone
);
zone_view!(
    /// Finite-element zone with one fixed element type.
    ClassicFEZone
);
zone_view!(
    /// Polygonal or polyhedral zone.
    PolyFEZone
);

impl<'s> OrderedZone<'s> {
    pub fn dimensions(&self) -> Result<[usize; 3], DataError> {
        match self.shape()? {
            ZoneShape::Ordered { dims } => Ok(dims),
            shape => Err(self.0.wrong_type(shape, "an ordered zone", "dimensions")),
        }
    }

    pub fn rank(&self) -> Result<usize, DataError> {
        Ok(self.shape()?.rank())
    }

    /// `2^rank`.
    pub fn num_points_per_element(&self) -> Result<usize, DataError> {
        Ok(1 << self.rank()?)
    }

    pub fn num_faces_per_element(&self) -> Result<usize, DataError> {
        Ok(self.shape()?.num_faces_per_element().unwrap_or(0))
    }
}

impl<'s> ClassicFEZone<'s> {
    pub fn element_type(&self) -> Result<ElementType, DataError> {
        match self.shape()? {
            ZoneShape::ClassicFE { element, .. } => Ok(element),
            shape => Err(self.0.wrong_type(shape, "a classic finite-element zone", "element type")),
        }
    }

    pub fn num_points_per_element(&self) -> Result<usize, DataError> {
        Ok(self.element_type()?.points_per_element())
    }

    pub fn num_faces_per_element(&self) -> Result<usize, DataError> {
        Ok(self.element_type()?.faces_per_element())
    }

    pub fn nodemap(&self) -> Nodemap<'s> {
        Nodemap::new(self.session(), self.dataset().id(), self.id())
    }
}

impl<'s> PolyFEZone<'s> {
    pub fn polytope_kind(&self) -> Result<PolytopeKind, DataError> {
        match self.shape()? {
            ZoneShape::PolyFE { kind, .. } => Ok(kind),
            shape => Err(self.0.wrong_type(shape, "a polytope zone", "polytope kind")),
        }
    }

    /// Face count; 0 until a facemap is committed when it was deferred.
    pub fn num_faces(&self) -> Result<usize, DataError> {
        match self.shape()? {
            ZoneShape::PolyFE { num_faces, .. } => Ok(num_faces),
            shape => Err(self.0.wrong_type(shape, "a polytope zone", "face count")),
        }
    }

    pub fn facemap(&self) -> Facemap<'s> {
        Facemap::new(self.session(), self.dataset().id(), self.id())
    }
}
