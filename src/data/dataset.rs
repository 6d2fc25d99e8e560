//! `Dataset`: the zone × variable catalog and its lifecycle operations.

use std::fmt;

use super::index::{IndexRange, PerItem};
use super::pattern::{ItemRef, Lookup, NameMatcher};
use super::variable::Variable;
use super::zone::{ClassicFEZone, OrderedZone, PolyFEZone, Zone};
use crate::data_error::{DataError, ItemKind};
use crate::engine::{ArraySpec, ChangeEvent, CopyPlan, ZoneSpec};
use crate::handle::{DatasetId, VariableId, ZoneId};
use crate::session::Session;
use crate::types::{
    ElementType, FaceNeighborMode, Feature, Location, PolytopeKind, ValueType, ZoneShape,
};

/// Per-zone storage options for a new variable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariableOptions {
    pub value_types: PerItem<ValueType>,
    pub locations: PerItem<Location>,
    pub passive: PerItem<bool>,
}

impl VariableOptions {
    pub fn value_types(mut self, v: impl Into<PerItem<ValueType>>) -> Self {
        self.value_types = v.into();
        self
    }

    pub fn locations(mut self, v: impl Into<PerItem<Location>>) -> Self {
        self.locations = v.into();
        self
    }

    pub fn passive(mut self, v: impl Into<PerItem<bool>>) -> Self {
        self.passive = v.into();
        self
    }
}

/// Everything needed to add a zone. Per-variable options expand over the
/// dataset's variables in order.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneOptions {
    pub name: String,
    pub shape: ZoneShape,
    pub value_types: PerItem<ValueType>,
    pub locations: PerItem<Location>,
    pub passive: PerItem<bool>,
    pub parent: Option<ZoneId>,
    pub solution_time: f64,
    pub strand_id: i32,
    /// Replace the zone at this index instead of appending.
    pub index: Option<usize>,
    pub face_neighbor_mode: FaceNeighborMode,
}

impl ZoneOptions {
    pub fn new(name: &str, shape: ZoneShape) -> Self {
        Self {
            name: name.to_owned(),
            shape,
            value_types: PerItem::Default,
            locations: PerItem::Default,
            passive: PerItem::Default,
            parent: None,
            solution_time: 0.0,
            strand_id: 0,
            index: None,
            face_neighbor_mode: FaceNeighborMode::default(),
        }
    }

    pub fn ordered(name: &str, (i, j, k): (usize, usize, usize)) -> Self {
        Self::new(name, ZoneShape::ordered(i, j, k))
    }

    pub fn classic_fe(name: &str, element: ElementType, num_points: usize, num_elements: usize) -> Self {
        Self::new(name, ZoneShape::classic_fe(element, num_points, num_elements))
    }

    pub fn poly_fe(
        name: &str,
        kind: PolytopeKind,
        num_points: usize,
        num_elements: usize,
        num_faces: usize,
    ) -> Self {
        Self::new(name, ZoneShape::poly_fe(kind, num_points, num_elements, num_faces))
    }

    pub fn value_types(mut self, v: impl Into<PerItem<ValueType>>) -> Self {
        self.value_types = v.into();
        self
    }

    pub fn locations(mut self, v: impl Into<PerItem<Location>>) -> Self {
        self.locations = v.into();
        self
    }

    pub fn passive(mut self, v: impl Into<PerItem<bool>>) -> Self {
        self.passive = v.into();
        self
    }

    pub fn parent(mut self, parent: ZoneId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn solution_time(mut self, t: f64) -> Self {
        self.solution_time = t;
        self
    }

    pub fn strand_id(mut self, strand: i32) -> Self {
        self.strand_id = strand;
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn face_neighbor_mode(mut self, mode: FaceNeighborMode) -> Self {
        self.face_neighbor_mode = mode;
        self
    }
}

/// Which variables a zone copy aliases instead of copying.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ShareSelection {
    #[default]
    None,
    All,
    Only(Vec<VariableId>),
}

/// Options for [`Dataset::copy_zones`] and [`Zone::copy_with`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CopyOptions {
    pub share: ShareSelection,
    /// Ordered zones only: node ranges kept along i, j and k.
    pub ranges: Option<[IndexRange; 3]>,
}

impl CopyOptions {
    pub fn share_all(mut self) -> Self {
        self.share = ShareSelection::All;
        self
    }

    pub fn share<I: IntoIterator<Item = VariableId>>(mut self, variables: I) -> Self {
        self.share = ShareSelection::Only(variables.into_iter().collect());
        self
    }

    pub fn ranges(mut self, i: IndexRange, j: IndexRange, k: IndexRange) -> Self {
        self.ranges = Some([i, j, k]);
        self
    }
}

/// Handle on one dataset of a session.
#[derive(Clone, Copy)]
pub struct Dataset<'s> {
    session: &'s Session,
    id: DatasetId,
}

impl fmt::Debug for Dataset<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dataset").field(&self.id).finish()
    }
}

impl PartialEq for Dataset<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.session, other.session)
    }
}

impl Eq for Dataset<'_> {}

impl<'s> Dataset<'s> {
    pub(crate) fn new(session: &'s Session, id: DatasetId) -> Self {
        Self { session, id }
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    pub fn title(&self) -> Result<String, DataError> {
        self.session.with_engine(|e| e.dataset_title(self.id))
    }

    pub fn set_title(&self, title: &str) -> Result<(), DataError> {
        self.session.with_engine(|e| e.set_dataset_title(self.id, title))
    }

    pub fn num_variables(&self) -> Result<usize, DataError> {
        self.session.with_engine(|e| e.num_variables(self.id))
    }

    pub fn num_zones(&self) -> Result<usize, DataError> {
        self.session.with_engine(|e| e.num_zones(self.id))
    }

    pub(crate) fn check_name(&self, what: ItemKind, name: &str) -> Result<(), DataError> {
        let max = self.session.config().max_name_len;
        if name.len() > max {
            return Err(DataError::NameTooLong {
                what,
                found: name.len(),
                max,
            });
        }
        Ok(())
    }

    /// Append a variable with default storage in every zone.
    pub fn add_variable(&self, name: &str) -> Result<Variable<'s>, DataError> {
        self.add_variable_with(name, VariableOptions::default())
    }

    pub fn add_variable_with(&self, name: &str, options: VariableOptions) -> Result<Variable<'s>, DataError> {
        self.check_name(ItemKind::Variable, name)?;
        let cfg = self.session.config();
        let n = self.num_zones()?;
        let types = options.value_types.expand(n, cfg.default_value_type)?;
        let locations = options.locations.expand(n, cfg.default_location)?;
        let passive = options.passive.expand(n, false)?;
        let arrays = array_specs(&types, &locations, &passive);
        let id = self.session.with_engine(|e| e.add_variable(self.id, name, &arrays))?;
        self.session.emit(ChangeEvent::StructureAltered { dataset: self.id });
        Ok(Variable::new(self.session, self.id, id))
    }

    pub fn add_zone(&self, options: ZoneOptions) -> Result<Zone<'s>, DataError> {
        self.check_name(ItemKind::Zone, &options.name)?;
        let cfg = self.session.config();
        let n = self.num_variables()?;
        if n == 0 {
            return Err(DataError::NoVariables);
        }
        let types = options.value_types.expand(n, cfg.default_value_type)?;
        let locations = options.locations.expand(n, cfg.default_location)?;
        let passive = options.passive.expand(n, false)?;
        let arrays = array_specs(&types, &locations, &passive);
        let spec = ZoneSpec {
            name: options.name,
            shape: options.shape,
            parent: options.parent,
            solution_time: options.solution_time,
            strand_id: options.strand_id,
            face_neighbor_mode: options.face_neighbor_mode,
            index: options.index,
        };
        let id = self.session.with_engine(|e| e.add_zone(self.id, &spec, &arrays))?;
        self.session.emit(ChangeEvent::StructureAltered { dataset: self.id });
        Ok(Zone::new(self.session, self.id, id))
    }

    pub fn add_ordered_zone(
        &self,
        name: &str,
        dims: (usize, usize, usize),
    ) -> Result<OrderedZone<'s>, DataError> {
        self.add_zone(ZoneOptions::ordered(name, dims))?.as_ordered()
    }

    pub fn add_fe_zone(
        &self,
        element: ElementType,
        name: &str,
        num_points: usize,
        num_elements: usize,
    ) -> Result<ClassicFEZone<'s>, DataError> {
        self.add_zone(ZoneOptions::classic_fe(name, element, num_points, num_elements))?
            .as_classic_fe()
    }

    pub fn add_poly_zone(
        &self,
        kind: PolytopeKind,
        name: &str,
        num_points: usize,
        num_elements: usize,
        num_faces: usize,
    ) -> Result<PolyFEZone<'s>, DataError> {
        self.add_zone(ZoneOptions::poly_fe(name, kind, num_points, num_elements, num_faces))?
            .as_poly_fe()
    }

    /// Delete variables. Deleting every variable is refused and nothing is deleted.
    pub fn delete_variables<'a, I, R>(&self, variables: I) -> Result<(), DataError>
    where
        I: IntoIterator<Item = R>,
        R: Into<ItemRef<'a, VariableId>>,
    {
        let ids = self.variable_ids_of(variables)?;
        self.session.with_engine(|e| e.delete_variables(self.id, &ids))?;
        self.session.emit(ChangeEvent::StructureAltered { dataset: self.id });
        Ok(())
    }

    /// Delete zones. Deleting every zone is refused and nothing is deleted.
    pub fn delete_zones<'a, I, R>(&self, zones: I) -> Result<(), DataError>
    where
        I: IntoIterator<Item = R>,
        R: Into<ItemRef<'a, ZoneId>>,
    {
        let ids = self.zone_ids_of(zones)?;
        self.session.with_engine(|e| e.delete_zones(self.id, &ids))?;
        self.session.emit(ChangeEvent::StructureAltered { dataset: self.id });
        Ok(())
    }

    /// Append one copy of each zone. Every copy is planned (and ranges
    /// resolved) before any zone is created.
    pub fn copy_zones<'a, I, R>(&self, zones: I, options: &CopyOptions) -> Result<Vec<Zone<'s>>, DataError>
    where
        I: IntoIterator<Item = R>,
        R: Into<ItemRef<'a, ZoneId>>,
    {
        if options.ranges.is_some() {
            self.session.require(Feature::RangedZoneCopy)?;
        }
        let sources = self.zone_ids_of(zones)?;
        let shared = match &options.share {
            ShareSelection::None => Vec::new(),
            ShareSelection::All => self.variable_ids()?,
            ShareSelection::Only(list) => self.variable_ids_of(list.iter().copied())?,
        };
        let mut plans = Vec::with_capacity(sources.len());
        for &source in &sources {
            let ranges = match &options.ranges {
                None => None,
                Some(r) => Some(self.zone(source)?.resolve_ranges(r)?),
            };
            plans.push(CopyPlan {
                name: None,
                ranges,
                shared: shared.clone(),
                negated: Vec::new(),
            });
        }
        let copies: Vec<(ZoneId, CopyPlan)> = sources.into_iter().zip(plans).collect();
        let ids = self.session.with_engine(|e| e.copy_zones(self.id, &copies))?;
        self.session.emit(ChangeEvent::StructureAltered { dataset: self.id });
        Ok(ids.into_iter().map(|id| Zone::new(self.session, self.id, id)).collect())
    }

    /// Give each (zone, variable) cell its own storage. With `copy_data =
    /// false` the cells become passive and read as zeros.
    pub fn branch_variables<'a, 'b, Z, ZR, V, VR>(
        &self,
        zones: Z,
        variables: V,
        copy_data: bool,
    ) -> Result<(), DataError>
    where
        Z: IntoIterator<Item = ZR>,
        ZR: Into<ItemRef<'a, ZoneId>>,
        V: IntoIterator<Item = VR>,
        VR: Into<ItemRef<'b, VariableId>>,
    {
        let zones = self.zone_ids_of(zones)?;
        let variables = self.variable_ids_of(variables)?;
        self.session
            .with_engine(|e| e.branch_arrays(self.id, &zones, &variables, copy_data))?;
        self.session.emit(ChangeEvent::StructureAltered { dataset: self.id });
        Ok(())
    }

    /// Alias the destination cells to the source zone's storage.
    pub fn share_variables<'a, 'b, 'c, S, Z, ZR, V, VR>(
        &self,
        source: S,
        destinations: Z,
        variables: V,
    ) -> Result<(), DataError>
    where
        S: Into<ItemRef<'a, ZoneId>>,
        Z: IntoIterator<Item = ZR>,
        ZR: Into<ItemRef<'b, ZoneId>>,
        V: IntoIterator<Item = VR>,
        VR: Into<ItemRef<'c, VariableId>>,
    {
        let source = self.resolve_zone(&source.into())?;
        let destinations = self.zone_ids_of(destinations)?;
        let variables = self.variable_ids_of(variables)?;
        self.session
            .with_engine(|e| e.share_arrays(self.id, source, &destinations, &variables))?;
        self.session.emit(ChangeEvent::StructureAltered { dataset: self.id });
        for &zone in &destinations {
            for &variable in &variables {
                self.session.emit(ChangeEvent::DataAltered {
                    dataset: self.id,
                    zone,
                    variable,
                });
            }
        }
        Ok(())
    }

    /// Give each zone its own copy of its nodemap or facemap.
    pub fn branch_connectivity<'a, I, R>(&self, zones: I) -> Result<(), DataError>
    where
        I: IntoIterator<Item = R>,
        R: Into<ItemRef<'a, ZoneId>>,
    {
        self.session.require(Feature::BranchConnectivity)?;
        let zones = self.zone_ids_of(zones)?;
        self.session.with_engine(|e| e.branch_connectivity(self.id, &zones))?;
        for zone in zones {
            self.session.emit(ChangeEvent::ConnectivityAltered {
                dataset: self.id,
                zone,
            });
        }
        Ok(())
    }

    /// Alias the destinations' nodemap or facemap to the source's.
    pub fn share_connectivity<'a, 'b, S, I, R>(&self, source: S, destinations: I) -> Result<(), DataError>
    where
        S: Into<ItemRef<'a, ZoneId>>,
        I: IntoIterator<Item = R>,
        R: Into<ItemRef<'b, ZoneId>>,
    {
        self.session.require(Feature::ShareConnectivity)?;
        let source = self.resolve_zone(&source.into())?;
        let destinations = self.zone_ids_of(destinations)?;
        self.session
            .with_engine(|e| e.share_connectivity(self.id, source, &destinations))?;
        for zone in destinations {
            self.session.emit(ChangeEvent::ConnectivityAltered {
                dataset: self.id,
                zone,
            });
        }
        Ok(())
    }

    pub fn zone<'a>(&self, item: impl Into<ItemRef<'a, ZoneId>>) -> Result<Zone<'s>, DataError> {
        let id = self.resolve_zone(&item.into())?;
        Ok(Zone::new(self.session, self.id, id))
    }

    pub fn variable<'a>(&self, item: impl Into<ItemRef<'a, VariableId>>) -> Result<Variable<'s>, DataError> {
        let id = self.resolve_variable(&item.into())?;
        Ok(Variable::new(self.session, self.id, id))
    }

    /// Enabled zones in dataset order.
    pub fn zones(&self) -> ZoneIter<'s> {
        ZoneIter {
            dataset: *self,
            matcher: None,
            next: 0,
        }
    }

    /// Enabled zones whose name matches a glob.
    pub fn zones_matching(&self, pattern: &str) -> Result<ZoneIter<'s>, DataError> {
        Ok(ZoneIter {
            dataset: *self,
            matcher: Some(NameMatcher::glob(pattern)?),
            next: 0,
        })
    }

    pub fn variables(&self) -> VariableIter<'s> {
        VariableIter {
            dataset: *self,
            matcher: None,
            next: 0,
        }
    }

    pub fn variables_matching(&self, pattern: &str) -> Result<VariableIter<'s>, DataError> {
        Ok(VariableIter {
            dataset: *self,
            matcher: Some(NameMatcher::glob(pattern)?),
            next: 0,
        })
    }

    pub fn variable_names(&self) -> Result<Vec<String>, DataError> {
        self.session.with_engine(|e| {
            (0..e.num_variables(self.id)?)
                .map(|i| {
                    let id = e.variable_id(self.id, i)?;
                    e.variable_name(self.id, id)
                })
                .collect()
        })
    }

    /// Distinct solution times over all zones, ascending.
    pub fn solution_times(&self) -> Result<Vec<f64>, DataError> {
        let mut times: Vec<f64> = self.session.with_engine(|e| {
            (0..e.num_zones(self.id)?)
                .map(|i| -> Result<f64, DataError> {
                    let id = e.zone_id(self.id, i)?;
                    Ok(e.zone_info(self.id, id)?.solution_time)
                })
                .collect::<Result<_, _>>()
        })?;
        times.sort_by(f64::total_cmp);
        times.dedup();
        Ok(times)
    }

    pub fn num_solution_times(&self) -> Result<usize, DataError> {
        Ok(self.solution_times()?.len())
    }

    pub(crate) fn variable_ids(&self) -> Result<Vec<VariableId>, DataError> {
        self.session.with_engine(|e| {
            (0..e.num_variables(self.id)?)
                .map(|i| e.variable_id(self.id, i))
                .collect()
        })
    }

    pub(crate) fn resolve_zone(&self, item: &ItemRef<'_, ZoneId>) -> Result<ZoneId, DataError> {
        self.session.with_engine(|e| {
            let ds = self.id;
            Lookup {
                owner: ds,
                kind: ItemKind::Zone,
                len: e.num_zones(ds)?,
                id_at: |i| e.zone_id(ds, i),
                name_at: |i| -> Result<String, DataError> { Ok(e.zone_info(ds, e.zone_id(ds, i)?)?.name) },
                exists: |id| e.zone_index(ds, id).map(|_| ()),
            }
            .resolve(item)
        })
    }

    pub(crate) fn resolve_variable(&self, item: &ItemRef<'_, VariableId>) -> Result<VariableId, DataError> {
        self.session.with_engine(|e| {
            let ds = self.id;
            Lookup {
                owner: ds,
                kind: ItemKind::Variable,
                len: e.num_variables(ds)?,
                id_at: |i| e.variable_id(ds, i),
                name_at: |i| e.variable_name(ds, e.variable_id(ds, i)?),
                exists: |id| e.variable_index(ds, id).map(|_| ()),
            }
            .resolve(item)
        })
    }

    fn zone_ids_of<'a, I, R>(&self, items: I) -> Result<Vec<ZoneId>, DataError>
    where
        I: IntoIterator<Item = R>,
        R: Into<ItemRef<'a, ZoneId>>,
    {
        items
            .into_iter()
            .map(|r| self.resolve_zone(&r.into()))
            .collect()
    }

    fn variable_ids_of<'a, I, R>(&self, items: I) -> Result<Vec<VariableId>, DataError>
    where
        I: IntoIterator<Item = R>,
        R: Into<ItemRef<'a, VariableId>>,
    {
        items
            .into_iter()
            .map(|r| self.resolve_variable(&r.into()))
            .collect()
    }
}

fn array_specs(types: &[ValueType], locations: &[Location], passive: &[bool]) -> Vec<ArraySpec> {
    types
        .iter()
        .zip(locations)
        .zip(passive)
        .map(|((&value_type, &location), &passive)| ArraySpec {
            value_type,
            location,
            passive,
        })
        .collect()
}

/// Lazy walk over a dataset's enabled zones.
///
/// Positions are re-read from the engine on every step, so deleting zones
/// while iterating skips or repeats items; restart the iteration instead.
#[derive(Debug)]
pub struct ZoneIter<'s> {
    dataset: Dataset<'s>,
    matcher: Option<NameMatcher>,
    next: usize,
}

impl<'s> Iterator for ZoneIter<'s> {
    type Item = Zone<'s>;

    fn next(&mut self) -> Option<Self::Item> {
        let ds = self.dataset.id;
        loop {
            let index = self.next;
            let info = self
                .dataset
                .session
                .with_engine(|e| e.zone_info(ds, e.zone_id(ds, index)?))
                .ok()?;
            self.next += 1;
            if !info.enabled {
                continue;
            }
            if self.matcher.as_ref().is_none_or(|m| m.is_match(&info.name)) {
                return Some(Zone::new(self.dataset.session, ds, info.id));
            }
        }
    }
}

/// Lazy walk over a dataset's variables; same deletion caveat as [`ZoneIter`].
#[derive(Debug)]
pub struct VariableIter<'s> {
    dataset: Dataset<'s>,
    matcher: Option<NameMatcher>,
    next: usize,
}

impl<'s> Iterator for VariableIter<'s> {
    type Item = Variable<'s>;

    fn next(&mut self) -> Option<Self::Item> {
        let ds = self.dataset.id;
        loop {
            let index = self.next;
            let (id, name) = self
                .dataset
                .session
                .with_engine(|e| {
                    let id = e.variable_id(ds, index)?;
                    Ok::<_, DataError>((id, e.variable_name(ds, id)?))
                })
                .ok()?;
            self.next += 1;
            if self.matcher.as_ref().is_none_or(|m| m.is_match(&name)) {
                return Some(Variable::new(self.dataset.session, ds, id));
            }
        }
    }
}
