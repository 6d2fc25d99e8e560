#![cfg_attr(docsrs, feature(doc_cfg))]
//! # zonal-data
//!
//! zonal-data is the data model of a scientific-visualization engine: a
//! dataset is a dense grid of zones × variables, and every cell of that grid
//! is an [`Array`](data::Array) of values. Zones come in three topologies:
//!
//! - **Ordered**: logically structured (i, j, k) blocks.
//! - **Classic FE**: one fixed element type, connected through a
//!   [`Nodemap`](topology::Nodemap).
//! - **Poly FE**: polygons or polyhedra, connected through a
//!   [`Facemap`](topology::Facemap).
//!
//! Ordered and classic FE zones can also carry
//! [`FaceNeighbors`](topology::FaceNeighbors) that stitch element faces
//! across zone boundaries.
//!
//! ## Model
//! - Storage lives in an engine behind the [`engine::Engine`] traits;
//!   [`engine::InMemoryEngine`] is the in-process implementation.
//! - A [`Session`](session::Session) owns the engine. Handles (`Dataset`,
//!   `Zone`, `Variable`, `Array`, connectivity) are cheap `Copy` views that
//!   name items by stable id.
//! - Arrays and connectivity can be *shared* between zones (one storage,
//!   several owners) and *branched* back into independent copies.
//! - Connectivity is edited in transactions that validate before they
//!   commit; a failed commit leaves the previous content in place.
//! - [`Session::suspend`](session::Session::suspend) batches change
//!   notifications until the outermost scope ends.
//!
//! ## Usage
//! ```
//! use zonal_data::prelude::*;
//!
//! let session = Session::default();
//! let ds = session.create_dataset("demo");
//! ds.add_variable("x")?;
//! let zone = ds.add_fe_zone(ElementType::Triangle, "tri", 3, 1)?;
//! zone.nodemap().set(0, &[0, 1, 2])?;
//! zone.values("x")?.set_all(&[0.0, 1.0, 0.5])?;
//! assert_eq!(zone.values(0)?.max()?, 1.0);
//! # Ok::<(), DataError>(())
//! ```

pub mod cache;
pub mod config;
pub mod data;
pub mod data_error;
pub mod debug_invariants;
pub mod engine;
pub mod handle;
pub mod session;
pub mod topology;
pub mod types;

pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used types:
pub mod prelude {
    pub use crate::config::SessionConfig;
    pub use crate::data::{
        Array, ArraySlice, ClassicFEZone, CopyOptions, Dataset, IndexRange, ItemRef, OrderedZone,
        PerItem, PolyFEZone, RawView, ShareSelection, Variable, VariableOptions, Zone, ZoneKind,
        ZoneOptions,
    };
    pub use crate::data_error::{DataError, ErrorKind};
    pub use crate::engine::{
        BoundaryConnection, BoundaryFace, ChangeEvent, FacemapCapacity, InMemoryEngine, Neighbor,
    };
    pub use crate::handle::{DatasetId, VariableId, ZoneId};
    pub use crate::session::{ListenerId, Session, SuspendGuard};
    pub use crate::topology::{
        FaceNeighborAssignment, FaceNeighbors, Facemap, FacemapAssignment, Nodemap,
        NodemapAssignment,
    };
    pub use crate::types::{
        ElementType, EngineVersion, ExecutionMode, FaceNeighborMode, Feature, Location,
        NeighborArity, NeighborScope, PolytopeKind, ValueType, VariableLockMode, ZoneShape,
        ZoneType,
    };
}
