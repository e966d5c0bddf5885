//! `mcl-perception` – the world model the particle filter scores against.
//!
//! # Modules
//!
//! - [`transform`] – [`TfEngine`][transform::TfEngine]: graph of named
//!   reference frames with time-stamped rigid transforms, plus the
//!   [`TransformProvider`][transform::TransformProvider] seam the filter is
//!   written against.
//! - [`occupancy`] – [`OccupancyGrid`][occupancy::OccupancyGrid]: the static
//!   map, parsed from a compact ASCII layout.
//! - [`quadtree`] – [`Quadtree`][quadtree::Quadtree]: planar spatial index
//!   answering nearest-obstacle queries.
//! - [`likelihood`] – [`LikelihoodField`][likelihood::LikelihoodField]:
//!   per-cell distance to the closest obstacle, precomputed once so that
//!   every sensor-model query is a table lookup.

pub mod likelihood;
pub mod occupancy;
pub mod quadtree;
pub mod transform;

pub use likelihood::{DistanceField, LikelihoodField};
pub use occupancy::{CellState, MapError, OccupancyGrid};
pub use transform::{
    LATEST, Quaternion, SharedTf, TfEngine, TfError, Transform3D, TransformProvider, Vec3,
};
