//! Core spatial types and math.

pub mod math;
pub mod types;

pub use types::{ActorId, BOX_EDGES, BoundingBox, Location, Rotation, Transform};
