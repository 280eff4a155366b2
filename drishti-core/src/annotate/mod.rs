//! Traffic light annotation of replayed recordings.
//!
//! - [`Annotator`]: one world snapshot to a list of [`Annotation2D`].
//! - [`AnnotationEngine`]: drives a replay and streams [`Frame`]s to a
//!   [`FrameSink`].

pub mod annotator;
pub mod engine;
pub mod types;

pub use annotator::Annotator;
pub use engine::{AnnotationConfig, AnnotationEngine, EngineState, ReplaySummary, ticks_per_frame};
pub use types::{Annotation2D, Category, CollectingSink, Frame, FrameSink, StreamEnd};
