//! # Drishti: Traffic Light Dataset Pipeline
//!
//! Builds labeled camera datasets from a driving simulator in two phases:
//!
//! 1. **Record**: plan a route that covers every drivable lane of a town,
//!    drive it with the simulator's autopilot and keep the native recording.
//! 2. **Annotate**: replay the recording under a weather preset, capture a
//!    roof camera image every sensor tick and box every visible traffic light.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use drishti_core::annotate::{AnnotationConfig, AnnotationEngine, CollectingSink};
//! use drishti_core::camera::CameraConfig;
//! use drishti_core::config::PipelineConfig;
//! use drishti_core::session::RecordingSession;
//! use drishti_core::sim::mock::MockSimulator;
//!
//! let config = PipelineConfig::default();
//! let mut sim = MockSimulator::default();
//!
//! let summary = RecordingSession::setup(&mut sim, &config.recording, &config.planner, &config.drive)?
//!     .run()?;
//!
//! let mut engine = AnnotationEngine::new(&mut sim, CameraConfig::default(), AnnotationConfig::default());
//! engine.open(&summary.path, None)?;
//! let mut sink = CollectingSink::default();
//! engine.run(&mut sink)?;
//! # Ok::<(), drishti_core::DrishtiError>(())
//! ```
//!
//! ## Coordinate Frame
//!
//! World coordinates follow the simulator:
//! - **X-forward**, **Y-right**, **Z-up** (left-handed)
//! - Rotations are pitch/yaw/roll in degrees, positive yaw turns right
//!
//! Camera space is X-right, Y-down, Z-forward, see [`camera::projection`].
//!
//! ## Architecture
//!
//! - [`core`]: Location, Rotation, Transform, BoundingBox
//! - [`camera`]: Intrinsics, projection, frustum and occlusion tests
//! - [`route`]: Full-coverage route planning over the lane graph
//! - [`drive`]: Autopilot adapter that records a drive
//! - [`session`]: Recording session context and cleanup
//! - [`annotate`]: Replay annotation engine and frame stream
//! - [`sim`]: Simulator interface and the in-process mock
//! - [`config`]: YAML configuration

pub mod annotate;
pub mod camera;
pub mod config;
pub mod core;
pub mod drive;
pub mod error;
pub mod route;
pub mod session;
pub mod sim;

pub use annotate::{Annotation2D, AnnotationEngine, Category, Frame, FrameSink, StreamEnd};
pub use camera::{CameraCalibration, PixelBox, PixelRect};
pub use config::PipelineConfig;
pub use error::{DrishtiError, Result, WorkUnit};
pub use route::{CoveragePlanner, Route};
pub use session::{RecordingSession, RecordingSummary};
pub use sim::{SimError, Simulator};
