//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;

use drishti_core::annotate::{AnnotationConfig, AnnotationEngine, CollectingSink, ReplaySummary};
use drishti_core::camera::CameraConfig;
use drishti_core::drive::DriveConfig;
use drishti_core::route::PlannerConfig;
use drishti_core::session::{RecordingConfig, RecordingSession, RecordingSummary};
use drishti_core::sim::WeatherPreset;
use drishti_core::sim::mock::MockSimulator;
use drishti_core::Result;

/// Ticks recorded by [`record`]: 100 frames at the default 20 ticks per frame.
pub const RECORDED_TICKS: u64 = 2_000;

/// Small camera to keep captured images cheap.
pub fn small_camera() -> CameraConfig {
    CameraConfig {
        width: 320,
        height: 240,
        ..Default::default()
    }
}

/// Record the first [`RECORDED_TICKS`] ticks of a town's coverage route.
pub fn record(town: &str, dir: &Path) -> RecordingSummary {
    let mut sim = MockSimulator::default();
    let recording = RecordingConfig {
        town: town.to_string(),
        output_dir: dir.to_path_buf(),
        ..Default::default()
    };
    let drive = DriveConfig {
        max_ticks: RECORDED_TICKS,
        ..Default::default()
    };
    RecordingSession::setup(&mut sim, &recording, &PlannerConfig::default(), &drive)
        .expect("session setup")
        .run()
        .expect("recording")
}

/// Annotate `log` on a fresh simulator.
pub fn annotate(
    sim: &mut MockSimulator,
    log: &Path,
    weather: WeatherPreset,
    resume_after: Option<u64>,
) -> (Result<ReplaySummary>, CollectingSink) {
    let config = AnnotationConfig {
        weather,
        ..Default::default()
    };
    let mut engine = AnnotationEngine::new(sim, small_camera(), config);
    let mut sink = CollectingSink::default();
    let opened = engine.open(log, resume_after).map(|_| ());
    let result = match opened {
        Ok(()) => engine.run(&mut sink),
        Err(e) => Err(e),
    };
    (result, sink)
}
