//! Subcommand implementations.

use crate::client::BridgeClient;
use crate::config::{ConnectionConfig, ToolConfig};
use crate::error::Result;
use crate::export::{FanOut, PreviewWriter, YoloDatasetExporter};
use clap::ValueEnum;
use drishti_core::annotate::{AnnotationEngine, ReplaySummary};
use drishti_core::route::{CoveragePlanner, PlannerConfig, Route};
use drishti_core::session::{RecordingSession, RecordingSummary};
use drishti_core::sim::Simulator;
use drishti_core::sim::mock::MockSimulator;
use drishti_core::{DrishtiError, WorkUnit};
use std::path::Path;
use tracing::{info, warn};

/// Simulator backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// TCP bridge to a running simulator
    #[default]
    Bridge,
    /// Deterministic in-process grid towns
    Mock,
}

/// Open a simulator connection for the chosen backend
pub fn connect(backend: Backend, connection: &ConnectionConfig) -> Result<Box<dyn Simulator>> {
    match backend {
        Backend::Bridge => {
            info!("Connecting to {}", connection.address());
            Ok(Box::new(BridgeClient::connect(connection)?))
        }
        Backend::Mock => {
            info!("Using mock simulator");
            Ok(Box::new(MockSimulator::default()))
        }
    }
}

/// Plan a coverage route, drive it and keep the recording
pub fn record(sim: &mut dyn Simulator, config: &ToolConfig) -> Result<RecordingSummary> {
    let session =
        RecordingSession::setup(sim, &config.recording, &config.planner, &config.drive)?;
    info!("Recording to {:?}", session.log_path());

    let summary = session.run()?;
    let report = &summary.report;
    info!(
        "Recorded {} ticks to {:?} ({} legs, {} respawns, {:.0} m required, {:.0} m deadhead)",
        summary.frames,
        summary.path,
        report.components,
        report.respawns,
        report.required_length_m,
        report.deadhead_length_m
    );
    if !summary.completed {
        warn!("Tick budget ran out before the route was finished");
    }
    Ok(summary)
}

/// Replay a recording and export annotated frames
pub fn annotate(
    sim: &mut dyn Simulator,
    config: &ToolConfig,
    log: &Path,
    resume_after: Option<u64>,
) -> Result<ReplaySummary> {
    let mut sinks = FanOut::default();
    sinks.push(Box::new(YoloDatasetExporter::new(&config.export)?));
    if config.export.preview {
        let dir = config.export.output_dir.join("preview");
        info!("Writing previews to {:?}", dir);
        sinks.push(Box::new(PreviewWriter::new(&dir)?));
    }

    let mut engine = AnnotationEngine::new(sim, config.camera.clone(), config.annotation.clone());
    let info = engine.open(log, resume_after)?;
    info!(
        "Replaying {:?} ({}, {} ticks) under {}",
        info.path, info.town, info.frames, config.annotation.weather
    );

    match engine.run(&mut sinks) {
        Ok(summary) => {
            info!(
                "Annotated {} frames with {} boxes",
                summary.frames, summary.annotations
            );
            Ok(summary)
        }
        Err(e) => {
            if let Some(index) = e.resume_after() {
                warn!(
                    "Replay stopped ({}); re-run with --resume-after {} to continue",
                    e.code(),
                    index
                );
            }
            Err(e.into())
        }
    }
}

/// Plan a town's coverage route without driving it
pub fn plan(sim: &mut dyn Simulator, town: &str, planner: &PlannerConfig) -> Result<Route> {
    let lost = |e| DrishtiError::from_sim(e, WorkUnit::Waypoint, None);
    sim.load_world(town).map_err(lost)?;
    let network = sim.road_network(planner.sampling_resolution).map_err(lost)?;
    let spawn = sim.spawn_points().map_err(lost)?;
    let start = spawn
        .first()
        .and_then(|pose| network.closest_waypoint(&pose.location));

    let route = CoveragePlanner::new(planner.clone()).plan(&network, start)?;
    let report = &route.report;
    info!(
        "{}: {} segments, {} components, {} waypoints",
        town,
        network.segments.len(),
        report.components,
        report.waypoints
    );
    info!(
        "{}: {:.0} m required, {:.0} m deadhead over {} edges, {} lane changes, {} respawns",
        town,
        report.required_length_m,
        report.deadhead_length_m,
        report.deadhead_edges,
        report.lane_changes,
        report.respawns
    );
    Ok(route)
}

/// Write a planned route as YAML
pub fn write_route(route: &Route, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_yaml::to_string(route)?)?;
    info!("Route written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drishti_core::camera::CameraConfig;
    use drishti_core::drive::DriveConfig;
    use drishti_core::sim::mock::{MockFaults, MockSimulator};
    use std::fs;
    use tempfile::TempDir;

    fn small_config(dir: &TempDir) -> ToolConfig {
        let mut config = ToolConfig::default();
        config.recording.town = "Town02".into();
        config.recording.output_dir = dir.path().join("recordings");
        config.drive = DriveConfig {
            max_ticks: 600,
            ..Default::default()
        };
        config.camera = CameraConfig {
            width: 160,
            height: 120,
            ..Default::default()
        };
        config.export.output_dir = dir.path().join("dataset");
        config.export.preview = true;
        config
    }

    #[test]
    fn test_plan_mock_town() {
        let mut sim = MockSimulator::default();
        let route = plan(&mut sim, "Town01", &PlannerConfig::default()).unwrap();
        assert!(route.waypoint_count() > 0);
        assert_eq!(route.report.respawns + 1, route.legs.len());
    }

    #[test]
    fn test_plan_unknown_town() {
        let mut sim = MockSimulator::default();
        let result = plan(&mut sim, "Atlantis", &PlannerConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_write_route_yaml() {
        let dir = TempDir::new().unwrap();
        let mut sim = MockSimulator::default();
        let route = plan(&mut sim, "Town02", &PlannerConfig::default()).unwrap();
        let path = dir.path().join("out").join("route.yaml");
        write_route(&route, &path).unwrap();
        let parsed: Route = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.report, route.report);
    }

    #[test]
    fn test_record_then_annotate_exports_dataset() {
        let dir = TempDir::new().unwrap();
        let config = small_config(&dir);

        let mut sim = MockSimulator::default();
        let recording = record(&mut sim, &config).unwrap();
        assert_eq!(recording.frames, 600);

        let mut sim = MockSimulator::default();
        let summary = annotate(&mut sim, &config, &recording.path, None).unwrap();
        // 600 ticks at 20 ticks per frame
        assert_eq!(summary.frames, 30);

        let root = &config.export.output_dir;
        let count = |sub: &str| fs::read_dir(root.join(sub)).unwrap().count();
        assert_eq!(count("labels/train"), 24);
        assert_eq!(count("labels/val"), 6);
        assert_eq!(count("images/val"), 6);
        assert_eq!(count("preview"), 30);
        assert!(root.join("traffic_lights.yaml").exists());
    }

    #[test]
    fn test_failed_annotate_resumes_into_same_dataset() {
        let dir = TempDir::new().unwrap();
        let config = small_config(&dir);
        let recording = record(&mut MockSimulator::default(), &config).unwrap();

        let mut faulty = MockSimulator::with_faults(MockFaults {
            disconnect_on_tick: Some(10 * 20 + 1),
            ..Default::default()
        });
        let err = annotate(&mut faulty, &config, &recording.path, None).unwrap_err();
        assert_eq!(err.resume_after(), Some(9));

        let root = &config.export.output_dir;
        assert_eq!(fs::read_dir(root.join("labels/train")).unwrap().count(), 10);
        assert_eq!(fs::read_dir(root.join("labels/val")).unwrap().count(), 0);

        let summary = annotate(
            &mut MockSimulator::default(),
            &config,
            &recording.path,
            err.resume_after(),
        )
        .unwrap();
        assert_eq!(summary.frames, 20);
        assert_eq!(fs::read_dir(root.join("labels/train")).unwrap().count(), 24);
        assert_eq!(fs::read_dir(root.join("labels/val")).unwrap().count(), 6);
    }
}
