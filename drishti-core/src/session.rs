//! Recording session context.
//!
//! A [`RecordingSession`] owns the simulator connection for one recording:
//! it loads the town, switches to synchronous stepping, plans the coverage
//! route and spawns the ego vehicle. Dropping the session undoes all of it,
//! whether the drive finished, failed or never started.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core::ActorId;
use crate::drive::{DriveConfig, DriveController, DriveSummary, lifted};
use crate::error::{DrishtiError, Result, WorkUnit};
use crate::route::{CoveragePlanner, CoverageReport, PlannerConfig, Route};
use crate::sim::{SimError, Simulator, WorldSettings};

/// Role name given to the recorded vehicle.
pub const EGO_ROLE: &str = "ego";

/// Recording settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Town to load (default: Town01)
    #[serde(default = "default_town")]
    pub town: String,

    /// Directory receiving recording logs (default: recordings)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Blueprint of the ego vehicle (default: vehicle.tesla.model3)
    #[serde(default = "default_blueprint")]
    pub vehicle_blueprint: String,

    /// Seconds per synchronous tick (default: 0.05)
    #[serde(default = "default_fixed_delta")]
    pub fixed_delta_seconds: f64,
}

fn default_town() -> String {
    "Town01".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("recordings")
}
fn default_blueprint() -> String {
    "vehicle.tesla.model3".to_string()
}
fn default_fixed_delta() -> f64 {
    0.05
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            town: default_town(),
            output_dir: default_output_dir(),
            vehicle_blueprint: default_blueprint(),
            fixed_delta_seconds: default_fixed_delta(),
        }
    }
}

/// Outcome of a recording session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    /// Simulation ticks written to the log.
    pub frames: u64,
    pub path: PathBuf,
    pub report: CoverageReport,
    /// The whole route was driven within the tick budget.
    pub completed: bool,
}

/// Log file name for a town recorded at `unix_seconds`.
pub fn recording_file_name(town: &str, unix_seconds: u64) -> String {
    format!("{}_{}.log", town, unix_seconds)
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn setup_error(err: SimError) -> DrishtiError {
    DrishtiError::from_sim(err, WorkUnit::Waypoint, None)
}

/// One recording over one simulator connection.
pub struct RecordingSession<'a> {
    sim: &'a mut dyn Simulator,
    drive: DriveConfig,
    restore: Option<WorldSettings>,
    ego: Option<ActorId>,
    route: Route,
    log_path: PathBuf,
    /// Set once the log has been closed by a successful drive.
    finished: bool,
}

impl<'a> RecordingSession<'a> {
    /// Prepare the world and the ego vehicle.
    ///
    /// A failure part way through releases whatever was already set up.
    pub fn setup(
        sim: &'a mut dyn Simulator,
        recording: &RecordingConfig,
        planner: &PlannerConfig,
        drive: &DriveConfig,
    ) -> Result<Self> {
        let log_path = recording
            .output_dir
            .join(recording_file_name(&recording.town, unix_seconds()));
        let mut session = Self {
            sim,
            drive: drive.clone(),
            restore: None,
            ego: None,
            route: Route::default(),
            log_path,
            finished: false,
        };

        session.sim.load_world(&recording.town).map_err(setup_error)?;
        let previous = session.sim.settings().map_err(setup_error)?;
        session.restore = Some(previous);
        session
            .sim
            .apply_settings(&WorldSettings {
                synchronous_mode: true,
                fixed_delta_seconds: Some(recording.fixed_delta_seconds),
                no_rendering_mode: true,
            })
            .map_err(setup_error)?;

        let network = session
            .sim
            .road_network(planner.sampling_resolution)
            .map_err(setup_error)?;
        let spawn = session.sim.spawn_points().map_err(setup_error)?;
        let start = spawn
            .first()
            .and_then(|pose| network.closest_waypoint(&pose.location));
        session.route = CoveragePlanner::new(planner.clone()).plan(&network, start)?;

        let first = session
            .route
            .waypoints()
            .next()
            .map(|wp| wp.waypoint.transform)
            .ok_or_else(|| DrishtiError::RoutePlanning("route has no waypoints".to_string()))?;
        let vehicle = session
            .sim
            .spawn_vehicle(
                &recording.vehicle_blueprint,
                EGO_ROLE,
                &lifted(&first, drive.spawn_z_offset),
            )
            .map_err(setup_error)?;
        session.ego = Some(vehicle.id);

        std::fs::create_dir_all(&recording.output_dir)?;
        tracing::info!(
            town = %recording.town,
            ego = vehicle.id,
            waypoints = session.route.waypoint_count(),
            "Recording session ready"
        );
        Ok(session)
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn ego(&self) -> Option<ActorId> {
        self.ego
    }

    /// Drive the route while recording.
    pub fn run(mut self) -> Result<RecordingSummary> {
        let Some(ego) = self.ego else {
            return Err(DrishtiError::Config("session has no ego vehicle".to_string()));
        };
        let summary: DriveSummary = DriveController::new(&mut *self.sim, self.drive.clone())
            .drive(ego, &self.route, &self.log_path)?;
        self.finished = true;

        Ok(RecordingSummary {
            frames: summary.ticks,
            path: self.log_path.clone(),
            report: self.route.report.clone(),
            completed: summary.completed,
        })
    }
}

impl Drop for RecordingSession<'_> {
    fn drop(&mut self) {
        if let Some(ego) = self.ego.take()
            && let Err(e) = self.sim.destroy_actor(ego)
        {
            tracing::warn!("Failed to destroy ego vehicle {}: {}", ego, e);
        }
        if let Some(settings) = self.restore.take()
            && let Err(e) = self.sim.apply_settings(&settings)
        {
            tracing::warn!("Failed to restore world settings: {}", e);
        }
        if !self.finished && self.log_path.exists() {
            match std::fs::remove_file(&self.log_path) {
                Ok(()) => tracing::info!(path = %self.log_path.display(), "Removed incomplete recording"),
                Err(e) => tracing::warn!("Failed to remove incomplete recording: {}", e),
            }
        }
        self.route = Route::default();
        tracing::debug!("Recording session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::mock::{MockFaults, MockSimulator};
    use tempfile::TempDir;

    fn config(dir: &TempDir, town: &str) -> RecordingConfig {
        RecordingConfig {
            town: town.to_string(),
            output_dir: dir.path().join("logs"),
            ..Default::default()
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(recording_file_name("Town01", 1700000000), "Town01_1700000000.log");
    }

    #[test]
    fn test_default_recording_config() {
        let config = RecordingConfig::default();
        assert_eq!(config.vehicle_blueprint, "vehicle.tesla.model3");
        assert_eq!(config.fixed_delta_seconds, 0.05);
    }

    #[test]
    fn test_session_records_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let mut sim = MockSimulator::default();
        let summary = {
            let session = RecordingSession::setup(
                &mut sim,
                &config(&dir, "Town02"),
                &PlannerConfig::default(),
                &DriveConfig::default(),
            )
            .unwrap();
            assert!(session.ego().is_some());
            session.run().unwrap()
        };
        assert!(summary.completed);
        assert!(summary.frames > 0);
        assert!(summary.path.exists());
        assert_eq!(summary.report.components, 1);
        assert_eq!(sim.spawned_actor_count(), 0);
        assert!(!sim.settings().unwrap().synchronous_mode);
    }

    #[test]
    fn test_failed_drive_removes_log() {
        let dir = TempDir::new().unwrap();
        let mut sim = MockSimulator::with_faults(MockFaults {
            timeout_on_tick: Some(10),
            ..Default::default()
        });
        let (path, err) = {
            let session = RecordingSession::setup(
                &mut sim,
                &config(&dir, "Town01"),
                &PlannerConfig::default(),
                &DriveConfig::default(),
            )
            .unwrap();
            let path = session.log_path().to_path_buf();
            (path, session.run().unwrap_err())
        };
        assert!(matches!(err, DrishtiError::SimulatorConnection { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_unknown_town_fails_setup() {
        let dir = TempDir::new().unwrap();
        let mut sim = MockSimulator::default();
        let result = RecordingSession::setup(
            &mut sim,
            &config(&dir, "Atlantis"),
            &PlannerConfig::default(),
            &DriveConfig::default(),
        );
        assert!(matches!(result, Err(DrishtiError::SimulatorConnection { .. })));
    }
}
