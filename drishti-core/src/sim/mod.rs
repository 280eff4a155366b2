//! Simulator interface.
//!
//! Everything the pipeline needs from the driving simulator goes through the
//! [`Simulator`] trait: map queries, actor control, the native recorder and
//! replay, weather and the roof camera. One value owns one connection; every
//! call blocks until the simulator answers or the connection times out.
//!
//! Two implementations exist:
//! - [`mock::MockSimulator`]: deterministic in-process grid town, used by
//!   tests, benches and the `mock` backend of the command line tool.
//! - The TCP bridge client in `drishti-annotate`.

pub mod mock;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{ActorId, BoundingBox, Transform};
use crate::route::{RoadNetwork, RouteWaypoint};

/// Failure reported by a simulator backend.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("disconnected: {0}")]
    Disconnected(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt recording: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SimResult<T> = std::result::Result<T, SimError>;

/// Towns the pipeline knows how to record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Town {
    Town01,
    Town02,
    Town10HD,
}

impl Town {
    pub const ALL: [Town; 3] = [Town::Town01, Town::Town02, Town::Town10HD];

    pub fn as_str(self) -> &'static str {
        match self {
            Town::Town01 => "Town01",
            Town::Town02 => "Town02",
            Town::Town10HD => "Town10HD",
        }
    }
}

impl fmt::Display for Town {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Town {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Town::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown town '{}'", s))
    }
}

/// Weather presets applied at replay time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeatherPreset {
    #[default]
    ClearNoon,
    CloudyNoon,
    WetNoon,
    SoftRainNoon,
    HardRainNoon,
    ClearSunset,
}

impl WeatherPreset {
    pub const ALL: [WeatherPreset; 6] = [
        WeatherPreset::ClearNoon,
        WeatherPreset::CloudyNoon,
        WeatherPreset::WetNoon,
        WeatherPreset::SoftRainNoon,
        WeatherPreset::HardRainNoon,
        WeatherPreset::ClearSunset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WeatherPreset::ClearNoon => "ClearNoon",
            WeatherPreset::CloudyNoon => "CloudyNoon",
            WeatherPreset::WetNoon => "WetNoon",
            WeatherPreset::SoftRainNoon => "SoftRainNoon",
            WeatherPreset::HardRainNoon => "HardRainNoon",
            WeatherPreset::ClearSunset => "ClearSunset",
        }
    }
}

impl fmt::Display for WeatherPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeatherPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WeatherPreset::ALL
            .into_iter()
            .find(|w| w.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown weather preset '{}'", s))
    }
}

/// World stepping settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldSettings {
    pub synchronous_mode: bool,
    /// Seconds per tick in synchronous mode.
    pub fixed_delta_seconds: Option<f64>,
    pub no_rendering_mode: bool,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            synchronous_mode: false,
            fixed_delta_seconds: None,
            no_rendering_mode: false,
        }
    }
}

/// Throttle, steer and brake for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleControl {
    pub throttle: f64,
    pub steer: f64,
    pub brake: f64,
}

/// Output of one autopilot step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AutopilotStep {
    pub control: VehicleControl,
    /// Index of the last plan waypoint reached, if any.
    pub waypoint_index: Option<usize>,
    /// The final plan waypoint has been reached.
    pub done: bool,
}

/// A spawned vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub id: ActorId,
    pub bounding_box: BoundingBox,
}

/// RGB camera blueprint settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub width: u32,
    pub height: u32,
    pub fov_degrees: f64,
    pub sensor_tick: f64,
    /// Pose relative to the parent actor.
    pub mount: Transform,
}

/// One rendered camera image, packed RGB8 rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraImage {
    /// Simulator frame the image was rendered at.
    pub frame: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl CameraImage {
    /// Expected byte length for the image size.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Traffic light signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalState {
    Red,
    Yellow,
    Green,
    Off,
    #[default]
    Unknown,
}

/// Traffic light actor at the current tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrafficLight {
    pub id: ActorId,
    pub transform: Transform,
    /// Relative to `transform`.
    pub bounding_box: BoundingBox,
    /// Signal heads in world coordinates.
    pub light_boxes: Vec<BoundingBox>,
    pub state: SignalState,
}

/// Semantic category of a world actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorCategory {
    Vehicle,
    Walker,
    TrafficLight,
    TrafficSign,
    Building,
    Vegetation,
    Sensor,
    Other,
}

/// Any world actor at the current tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub category: ActorCategory,
    /// `role_name` attribute, if set.
    pub role: Option<String>,
    pub transform: Transform,
    /// Relative to `transform`.
    pub bounding_box: BoundingBox,
}

/// Replay started from a recording log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayInfo {
    pub path: PathBuf,
    pub town: String,
    /// Total ticks in the log.
    pub frames: u64,
    /// Seconds per tick at record time.
    pub fixed_delta_seconds: f64,
    /// First tick the next `tick()` plays.
    pub start_frame: u64,
}

/// Blocking simulator connection.
pub trait Simulator {
    /// Load a town, destroying every actor of the previous world.
    fn load_world(&mut self, town: &str) -> SimResult<()>;

    /// Name of the loaded town.
    fn current_town(&mut self) -> SimResult<String>;

    fn settings(&mut self) -> SimResult<WorldSettings>;

    fn apply_settings(&mut self, settings: &WorldSettings) -> SimResult<()>;

    /// Lane segments sampled every `sampling_resolution` meters.
    fn road_network(&mut self, sampling_resolution: f64) -> SimResult<RoadNetwork>;

    /// Recommended vehicle spawn poses.
    fn spawn_points(&mut self) -> SimResult<Vec<Transform>>;

    fn spawn_vehicle(
        &mut self,
        blueprint: &str,
        role: &str,
        transform: &Transform,
    ) -> SimResult<VehicleInfo>;

    fn set_transform(&mut self, actor: ActorId, transform: &Transform) -> SimResult<()>;

    fn actor_transform(&mut self, actor: ActorId) -> SimResult<Transform>;

    fn destroy_actor(&mut self, actor: ActorId) -> SimResult<()>;

    /// Every actor in the world.
    fn actors(&mut self) -> SimResult<Vec<ActorSnapshot>>;

    /// Hand a waypoint plan to the simulator's path-following agent.
    fn set_autopilot_plan(&mut self, actor: ActorId, plan: &[RouteWaypoint]) -> SimResult<()>;

    /// Ask the agent for the next control command.
    fn autopilot_step(&mut self, actor: ActorId) -> SimResult<AutopilotStep>;

    fn apply_control(&mut self, actor: ActorId, control: &VehicleControl) -> SimResult<()>;

    /// Advance one tick. Returns the new simulator frame number.
    fn tick(&mut self) -> SimResult<u64>;

    fn start_recorder(&mut self, path: &Path) -> SimResult<()>;

    fn stop_recorder(&mut self) -> SimResult<()>;

    /// Start replaying `path` so the next tick plays `start_frame`.
    fn open_replay(&mut self, path: &Path, start_frame: u64) -> SimResult<ReplayInfo>;

    fn stop_replay(&mut self) -> SimResult<()>;

    fn set_weather(&mut self, weather: WeatherPreset) -> SimResult<()>;

    /// Attach an RGB camera to `parent`.
    fn attach_camera(&mut self, parent: ActorId, spec: &CameraSpec) -> SimResult<ActorId>;

    /// Image rendered at the current tick.
    fn camera_image(&mut self, camera: ActorId) -> SimResult<CameraImage>;

    fn traffic_lights(&mut self) -> SimResult<Vec<TrafficLight>>;
}
