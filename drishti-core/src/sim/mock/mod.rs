//! Deterministic in-process simulator.
//!
//! [`MockSimulator`] implements [`Simulator`] on top of a procedural grid
//! town ([`town`]) and its own recording log ([`recording`]). It is used by
//! the test suite, the benches and the `mock` backend of the command line.
//!
//! # Behavior
//!
//! | Concern | Simulation |
//! |---------|------------|
//! | Map | Grid of two-way roads, see [`town::GridSpec::for_town`] |
//! | Autopilot | Kinematic path following at a fixed speed |
//! | Signals | Fixed-cycle plan driven by simulation time |
//! | Recorder | Vehicles and signal states per tick |
//! | Replay | Restores recorded vehicles and signals tick by tick |
//! | Camera | Flat sky/ground image shaded by the weather preset |
//!
//! Geometry never depends on the weather, so replaying a log twice under
//! any presets yields identical actor poses.
//!
//! # Fault injection
//!
//! [`MockFaults`] makes the connection drop or time out after a number of
//! ticks, which is how the session error paths are tested.

pub mod recording;
pub mod town;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::math::normalize_degrees;
use crate::core::{ActorId, BoundingBox, Location, Rotation, Transform};
use crate::route::{RoadNetwork, RouteWaypoint};
use crate::sim::{
    ActorCategory, ActorSnapshot, AutopilotStep, CameraImage, CameraSpec, ReplayInfo,
    SignalState, SimError, SimResult, Simulator, TrafficLight, VehicleControl, VehicleInfo,
    WeatherPreset, WorldSettings,
};

use recording::{FrameRecord, RecordingReader, RecordingWriter};
use town::{GridSpec, MockTown};

/// Seconds per tick when the world runs asynchronously.
const ASYNC_DELTA_SECONDS: f64 = 0.05;

/// First id handed to spawned actors.
const SPAWNED_ACTOR_BASE: ActorId = 10_000;

/// Connection faults to inject.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MockFaults {
    /// The connection drops on this tick (1-based count of `tick` calls).
    pub disconnect_on_tick: Option<u64>,
    /// This tick times out; the connection is unusable afterwards.
    pub timeout_on_tick: Option<u64>,
}

/// Mock simulator settings.
#[derive(Clone, Debug, PartialEq)]
pub struct MockConfig {
    /// Autopilot cruise speed (m/s)
    pub cruise_speed: f64,
    pub faults: MockFaults,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            cruise_speed: 10.0,
            faults: MockFaults::default(),
        }
    }
}

#[derive(Clone, Debug)]
struct MockVehicle {
    role: String,
    transform: Transform,
    bounding_box: BoundingBox,
    plan: Vec<Transform>,
    /// Index of the last plan point reached.
    cursor: usize,
    control: VehicleControl,
}

impl MockVehicle {
    fn snapshot(&self, id: ActorId) -> ActorSnapshot {
        ActorSnapshot {
            id,
            category: ActorCategory::Vehicle,
            role: Some(self.role.clone()),
            transform: self.transform,
            bounding_box: self.bounding_box,
        }
    }

    /// Move `distance` meters along the plan.
    fn advance(&mut self, mut distance: f64) {
        while distance > 0.0 && self.cursor + 1 < self.plan.len() {
            let target = self.plan[self.cursor + 1].location;
            let here = self.transform.location;
            let gap = here.distance(&target);
            let yaw = (target.y - here.y).atan2(target.x - here.x).to_degrees();
            if gap <= distance {
                self.transform = Transform::new(target, Rotation::from_yaw(yaw));
                self.cursor += 1;
                distance -= gap;
            } else {
                let t = distance / gap;
                let location = Location::new(
                    here.x + (target.x - here.x) * t,
                    here.y + (target.y - here.y) * t,
                    here.z + (target.z - here.z) * t,
                );
                self.transform = Transform::new(location, Rotation::from_yaw(yaw));
                distance = 0.0;
            }
        }
    }
}

#[derive(Clone, Debug)]
struct MockCamera {
    parent: ActorId,
    spec: CameraSpec,
}

struct Replay {
    reader: RecordingReader,
    path: PathBuf,
}

/// In-process [`Simulator`].
pub struct MockSimulator {
    config: MockConfig,
    town: Option<MockTown>,
    settings: WorldSettings,
    weather: WeatherPreset,
    /// Simulator frame counter.
    frame: u64,
    elapsed: f64,
    tick_calls: u64,
    broken: Option<SimError>,
    vehicles: BTreeMap<ActorId, MockVehicle>,
    cameras: BTreeMap<ActorId, MockCamera>,
    signals: BTreeMap<ActorId, SignalState>,
    next_actor: ActorId,
    recorder: Option<RecordingWriter>,
    replay: Option<Replay>,
}

impl Default for MockSimulator {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

impl MockSimulator {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            town: None,
            settings: WorldSettings::default(),
            weather: WeatherPreset::default(),
            frame: 0,
            elapsed: 0.0,
            tick_calls: 0,
            broken: None,
            vehicles: BTreeMap::new(),
            cameras: BTreeMap::new(),
            signals: BTreeMap::new(),
            next_actor: SPAWNED_ACTOR_BASE,
            recorder: None,
            replay: None,
        }
    }

    /// Mock with the given faults and default settings.
    pub fn with_faults(faults: MockFaults) -> Self {
        Self::new(MockConfig {
            faults,
            ..MockConfig::default()
        })
    }

    pub fn weather(&self) -> WeatherPreset {
        self.weather
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    pub fn is_replaying(&self) -> bool {
        self.replay.is_some()
    }

    /// Number of live spawned actors (vehicles and sensors).
    pub fn spawned_actor_count(&self) -> usize {
        self.vehicles.len() + self.cameras.len()
    }

    fn link(&self) -> SimResult<()> {
        match &self.broken {
            Some(SimError::Timeout(what)) => Err(SimError::Timeout(what.clone())),
            Some(_) => Err(SimError::Disconnected("connection closed by peer".to_string())),
            None => Ok(()),
        }
    }

    fn town(&self) -> SimResult<&MockTown> {
        self.town
            .as_ref()
            .ok_or_else(|| SimError::NotFound("no world loaded".to_string()))
    }

    fn delta(&self) -> f64 {
        self.settings
            .fixed_delta_seconds
            .unwrap_or(ASYNC_DELTA_SECONDS)
    }

    fn refresh_signals(&mut self) {
        let Some(town) = &self.town else {
            return;
        };
        self.signals = town
            .lights
            .iter()
            .map(|light| (light.id, light.state_at(self.elapsed)))
            .collect();
    }

    fn record_frame(&mut self) -> SimResult<()> {
        let Some(writer) = self.recorder.as_mut() else {
            return Ok(());
        };
        let frame = FrameRecord {
            index: writer.frame_count(),
            elapsed: self.elapsed,
            vehicles: self
                .vehicles
                .iter()
                .map(|(id, v)| v.snapshot(*id))
                .collect(),
            lights: self.signals.iter().map(|(id, s)| (*id, *s)).collect(),
        };
        writer.write_frame(&frame)
    }

    fn replay_frame(&mut self) -> SimResult<()> {
        let Some(replay) = self.replay.as_mut() else {
            return Ok(());
        };
        let frame = replay.reader.next_frame()?.ok_or_else(|| {
            SimError::Protocol(format!("replay of {} has ended", replay.path.display()))
        })?;
        self.apply_recorded(&frame);
        Ok(())
    }

    fn apply_recorded(&mut self, frame: &FrameRecord) {
        self.elapsed = frame.elapsed;
        for snapshot in &frame.vehicles {
            let vehicle = self.vehicles.entry(snapshot.id).or_insert_with(|| MockVehicle {
                role: snapshot.role.clone().unwrap_or_default(),
                transform: snapshot.transform,
                bounding_box: snapshot.bounding_box,
                plan: Vec::new(),
                cursor: 0,
                control: VehicleControl::default(),
            });
            vehicle.transform = snapshot.transform;
            self.next_actor = self.next_actor.max(snapshot.id + 1);
        }
        self.signals = frame.lights.iter().copied().collect();
    }

    fn camera_pose(&self, camera: &MockCamera) -> SimResult<Transform> {
        let parent = self
            .vehicles
            .get(&camera.parent)
            .ok_or_else(|| SimError::NotFound(format!("actor {}", camera.parent)))?;
        Ok(parent.transform.compose(&camera.spec.mount))
    }
}

/// Sky and ground colors for a preset.
fn palette(weather: WeatherPreset) -> ([u8; 3], [u8; 3]) {
    match weather {
        WeatherPreset::ClearNoon => ([135, 190, 235], [90, 90, 90]),
        WeatherPreset::CloudyNoon => ([170, 175, 180], [85, 85, 85]),
        WeatherPreset::WetNoon => ([150, 170, 190], [55, 58, 62]),
        WeatherPreset::SoftRainNoon => ([120, 130, 140], [50, 52, 56]),
        WeatherPreset::HardRainNoon => ([80, 85, 95], [40, 42, 45]),
        WeatherPreset::ClearSunset => ([240, 150, 90], [70, 60, 55]),
    }
}

impl Simulator for MockSimulator {
    fn load_world(&mut self, town: &str) -> SimResult<()> {
        self.link()?;
        let spec = GridSpec::for_town(town)
            .ok_or_else(|| SimError::NotFound(format!("town {}", town)))?;
        self.town = Some(MockTown::generate(&spec, 2.0));
        self.vehicles.clear();
        self.cameras.clear();
        self.frame = 0;
        self.elapsed = 0.0;
        self.refresh_signals();
        tracing::debug!(town, "Mock world loaded");
        Ok(())
    }

    fn current_town(&mut self) -> SimResult<String> {
        self.link()?;
        Ok(self.town()?.spec.name.clone())
    }

    fn settings(&mut self) -> SimResult<WorldSettings> {
        self.link()?;
        Ok(self.settings)
    }

    fn apply_settings(&mut self, settings: &WorldSettings) -> SimResult<()> {
        self.link()?;
        self.settings = *settings;
        Ok(())
    }

    fn road_network(&mut self, sampling_resolution: f64) -> SimResult<RoadNetwork> {
        self.link()?;
        let spec = self.town()?.spec.clone();
        Ok(MockTown::generate(&spec, sampling_resolution).network)
    }

    fn spawn_points(&mut self) -> SimResult<Vec<Transform>> {
        self.link()?;
        Ok(self
            .town()?
            .network
            .segments
            .iter()
            .filter(|s| !s.is_junction())
            .map(|s| s.entry().transform)
            .collect())
    }

    fn spawn_vehicle(
        &mut self,
        blueprint: &str,
        role: &str,
        transform: &Transform,
    ) -> SimResult<VehicleInfo> {
        self.link()?;
        self.town()?;
        if !blueprint.starts_with("vehicle.") {
            return Err(SimError::NotFound(format!("blueprint {}", blueprint)));
        }
        let id = self.next_actor;
        self.next_actor += 1;
        let bounding_box = BoundingBox::axis_aligned(
            Location::new(0.0, 0.0, 0.75),
            Location::new(2.4, 1.0, 0.75),
        );
        self.vehicles.insert(
            id,
            MockVehicle {
                role: role.to_string(),
                transform: *transform,
                bounding_box,
                plan: Vec::new(),
                cursor: 0,
                control: VehicleControl::default(),
            },
        );
        Ok(VehicleInfo { id, bounding_box })
    }

    fn set_transform(&mut self, actor: ActorId, transform: &Transform) -> SimResult<()> {
        self.link()?;
        let vehicle = self
            .vehicles
            .get_mut(&actor)
            .ok_or_else(|| SimError::NotFound(format!("actor {}", actor)))?;
        vehicle.transform = *transform;
        Ok(())
    }

    fn actor_transform(&mut self, actor: ActorId) -> SimResult<Transform> {
        self.link()?;
        if let Some(vehicle) = self.vehicles.get(&actor) {
            return Ok(vehicle.transform);
        }
        if let Some(camera) = self.cameras.get(&actor) {
            return self.camera_pose(camera);
        }
        Err(SimError::NotFound(format!("actor {}", actor)))
    }

    fn destroy_actor(&mut self, actor: ActorId) -> SimResult<()> {
        self.link()?;
        if self.vehicles.remove(&actor).is_some() {
            self.cameras.retain(|_, cam| cam.parent != actor);
            return Ok(());
        }
        if self.cameras.remove(&actor).is_some() {
            return Ok(());
        }
        Err(SimError::NotFound(format!("actor {}", actor)))
    }

    fn actors(&mut self) -> SimResult<Vec<ActorSnapshot>> {
        self.link()?;
        let town = self.town()?;
        let mut actors: Vec<ActorSnapshot> = self
            .vehicles
            .iter()
            .map(|(id, v)| v.snapshot(*id))
            .collect();
        for (id, camera) in &self.cameras {
            actors.push(ActorSnapshot {
                id: *id,
                category: ActorCategory::Sensor,
                role: None,
                transform: self.camera_pose(camera)?,
                bounding_box: BoundingBox::default(),
            });
        }
        actors.extend(town.lights.iter().map(|light| ActorSnapshot {
            id: light.id,
            category: ActorCategory::TrafficLight,
            role: None,
            transform: light.transform,
            bounding_box: light.bounding_box,
        }));
        actors.extend(town.props.iter().cloned());
        Ok(actors)
    }

    fn set_autopilot_plan(&mut self, actor: ActorId, plan: &[RouteWaypoint]) -> SimResult<()> {
        self.link()?;
        let vehicle = self
            .vehicles
            .get_mut(&actor)
            .ok_or_else(|| SimError::NotFound(format!("actor {}", actor)))?;
        vehicle.plan = plan.iter().map(|wp| wp.waypoint.transform).collect();
        vehicle.cursor = 0;
        Ok(())
    }

    fn autopilot_step(&mut self, actor: ActorId) -> SimResult<AutopilotStep> {
        self.link()?;
        let vehicle = self
            .vehicles
            .get(&actor)
            .ok_or_else(|| SimError::NotFound(format!("actor {}", actor)))?;
        if vehicle.plan.is_empty() {
            return Ok(AutopilotStep {
                control: VehicleControl {
                    brake: 1.0,
                    ..Default::default()
                },
                waypoint_index: None,
                done: true,
            });
        }

        let done = vehicle.cursor + 1 >= vehicle.plan.len();
        let control = if done {
            VehicleControl {
                throttle: 0.0,
                steer: 0.0,
                brake: 1.0,
            }
        } else {
            let target = vehicle.plan[vehicle.cursor + 1].location;
            let here = vehicle.transform.location;
            let bearing = (target.y - here.y).atan2(target.x - here.x).to_degrees();
            let error = normalize_degrees(bearing - vehicle.transform.rotation.yaw);
            VehicleControl {
                throttle: 0.6,
                steer: (error / 70.0).clamp(-1.0, 1.0),
                brake: 0.0,
            }
        };
        Ok(AutopilotStep {
            control,
            waypoint_index: Some(vehicle.cursor),
            done,
        })
    }

    fn apply_control(&mut self, actor: ActorId, control: &VehicleControl) -> SimResult<()> {
        self.link()?;
        let vehicle = self
            .vehicles
            .get_mut(&actor)
            .ok_or_else(|| SimError::NotFound(format!("actor {}", actor)))?;
        vehicle.control = *control;
        Ok(())
    }

    fn tick(&mut self) -> SimResult<u64> {
        self.link()?;
        self.tick_calls += 1;
        let faults = self.config.faults;
        if faults.disconnect_on_tick == Some(self.tick_calls) {
            self.broken = Some(SimError::Disconnected("connection reset".to_string()));
            return self.link().map(|_| self.frame);
        }
        if faults.timeout_on_tick == Some(self.tick_calls) {
            self.broken = Some(SimError::Timeout("tick".to_string()));
            return self.link().map(|_| self.frame);
        }

        self.frame += 1;
        if self.replay.is_some() {
            self.replay_frame()?;
            return Ok(self.frame);
        }

        let dt = self.delta();
        self.elapsed += dt;
        let step = self.config.cruise_speed * dt;
        for vehicle in self.vehicles.values_mut() {
            if vehicle.control.throttle > 0.0 && vehicle.control.brake <= 0.0 {
                vehicle.advance(step);
            }
        }
        self.refresh_signals();
        self.record_frame()?;
        Ok(self.frame)
    }

    fn start_recorder(&mut self, path: &Path) -> SimResult<()> {
        self.link()?;
        let town = self.town()?.spec.name.clone();
        if self.recorder.is_some() {
            return Err(SimError::Protocol("recorder already running".to_string()));
        }
        self.recorder = Some(RecordingWriter::create(path, &town, self.delta())?);
        tracing::debug!(path = %path.display(), "Mock recorder started");
        Ok(())
    }

    fn stop_recorder(&mut self) -> SimResult<()> {
        self.link()?;
        if let Some(writer) = self.recorder.take() {
            writer.finish()?;
        }
        Ok(())
    }

    fn open_replay(&mut self, path: &Path, start_frame: u64) -> SimResult<ReplayInfo> {
        self.link()?;
        let mut reader = RecordingReader::open(path)?;
        let town = reader.town().to_string();
        self.load_world(&town)?;

        // Ticks before the start only restore state.
        if start_frame > 0 {
            reader.skip(start_frame - 1)?;
            if let Some(frame) = reader.next_frame()? {
                self.apply_recorded(&frame);
            }
        }

        let info = ReplayInfo {
            path: path.to_path_buf(),
            town,
            frames: reader.frame_count(),
            fixed_delta_seconds: reader.header().fixed_delta_seconds,
            start_frame: start_frame.min(reader.frame_count()),
        };
        self.replay = Some(Replay {
            reader,
            path: path.to_path_buf(),
        });
        if start_frame == 0 {
            // Actors appear as soon as replay starts, before the first tick.
            self.preload_first_frame()?;
        }
        Ok(info)
    }

    fn stop_replay(&mut self) -> SimResult<()> {
        self.link()?;
        self.replay = None;
        Ok(())
    }

    fn set_weather(&mut self, weather: WeatherPreset) -> SimResult<()> {
        self.link()?;
        self.weather = weather;
        Ok(())
    }

    fn attach_camera(&mut self, parent: ActorId, spec: &CameraSpec) -> SimResult<ActorId> {
        self.link()?;
        if !self.vehicles.contains_key(&parent) {
            return Err(SimError::NotFound(format!("actor {}", parent)));
        }
        let id = self.next_actor;
        self.next_actor += 1;
        self.cameras.insert(id, MockCamera { parent, spec: *spec });
        Ok(id)
    }

    fn camera_image(&mut self, camera: ActorId) -> SimResult<CameraImage> {
        self.link()?;
        let cam = self
            .cameras
            .get(&camera)
            .ok_or_else(|| SimError::NotFound(format!("camera {}", camera)))?;
        let (width, height) = (cam.spec.width, cam.spec.height);
        let (sky, ground) = palette(self.weather);
        let horizon = height / 2;

        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for row in 0..height {
            let color = if row < horizon { sky } else { ground };
            for _ in 0..width {
                data.extend_from_slice(&color);
            }
        }
        Ok(CameraImage {
            frame: self.frame,
            width,
            height,
            data,
        })
    }

    fn traffic_lights(&mut self) -> SimResult<Vec<TrafficLight>> {
        self.link()?;
        let town = self.town()?;
        Ok(town
            .lights
            .iter()
            .map(|light| TrafficLight {
                id: light.id,
                transform: light.transform,
                bounding_box: light.bounding_box,
                light_boxes: light.light_boxes.clone(),
                state: self.signals.get(&light.id).copied().unwrap_or_default(),
            })
            .collect())
    }
}

impl MockSimulator {
    /// Restore vehicles from frame 0 without consuming it.
    fn preload_first_frame(&mut self) -> SimResult<()> {
        let Some(replay) = &self.replay else {
            return Ok(());
        };
        let mut peek = RecordingReader::open(&replay.path)?;
        if let Some(frame) = peek.next_frame()? {
            self.apply_recorded(&frame);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spawn_ego(sim: &mut MockSimulator) -> ActorId {
        sim.load_world("Town01").unwrap();
        let spawn = sim.spawn_points().unwrap()[0];
        sim.spawn_vehicle("vehicle.lincoln.mkz", "ego", &spawn).unwrap().id
    }

    #[test]
    fn test_unknown_town_not_found() {
        let mut sim = MockSimulator::default();
        assert!(matches!(sim.load_world("Atlantis"), Err(SimError::NotFound(_))));
    }

    #[test]
    fn test_autopilot_follows_plan() {
        let mut sim = MockSimulator::default();
        let ego = spawn_ego(&mut sim);
        let network = sim.road_network(2.0).unwrap();
        let plan: Vec<RouteWaypoint> = network.segments[0]
            .path
            .iter()
            .map(|wp| RouteWaypoint {
                waypoint: wp.clone(),
                option: Default::default(),
                segment: 0,
                kind: crate::route::EdgeKind::Required,
            })
            .collect();
        sim.set_autopilot_plan(ego, &plan).unwrap();

        let mut ticks = 0;
        loop {
            let step = sim.autopilot_step(ego).unwrap();
            if step.done {
                break;
            }
            sim.apply_control(ego, &step.control).unwrap();
            sim.tick().unwrap();
            ticks += 1;
            assert!(ticks < 1_000);
        }
        let end = sim.actor_transform(ego).unwrap().location;
        let goal = network.segments[0].exit().location();
        assert!(end.distance(&goal) < 1e-6);
    }

    #[test]
    fn test_disconnect_fault() {
        let mut sim = MockSimulator::with_faults(MockFaults {
            disconnect_on_tick: Some(3),
            ..Default::default()
        });
        sim.load_world("Town01").unwrap();
        assert!(sim.tick().is_ok());
        assert!(sim.tick().is_ok());
        assert!(matches!(sim.tick(), Err(SimError::Disconnected(_))));
        assert!(matches!(sim.settings(), Err(SimError::Disconnected(_))));
    }

    #[test]
    fn test_record_and_replay_restore_ego() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Town01_0.log");

        let mut sim = MockSimulator::default();
        let ego = spawn_ego(&mut sim);
        sim.start_recorder(&path).unwrap();
        let moved = Transform::new(Location::new(1.0, 2.0, 0.0), Rotation::default());
        sim.tick().unwrap();
        sim.set_transform(ego, &moved).unwrap();
        sim.tick().unwrap();
        sim.stop_recorder().unwrap();

        let mut replay = MockSimulator::default();
        let info = replay.open_replay(&path, 0).unwrap();
        assert_eq!(info.frames, 2);
        assert_eq!(info.town, "Town01");
        replay.tick().unwrap();
        replay.tick().unwrap();
        let ego_now = replay
            .actors()
            .unwrap()
            .into_iter()
            .find(|a| a.role.as_deref() == Some("ego"))
            .unwrap();
        assert_eq!(ego_now.transform, moved);
        assert!(replay.tick().is_err());
    }

    #[test]
    fn test_weather_changes_pixels_only() {
        let mut sim = MockSimulator::default();
        let ego = spawn_ego(&mut sim);
        let spec = CameraSpec {
            width: 8,
            height: 4,
            fov_degrees: 90.0,
            sensor_tick: 1.0,
            mount: Transform::default(),
        };
        let camera = sim.attach_camera(ego, &spec).unwrap();
        let clear = sim.camera_image(camera).unwrap();
        let lights_clear = sim.traffic_lights().unwrap();
        sim.set_weather(WeatherPreset::HardRainNoon).unwrap();
        let rain = sim.camera_image(camera).unwrap();
        assert_eq!(clear.data.len(), clear.expected_len());
        assert_ne!(clear.data, rain.data);
        assert_eq!(lights_clear, sim.traffic_lights().unwrap());
    }
}
