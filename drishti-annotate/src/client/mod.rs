//! TCP client for the simulator bridge.
//!
//! The bridge runs next to the simulator and executes one [`proto::Request`]
//! at a time. [`BridgeClient`] implements [`Simulator`] on top of it, so the
//! recording and annotation sessions run unchanged against a live simulator.

pub mod proto;

use crate::config::ConnectionConfig;
use crate::error::{AppError, Result};
use drishti_core::core::{ActorId, Transform};
use drishti_core::route::{RoadNetwork, RouteWaypoint};
use drishti_core::sim::{
    ActorSnapshot, AutopilotStep, CameraImage, CameraSpec, ReplayInfo, SimError, SimResult,
    Simulator, TrafficLight, VehicleControl, VehicleInfo, WeatherPreset, WorldSettings,
};
use prost::Message as ProstMessage;
use proto::request::Command;
use proto::response::Outcome;
use proto::{Empty, Request, Response};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;

/// Largest response accepted (one 4K RGB image plus headroom)
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Blocking request/response connection to the bridge
pub struct BridgeClient {
    stream: TcpStream,
    next_id: u64,
}

impl BridgeClient {
    /// Connect with the configured connect and read timeouts
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let address = config.address();
        let addr = address
            .to_socket_addrs()
            .map_err(|e| AppError::Config(format!("Invalid address {}: {}", address, e)))?
            .next()
            .ok_or_else(|| AppError::Config(format!("Address {} did not resolve", address)))?;

        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout())
            .map_err(|e| AppError::Connection(format!("{}: {}", addr, e)))?;
        stream.set_read_timeout(Some(config.timeout()))?;
        stream.set_write_timeout(Some(config.timeout()))?;
        stream.set_nodelay(true)?;

        tracing::info!("Connected to simulator bridge at {}", addr);
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream, next_id: 1 }
    }

    /// Send one request and wait for its response
    fn call(&mut self, what: &'static str, command: Command) -> SimResult<Outcome> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Request {
            id,
            command: Some(command),
        };
        self.send(what, &request)?;
        let response = self.receive(what)?;

        if response.id != id {
            return Err(SimError::Protocol(format!(
                "{}: response id {} for request {}",
                what, response.id, id
            )));
        }
        match response.outcome {
            Some(Outcome::Failure(failure)) => Err(failure.into_sim_error()),
            Some(outcome) => Ok(outcome),
            None => Err(SimError::Protocol(format!("{}: empty response", what))),
        }
    }

    /// Call expecting a bare acknowledgement
    fn call_ok(&mut self, what: &'static str, command: Command) -> SimResult<()> {
        match self.call(what, command)? {
            Outcome::Ok(_) => Ok(()),
            other => Err(unexpected(what, &other)),
        }
    }

    fn send(&mut self, what: &'static str, request: &Request) -> SimResult<()> {
        let encoded = request.encode_to_vec();
        let len = u32::try_from(encoded.len())
            .map_err(|_| SimError::Protocol(format!("{}: request too large", what)))?;

        // Write length prefix (big-endian)
        self.stream
            .write_all(&len.to_be_bytes())
            .map_err(|e| io_error(what, e))?;
        self.stream
            .write_all(&encoded)
            .map_err(|e| io_error(what, e))?;
        self.stream.flush().map_err(|e| io_error(what, e))
    }

    fn receive(&mut self, what: &'static str) -> SimResult<Response> {
        let mut header = [0u8; 4];
        self.stream
            .read_exact(&mut header)
            .map_err(|e| io_error(what, e))?;
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(SimError::Protocol(format!(
                "{}: response of {} bytes exceeds limit",
                what, len
            )));
        }

        let mut buffer = vec![0u8; len];
        self.stream
            .read_exact(&mut buffer)
            .map_err(|e| io_error(what, e))?;
        Response::decode(buffer.as_slice())
            .map_err(|e| SimError::Protocol(format!("{}: {}", what, e)))
    }
}

/// Map socket failures onto the simulator error taxonomy
fn io_error(what: &str, e: std::io::Error) -> SimError {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => SimError::Timeout(what.to_string()),
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::NotConnected => SimError::Disconnected(format!("{}: {}", what, e)),
        _ => SimError::Io(e),
    }
}

fn unexpected(what: &str, outcome: &Outcome) -> SimError {
    SimError::Protocol(format!("{}: unexpected response {:?}", what, outcome))
}

impl Simulator for BridgeClient {
    fn load_world(&mut self, town: &str) -> SimResult<()> {
        self.call_ok("load_world", Command::LoadWorld(town.to_string()))
    }

    fn current_town(&mut self) -> SimResult<String> {
        match self.call("current_town", Command::CurrentTown(Empty {}))? {
            Outcome::Town(town) => Ok(town),
            other => Err(unexpected("current_town", &other)),
        }
    }

    fn settings(&mut self) -> SimResult<WorldSettings> {
        match self.call("settings", Command::GetSettings(Empty {}))? {
            Outcome::Settings(settings) => Ok(settings.into()),
            other => Err(unexpected("settings", &other)),
        }
    }

    fn apply_settings(&mut self, settings: &WorldSettings) -> SimResult<()> {
        self.call_ok("apply_settings", Command::ApplySettings(settings.into()))
    }

    fn road_network(&mut self, sampling_resolution: f64) -> SimResult<RoadNetwork> {
        match self.call("road_network", Command::RoadNetwork(sampling_resolution))? {
            Outcome::RoadNetwork(network) => network.into_network(),
            other => Err(unexpected("road_network", &other)),
        }
    }

    fn spawn_points(&mut self) -> SimResult<Vec<Transform>> {
        match self.call("spawn_points", Command::SpawnPoints(Empty {}))? {
            Outcome::Poses(list) => list
                .poses
                .into_iter()
                .map(proto::Pose::into_transform)
                .collect(),
            other => Err(unexpected("spawn_points", &other)),
        }
    }

    fn spawn_vehicle(
        &mut self,
        blueprint: &str,
        role: &str,
        transform: &Transform,
    ) -> SimResult<VehicleInfo> {
        let command = Command::SpawnVehicle(proto::SpawnVehicle {
            blueprint: blueprint.to_string(),
            role: role.to_string(),
            pose: Some(transform.into()),
        });
        match self.call("spawn_vehicle", command)? {
            Outcome::Vehicle(vehicle) => vehicle.into_info(),
            other => Err(unexpected("spawn_vehicle", &other)),
        }
    }

    fn set_transform(&mut self, actor: ActorId, transform: &Transform) -> SimResult<()> {
        let command = Command::SetTransform(proto::ActorPose {
            actor,
            pose: Some(transform.into()),
        });
        self.call_ok("set_transform", command)
    }

    fn actor_transform(&mut self, actor: ActorId) -> SimResult<Transform> {
        match self.call("actor_transform", Command::GetTransform(actor))? {
            Outcome::Pose(pose) => pose.into_transform(),
            other => Err(unexpected("actor_transform", &other)),
        }
    }

    fn destroy_actor(&mut self, actor: ActorId) -> SimResult<()> {
        self.call_ok("destroy_actor", Command::DestroyActor(actor))
    }

    fn actors(&mut self) -> SimResult<Vec<ActorSnapshot>> {
        match self.call("actors", Command::Actors(Empty {}))? {
            Outcome::Actors(list) => list
                .actors
                .into_iter()
                .map(proto::Actor::into_snapshot)
                .collect(),
            other => Err(unexpected("actors", &other)),
        }
    }

    fn set_autopilot_plan(&mut self, actor: ActorId, plan: &[RouteWaypoint]) -> SimResult<()> {
        let command = Command::SetAutopilotPlan(proto::AutopilotPlan {
            actor,
            plan: plan.iter().map(Into::into).collect(),
        });
        self.call_ok("set_autopilot_plan", command)
    }

    fn autopilot_step(&mut self, actor: ActorId) -> SimResult<AutopilotStep> {
        match self.call("autopilot_step", Command::AutopilotStep(actor))? {
            Outcome::Step(step) => Ok(step.into()),
            other => Err(unexpected("autopilot_step", &other)),
        }
    }

    fn apply_control(&mut self, actor: ActorId, control: &VehicleControl) -> SimResult<()> {
        let command = Command::ApplyControl(proto::ActorControl {
            actor,
            control: Some(control.into()),
        });
        self.call_ok("apply_control", command)
    }

    fn tick(&mut self) -> SimResult<u64> {
        match self.call("tick", Command::Tick(Empty {}))? {
            Outcome::Frame(frame) => Ok(frame),
            other => Err(unexpected("tick", &other)),
        }
    }

    fn start_recorder(&mut self, path: &Path) -> SimResult<()> {
        let path = path.to_string_lossy().into_owned();
        self.call_ok("start_recorder", Command::StartRecorder(path))
    }

    fn stop_recorder(&mut self) -> SimResult<()> {
        self.call_ok("stop_recorder", Command::StopRecorder(Empty {}))
    }

    fn open_replay(&mut self, path: &Path, start_frame: u64) -> SimResult<ReplayInfo> {
        let command = Command::OpenReplay(proto::OpenReplay {
            path: path.to_string_lossy().into_owned(),
            start_frame,
        });
        match self.call("open_replay", command)? {
            Outcome::Replay(replay) => Ok(replay.into()),
            other => Err(unexpected("open_replay", &other)),
        }
    }

    fn stop_replay(&mut self) -> SimResult<()> {
        self.call_ok("stop_replay", Command::StopReplay(Empty {}))
    }

    fn set_weather(&mut self, weather: WeatherPreset) -> SimResult<()> {
        self.call_ok("set_weather", Command::SetWeather(weather.to_string()))
    }

    fn attach_camera(&mut self, parent: ActorId, spec: &CameraSpec) -> SimResult<ActorId> {
        let command = Command::AttachCamera(proto::AttachCamera {
            parent,
            spec: Some(spec.into()),
        });
        match self.call("attach_camera", command)? {
            Outcome::ActorId(id) => Ok(id),
            other => Err(unexpected("attach_camera", &other)),
        }
    }

    fn camera_image(&mut self, camera: ActorId) -> SimResult<CameraImage> {
        match self.call("camera_image", Command::CameraImage(camera))? {
            Outcome::Image(image) => image.into_camera_image(),
            other => Err(unexpected("camera_image", &other)),
        }
    }

    fn traffic_lights(&mut self) -> SimResult<Vec<TrafficLight>> {
        match self.call("traffic_lights", Command::TrafficLights(Empty {}))? {
            Outcome::Lights(list) => list
                .lights
                .into_iter()
                .map(proto::Light::into_traffic_light)
                .collect(),
            other => Err(unexpected("traffic_lights", &other)),
        }
    }
}
