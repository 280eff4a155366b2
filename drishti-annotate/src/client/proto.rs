//! Bridge wire messages.
//!
//! Every call is one [`Request`] answered by one [`Response`] with the same
//! `id`. Both travel as protobuf behind a u32 big-endian length prefix.

use drishti_core::core::{BoundingBox, Location, Rotation, Transform};
use drishti_core::route::{
    EdgeKind, LaneChange, LaneChangeLink, LaneSegment, RoadNetwork, RoadOption, RouteWaypoint,
    Side, Waypoint,
};
use drishti_core::sim::{
    ActorCategory, ActorSnapshot, AutopilotStep, CameraImage, CameraSpec, ReplayInfo, SignalState,
    SimError, SimResult, TrafficLight, VehicleControl, VehicleInfo, WorldSettings,
};

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Vec3 {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Rot {
    #[prost(double, tag = "1")]
    pub pitch: f64,
    #[prost(double, tag = "2")]
    pub yaw: f64,
    #[prost(double, tag = "3")]
    pub roll: f64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Pose {
    #[prost(message, optional, tag = "1")]
    pub location: Option<Vec3>,
    #[prost(message, optional, tag = "2")]
    pub rotation: Option<Rot>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Box3 {
    #[prost(message, optional, tag = "1")]
    pub location: Option<Vec3>,
    #[prost(message, optional, tag = "2")]
    pub extent: Option<Vec3>,
    #[prost(message, optional, tag = "3")]
    pub rotation: Option<Rot>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WaypointMsg {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, optional, tag = "2")]
    pub pose: Option<Pose>,
    #[prost(int32, tag = "3")]
    pub road_id: i32,
    #[prost(int32, tag = "4")]
    pub section_id: i32,
    #[prost(int32, tag = "5")]
    pub lane_id: i32,
    #[prost(double, tag = "6")]
    pub s: f64,
    #[prost(double, tag = "7")]
    pub lane_width: f64,
    #[prost(bool, tag = "8")]
    pub is_junction: bool,
    /// 0 none, 1 left, 2 right, 3 both
    #[prost(int32, tag = "9")]
    pub lane_change: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SegmentMsg {
    #[prost(message, repeated, tag = "1")]
    pub path: Vec<WaypointMsg>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct LaneChangeMsg {
    #[prost(uint64, tag = "1")]
    pub from: u64,
    #[prost(uint64, tag = "2")]
    pub to: u64,
    /// 0 left, 1 right
    #[prost(int32, tag = "3")]
    pub side: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RoadNetworkMsg {
    #[prost(message, repeated, tag = "1")]
    pub segments: Vec<SegmentMsg>,
    #[prost(message, repeated, tag = "2")]
    pub lane_changes: Vec<LaneChangeMsg>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlanWaypoint {
    #[prost(message, optional, tag = "1")]
    pub waypoint: Option<WaypointMsg>,
    /// 0 follow, 1 left, 2 right, 3 straight, 4 change left, 5 change right
    #[prost(int32, tag = "2")]
    pub option: i32,
    #[prost(uint64, tag = "3")]
    pub segment: u64,
    #[prost(int32, tag = "4")]
    pub kind: i32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Settings {
    #[prost(bool, tag = "1")]
    pub synchronous_mode: bool,
    #[prost(double, optional, tag = "2")]
    pub fixed_delta_seconds: Option<f64>,
    #[prost(bool, tag = "3")]
    pub no_rendering_mode: bool,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Control {
    #[prost(double, tag = "1")]
    pub throttle: f64,
    #[prost(double, tag = "2")]
    pub steer: f64,
    #[prost(double, tag = "3")]
    pub brake: f64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Step {
    #[prost(message, optional, tag = "1")]
    pub control: Option<Control>,
    #[prost(uint64, optional, tag = "2")]
    pub waypoint_index: Option<u64>,
    #[prost(bool, tag = "3")]
    pub done: bool,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Vehicle {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, optional, tag = "2")]
    pub bounding_box: Option<Box3>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Camera {
    #[prost(uint32, tag = "1")]
    pub width: u32,
    #[prost(uint32, tag = "2")]
    pub height: u32,
    #[prost(double, tag = "3")]
    pub fov_degrees: f64,
    #[prost(double, tag = "4")]
    pub sensor_tick: f64,
    #[prost(message, optional, tag = "5")]
    pub mount: Option<Pose>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Image {
    #[prost(uint64, tag = "1")]
    pub frame: u64,
    #[prost(uint32, tag = "2")]
    pub width: u32,
    #[prost(uint32, tag = "3")]
    pub height: u32,
    /// Packed RGB8 rows
    #[prost(bytes = "vec", tag = "4")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Light {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, optional, tag = "2")]
    pub pose: Option<Pose>,
    #[prost(message, optional, tag = "3")]
    pub bounding_box: Option<Box3>,
    #[prost(message, repeated, tag = "4")]
    pub light_boxes: Vec<Box3>,
    /// 0 red, 1 yellow, 2 green, 3 off, 4 unknown
    #[prost(int32, tag = "5")]
    pub state: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Actor {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    /// Vehicle, walker, light, sign, building, vegetation, sensor, other
    #[prost(int32, tag = "2")]
    pub category: i32,
    #[prost(string, optional, tag = "3")]
    pub role: Option<String>,
    #[prost(message, optional, tag = "4")]
    pub pose: Option<Pose>,
    #[prost(message, optional, tag = "5")]
    pub bounding_box: Option<Box3>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Replay {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(string, tag = "2")]
    pub town: String,
    #[prost(uint64, tag = "3")]
    pub frames: u64,
    #[prost(double, tag = "4")]
    pub fixed_delta_seconds: f64,
    #[prost(uint64, tag = "5")]
    pub start_frame: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PoseList {
    #[prost(message, repeated, tag = "1")]
    pub poses: Vec<Pose>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActorList {
    #[prost(message, repeated, tag = "1")]
    pub actors: Vec<Actor>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LightList {
    #[prost(message, repeated, tag = "1")]
    pub lights: Vec<Light>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SpawnVehicle {
    #[prost(string, tag = "1")]
    pub blueprint: String,
    #[prost(string, tag = "2")]
    pub role: String,
    #[prost(message, optional, tag = "3")]
    pub pose: Option<Pose>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ActorPose {
    #[prost(uint64, tag = "1")]
    pub actor: u64,
    #[prost(message, optional, tag = "2")]
    pub pose: Option<Pose>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AutopilotPlan {
    #[prost(uint64, tag = "1")]
    pub actor: u64,
    #[prost(message, repeated, tag = "2")]
    pub plan: Vec<PlanWaypoint>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ActorControl {
    #[prost(uint64, tag = "1")]
    pub actor: u64,
    #[prost(message, optional, tag = "2")]
    pub control: Option<Control>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpenReplay {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(uint64, tag = "2")]
    pub start_frame: u64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct AttachCamera {
    #[prost(uint64, tag = "1")]
    pub parent: u64,
    #[prost(message, optional, tag = "2")]
    pub spec: Option<Camera>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(
        oneof = "request::Command",
        tags = "2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24"
    )]
    pub command: Option<request::Command>,
}

pub mod request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Command {
        #[prost(string, tag = "2")]
        LoadWorld(String),
        #[prost(message, tag = "3")]
        CurrentTown(super::Empty),
        #[prost(message, tag = "4")]
        GetSettings(super::Empty),
        #[prost(message, tag = "5")]
        ApplySettings(super::Settings),
        /// Sampling resolution in meters
        #[prost(double, tag = "6")]
        RoadNetwork(f64),
        #[prost(message, tag = "7")]
        SpawnPoints(super::Empty),
        #[prost(message, tag = "8")]
        SpawnVehicle(super::SpawnVehicle),
        #[prost(message, tag = "9")]
        SetTransform(super::ActorPose),
        #[prost(uint64, tag = "10")]
        GetTransform(u64),
        #[prost(uint64, tag = "11")]
        DestroyActor(u64),
        #[prost(message, tag = "12")]
        Actors(super::Empty),
        #[prost(message, tag = "13")]
        SetAutopilotPlan(super::AutopilotPlan),
        #[prost(uint64, tag = "14")]
        AutopilotStep(u64),
        #[prost(message, tag = "15")]
        ApplyControl(super::ActorControl),
        #[prost(message, tag = "16")]
        Tick(super::Empty),
        #[prost(string, tag = "17")]
        StartRecorder(String),
        #[prost(message, tag = "18")]
        StopRecorder(super::Empty),
        #[prost(message, tag = "19")]
        OpenReplay(super::OpenReplay),
        #[prost(message, tag = "20")]
        StopReplay(super::Empty),
        #[prost(string, tag = "21")]
        SetWeather(String),
        #[prost(message, tag = "22")]
        AttachCamera(super::AttachCamera),
        #[prost(uint64, tag = "23")]
        CameraImage(u64),
        #[prost(message, tag = "24")]
        TrafficLights(super::Empty),
    }
}

/// Failure class reported by the bridge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ErrorKind {
    Internal = 0,
    Timeout = 1,
    NotFound = 2,
    Corrupt = 3,
    InvalidRequest = 4,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Failure {
    #[prost(enumeration = "ErrorKind", tag = "1")]
    pub kind: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(
        oneof = "response::Outcome",
        tags = "2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16"
    )]
    pub outcome: Option<response::Outcome>,
}

pub mod response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Outcome {
        #[prost(message, tag = "2")]
        Failure(super::Failure),
        #[prost(message, tag = "3")]
        Ok(super::Empty),
        #[prost(string, tag = "4")]
        Town(String),
        #[prost(message, tag = "5")]
        Settings(super::Settings),
        #[prost(message, tag = "6")]
        RoadNetwork(super::RoadNetworkMsg),
        #[prost(message, tag = "7")]
        Poses(super::PoseList),
        #[prost(message, tag = "8")]
        Vehicle(super::Vehicle),
        #[prost(message, tag = "9")]
        Pose(super::Pose),
        #[prost(message, tag = "10")]
        Actors(super::ActorList),
        #[prost(message, tag = "11")]
        Step(super::Step),
        /// Simulator frame number after a tick
        #[prost(uint64, tag = "12")]
        Frame(u64),
        #[prost(message, tag = "13")]
        Replay(super::Replay),
        #[prost(uint64, tag = "14")]
        ActorId(u64),
        #[prost(message, tag = "15")]
        Image(super::Image),
        #[prost(message, tag = "16")]
        Lights(super::LightList),
    }
}

impl Failure {
    /// Simulator error carried by this response.
    pub fn into_sim_error(self) -> SimError {
        match ErrorKind::try_from(self.kind).unwrap_or(ErrorKind::Internal) {
            ErrorKind::Timeout => SimError::Timeout(self.message),
            ErrorKind::NotFound => SimError::NotFound(self.message),
            ErrorKind::Corrupt => SimError::Corrupt(self.message),
            ErrorKind::Internal | ErrorKind::InvalidRequest => SimError::Protocol(self.message),
        }
    }
}

fn missing(field: &str) -> SimError {
    SimError::Protocol(format!("missing field '{}'", field))
}

fn required<T>(value: Option<T>, field: &str) -> SimResult<T> {
    value.ok_or_else(|| missing(field))
}

// Core types -> wire

impl From<&Location> for Vec3 {
    fn from(l: &Location) -> Self {
        Vec3 {
            x: l.x,
            y: l.y,
            z: l.z,
        }
    }
}

impl From<&Rotation> for Rot {
    fn from(r: &Rotation) -> Self {
        Rot {
            pitch: r.pitch,
            yaw: r.yaw,
            roll: r.roll,
        }
    }
}

impl From<&Transform> for Pose {
    fn from(t: &Transform) -> Self {
        Pose {
            location: Some((&t.location).into()),
            rotation: Some((&t.rotation).into()),
        }
    }
}

impl From<&BoundingBox> for Box3 {
    fn from(b: &BoundingBox) -> Self {
        Box3 {
            location: Some((&b.location).into()),
            extent: Some((&b.extent).into()),
            rotation: Some((&b.rotation).into()),
        }
    }
}

impl From<&Waypoint> for WaypointMsg {
    fn from(wp: &Waypoint) -> Self {
        WaypointMsg {
            id: wp.id,
            pose: Some((&wp.transform).into()),
            road_id: wp.road_id,
            section_id: wp.section_id,
            lane_id: wp.lane_id,
            s: wp.s,
            lane_width: wp.lane_width,
            is_junction: wp.is_junction,
            lane_change: match wp.lane_change {
                LaneChange::None => 0,
                LaneChange::Left => 1,
                LaneChange::Right => 2,
                LaneChange::Both => 3,
            },
        }
    }
}

impl From<&RouteWaypoint> for PlanWaypoint {
    fn from(wp: &RouteWaypoint) -> Self {
        PlanWaypoint {
            waypoint: Some((&wp.waypoint).into()),
            option: match wp.option {
                RoadOption::LaneFollow => 0,
                RoadOption::Left => 1,
                RoadOption::Right => 2,
                RoadOption::Straight => 3,
                RoadOption::ChangeLaneLeft => 4,
                RoadOption::ChangeLaneRight => 5,
            },
            segment: wp.segment as u64,
            kind: match wp.kind {
                EdgeKind::Required => 0,
                EdgeKind::Deadhead => 1,
                EdgeKind::LaneChange => 2,
                EdgeKind::Teleport => 3,
            },
        }
    }
}

impl From<&WorldSettings> for Settings {
    fn from(s: &WorldSettings) -> Self {
        Settings {
            synchronous_mode: s.synchronous_mode,
            fixed_delta_seconds: s.fixed_delta_seconds,
            no_rendering_mode: s.no_rendering_mode,
        }
    }
}

impl From<&VehicleControl> for Control {
    fn from(c: &VehicleControl) -> Self {
        Control {
            throttle: c.throttle,
            steer: c.steer,
            brake: c.brake,
        }
    }
}

impl From<&CameraSpec> for Camera {
    fn from(c: &CameraSpec) -> Self {
        Camera {
            width: c.width,
            height: c.height,
            fov_degrees: c.fov_degrees,
            sensor_tick: c.sensor_tick,
            mount: Some((&c.mount).into()),
        }
    }
}

// Wire -> core types

impl From<Vec3> for Location {
    fn from(v: Vec3) -> Self {
        Location::new(v.x, v.y, v.z)
    }
}

impl From<Rot> for Rotation {
    fn from(r: Rot) -> Self {
        Rotation::new(r.pitch, r.yaw, r.roll)
    }
}

impl Pose {
    pub fn into_transform(self) -> SimResult<Transform> {
        Ok(Transform::new(
            required(self.location, "location")?.into(),
            required(self.rotation, "rotation")?.into(),
        ))
    }
}

impl Box3 {
    pub fn into_bounding_box(self) -> SimResult<BoundingBox> {
        Ok(BoundingBox::new(
            required(self.location, "location")?.into(),
            required(self.extent, "extent")?.into(),
            self.rotation.map(Rotation::from).unwrap_or_default(),
        ))
    }
}

impl WaypointMsg {
    pub fn into_waypoint(self) -> SimResult<Waypoint> {
        let lane_change = match self.lane_change {
            0 => LaneChange::None,
            1 => LaneChange::Left,
            2 => LaneChange::Right,
            3 => LaneChange::Both,
            other => {
                return Err(SimError::Protocol(format!(
                    "invalid lane change {}",
                    other
                )));
            }
        };
        Ok(Waypoint {
            id: self.id,
            transform: required(self.pose, "pose")?.into_transform()?,
            road_id: self.road_id,
            section_id: self.section_id,
            lane_id: self.lane_id,
            s: self.s,
            lane_width: self.lane_width,
            is_junction: self.is_junction,
            lane_change,
        })
    }
}

impl RoadNetworkMsg {
    pub fn into_network(self) -> SimResult<RoadNetwork> {
        let segments = self
            .segments
            .into_iter()
            .map(|seg| {
                let path = seg
                    .path
                    .into_iter()
                    .map(WaypointMsg::into_waypoint)
                    .collect::<SimResult<Vec<_>>>()?;
                if path.len() < 2 {
                    return Err(SimError::Protocol(
                        "lane segment with fewer than two waypoints".into(),
                    ));
                }
                Ok(LaneSegment::new(path))
            })
            .collect::<SimResult<Vec<_>>>()?;

        let lane_changes = self
            .lane_changes
            .into_iter()
            .map(|link| {
                let side = match link.side {
                    0 => Side::Left,
                    1 => Side::Right,
                    other => {
                        return Err(SimError::Protocol(format!("invalid side {}", other)));
                    }
                };
                let (from, to) = (link.from as usize, link.to as usize);
                if from >= segments.len() || to >= segments.len() {
                    return Err(SimError::Protocol(format!(
                        "lane change {} -> {} out of range",
                        from, to
                    )));
                }
                Ok(LaneChangeLink { from, to, side })
            })
            .collect::<SimResult<Vec<_>>>()?;

        Ok(RoadNetwork::new(segments, lane_changes))
    }
}

impl From<Settings> for WorldSettings {
    fn from(s: Settings) -> Self {
        WorldSettings {
            synchronous_mode: s.synchronous_mode,
            fixed_delta_seconds: s.fixed_delta_seconds,
            no_rendering_mode: s.no_rendering_mode,
        }
    }
}

impl From<Step> for AutopilotStep {
    fn from(s: Step) -> Self {
        let control = s
            .control
            .map(|c| VehicleControl {
                throttle: c.throttle,
                steer: c.steer,
                brake: c.brake,
            })
            .unwrap_or_default();
        AutopilotStep {
            control,
            waypoint_index: s.waypoint_index.map(|i| i as usize),
            done: s.done,
        }
    }
}

impl Vehicle {
    pub fn into_info(self) -> SimResult<VehicleInfo> {
        Ok(VehicleInfo {
            id: self.id,
            bounding_box: required(self.bounding_box, "bounding_box")?.into_bounding_box()?,
        })
    }
}

impl Image {
    pub fn into_camera_image(self) -> SimResult<CameraImage> {
        let image = CameraImage {
            frame: self.frame,
            width: self.width,
            height: self.height,
            data: self.data,
        };
        if image.data.len() != image.expected_len() {
            return Err(SimError::Protocol(format!(
                "image of {}x{} carries {} bytes",
                image.width,
                image.height,
                image.data.len()
            )));
        }
        Ok(image)
    }
}

impl Light {
    pub fn into_traffic_light(self) -> SimResult<TrafficLight> {
        let state = match self.state {
            0 => SignalState::Red,
            1 => SignalState::Yellow,
            2 => SignalState::Green,
            3 => SignalState::Off,
            _ => SignalState::Unknown,
        };
        Ok(TrafficLight {
            id: self.id,
            transform: required(self.pose, "pose")?.into_transform()?,
            bounding_box: required(self.bounding_box, "bounding_box")?.into_bounding_box()?,
            light_boxes: self
                .light_boxes
                .into_iter()
                .map(Box3::into_bounding_box)
                .collect::<SimResult<Vec<_>>>()?,
            state,
        })
    }
}

impl Actor {
    pub fn into_snapshot(self) -> SimResult<ActorSnapshot> {
        let category = match self.category {
            0 => ActorCategory::Vehicle,
            1 => ActorCategory::Walker,
            2 => ActorCategory::TrafficLight,
            3 => ActorCategory::TrafficSign,
            4 => ActorCategory::Building,
            5 => ActorCategory::Vegetation,
            6 => ActorCategory::Sensor,
            _ => ActorCategory::Other,
        };
        Ok(ActorSnapshot {
            id: self.id,
            category,
            role: self.role,
            transform: required(self.pose, "pose")?.into_transform()?,
            bounding_box: required(self.bounding_box, "bounding_box")?.into_bounding_box()?,
        })
    }
}

impl From<Replay> for ReplayInfo {
    fn from(r: Replay) -> Self {
        ReplayInfo {
            path: r.path.into(),
            town: r.town,
            frames: r.frames,
            fixed_delta_seconds: r.fixed_delta_seconds,
            start_frame: r.start_frame,
        }
    }
}
