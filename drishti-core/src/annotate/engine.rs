//! Replay annotation engine.
//!
//! # State machine
//!
//! ```text
//!  Idle ──open()──► Replaying ──tick×N──► Fetching ──► Annotating ─┐
//!                      ▲                                            │
//!                      └────────────── frame emitted ◄──────────────┘
//!                      │
//!                      ├── last frame ──► Done
//!                      └── connection lost / corrupt log ──► Failed
//! ```
//!
//! A frame is captured every `sensor_tick / fixed_delta` replayed ticks, so
//! frame `k` always shows the world after recorded tick `(k + 1) * N - 1`.
//! That keeps frame indices stable across resumed runs and across weather
//! presets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::annotator::Annotator;
use super::types::{Frame, FrameSink, StreamEnd};
use crate::camera::{CameraCalibration, CameraConfig, roof_mount};
use crate::core::ActorId;
use crate::error::{DrishtiError, Result, WorkUnit};
use crate::session::EGO_ROLE;
use crate::sim::{CameraSpec, ReplayInfo, SimError, Simulator, WeatherPreset};

/// Replay annotation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotationConfig {
    /// Weather applied to the replay (default: ClearNoon)
    #[serde(default)]
    pub weather: WeatherPreset,

    /// Role name of the recorded vehicle (default: ego)
    #[serde(default = "default_ego_role")]
    pub ego_role: String,

    /// Stop after this many frames (default: unlimited)
    #[serde(default)]
    pub max_frames: Option<u64>,
}

fn default_ego_role() -> String {
    EGO_ROLE.to_string()
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            weather: WeatherPreset::default(),
            ego_role: default_ego_role(),
            max_frames: None,
        }
    }
}

/// Engine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Replaying,
    Fetching,
    Annotating,
    Done,
    Failed,
}

/// Outcome of one replay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Frames emitted by this run.
    pub frames: u64,
    pub annotations: u64,
    pub recording: PathBuf,
    /// Index of the last emitted frame.
    pub last_frame: Option<u64>,
}

/// Simulator ticks between two captured frames.
pub fn ticks_per_frame(sensor_tick: f64, fixed_delta_seconds: f64) -> u64 {
    if fixed_delta_seconds <= 0.0 || !sensor_tick.is_finite() {
        return 1;
    }
    ((sensor_tick / fixed_delta_seconds).round() as u64).max(1)
}

/// Open replay.
struct Replay {
    info: ReplayInfo,
    ego: ActorId,
    camera: ActorId,
    annotator: Annotator,
    ticks_per_frame: u64,
    total_frames: u64,
}

/// Replays a recording and annotates its camera frames.
pub struct AnnotationEngine<'a> {
    sim: &'a mut dyn Simulator,
    camera: CameraConfig,
    config: AnnotationConfig,
    state: EngineState,
    replay: Option<Replay>,
    next_frame: u64,
    last_completed: Option<u64>,
}

impl<'a> AnnotationEngine<'a> {
    pub fn new(sim: &'a mut dyn Simulator, camera: CameraConfig, config: AnnotationConfig) -> Self {
        Self {
            sim,
            camera,
            config,
            state: EngineState::Idle,
            replay: None,
            next_frame: 0,
            last_completed: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Index of the last frame handed to the sink.
    pub fn last_completed(&self) -> Option<u64> {
        self.last_completed
    }

    /// Frames the open recording holds.
    pub fn total_frames(&self) -> Option<u64> {
        self.replay.as_ref().map(|r| r.total_frames)
    }

    /// Start replaying `log` under the configured weather.
    ///
    /// With `resume_after = Some(k)` the first emitted frame is `k + 1`.
    pub fn open(&mut self, log: &Path, resume_after: Option<u64>) -> Result<&ReplayInfo> {
        if self.state != EngineState::Idle {
            return Err(DrishtiError::Config(format!(
                "engine cannot open a replay in state {:?}",
                self.state
            )));
        }
        match self.open_replay(log, resume_after) {
            Ok(replay) => {
                self.state = EngineState::Replaying;
                Ok(&self.replay.insert(replay).info)
            }
            Err(e) => {
                self.state = EngineState::Failed;
                self.release();
                Err(e)
            }
        }
    }

    fn open_replay(&mut self, log: &Path, resume_after: Option<u64>) -> Result<Replay> {
        let open_error = |e| DrishtiError::from_sim(e, WorkUnit::Frame, resume_after);

        let mut info = self.sim.open_replay(log, 0).map_err(open_error)?;
        let ticks_per_frame = ticks_per_frame(self.camera.sensor_tick, info.fixed_delta_seconds);
        let total_frames = info.frames / ticks_per_frame;

        let next_frame = match resume_after {
            None => Some(0),
            Some(k) => k.checked_add(1),
        };
        let start_tick = next_frame.and_then(|f| f.checked_mul(ticks_per_frame));
        let (Some(next_frame), Some(start_tick)) = (next_frame, start_tick) else {
            return Err(DrishtiError::Config(format!(
                "resume frame {:?} is out of range",
                resume_after
            )));
        };
        self.next_frame = next_frame;
        self.last_completed = resume_after;
        if start_tick > 0 && start_tick < info.frames {
            self.sim.stop_replay().map_err(open_error)?;
            info = self.sim.open_replay(log, start_tick).map_err(open_error)?;
        }

        self.sim.set_weather(self.config.weather).map_err(open_error)?;
        let ego = self
            .sim
            .actors()
            .map_err(open_error)?
            .into_iter()
            .find(|a| a.role.as_deref() == Some(self.config.ego_role.as_str()))
            .ok_or_else(|| DrishtiError::ReplayCorruption {
                last_good_frame: resume_after,
                reason: format!(
                    "no actor with role '{}' in {}",
                    self.config.ego_role,
                    log.display()
                ),
            })?;

        let mount = roof_mount(&ego.bounding_box);
        let calibration =
            CameraCalibration::new(self.camera.width, self.camera.height, self.camera.fov_degrees, mount)?;
        let spec = CameraSpec {
            width: self.camera.width,
            height: self.camera.height,
            fov_degrees: self.camera.fov_degrees,
            sensor_tick: self.camera.sensor_tick,
            mount,
        };
        let camera = self.sim.attach_camera(ego.id, &spec).map_err(open_error)?;

        tracing::info!(
            path = %log.display(),
            town = %info.town,
            ticks = info.frames,
            frames = total_frames,
            first_frame = self.next_frame,
            weather = %self.config.weather,
            "Replay opened"
        );
        Ok(Replay {
            info,
            ego: ego.id,
            camera,
            annotator: Annotator::new(calibration, self.camera.near_plane),
            ticks_per_frame,
            total_frames,
        })
    }

    /// Annotate every remaining frame into `sink`.
    ///
    /// The sink always receives a [`StreamEnd`]. On failure the error carries
    /// the index of the last frame the sink accepted.
    pub fn run(&mut self, sink: &mut dyn FrameSink) -> Result<ReplaySummary> {
        if self.state != EngineState::Replaying {
            return Err(DrishtiError::Config(format!(
                "engine cannot run in state {:?}",
                self.state
            )));
        }

        let first_frame = self.next_frame;
        let mut annotations = 0u64;
        let result = self.run_frames(sink, &mut annotations);
        let emitted = self.next_frame - first_frame;
        let recording = self
            .replay
            .as_ref()
            .map(|r| r.info.path.clone())
            .unwrap_or_default();
        self.release();

        match result {
            Ok(()) => {
                if let Err(e) = sink.finish(&StreamEnd::Completed { frames: emitted }) {
                    self.state = EngineState::Failed;
                    tracing::error!(code = e.code(), "Sink failed to finish: {}", e);
                    return Err(e);
                }
                self.state = EngineState::Done;
                tracing::info!(frames = emitted, annotations, "Replay annotated");
                Ok(ReplaySummary {
                    frames: emitted,
                    annotations,
                    recording,
                    last_frame: self.last_completed,
                })
            }
            Err(e) => {
                self.state = EngineState::Failed;
                let end = StreamEnd::Failed {
                    last_completed: self.last_completed,
                    reason: e.to_string(),
                };
                if let Err(sink_err) = sink.finish(&end) {
                    tracing::warn!("Sink failed to finish after replay error: {}", sink_err);
                }
                tracing::error!(
                    code = e.code(),
                    last_frame = self.last_completed,
                    "Replay failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    fn lost(&self, err: SimError) -> DrishtiError {
        DrishtiError::from_sim(err, WorkUnit::Frame, self.last_completed)
    }

    fn run_frames(&mut self, sink: &mut dyn FrameSink, annotations: &mut u64) -> Result<()> {
        let Some(replay) = self.replay.as_ref() else {
            return Ok(());
        };
        let (ego, camera, per_frame) = (replay.ego, replay.camera, replay.ticks_per_frame);
        let mut end = replay.total_frames;
        if let Some(max) = self.config.max_frames {
            end = end.min(self.next_frame.saturating_add(max));
        }

        while self.next_frame < end {
            self.state = EngineState::Replaying;
            for _ in 0..per_frame {
                self.sim.tick().map_err(|e| self.lost(e))?;
            }

            self.state = EngineState::Fetching;
            let image = self.sim.camera_image(camera).map_err(|e| self.lost(e))?;
            let camera_pose = self.sim.actor_transform(camera).map_err(|e| self.lost(e))?;
            let lights = self.sim.traffic_lights().map_err(|e| self.lost(e))?;
            let actors = self.sim.actors().map_err(|e| self.lost(e))?;

            self.state = EngineState::Annotating;
            let Some(replay) = self.replay.as_ref() else {
                return Ok(());
            };
            let boxes = replay
                .annotator
                .annotate(&camera_pose, &lights, &actors, Some(ego));
            let frame = Frame {
                index: self.next_frame,
                image,
                camera_pose,
                annotations: boxes,
            };
            sink.accept(&frame)?;

            *annotations += frame.annotations.len() as u64;
            self.last_completed = Some(frame.index);
            self.next_frame += 1;
            tracing::debug!(
                frame = frame.index,
                lights = lights.len(),
                annotations = frame.annotations.len(),
                "Frame annotated"
            );
        }
        Ok(())
    }

    /// Detach the camera and stop the replay. Safe to call repeatedly.
    fn release(&mut self) {
        let Some(replay) = self.replay.take() else {
            if let Err(e) = self.sim.stop_replay() {
                tracing::debug!("Stop replay: {}", e);
            }
            return;
        };
        if let Err(e) = self.sim.destroy_actor(replay.camera) {
            tracing::warn!("Failed to destroy camera {}: {}", replay.camera, e);
        }
        if let Err(e) = self.sim.stop_replay() {
            tracing::warn!("Failed to stop replay: {}", e);
        }
    }
}

impl Drop for AnnotationEngine<'_> {
    fn drop(&mut self) {
        if self.replay.is_some() {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_per_frame() {
        assert_eq!(ticks_per_frame(1.0, 0.05), 20);
        assert_eq!(ticks_per_frame(0.5, 0.05), 10);
        assert_eq!(ticks_per_frame(0.01, 0.05), 1);
        assert_eq!(ticks_per_frame(1.0, 0.0), 1);
    }

    #[test]
    fn test_default_config() {
        let config = AnnotationConfig::default();
        assert_eq!(config.weather, WeatherPreset::ClearNoon);
        assert_eq!(config.ego_role, "ego");
        assert!(config.max_frames.is_none());
    }
}
