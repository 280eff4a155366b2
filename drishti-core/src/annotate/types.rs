//! Annotation records and the frame stream interface.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::camera::PixelRect;
use crate::core::{ActorId, Transform};
use crate::error::Result;
use crate::sim::{CameraImage, SignalState};

/// Annotation label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    TrafficLightStop,
    TrafficLightCaution,
    TrafficLightGo,
    TrafficLightUnknown,
}

impl Category {
    /// All labels in class-id order.
    pub const ALL: [Category; 4] = [
        Category::TrafficLightStop,
        Category::TrafficLightCaution,
        Category::TrafficLightGo,
        Category::TrafficLightUnknown,
    ];

    pub fn from_signal(state: SignalState) -> Self {
        match state {
            SignalState::Red => Category::TrafficLightStop,
            SignalState::Yellow => Category::TrafficLightCaution,
            SignalState::Green => Category::TrafficLightGo,
            SignalState::Off | SignalState::Unknown => Category::TrafficLightUnknown,
        }
    }

    /// Dense class id used by dataset exporters.
    pub fn class_id(self) -> u32 {
        match self {
            Category::TrafficLightStop => 0,
            Category::TrafficLightCaution => 1,
            Category::TrafficLightGo => 2,
            Category::TrafficLightUnknown => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Category::TrafficLightStop => "traffic_light_stop",
            Category::TrafficLightCaution => "traffic_light_caution",
            Category::TrafficLightGo => "traffic_light_go",
            Category::TrafficLightUnknown => "traffic_light_unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One labeled box in one image.
///
/// Coordinates always lie inside `[0, width) x [0, height)` and the box has
/// non-zero width and height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation2D {
    pub category: Category,
    pub rect: PixelRect,
    /// Traffic light the box belongs to.
    pub actor: ActorId,
}

/// One captured image with its annotations.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Position in the capture sequence of the recording, stable across runs.
    pub index: u64,
    pub image: CameraImage,
    pub camera_pose: Transform,
    pub annotations: Vec<Annotation2D>,
}

/// Terminal signal of a frame stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEnd {
    /// Every frame of the recording was emitted.
    Completed { frames: u64 },
    /// The replay stopped early. Frames up to `last_completed` are valid.
    Failed {
        last_completed: Option<u64>,
        reason: String,
    },
}

/// Consumer of annotated frames, called in temporal order.
pub trait FrameSink {
    fn accept(&mut self, frame: &Frame) -> Result<()>;

    /// Called exactly once after the last frame.
    fn finish(&mut self, end: &StreamEnd) -> Result<()>;
}

/// Sink keeping every frame in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub frames: Vec<Frame>,
    pub end: Option<StreamEnd>,
}

impl CollectingSink {
    pub fn annotations(&self) -> Vec<Vec<Annotation2D>> {
        self.frames.iter().map(|f| f.annotations.clone()).collect()
    }
}

impl FrameSink for CollectingSink {
    fn accept(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self, end: &StreamEnd) -> Result<()> {
        self.end = Some(end.clone());
        Ok(())
    }
}
