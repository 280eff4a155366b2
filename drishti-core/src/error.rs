//! Error types for drishti-core.
//!
//! Geometry edge cases (box behind the camera, zero area after clipping) are
//! not errors; they show up as `None` from the projection functions.

use std::fmt;

use thiserror::Error;

use crate::sim::SimError;

/// Unit of work a session reports progress in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkUnit {
    /// Index into the route's flattened waypoint sequence.
    Waypoint,
    /// Index of an emitted camera frame.
    Frame,
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkUnit::Waypoint => write!(f, "waypoint"),
            WorkUnit::Frame => write!(f, "frame"),
        }
    }
}

/// Formats an optional resume index for error messages.
fn describe_last(last: &Option<u64>) -> String {
    match last {
        Some(index) => index.to_string(),
        None => "none".to_string(),
    }
}

/// drishti-core error type
#[derive(Error, Debug)]
pub enum DrishtiError {
    #[error("Invalid camera calibration: {0}")]
    InvalidCalibration(String),

    #[error("Route planning failed: {0}")]
    RoutePlanning(String),

    #[error("Simulator connection lost ({reason}); last completed {unit}: {}", describe_last(.last_completed))]
    SimulatorConnection {
        unit: WorkUnit,
        last_completed: Option<u64>,
        reason: String,
    },

    #[error("Replay log corrupt ({reason}); last good frame: {}", describe_last(.last_good_frame))]
    ReplayCorruption {
        last_good_frame: Option<u64>,
        reason: String,
    },

    #[error("Frame sink error: {0}")]
    Sink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DrishtiError {
    /// Attach session progress to a simulator failure.
    ///
    /// Corrupt-log failures become [`DrishtiError::ReplayCorruption`]; every
    /// other simulator failure is a fatal connection error.
    pub fn from_sim(err: SimError, unit: WorkUnit, last_completed: Option<u64>) -> Self {
        match err {
            SimError::Corrupt(reason) => DrishtiError::ReplayCorruption {
                last_good_frame: last_completed,
                reason,
            },
            other => DrishtiError::SimulatorConnection {
                unit,
                last_completed,
                reason: other.to_string(),
            },
        }
    }

    /// Index a caller can resume after, if the failure carries one.
    pub fn resume_after(&self) -> Option<u64> {
        match self {
            DrishtiError::SimulatorConnection { last_completed, .. } => *last_completed,
            DrishtiError::ReplayCorruption {
                last_good_frame, ..
            } => *last_good_frame,
            _ => None,
        }
    }

    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            DrishtiError::InvalidCalibration(_) => "INVALID_CALIBRATION",
            DrishtiError::RoutePlanning(_) => "ROUTE_PLANNING",
            DrishtiError::SimulatorConnection { .. } => "SIMULATOR_CONNECTION",
            DrishtiError::ReplayCorruption { .. } => "REPLAY_CORRUPTION",
            DrishtiError::Sink(_) => "SINK",
            DrishtiError::Io(_) => "IO",
            DrishtiError::Config(_) => "CONFIG",
        }
    }
}

pub type Result<T> = std::result::Result<T, DrishtiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sim_timeout_is_connection_error() {
        let err = DrishtiError::from_sim(
            SimError::Timeout("tick".into()),
            WorkUnit::Waypoint,
            Some(41),
        );
        assert!(matches!(err, DrishtiError::SimulatorConnection { .. }));
        assert_eq!(err.resume_after(), Some(41));
        assert_eq!(err.code(), "SIMULATOR_CONNECTION");
    }

    #[test]
    fn test_from_sim_corrupt_is_replay_corruption() {
        let err = DrishtiError::from_sim(
            SimError::Corrupt("truncated frame".into()),
            WorkUnit::Frame,
            Some(7),
        );
        assert!(matches!(
            err,
            DrishtiError::ReplayCorruption {
                last_good_frame: Some(7),
                ..
            }
        ));
    }

    #[test]
    fn test_display_without_progress() {
        let err = DrishtiError::SimulatorConnection {
            unit: WorkUnit::Frame,
            last_completed: None,
            reason: "refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "Simulator connection lost (refused); last completed frame: none"
        );
    }
}
