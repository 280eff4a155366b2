//! Record-then-annotate tests on the mock simulator.
//!
//! Each test records a short drive through a mock town and replays it:
//! - Frames are emitted in order, with boxes inside the image
//! - Replays are idempotent and weather-invariant
//! - Resumed runs continue exactly where a failed run stopped
//! - Corrupt logs and dropped connections report the last good frame
//!
//! Run with: `cargo test --test pipeline`

mod common;

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

use common::{RECORDED_TICKS, annotate, record, small_camera};
use drishti_core::annotate::{
    AnnotationConfig, AnnotationEngine, CollectingSink, EngineState, Frame, FrameSink, StreamEnd,
};
use drishti_core::sim::WeatherPreset;
use drishti_core::sim::mock::{MockFaults, MockSimulator};
use drishti_core::{DrishtiError, WorkUnit};
use tempfile::TempDir;

/// Frames in a [`RECORDED_TICKS`] log at 20 ticks per frame.
const FRAMES: u64 = RECORDED_TICKS / 20;

#[test]
fn test_recording_summary() {
    let dir = TempDir::new().unwrap();
    let summary = record("Town01", dir.path());
    assert_eq!(summary.frames, RECORDED_TICKS);
    assert!(!summary.completed);
    assert!(summary.path.exists());
    let name = summary.path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Town01_") && name.ends_with(".log"));
}

#[test]
fn test_annotate_emits_every_frame_in_order() {
    let dir = TempDir::new().unwrap();
    let log = record("Town01", dir.path()).path;

    let mut sim = MockSimulator::default();
    let (result, sink) = annotate(&mut sim, &log, WeatherPreset::ClearNoon, None);
    let summary = result.unwrap();

    assert_eq!(summary.frames, FRAMES);
    assert_eq!(summary.last_frame, Some(FRAMES - 1));
    assert_eq!(sink.end, Some(StreamEnd::Completed { frames: FRAMES }));
    for (i, frame) in sink.frames.iter().enumerate() {
        assert_eq!(frame.index, i as u64);
        assert_eq!(frame.image.data.len(), frame.image.expected_len());
    }

    let camera = small_camera();
    let total: usize = sink.frames.iter().map(|f| f.annotations.len()).sum();
    assert_eq!(summary.annotations, total as u64);
    // The drive passes several signalized intersections.
    assert!(total > 0);
    for annotation in sink.frames.iter().flat_map(|f| &f.annotations) {
        let r = annotation.rect;
        assert!(r.xmin < r.xmax && r.ymin < r.ymax);
        assert!(r.xmax < camera.width && r.ymax < camera.height);
    }

    // Camera and replay are released.
    assert_eq!(sim.spawned_actor_count(), 1);
    assert!(!sim.is_replaying());
}

#[test]
fn test_replay_is_idempotent_and_weather_invariant() {
    let dir = TempDir::new().unwrap();
    let log = record("Town01", dir.path()).path;

    let (first, clear_a) = annotate(&mut MockSimulator::default(), &log, WeatherPreset::ClearNoon, None);
    let (second, clear_b) = annotate(&mut MockSimulator::default(), &log, WeatherPreset::ClearNoon, None);
    let (third, rain) = annotate(&mut MockSimulator::default(), &log, WeatherPreset::HardRainNoon, None);
    first.unwrap();
    second.unwrap();
    third.unwrap();

    assert_eq!(clear_a.annotations(), clear_b.annotations());
    assert_eq!(clear_a.annotations(), rain.annotations());
    assert_eq!(clear_a.frames[0].image, clear_b.frames[0].image);
    assert_ne!(clear_a.frames[0].image, rain.frames[0].image);
    for (a, b) in clear_a.frames.iter().zip(&rain.frames) {
        assert_eq!(a.camera_pose, b.camera_pose);
    }
}

#[test]
fn test_disconnect_then_resume() {
    let dir = TempDir::new().unwrap();
    let log = record("Town01", dir.path()).path;
    let (full, reference) = annotate(&mut MockSimulator::default(), &log, WeatherPreset::ClearNoon, None);
    full.unwrap();

    // Five frames of 20 ticks succeed, the 101st tick drops the connection.
    let mut faulty = MockSimulator::with_faults(MockFaults {
        disconnect_on_tick: Some(5 * 20 + 1),
        ..Default::default()
    });
    let (failed, partial) = annotate(&mut faulty, &log, WeatherPreset::ClearNoon, None);
    let err = failed.unwrap_err();
    match &err {
        DrishtiError::SimulatorConnection {
            unit,
            last_completed,
            ..
        } => {
            assert_eq!(*unit, WorkUnit::Frame);
            assert_eq!(*last_completed, Some(4));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(partial.frames.len(), 5);
    assert!(matches!(
        partial.end,
        Some(StreamEnd::Failed {
            last_completed: Some(4),
            ..
        })
    ));

    let (resumed, tail) = annotate(
        &mut MockSimulator::default(),
        &log,
        WeatherPreset::ClearNoon,
        err.resume_after(),
    );
    assert_eq!(resumed.unwrap().frames, FRAMES - 5);
    assert_eq!(tail.frames[0].index, 5);

    let mut stitched = partial.annotations();
    stitched.extend(tail.annotations());
    assert_eq!(stitched, reference.annotations());
}

#[test]
fn test_truncated_log_is_replay_corruption() {
    let dir = TempDir::new().unwrap();
    let log = record("Town01", dir.path()).path;
    let len = std::fs::metadata(&log).unwrap().len();
    let file = OpenOptions::new().write(true).open(&log).unwrap();
    file.set_len(len / 2).unwrap();
    drop(file);

    let (result, sink) = annotate(&mut MockSimulator::default(), &log, WeatherPreset::ClearNoon, None);
    let err = result.unwrap_err();
    let last = sink.frames.last().map(|f| f.index);
    assert!(matches!(
        err,
        DrishtiError::ReplayCorruption { last_good_frame, .. } if last_good_frame == last
    ));
    assert!(!sink.frames.is_empty());
    assert!((sink.frames.len() as u64) < FRAMES);
}

#[test]
fn test_unfinished_log_rejected_on_open() {
    let dir = TempDir::new().unwrap();
    let log = record("Town01", dir.path()).path;
    let mut file = OpenOptions::new().write(true).open(&log).unwrap();
    // Zeroed header, as left by a recorder that never finished.
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(&[0u8; 64]).unwrap();
    drop(file);

    let (result, sink) = annotate(&mut MockSimulator::default(), &log, WeatherPreset::ClearNoon, None);
    assert!(matches!(
        result,
        Err(DrishtiError::ReplayCorruption {
            last_good_frame: None,
            ..
        })
    ));
    assert!(sink.frames.is_empty());
}

#[test]
fn test_missing_ego_role() {
    let dir = TempDir::new().unwrap();
    let log = record("Town02", dir.path()).path;

    let mut sim = MockSimulator::default();
    let config = AnnotationConfig {
        ego_role: "hero".to_string(),
        ..Default::default()
    };
    let mut engine = AnnotationEngine::new(&mut sim, small_camera(), config);
    assert!(matches!(
        engine.open(&log, None),
        Err(DrishtiError::ReplayCorruption {
            last_good_frame: None,
            ..
        })
    ));
    assert_eq!(engine.state(), EngineState::Failed);
}

#[test]
fn test_resume_index_out_of_range() {
    let dir = TempDir::new().unwrap();
    let log = record("Town02", dir.path()).path;

    // Both the next frame and its start tick must fit in u64.
    for resume_after in [u64::MAX, u64::MAX / 10] {
        let mut sim = MockSimulator::default();
        {
            let mut engine = AnnotationEngine::new(&mut sim, small_camera(), AnnotationConfig::default());
            assert!(matches!(
                engine.open(&log, Some(resume_after)),
                Err(DrishtiError::Config(_))
            ));
            assert_eq!(engine.state(), EngineState::Failed);
        }
        assert!(!sim.is_replaying());
    }
}

#[test]
fn test_unbounded_max_frames() {
    let dir = TempDir::new().unwrap();
    let log = record("Town01", dir.path()).path;

    let mut sim = MockSimulator::default();
    let config = AnnotationConfig {
        max_frames: Some(u64::MAX),
        ..Default::default()
    };
    let mut engine = AnnotationEngine::new(&mut sim, small_camera(), config);
    engine.open(&log, Some(10)).unwrap();
    let mut sink = CollectingSink::default();
    let summary = engine.run(&mut sink).unwrap();
    assert_eq!(summary.frames, FRAMES - 11);
    assert_eq!(summary.last_frame, Some(FRAMES - 1));
}

/// Accepts every frame but cannot finish the stream.
struct FailingFinish {
    accepted: u64,
}

impl FrameSink for FailingFinish {
    fn accept(&mut self, _frame: &Frame) -> drishti_core::Result<()> {
        self.accepted += 1;
        Ok(())
    }

    fn finish(&mut self, _end: &StreamEnd) -> drishti_core::Result<()> {
        Err(DrishtiError::Sink("descriptor not written".into()))
    }
}

#[test]
fn test_finish_error_fails_engine() {
    let dir = TempDir::new().unwrap();
    let log = record("Town02", dir.path()).path;

    let mut sim = MockSimulator::default();
    let config = AnnotationConfig {
        max_frames: Some(2),
        ..Default::default()
    };
    let mut engine = AnnotationEngine::new(&mut sim, small_camera(), config);
    engine.open(&log, None).unwrap();
    let mut sink = FailingFinish { accepted: 0 };
    assert!(matches!(engine.run(&mut sink), Err(DrishtiError::Sink(_))));
    assert_eq!(sink.accepted, 2);
    assert_eq!(engine.state(), EngineState::Failed);
}

#[test]
fn test_max_frames_limits_run() {
    let dir = TempDir::new().unwrap();
    let log = record("Town02", dir.path()).path;

    let mut sim = MockSimulator::default();
    let config = AnnotationConfig {
        max_frames: Some(3),
        ..Default::default()
    };
    let mut engine = AnnotationEngine::new(&mut sim, small_camera(), config);
    engine.open(&log, Some(10)).unwrap();
    let mut sink = drishti_core::annotate::CollectingSink::default();
    let summary = engine.run(&mut sink).unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.last_frame, Some(13));
    assert_eq!(engine.state(), EngineState::Done);
}
