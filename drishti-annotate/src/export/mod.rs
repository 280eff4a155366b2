//! Frame sinks writing annotated frames to disk.

pub mod preview;
pub mod yolo;

pub use preview::PreviewWriter;
pub use yolo::YoloDatasetExporter;

use crate::error::AppError;
use drishti_core::DrishtiError;
use drishti_core::annotate::{Frame, FrameSink, StreamEnd};

/// Report a tool error through the core sink interface
pub(crate) fn sink_error(e: AppError) -> DrishtiError {
    match e {
        AppError::Core(inner) => inner,
        other => DrishtiError::Sink(other.to_string()),
    }
}

/// Forwards every frame to several sinks in order
#[derive(Default)]
pub struct FanOut {
    sinks: Vec<Box<dyn FrameSink>>,
}

impl FanOut {
    pub fn push(&mut self, sink: Box<dyn FrameSink>) {
        self.sinks.push(sink);
    }
}

impl FrameSink for FanOut {
    fn accept(&mut self, frame: &Frame) -> drishti_core::Result<()> {
        for sink in &mut self.sinks {
            sink.accept(frame)?;
        }
        Ok(())
    }

    /// Every sink is finished even if an earlier one fails
    fn finish(&mut self, end: &StreamEnd) -> drishti_core::Result<()> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.finish(end) {
                tracing::warn!("Sink failed to finish: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
        name: &'static str,
        fail_finish: bool,
    }

    impl FrameSink for Recorder {
        fn accept(&mut self, frame: &Frame) -> drishti_core::Result<()> {
            self.log
                .borrow_mut()
                .push(format!("{}:{}", self.name, frame.index));
            Ok(())
        }

        fn finish(&mut self, _end: &StreamEnd) -> drishti_core::Result<()> {
            self.log.borrow_mut().push(format!("{}:end", self.name));
            if self.fail_finish {
                Err(DrishtiError::Sink("disk full".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_fan_out_order_and_finish() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut fan = FanOut::default();
        fan.push(Box::new(Recorder {
            log: Rc::clone(&log),
            name: "a",
            fail_finish: true,
        }));
        fan.push(Box::new(Recorder {
            log: Rc::clone(&log),
            name: "b",
            fail_finish: false,
        }));

        let frame = Frame {
            index: 4,
            image: drishti_core::sim::CameraImage {
                frame: 80,
                width: 1,
                height: 1,
                data: vec![0; 3],
            },
            camera_pose: drishti_core::core::Transform::identity(),
            annotations: vec![],
        };
        fan.accept(&frame).unwrap();
        assert!(fan.finish(&StreamEnd::Completed { frames: 1 }).is_err());
        assert_eq!(*log.borrow(), vec!["a:4", "b:4", "a:end", "b:end"]);
    }
}
