//! YOLO dataset export.
//!
//! Layout under the dataset root:
//!
//! ```text
//! <name>.yaml
//! images/{train,val}/000042.jpg
//! labels/{train,val}/000042.txt
//! ```
//!
//! Frames land in `train` as they stream in. When the stream completes, the
//! last `val_ratio` share of frames (by index) moves to `val`. A failed stream
//! leaves everything in `train` so a resumed run can append to it.

use super::sink_error;
use crate::config::{ExportConfig, ImageFormat};
use crate::error::{AppError, Result};
use drishti_core::DrishtiError;
use drishti_core::annotate::{Annotation2D, Category, Frame, FrameSink, StreamEnd};
use drishti_core::sim::CameraImage;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const TRAIN: &str = "train";
const VAL: &str = "val";

/// Dataset descriptor read by YOLO trainers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub path: PathBuf,
    pub train: String,
    pub val: String,
    pub nc: usize,
    pub names: Vec<String>,
}

impl DatasetDescriptor {
    fn new(root: &Path) -> Self {
        Self {
            path: root.to_path_buf(),
            train: format!("images/{}", TRAIN),
            val: format!("images/{}", VAL),
            nc: Category::ALL.len(),
            names: Category::ALL.iter().map(|c| c.name().to_string()).collect(),
        }
    }
}

/// Convert an RGB8 camera image for encoding
pub fn to_rgb_image(image: &CameraImage) -> Result<RgbImage> {
    RgbImage::from_raw(image.width, image.height, image.data.clone()).ok_or_else(|| {
        AppError::Core(DrishtiError::Sink(format!(
            "frame {} holds {} bytes for {}x{}",
            image.frame,
            image.data.len(),
            image.width,
            image.height
        )))
    })
}

/// One label line per box: `class x_center y_center width height`
pub fn label_lines(annotations: &[Annotation2D], width: u32, height: u32) -> String {
    let mut out = String::new();
    for a in annotations {
        let (xc, yc, w, h) = a.rect.to_yolo(width, height);
        let _ = writeln!(
            out,
            "{} {:.6} {:.6} {:.6} {:.6}",
            a.category.class_id(),
            xc,
            yc,
            w,
            h
        );
    }
    out
}

/// Frame sink writing a YOLO detection dataset
pub struct YoloDatasetExporter {
    root: PathBuf,
    name: String,
    val_ratio: f64,
    format: ImageFormat,
    skip_empty: bool,
    /// Frame indices currently in the train split
    frames: Vec<u64>,
    annotations: u64,
}

impl YoloDatasetExporter {
    /// Create the directory layout, picking up frames of an earlier partial run
    pub fn new(config: &ExportConfig) -> Result<Self> {
        let root = config.output_dir.clone();
        for kind in ["images", "labels"] {
            for split in [TRAIN, VAL] {
                fs::create_dir_all(root.join(kind).join(split))?;
            }
        }

        let mut frames = Vec::new();
        for entry in fs::read_dir(root.join("labels").join(TRAIN))? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "txt")
                && let Some(index) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u64>().ok())
            {
                frames.push(index);
            }
        }
        frames.sort_unstable();
        if !frames.is_empty() {
            tracing::info!(
                "Dataset {:?} already holds {} training frames",
                root,
                frames.len()
            );
        }

        Ok(Self {
            root,
            name: config.name.clone(),
            val_ratio: config.val_ratio,
            format: config.image_format,
            skip_empty: config.skip_empty,
            frames,
            annotations: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the descriptor file
    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join(format!("{}.yaml", self.name))
    }

    /// Frames written so far, including those of earlier runs
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn image_path(&self, split: &str, index: u64) -> PathBuf {
        self.root
            .join("images")
            .join(split)
            .join(format!("{:06}.{}", index, self.format.extension()))
    }

    fn label_path(&self, split: &str, index: u64) -> PathBuf {
        self.root
            .join("labels")
            .join(split)
            .join(format!("{:06}.txt", index))
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.skip_empty && frame.annotations.is_empty() {
            return Ok(());
        }

        let image = to_rgb_image(&frame.image)?;
        image.save(self.image_path(TRAIN, frame.index))?;
        let labels = label_lines(&frame.annotations, frame.image.width, frame.image.height);
        fs::write(self.label_path(TRAIN, frame.index), labels)?;

        if let Err(pos) = self.frames.binary_search(&frame.index) {
            self.frames.insert(pos, frame.index);
        }
        self.annotations += frame.annotations.len() as u64;
        Ok(())
    }

    /// Move the trailing share of frames into the validation split
    fn split(&mut self) -> Result<usize> {
        let val_count = (self.frames.len() as f64 * self.val_ratio).floor() as usize;
        let moved = self.frames.split_off(self.frames.len() - val_count);
        for &index in &moved {
            fs::rename(self.image_path(TRAIN, index), self.image_path(VAL, index))?;
            fs::rename(self.label_path(TRAIN, index), self.label_path(VAL, index))?;
        }
        Ok(moved.len())
    }

    fn write_descriptor(&self) -> Result<()> {
        let root = fs::canonicalize(&self.root)?;
        let yaml = serde_yaml::to_string(&DatasetDescriptor::new(&root))?;
        fs::write(self.descriptor_path(), yaml)?;
        Ok(())
    }

    fn finish_stream(&mut self, end: &StreamEnd) -> Result<()> {
        match end {
            StreamEnd::Completed { .. } => {
                let val = self.split()?;
                tracing::info!(
                    "Dataset complete: {} train, {} val frames, {} boxes this run",
                    self.frames.len(),
                    val,
                    self.annotations
                );
            }
            StreamEnd::Failed { last_completed, .. } => {
                tracing::warn!(
                    "Stream failed after frame {:?}; {} frames kept in train for resume",
                    last_completed,
                    self.frames.len()
                );
            }
        }
        self.write_descriptor()
    }
}

impl FrameSink for YoloDatasetExporter {
    fn accept(&mut self, frame: &Frame) -> drishti_core::Result<()> {
        self.write_frame(frame).map_err(sink_error)
    }

    fn finish(&mut self, end: &StreamEnd) -> drishti_core::Result<()> {
        self.finish_stream(end).map_err(sink_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drishti_core::camera::PixelRect;
    use drishti_core::core::Transform;
    use tempfile::TempDir;

    fn frame(index: u64, boxes: usize) -> Frame {
        let annotations = (0..boxes)
            .map(|i| Annotation2D {
                category: Category::ALL[i % 4],
                rect: PixelRect {
                    xmin: 2,
                    ymin: 1,
                    xmax: 6,
                    ymax: 3,
                },
                actor: 100 + i as u64,
            })
            .collect();
        Frame {
            index,
            image: CameraImage {
                frame: index * 20,
                width: 8,
                height: 4,
                data: vec![90; 8 * 4 * 3],
            },
            camera_pose: Transform::identity(),
            annotations,
        }
    }

    fn config(dir: &TempDir) -> ExportConfig {
        ExportConfig {
            output_dir: dir.path().join("dataset"),
            name: "lights".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_label_format() {
        let lines = label_lines(&frame(0, 2).annotations, 8, 4);
        assert_eq!(
            lines,
            "0 0.500000 0.500000 0.500000 0.500000\n1 0.500000 0.500000 0.500000 0.500000\n"
        );
    }

    #[test]
    fn test_completed_stream_splits_last_share() {
        let dir = TempDir::new().unwrap();
        let mut exporter = YoloDatasetExporter::new(&config(&dir)).unwrap();
        for i in 0..10 {
            exporter.accept(&frame(i, 1)).unwrap();
        }
        exporter
            .finish(&StreamEnd::Completed { frames: 10 })
            .unwrap();

        let root = exporter.root().to_path_buf();
        assert!(root.join("images/train/000007.jpg").exists());
        assert!(root.join("images/val/000008.jpg").exists());
        assert!(root.join("labels/val/000009.txt").exists());
        assert!(!root.join("labels/train/000009.txt").exists());
        assert_eq!(exporter.frame_count(), 8);

        let yaml = fs::read_to_string(exporter.descriptor_path()).unwrap();
        let descriptor: DatasetDescriptor = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(descriptor.nc, 4);
        assert_eq!(descriptor.names[0], "traffic_light_stop");
        assert_eq!(descriptor.val, "images/val");
    }

    #[test]
    fn test_failed_stream_keeps_train_for_resume() {
        let dir = TempDir::new().unwrap();
        let mut first = YoloDatasetExporter::new(&config(&dir)).unwrap();
        for i in 0..5 {
            first.accept(&frame(i, 0)).unwrap();
        }
        first
            .finish(&StreamEnd::Failed {
                last_completed: Some(4),
                reason: "disconnected".into(),
            })
            .unwrap();
        assert_eq!(first.frame_count(), 5);

        let mut resumed = YoloDatasetExporter::new(&config(&dir)).unwrap();
        assert_eq!(resumed.frame_count(), 5);
        for i in 5..10 {
            resumed.accept(&frame(i, 1)).unwrap();
        }
        resumed
            .finish(&StreamEnd::Completed { frames: 5 })
            .unwrap();
        assert_eq!(resumed.frame_count(), 8);
        assert!(resumed.root().join("labels/val/000008.txt").exists());
        // Frames without boxes still get an empty label file.
        let empty = fs::read_to_string(resumed.root().join("labels/train/000000.txt")).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_skip_empty_frames() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.skip_empty = true;
        let mut exporter = YoloDatasetExporter::new(&config).unwrap();
        exporter.accept(&frame(0, 0)).unwrap();
        exporter.accept(&frame(1, 3)).unwrap();
        assert_eq!(exporter.frame_count(), 1);
    }

    #[test]
    fn test_bad_image_is_sink_error() {
        let dir = TempDir::new().unwrap();
        let mut exporter = YoloDatasetExporter::new(&config(&dir)).unwrap();
        let mut bad = frame(0, 1);
        bad.image.data.truncate(10);
        assert!(matches!(exporter.accept(&bad), Err(DrishtiError::Sink(_))));
    }
}
