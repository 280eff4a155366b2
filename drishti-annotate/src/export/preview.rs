//! Preview images with annotation boxes drawn.

use super::sink_error;
use super::yolo::to_rgb_image;
use crate::error::Result;
use drishti_core::annotate::{Category, Frame, FrameSink, StreamEnd};
use drishti_core::camera::PixelRect;
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

/// Outline thickness in pixels
const LINE_WIDTH: u32 = 2;

/// Box color per category
pub fn category_color(category: Category) -> Rgb<u8> {
    match category {
        Category::TrafficLightStop => Rgb([230, 30, 30]),
        Category::TrafficLightCaution => Rgb([250, 200, 0]),
        Category::TrafficLightGo => Rgb([30, 200, 60]),
        Category::TrafficLightUnknown => Rgb([160, 160, 160]),
    }
}

/// Draw a rectangle outline, clamped to the image
pub fn draw_rect(image: &mut RgbImage, rect: &PixelRect, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let xmax = rect.xmax.min(w - 1);
    let ymax = rect.ymax.min(h - 1);

    for t in 0..LINE_WIDTH {
        for x in rect.xmin..=xmax {
            for y in [rect.ymin + t, ymax.saturating_sub(t)] {
                if y < h {
                    image.put_pixel(x, y, color);
                }
            }
        }
        for y in rect.ymin..=ymax {
            for x in [rect.xmin + t, xmax.saturating_sub(t)] {
                if x < w {
                    image.put_pixel(x, y, color);
                }
            }
        }
    }
}

/// Frame sink writing one PNG per frame with its boxes drawn
pub struct PreviewWriter {
    dir: PathBuf,
    written: u64,
}

impl PreviewWriter {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{:06}.png", index))
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut image = to_rgb_image(&frame.image)?;
        for annotation in &frame.annotations {
            draw_rect(&mut image, &annotation.rect, category_color(annotation.category));
        }
        image.save(self.frame_path(frame.index))?;
        self.written += 1;
        Ok(())
    }
}

impl FrameSink for PreviewWriter {
    fn accept(&mut self, frame: &Frame) -> drishti_core::Result<()> {
        self.write_frame(frame).map_err(sink_error)
    }

    fn finish(&mut self, _end: &StreamEnd) -> drishti_core::Result<()> {
        tracing::info!("Wrote {} preview images to {:?}", self.written, self.dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drishti_core::annotate::Annotation2D;
    use drishti_core::core::Transform;
    use drishti_core::sim::CameraImage;
    use tempfile::TempDir;

    #[test]
    fn test_draw_rect_outline_only() {
        let mut image = RgbImage::new(20, 20);
        let rect = PixelRect {
            xmin: 4,
            ymin: 5,
            xmax: 15,
            ymax: 14,
        };
        let red = category_color(Category::TrafficLightStop);
        draw_rect(&mut image, &rect, red);

        assert_eq!(*image.get_pixel(4, 5), red);
        assert_eq!(*image.get_pixel(15, 14), red);
        assert_eq!(*image.get_pixel(10, 6), red);
        assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(2, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_rect_at_image_edge() {
        let mut image = RgbImage::new(10, 10);
        let rect = PixelRect {
            xmin: 0,
            ymin: 0,
            xmax: 9,
            ymax: 9,
        };
        draw_rect(&mut image, &rect, Rgb([1, 2, 3]));
        assert_eq!(*image.get_pixel(9, 9), Rgb([1, 2, 3]));
    }

    #[test]
    fn test_writes_png_per_frame() {
        let dir = TempDir::new().unwrap();
        let mut writer = PreviewWriter::new(&dir.path().join("preview")).unwrap();
        let frame = Frame {
            index: 3,
            image: CameraImage {
                frame: 60,
                width: 16,
                height: 12,
                data: vec![0; 16 * 12 * 3],
            },
            camera_pose: Transform::identity(),
            annotations: vec![Annotation2D {
                category: Category::TrafficLightGo,
                rect: PixelRect {
                    xmin: 2,
                    ymin: 2,
                    xmax: 8,
                    ymax: 10,
                },
                actor: 7,
            }],
        };
        writer.accept(&frame).unwrap();
        writer.finish(&StreamEnd::Completed { frames: 1 }).unwrap();

        let saved = image::open(writer.frame_path(3)).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (16, 12));
        assert_eq!(*saved.get_pixel(2, 2), category_color(Category::TrafficLightGo));
    }
}
