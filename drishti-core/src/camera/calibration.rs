//! Pinhole intrinsics and the fixed roof mount.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::core::{BoundingBox, Location, Rotation, Transform};
use crate::error::{DrishtiError, Result};

/// Height of the camera above the vehicle's bounding box roof (meters).
pub const ROOF_CLEARANCE: f64 = 1.0;

/// Build the 3x3 pinhole intrinsic matrix.
///
/// The principal point sits at the image center and pixels are square, so
/// `fx = fy = (width / 2) / tan(fov / 2)` with `fov` the horizontal field of view.
pub fn build_intrinsics(width: u32, height: u32, fov_degrees: f64) -> Result<Matrix3<f64>> {
    if width == 0 || height == 0 {
        return Err(DrishtiError::InvalidCalibration(format!(
            "image size must be positive, got {}x{}",
            width, height
        )));
    }
    if !fov_degrees.is_finite() || fov_degrees <= 0.0 || fov_degrees >= 180.0 {
        return Err(DrishtiError::InvalidCalibration(format!(
            "field of view must lie in (0, 180) degrees, got {}",
            fov_degrees
        )));
    }

    let focal = (width as f64 / 2.0) / (fov_degrees.to_radians() / 2.0).tan();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;

    Ok(Matrix3::new(
        focal, 0.0, cx, //
        0.0, focal, cy, //
        0.0, 0.0, 1.0,
    ))
}

/// Camera parameters fixed for the lifetime of a recording.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraCalibration {
    width: u32,
    height: u32,
    fov_degrees: f64,
    intrinsics: Matrix3<f64>,
    /// Camera pose relative to the vehicle it is attached to.
    mount: Transform,
}

impl CameraCalibration {
    /// Create a calibration, validating the intrinsic parameters.
    pub fn new(width: u32, height: u32, fov_degrees: f64, mount: Transform) -> Result<Self> {
        let intrinsics = build_intrinsics(width, height, fov_degrees)?;
        Ok(Self {
            width,
            height,
            fov_degrees,
            intrinsics,
            mount,
        })
    }

    /// Forward-facing camera on the vehicle roof, centered over the box.
    pub fn roof_mounted(
        width: u32,
        height: u32,
        fov_degrees: f64,
        vehicle_bbox: &BoundingBox,
    ) -> Result<Self> {
        Self::new(width, height, fov_degrees, roof_mount(vehicle_bbox))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn fov_degrees(&self) -> f64 {
        self.fov_degrees
    }

    #[inline]
    pub fn intrinsics(&self) -> &Matrix3<f64> {
        &self.intrinsics
    }

    #[inline]
    pub fn mount(&self) -> &Transform {
        &self.mount
    }

    /// Focal length in pixels.
    #[inline]
    pub fn focal(&self) -> f64 {
        self.intrinsics[(0, 0)]
    }

    /// Vertical field of view in degrees, derived from the aspect ratio.
    pub fn vertical_fov_degrees(&self) -> f64 {
        2.0 * ((self.height as f64 / 2.0) / self.focal()).atan().to_degrees()
    }

    /// World pose of the camera given the world pose of its vehicle.
    pub fn camera_pose(&self, vehicle: &Transform) -> Transform {
        vehicle.compose(&self.mount)
    }
}

/// Mount pose one [`ROOF_CLEARANCE`] above the top of the vehicle box.
pub fn roof_mount(vehicle_bbox: &BoundingBox) -> Transform {
    Transform::new(
        Location::new(
            0.0,
            0.0,
            vehicle_bbox.location.z + vehicle_bbox.extent.z + ROOF_CLEARANCE,
        ),
        Rotation::default(),
    )
}

/// Serializable camera settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Image width in pixels (default: 640)
    #[serde(default = "default_width")]
    pub width: u32,

    /// Image height in pixels (default: 640)
    #[serde(default = "default_height")]
    pub height: u32,

    /// Horizontal field of view in degrees (default: 90)
    #[serde(default = "default_fov")]
    pub fov_degrees: f64,

    /// Seconds of simulation time between captured frames (default: 1.0)
    #[serde(default = "default_sensor_tick")]
    pub sensor_tick: f64,

    /// Near clipping plane in meters (default: 0.01)
    #[serde(default = "default_near_plane")]
    pub near_plane: f64,
}

fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    640
}
fn default_fov() -> f64 {
    90.0
}
fn default_sensor_tick() -> f64 {
    1.0
}
fn default_near_plane() -> f64 {
    0.01
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fov_degrees: default_fov(),
            sensor_tick: default_sensor_tick(),
            near_plane: default_near_plane(),
        }
    }
}
