//! Camera model: calibration, projection, frustum and occlusion tests.

pub mod calibration;
pub mod frustum;
pub mod occlusion;
pub mod projection;

pub use calibration::{CameraCalibration, CameraConfig, build_intrinsics, roof_mount};
pub use frustum::Frustum;
pub use occlusion::{is_occluded, is_opaque};
pub use projection::{
    DEFAULT_NEAR_PLANE, PixelBox, PixelRect, project_bounding_box, project_bounding_box_with_near,
    project_corners, project_point, to_camera, world_to_camera,
};
