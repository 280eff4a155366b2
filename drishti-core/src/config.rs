//! Aggregate pipeline configuration loaded from YAML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::annotate::AnnotationConfig;
use crate::camera::CameraConfig;
use crate::drive::DriveConfig;
use crate::error::{DrishtiError, Result};
use crate::route::PlannerConfig;
use crate::session::RecordingConfig;

/// Every core section in one document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub recording: RecordingConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub drive: DriveConfig,

    #[serde(default)]
    pub annotation: AnnotationConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| DrishtiError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| DrishtiError::Config(e.to_string()))
    }

    /// Reject values no session could run with.
    pub fn validate(&self) -> Result<()> {
        if self.recording.fixed_delta_seconds <= 0.0 {
            return Err(DrishtiError::Config(
                "recording.fixed_delta_seconds must be positive".to_string(),
            ));
        }
        if self.camera.sensor_tick <= 0.0 {
            return Err(DrishtiError::Config(
                "camera.sensor_tick must be positive".to_string(),
            ));
        }
        if self.camera.near_plane <= 0.0 {
            return Err(DrishtiError::Config(
                "camera.near_plane must be positive".to_string(),
            ));
        }
        if self.planner.sampling_resolution <= 0.0 || self.planner.node_merge_epsilon <= 0.0 {
            return Err(DrishtiError::Config(
                "planner resolutions must be positive".to_string(),
            ));
        }
        crate::camera::build_intrinsics(self.camera.width, self.camera.height, self.camera.fov_degrees)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::WeatherPreset;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
camera:
  width: 1920
  height: 1080
annotation:
  weather: HardRainNoon
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.camera.width, 1920);
        assert_eq!(config.camera.fov_degrees, 90.0);
        assert_eq!(config.annotation.weather, WeatherPreset::HardRainNoon);
        assert_eq!(config.planner, PlannerConfig::default());
        assert_eq!(config.recording.town, "Town01");
    }

    #[test]
    fn test_invalid_fov_rejected() {
        let yaml = "camera:\n  fov_degrees: 180.0\n";
        assert!(matches!(
            PipelineConfig::from_yaml(yaml),
            Err(DrishtiError::InvalidCalibration(_))
        ));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = PipelineConfig::default();
        let parsed = PipelineConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
