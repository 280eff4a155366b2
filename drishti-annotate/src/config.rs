//! Configuration loading for drishti-annotate

use crate::error::{AppError, Result};
use drishti_core::PipelineConfig;
use drishti_core::annotate::AnnotationConfig;
use drishti_core::camera::CameraConfig;
use drishti_core::drive::DriveConfig;
use drishti_core::route::PlannerConfig;
use drishti_core::session::RecordingConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
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
    #[serde(default)]
    pub export: ExportConfig,
}

/// Simulator bridge connection settings
#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionConfig {
    /// Bridge host (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// Bridge TCP port (default: 2000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout for each blocking call in milliseconds (default: 10000)
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// TCP connect timeout in milliseconds (default: 5000)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

/// Image format of exported dataset frames
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpg,
    Png,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

/// Dataset export settings
#[derive(Clone, Debug, Deserialize)]
pub struct ExportConfig {
    /// Dataset root directory (default: dataset)
    #[serde(default = "default_export_dir")]
    pub output_dir: PathBuf,

    /// Dataset name, used for the descriptor file (default: traffic_lights)
    #[serde(default = "default_dataset_name")]
    pub name: String,

    /// Share of frames moved to the validation split (default: 0.2)
    #[serde(default = "default_val_ratio")]
    pub val_ratio: f64,

    /// Exported image format (default: jpg)
    #[serde(default)]
    pub image_format: ImageFormat,

    /// Also write preview images with boxes drawn (default: false)
    #[serde(default)]
    pub preview: bool,

    /// Skip frames without any annotation (default: false)
    #[serde(default)]
    pub skip_empty: bool,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    2000
}
fn default_timeout() -> u64 {
    10_000
}
fn default_connect_timeout() -> u64 {
    5000
}
fn default_export_dir() -> PathBuf {
    PathBuf::from("dataset")
}
fn default_dataset_name() -> String {
    "traffic_lights".to_string()
}
fn default_val_ratio() -> f64 {
    0.2
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_timeout(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_export_dir(),
            name: default_dataset_name(),
            val_ratio: default_val_ratio(),
            image_format: ImageFormat::default(),
            preview: false,
            skip_empty: false,
        }
    }
}

impl ConnectionConfig {
    /// Full address string for connection
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl ToolConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;
        let config: ToolConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Core sections as one pipeline configuration
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            recording: self.recording.clone(),
            camera: self.camera.clone(),
            planner: self.planner.clone(),
            drive: self.drive.clone(),
            annotation: self.annotation.clone(),
        }
    }

    /// Reject values no session could run with
    pub fn validate(&self) -> Result<()> {
        self.pipeline().validate()?;
        if !(0.0..1.0).contains(&self.export.val_ratio) {
            return Err(AppError::Config(format!(
                "export.val_ratio must be in [0, 1), got {}",
                self.export.val_ratio
            )));
        }
        if self.connection.timeout_ms == 0 {
            return Err(AppError::Config(
                "connection.timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drishti_core::sim::WeatherPreset;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: ToolConfig = toml::from_str("").unwrap();
        assert_eq!(config.connection.address(), "127.0.0.1:2000");
        assert_eq!(config.recording.town, "Town01");
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.export.val_ratio, 0.2);
        assert_eq!(config.export.image_format, ImageFormat::Jpg);
        config.validate().unwrap();
    }

    #[test]
    fn test_sections_override() {
        let config: ToolConfig = toml::from_str(
            r#"
            [connection]
            host = "10.0.0.5"
            timeout_ms = 2500

            [recording]
            town = "Town10HD"

            [annotation]
            weather = "HardRainNoon"

            [export]
            name = "lights_v2"
            image_format = "png"
            val_ratio = 0.1
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.address(), "10.0.0.5:2000");
        assert_eq!(config.connection.timeout(), Duration::from_millis(2500));
        assert_eq!(config.recording.town, "Town10HD");
        assert_eq!(config.annotation.weather, WeatherPreset::HardRainNoon);
        assert_eq!(config.export.image_format.extension(), "png");
        assert_eq!(config.pipeline().recording.town, "Town10HD");
    }

    #[test]
    fn test_sample_file_matches_defaults() {
        let config: ToolConfig = toml::from_str(include_str!("../drishti.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.pipeline(), ToolConfig::default().pipeline());
        assert_eq!(config.export.name, "traffic_lights");
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let mut config = ToolConfig::default();
        config.export.val_ratio = 1.0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = ToolConfig::default();
        config.camera.fov_degrees = 0.0;
        assert!(matches!(config.validate(), Err(AppError::Core(_))));
    }
}
