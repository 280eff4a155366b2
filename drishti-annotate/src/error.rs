//! Error types for the drishti-annotate tool

use drishti_core::DrishtiError;
use thiserror::Error;

/// Tool error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] DrishtiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset descriptor error: {0}")]
    Descriptor(#[from] serde_yaml::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl AppError {
    /// Frame index a re-run should resume after, if the failure was resumable.
    pub fn resume_after(&self) -> Option<u64> {
        match self {
            AppError::Core(e) => e.resume_after(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
