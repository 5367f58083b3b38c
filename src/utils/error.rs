//! Error types for the training pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for training operations
#[derive(Error, Debug)]
pub enum TrainError {
    /// The model output directory must not exist before a run
    #[error("{0} already exists")]
    OutputExists(PathBuf),

    /// Dataset layout or content problem
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// A class the pipeline depends on is not present in the dataset
    #[error("Class '{0}' not found in dataset")]
    MissingClass(String),

    /// Error loading or decoding an image
    #[error("Image error: {0}")]
    Image(String),

    /// Error building, saving or loading the model
    #[error("Model error: {0}")]
    Model(String),

    /// Error inside the training loop
    #[error("Training error: {0}")]
    Training(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TrainError {
    fn from(err: serde_json::Error) -> Self {
        TrainError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for TrainError {
    fn from(err: image::ImageError) -> Self {
        TrainError::Image(err.to_string())
    }
}

impl From<burn::record::RecorderError> for TrainError {
    fn from(err: burn::record::RecorderError) -> Self {
        TrainError::Model(format!("{:?}", err))
    }
}

/// Convenience Result type for training operations
pub type Result<T> = std::result::Result<T, TrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_exists_message() {
        let err = TrainError::OutputExists(PathBuf::from("models/run1"));
        assert_eq!(err.to_string(), "models/run1 already exists");
    }

    #[test]
    fn test_missing_class_message() {
        let err = TrainError::MissingClass("covid-19".to_string());
        assert_eq!(err.to_string(), "Class 'covid-19' not found in dataset");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TrainError = io_err.into();
        assert!(matches!(err, TrainError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: TrainError = json_err.into();
        assert!(matches!(err, TrainError::Serialization(_)));
    }
}
