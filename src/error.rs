//! Error types for the evaluation harness.

use thiserror::Error;

/// Errors that can occur while running inference or evaluation.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("No valid pixels were accumulated; accuracy is undefined")]
    EmptyPopulation,
    #[error("Model error: {0}")]
    Model(String),
    #[error("Dataset error: {0}")]
    Dataset(String),
    #[error("Invalid flow file: {0}")]
    FlowFormat(String),
    #[error("Submission writer failed: {0}")]
    Writer(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EvalError {
    /// Shorthand for a `(height, width)` mismatch.
    pub fn shape(context: &'static str, expected: (usize, usize), actual: (usize, usize)) -> Self {
        EvalError::ShapeMismatch {
            context,
            expected,
            actual,
        }
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for EvalError {
    fn from(err: ndarray::ShapeError) -> Self {
        EvalError::Model(format!("tensor shape error: {}", err))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EvalError>;
