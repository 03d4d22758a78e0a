/// Error types of the PEM processing engine
use thiserror::Error;

use crate::data::Component;

pub type Result<T> = std::result::Result<T, PemError>;

#[derive(Error, Debug)]
pub enum PemError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Insufficient data: no active readings at station {station} ({component})")]
    InsufficientData { station: String, component: Component },

    #[error("Missing sensor data: {0}")]
    MissingSensorData(String),

    #[error("Missing geometry: {0}")]
    MissingGeometry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot rotate: {0}")]
    Unprocessed(String),

    #[error("File is already rotated. Re-rotation must be explicitly allowed")]
    AlreadyRotated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PemError {
    /// Shorthand for a parse error tied to a (1-indexed) line of the file
    pub fn at_line(line: usize, message: impl std::fmt::Display) -> Self {
        PemError::Parse(format!("line {line}: {message}"))
    }
}
