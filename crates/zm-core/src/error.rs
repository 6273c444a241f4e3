//! Error types for zmorph

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum ZmError {
    #[error("DSP error: {0}")]
    Dsp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Shape data error: {0}")]
    ShapeData(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias
pub type ZmResult<T> = Result<T, ZmError>;
