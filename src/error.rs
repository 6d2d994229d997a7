//! Error types for streaming convolution layers.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Input tensor shape is incompatible with the layer.
    #[error("Shape error: {0}")]
    Shape(String),

    /// Invalid construction parameters or a configuration that cannot stream.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A pipeline state slot holds state for a different kind of layer.
    #[error("Layer/state mismatch at pipeline index {index}")]
    StateMismatch { index: usize },
}

impl Error {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
