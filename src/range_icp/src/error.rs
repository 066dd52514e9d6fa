//! Error taxonomy for rasterization and registration.
//!
//! Per-pixel rejections (invalid projections, gated outliers) are not errors;
//! they are counted in [`NormalEquations`](crate::objective::NormalEquations).

use thiserror::Error;

/// Errors raised by the registration core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// Invalid or missing configuration value, raised at construction.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The rasterizer could not run on the given frame/backend state.
    /// The frame is left untouched.
    #[error("rasterization precondition violated: {0}")]
    RasterizationPrecondition(String),

    /// Live and model data do not agree in dimensions or state.
    #[error("data mismatch: {0}")]
    DataMismatch(String),

    /// The normal matrix could not be inverted.
    #[error("singular normal equations: {0}")]
    SingularSystem(String),
}

impl RegistrationError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn mismatch(msg: impl Into<String>) -> Self {
        Self::DataMismatch(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RegistrationError>;
