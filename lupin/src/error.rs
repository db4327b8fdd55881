use thiserror::Error;

/// Errors raised by the inference engine
#[derive(Error, Debug)]
pub enum LupinError {
    /// inconsistent options, shapes or factor counts
    #[error("configuration error: {0}")]
    Configuration(String),

    /// missing views or groups, unobserved views, malformed tables
    #[error("data error: {0}")]
    Data(String),

    /// ELBO regression or non-finite parameters
    #[error("numerical error: {0}")]
    Numerical(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// a failing kernel call on an opened backend
    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, LupinError>;

impl From<candle_core::Error> for LupinError {
    fn from(e: candle_core::Error) -> Self {
        LupinError::Backend(e.to_string())
    }
}

impl From<anyhow::Error> for LupinError {
    fn from(e: anyhow::Error) -> Self {
        LupinError::Backend(e.to_string())
    }
}
