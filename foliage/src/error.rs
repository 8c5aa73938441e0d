use thiserror::Error;

use crate::placement::FoliageOperator;

#[derive(Debug, Error)]
pub enum FoliageError {
    #[error("Scene units must be Metric with a Unit Scale of 0.01!")]
    UnitsNotConfigured,
    #[error("{operator:?} is not available: {reason}")]
    OperatorUnavailable {
        operator: FoliageOperator,
        reason: &'static str,
    },
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<ron::error::SpannedError> for FoliageError {
    fn from(err: ron::error::SpannedError) -> Self {
        FoliageError::Parse(err.to_string())
    }
}

pub type FoliageResult<T> = Result<T, FoliageError>;
