//! Parameter validation error shared by the strategy and risk configurations.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be {expected}, got {actual}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        actual: f64,
    },
    #[error("{0}")]
    Inconsistent(String),
}

impl ConfigError {
    pub(crate) fn out_of_range(field: &'static str, expected: &'static str, actual: f64) -> Self {
        ConfigError::OutOfRange {
            field,
            expected,
            actual,
        }
    }
}
