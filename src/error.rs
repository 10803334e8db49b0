use std::time::Duration;

use thiserror::Error;

use crate::types::AcquisitionStatus;

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Acquisition failed (last status {status:?}): {reason}")]
    AcquisitionFailed {
        status: AcquisitionStatus,
        reason: String,
    },
    #[error("Acquisition timed out after {elapsed:?} (last status {last_status:?})")]
    AcquisitionTimeout {
        elapsed: Duration,
        last_status: AcquisitionStatus,
    },
    #[error("Acquisition cancelled")]
    Cancelled,
    #[error("Driver call {operation} failed: {message}")]
    Driver {
        operation: &'static str,
        message: String,
    },
    #[error("WaveForms runtime error: {0}")]
    Library(#[from] libloading::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Render error: {0}")]
    Render(String),
}

impl ScopeError {
    pub(crate) fn driver(operation: &'static str, message: impl Into<String>) -> Self {
        ScopeError::Driver {
            operation,
            message: message.into(),
        }
    }

    /// True for the failures that happen after the device was armed.
    pub fn is_acquisition_error(&self) -> bool {
        matches!(
            self,
            ScopeError::AcquisitionFailed { .. }
                | ScopeError::AcquisitionTimeout { .. }
                | ScopeError::Cancelled
        )
    }
}
