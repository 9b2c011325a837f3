//! Error types shared across the datalogger

use thiserror_no_std::Error;

/// Errors reported by the datalogger engine.
///
/// Use of an engine that is not initialized is not an error: those calls are
/// silent no-ops and report `Skipped` through their outcome types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DataloggerError<E> {
    #[error("storage device error: {0:?}")]
    Device(E),
    #[error("no free slot left on the device and restart-if-full is not set")]
    DeviceFull,
}

impl<E> DataloggerError<E> {
    pub(crate) fn device(error: E) -> Self {
        Self::Device(error)
    }
}

/// Rejected [`DataloggerConfig`](crate::config::DataloggerConfig) values.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sample interval must be nonzero, below 60 and divide 60 (got {0} min)")]
    InvalidSampleInterval(u8),
    #[error("save interval must be nonzero, below 60 and divide 60 (got {0} min)")]
    InvalidSaveInterval(u8),
}

/// Failure to acquire a raw data set from the sensors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleError {
    #[error("sensor conversion timed out")]
    Timeout,
    #[error("sensor read failed")]
    ReadError,
}

/// Failure of a bounded ready poll.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WaitError<E> {
    #[error("storage device error: {0:?}")]
    Device(E),
    #[error("device still busy after {0} us")]
    Timeout(u32),
}
