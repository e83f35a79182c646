//! Error types for the laser control library.
//!
//! This module defines the primary error type, `LaserError`, used across the
//! whole crate. Using the `thiserror` crate, it provides a single taxonomy for
//! everything that can go wrong between the serial link and the setpoint
//! engine:
//!
//! - **`Protocol`**: a malformed or checksum-failed frame, a device-rejected
//!   command, or a transport-level I/O failure. Never retried automatically;
//!   retry policy belongs to callers.
//! - **`Timeout`**: a transport read or a polling wait that exceeded its
//!   bound. Distinct from `IndeterminateState`: a timeout on a plain read
//!   leaves the device where it was, an abandoned completion wait does not.
//! - **`InvalidState`**: an operation attempted while the laser, sweep, or
//!   jump state machine is in the wrong state. Rejected before any register
//!   write, so there is no side effect to undo.
//! - **`OutOfRange`**: a frequency/power/grid/channel/fine-tune value outside
//!   the device limits, for the fields whose policy is to reject rather than
//!   clamp.
//! - **`MissingCalibration`** / **`InvalidCalibration`**: calibration files
//!   absent for this serial number, or present but malformed. Missing
//!   calibration degrades clean-jump operation only.
//! - **`UndefinedInterpolation`**: the filter calibration curves are
//!   discontinuous around the target and neither sub-bracket resolves the
//!   branch; the in-progress jump aborts before commit.
//! - **`IndeterminateState`**: a completion wait was abandoned and the
//!   device's true state is unknown. Must never be collapsed into plain
//!   success or failure.
//!
//! No error is used for normal control flow; every public operation returns
//! either a value or one of these kinds.

use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type Result<T> = std::result::Result<T, LaserError>;

/// Primary error type for the laser control library.
#[derive(Error, Debug)]
pub enum LaserError {
    /// Malformed frame, checksum mismatch, or device-rejected command.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A transport read or polling wait exceeded its bound.
    #[error("timed out {0}")]
    Timeout(String),

    /// Operation attempted in the wrong laser/sweep/jump state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Value outside the device limits for a field that rejects.
    #[error("{field} {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Calibration files absent for this device serial number.
    #[error("missing calibration: {0}")]
    MissingCalibration(String),

    /// Calibration file present but malformed.
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    /// Filter discontinuity that neither sub-bracket resolves.
    #[error("undefined interpolation: {0}")]
    UndefinedInterpolation(String),

    /// A completion wait was abandoned; the device's true state is unknown.
    #[error("indeterminate device state: {0}")]
    IndeterminateState(String),

    /// Configuration values that parse but fail semantic validation.
    #[error("configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("calibration file error: {0}")]
    Csv(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[cfg(feature = "instrument_serial")]
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
}

impl From<figment::Error> for LaserError {
    fn from(err: figment::Error) -> Self {
        LaserError::Config(Box::new(err))
    }
}
