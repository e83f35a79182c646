//! Calibration tables and the setpoint interpolation engine.

pub mod interp;
pub mod store;

pub use interp::{setpoint, Bracket, Setpoint, FILTER_REFERENCE_TEMP, POWER_TIER_EDGE};
pub use store::{CalRow, CalibrationSet, CalibrationTable, TableKind};
