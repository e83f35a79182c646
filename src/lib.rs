//! # PPCL550 Control Library
//!
//! Control library for the Pure Photonics PPCL550 tunable diode laser: a
//! register-based serial protocol with checksummed frames, a device
//! readiness state machine, and the calibration-table interpolation engine
//! behind the module's pre-computed "clean" frequency jumps and continuous
//! sweeps.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: the 4-byte checksummed register frame, the register
//!   map, and the transport executing one transaction at a time over an
//!   exclusively-owned serial stream.
//! - **`status`**: status-register decoding and the bounded polling waits
//!   that gate every asynchronous command.
//! - **`calibration`**: per-serial-number calibration table loading and the
//!   pure two-axis setpoint interpolation, including the discontinuity
//!   handling for the folded filter tuning curves.
//! - **`laser`**: the driver itself — connect, output enable, frequency,
//!   power, grid, channel, and fine-tune control.
//! - **`sweep`** / **`jump`**: the clean-sweep and clean-jump controllers
//!   layered on the driver.
//! - **`trigger`**: the seam to the external analog trigger output.
//! - **`config`**: figment-based TOML + environment configuration.
//! - **`mock`**: a register-map emulator behind an in-memory serial pipe,
//!   used by the test suite and handy for development without hardware.
//! - **`error`**: the `LaserError` taxonomy shared by everything above.

pub mod calibration;
pub mod config;
pub mod error;
pub mod jump;
pub mod laser;
pub mod mock;
pub mod protocol;
pub mod status;
pub mod sweep;
pub mod tracing_setup;
pub mod trigger;

pub use calibration::{CalibrationSet, Setpoint};
pub use config::LaserConfig;
pub use error::{LaserError, Result};
pub use jump::JumpOutcome;
pub use laser::{Bounds, LaserMode, OutputState, Ppcl550};
pub use sweep::SweepState;
