//! Driver for the tunable laser module.
//!
//! Protocol overview:
//! - 4-byte checksummed register frames over RS-232 (9600 8N1 by default),
//!   see [`crate::protocol`].
//! - Frequency, power, grid, and channel setters are asynchronous on the
//!   device: the driver polls the status register after each one.
//! - Everything the original exposed as a register-backed attribute is an
//!   explicit async operation here; nothing does device I/O behind a plain
//!   accessor.
//!
//! The driver owns its serial link exclusively and every operation takes
//! `&mut self`, so no two register transactions can ever be in flight on the
//! same device.
//!
//! ## Configuration
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! calibration_dir = "calibration"
//!
//! [trigger]
//! enabled = false
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use crate::calibration::CalibrationSet;
use crate::config::LaserConfig;
use crate::error::{LaserError, Result};
use crate::protocol::{registers, DynSerial, RegisterTransport};
use crate::status::{self, DeviceStatus};
use crate::sweep::SweepState;
use crate::trigger::TriggerOutput;

/// Speed of light, m/s.
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Serial numbers identify calibration files by their first characters.
const SERIAL_NUMBER_LEN: usize = 10;

// =============================================================================
// Unit conversions
// =============================================================================

/// Convert frequency in THz to wavelength in nm.
///
/// Truncated (not rounded) to 9 significant decimal digits for
/// compatibility with the module's own arithmetic; the same truncation makes
/// the function its own approximate inverse.
pub fn frequency_to_wavelength(f_thz: f64) -> f64 {
    ((SPEED_OF_LIGHT / f_thz) * 100.0).floor() / 100000.0
}

/// Convert wavelength in nm to frequency in THz.
pub fn wavelength_to_frequency(w_nm: f64) -> f64 {
    ((SPEED_OF_LIGHT / w_nm) * 100.0).floor() / 100000.0
}

/// Convert dBm to mW.
pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

// =============================================================================
// Driver types
// =============================================================================

/// Inclusive device limits for a settable quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Laser tuning mode.
///
/// The mode register reads 0 in dither mode and 2 in whisper (low-noise)
/// mode; writing 1 requests whisper, writing 0 requests dither. Sweeps and
/// jumps require whisper mode; locking after output enable is faster in
/// dither mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaserMode {
    Dither,
    Whisper,
}

/// Explicit output state, checked before any state-dependent register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Off,
    Emitting,
}

/// Driver handle for one laser module on one serial link.
pub struct Ppcl550 {
    pub(crate) transport: RegisterTransport,
    pub(crate) config: LaserConfig,
    pub(crate) trigger: Option<Arc<dyn TriggerOutput>>,
    serial_number: String,
    frequency_bounds: Bounds,
    power_bounds: Bounds,
    pub(crate) calibration: Option<CalibrationSet>,
    /// Last commanded power; the power register is only meaningful while
    /// the output is on, so reads while off fall back to this.
    set_power_dbm: Option<f64>,
    /// Local image of the write-only next-frequency staging registers.
    pub(crate) next_frequency: Option<f64>,
    /// Local image of the write-only sweep-speed register, GHz/s.
    pub(crate) sweep_speed: Option<f64>,
    pub(crate) sweep: SweepState,
}

impl Ppcl550 {
    /// Connect over an already-open serial stream.
    ///
    /// Drains stale bytes, identifies the module, reads the device limits,
    /// and loads the calibration set for its serial number. A missing or
    /// partial calibration set leaves the driver in degraded mode: every
    /// operation except clean jumps stays available.
    pub async fn connect(
        link: DynSerial,
        config: LaserConfig,
        trigger: Option<Arc<dyn TriggerOutput>>,
    ) -> Result<Self> {
        let mut transport = RegisterTransport::new(link, config.transport_timeout);
        transport.drain().await;

        let mut serial_number = transport.read_string(registers::SERIAL_NUMBER).await?;
        serial_number.truncate(SERIAL_NUMBER_LEN);
        info!(serial = %serial_number, "connected to laser module");

        let frequency_bounds = Self::read_frequency_bounds(&mut transport).await?;
        let power_bounds = Self::read_power_bounds(&mut transport).await?;
        info!(
            f_min = frequency_bounds.min,
            f_max = frequency_bounds.max,
            p_min = power_bounds.min,
            p_max = power_bounds.max,
            "device limits"
        );

        let calibration = match CalibrationSet::load(&serial_number, &config.calibration_dir) {
            Ok(set) => {
                if !set.is_complete() {
                    warn!(
                        missing = ?set.missing(),
                        "calibration incomplete, clean jumps unavailable"
                    );
                }
                Some(set)
            }
            Err(e) => {
                warn!(error = %e, "calibration load failed, clean jumps unavailable");
                None
            }
        };

        Ok(Self {
            transport,
            config,
            trigger,
            serial_number,
            frequency_bounds,
            power_bounds,
            calibration,
            set_power_dbm: None,
            next_frequency: None,
            sweep_speed: None,
            sweep: SweepState::Idle,
        })
    }

    /// Open the configured hardware serial port and connect.
    #[cfg(feature = "instrument_serial")]
    pub async fn connect_serial(
        config: LaserConfig,
        trigger: Option<Arc<dyn TriggerOutput>>,
    ) -> Result<Self> {
        use tokio_serial::SerialPortBuilderExt;

        let port = config.port.clone();
        let baud = config.baud_rate;
        let stream = tokio::task::spawn_blocking(move || {
            tokio_serial::new(&port, baud)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
        })
        .await
        .map_err(|e| LaserError::Protocol(format!("serial open task failed: {e}")))??;

        Self::connect(Box::new(stream), config, trigger).await
    }

    async fn read_frequency_bounds(transport: &mut RegisterTransport) -> Result<Bounds> {
        let lfl1 = transport.read(registers::LFL1).await?;
        let lfl2 = transport.read(registers::LFL2).await?;
        let lfh1 = transport.read(registers::LFH1).await?;
        let lfh2 = transport.read(registers::LFH2).await?;
        Ok(Bounds {
            min: f64::from(lfl1) + f64::from(lfl2) * 1e-5,
            max: f64::from(lfh1) + f64::from(lfh2) * 1e-5,
        })
    }

    async fn read_power_bounds(transport: &mut RegisterTransport) -> Result<Bounds> {
        let low = transport.read(registers::OPSL).await? as i16;
        let high = transport.read(registers::OPSH).await? as i16;
        Ok(Bounds {
            min: f64::from(low) * 0.01,
            max: f64::from(high) * 0.01,
        })
    }

    /// Shut the link down, optionally switching the output off first.
    pub async fn close(mut self, switch_off: bool) -> Result<()> {
        if switch_off && self.is_on().await? {
            self.off().await?;
            info!("laser output disabled on close");
        }
        Ok(())
    }

    // =========================================================================
    // Identity, status, calibration
    // =========================================================================

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn frequency_bounds(&self) -> Bounds {
        self.frequency_bounds
    }

    pub fn power_bounds(&self) -> Bounds {
        self.power_bounds
    }

    /// Wavelength limits corresponding to the frequency limits (inverted).
    pub fn wavelength_bounds(&self) -> Bounds {
        Bounds {
            min: frequency_to_wavelength(self.frequency_bounds.max),
            max: frequency_to_wavelength(self.frequency_bounds.min),
        }
    }

    pub fn calibration(&self) -> Option<&CalibrationSet> {
        self.calibration.as_ref()
    }

    /// All calibration tables present for this serial number.
    pub fn is_calibrated(&self) -> bool {
        self.calibration.as_ref().is_some_and(|c| c.is_complete())
    }

    /// Fresh status register read.
    pub async fn status(&mut self) -> Result<DeviceStatus> {
        status::read_status(&mut self.transport).await
    }

    /// Detailed module status register.
    pub async fn detailed_status(&mut self) -> Result<u16> {
        self.transport.read(registers::DL_STATUS).await
    }

    /// Module ready for its output to be enabled.
    pub async fn is_ready(&mut self) -> Result<bool> {
        Ok(self.status().await?.module_ready())
    }

    /// Wait for the pending operation to finish, converting an expired wait
    /// into `IndeterminateState`: the command may still land after we stop
    /// looking.
    pub(crate) async fn settle(&mut self, what: &str) -> Result<()> {
        status::await_operation_complete(
            &mut self.transport,
            self.config.operation_poll_interval,
            self.config.operation_timeout,
        )
        .await
        .map_err(|e| match e {
            LaserError::Timeout(_) => LaserError::IndeterminateState(format!(
                "{what} may still be in flight after abandoned completion wait"
            )),
            other => other,
        })
    }

    // =========================================================================
    // Output enable
    // =========================================================================

    /// Current output state from the enable register.
    pub async fn output_state(&mut self) -> Result<OutputState> {
        match self.transport.read(registers::RESENA).await? {
            0 => Ok(OutputState::Off),
            8 => Ok(OutputState::Emitting),
            other => Err(LaserError::Protocol(format!(
                "unexpected output-enable register value {other:#06x}"
            ))),
        }
    }

    pub async fn is_on(&mut self) -> Result<bool> {
        Ok(self.output_state().await? == OutputState::Emitting)
    }

    /// Enable the output. No-op if already emitting.
    ///
    /// Locking is faster in dither mode, so a whisper-mode laser is dropped
    /// to dither for the enable and restored afterwards. Blocks until the
    /// module reports ready, then until the enable completes.
    pub async fn on(&mut self) -> Result<()> {
        if self.is_on().await? {
            return Ok(());
        }

        let restore_whisper = match self.mode().await? {
            LaserMode::Whisper => {
                self.set_mode(LaserMode::Dither).await?;
                true
            }
            LaserMode::Dither => false,
        };

        status::await_module_ready(
            &mut self.transport,
            self.config.ready_poll_interval,
            self.config.operation_timeout,
        )
        .await?;

        self.transport.write(registers::RESENA, 8).await?;
        self.settle("output enable").await?;

        if restore_whisper {
            self.set_mode(LaserMode::Whisper).await?;
            self.settle("mode restore").await?;
        }

        if !self.is_on().await? {
            return Err(LaserError::Protocol(
                "module did not report output enabled".into(),
            ));
        }
        info!("laser output enabled");
        Ok(())
    }

    /// Disable the output. No-op if already off.
    pub async fn off(&mut self) -> Result<()> {
        if !self.is_on().await? {
            return Ok(());
        }
        self.transport.write(registers::RESENA, 0).await?;
        self.settle("output disable").await?;
        info!("laser output disabled");
        Ok(())
    }

    // =========================================================================
    // Tuning mode
    // =========================================================================

    pub async fn mode(&mut self) -> Result<LaserMode> {
        match self.transport.read(registers::MODE).await? {
            0 => Ok(LaserMode::Dither),
            2 => Ok(LaserMode::Whisper),
            other => Err(LaserError::Protocol(format!(
                "unexpected mode register value {other:#06x}"
            ))),
        }
    }

    pub async fn set_mode(&mut self, mode: LaserMode) -> Result<()> {
        let value = match mode {
            LaserMode::Dither => 0,
            LaserMode::Whisper => 1,
        };
        self.transport.write(registers::MODE, value).await?;
        Ok(())
    }

    // =========================================================================
    // Frequency
    // =========================================================================

    /// Reconstruct the output frequency in THz from its registers:
    /// central frequency (THz + 1e-4 THz + MHz parts), fine-tune offset,
    /// and the channel/grid contribution.
    pub async fn frequency(&mut self) -> Result<f64> {
        let thz = self.transport.read(registers::FCF1).await?;
        let ghz10 = self.transport.read(registers::FCF2).await?;
        let mhz = self.transport.read(registers::FCF_MHZ).await?;
        let ftf = self.transport.read(registers::FTF).await?;
        let channel = self.channel().await?;
        let grid = self.grid().await?;

        Ok(f64::from(thz)
            + f64::from(ghz10) / 1e4
            + (f64::from(mhz) + f64::from(ftf)) / 1e6
            + f64::from(channel.saturating_sub(1)) * grid / 1000.0)
    }

    /// Set the central frequency in THz.
    ///
    /// Hard precondition: the output must be off. The target decomposes into
    /// the integer-THz and 1e-4-THz registers; the fine-tune offset is
    /// zeroed and the channel reset to 1 so the central frequency is the
    /// whole story afterwards.
    pub async fn set_frequency(&mut self, f_thz: f64) -> Result<()> {
        if self.is_on().await? {
            return Err(LaserError::InvalidState(
                "frequency can only be set while the output is off".into(),
            ));
        }
        if !self.frequency_bounds.contains(f_thz) {
            return Err(LaserError::OutOfRange {
                field: "frequency",
                value: f_thz,
                min: self.frequency_bounds.min,
                max: self.frequency_bounds.max,
            });
        }

        let thz = f_thz.floor();
        let ghz10 = ((f_thz - thz) * 1e4).floor();
        self.transport.write(registers::FCF1, thz as u16).await?;
        self.transport.write(registers::FCF2, ghz10 as u16).await?;
        self.set_fine_tune(0).await?;
        self.set_channel(1).await?;
        self.settle("frequency change").await?;
        info!(f_thz, "central frequency set");
        Ok(())
    }

    /// Output wavelength in nm.
    pub async fn wavelength(&mut self) -> Result<f64> {
        Ok(frequency_to_wavelength(self.frequency().await?))
    }

    /// Set the wavelength in nm (converted to a frequency set).
    pub async fn set_wavelength(&mut self, w_nm: f64) -> Result<()> {
        self.set_frequency(wavelength_to_frequency(w_nm)).await
    }

    // =========================================================================
    // Power
    // =========================================================================

    /// Output power in dBm.
    ///
    /// While emitting this is the module's measured output power; while off
    /// the last commanded setpoint is returned instead, or `InvalidState`
    /// if none was ever set.
    pub async fn power(&mut self) -> Result<f64> {
        if self.is_on().await? {
            let raw = self.transport.read(registers::OOP).await? as i16;
            Ok(f64::from(raw) * 0.01)
        } else {
            self.set_power_dbm.ok_or_else(|| {
                LaserError::InvalidState(
                    "output is off and no power setpoint has been commanded".into(),
                )
            })
        }
    }

    /// Set the output power in dBm, clamped to the device limits.
    ///
    /// The power register is only writable while the output is off; an
    /// emitting laser is switched off for the write and back on afterwards.
    pub async fn set_power(&mut self, dbm: f64) -> Result<()> {
        let target = if self.power_bounds.contains(dbm) {
            dbm
        } else {
            let clamped = self.power_bounds.clamp(dbm);
            warn!(
                requested = dbm,
                clamped,
                "power outside device limits, clamping"
            );
            clamped
        };

        let was_on = self.is_on().await?;
        if was_on {
            self.off().await?;
        }

        let raw = (target * 100.0).round() as i16 as u16;
        self.transport.write(registers::POWER, raw).await?;
        self.set_power_dbm = Some(target);
        info!(dbm = target, "power setpoint written");

        if was_on {
            self.on().await?;
        }
        Ok(())
    }

    // =========================================================================
    // Grid and channel
    // =========================================================================

    /// Grid spacing in GHz.
    pub async fn grid(&mut self) -> Result<f64> {
        let ghz10 = self.transport.read(registers::GRID).await?;
        let mhz = self.transport.read(registers::GRID_MHZ).await?;
        Ok(f64::from(ghz10) / 10.0 + f64::from(mhz) / 1000.0)
    }

    /// Minimum supported grid spacing in GHz.
    pub async fn grid_min(&mut self) -> Result<f64> {
        let ghz10 = self.transport.read(registers::GRID_MIN).await?;
        let mhz = self.transport.read(registers::GRID_MIN_MHZ).await?;
        Ok(f64::from(ghz10) / 10.0 + f64::from(mhz) / 1000.0)
    }

    /// Set the grid spacing in GHz. Requires the output off.
    pub async fn set_grid(&mut self, ghz: f64) -> Result<()> {
        if self.is_on().await? {
            return Err(LaserError::InvalidState(
                "grid spacing can only be set while the output is off".into(),
            ));
        }
        let minimum = self.grid_min().await?;
        if ghz < minimum {
            return Err(LaserError::OutOfRange {
                field: "grid spacing",
                value: ghz,
                min: minimum,
                max: f64::MAX,
            });
        }
        let ghz10 = (ghz * 10.0).floor();
        let mhz = ((ghz - ghz10 / 10.0) * 1000.0).floor();
        self.transport.write(registers::GRID, ghz10 as u16).await?;
        self.transport.write(registers::GRID_MHZ, mhz as u16).await?;
        Ok(())
    }

    /// Channel number (32 bits across two registers).
    pub async fn channel(&mut self) -> Result<u32> {
        let low = self.transport.read(registers::CHANNEL).await?;
        let high = self.transport.read(registers::CHANNEL_H).await?;
        Ok(u32::from(low) | u32::from(high) << 16)
    }

    /// Select a channel. The module retunes to
    /// `central frequency + (channel - 1) * grid`, switching its output off
    /// and on by itself, so the driver waits for completion.
    pub async fn set_channel(&mut self, channel: u32) -> Result<()> {
        if channel == 0 {
            return Err(LaserError::OutOfRange {
                field: "channel",
                value: 0.0,
                min: 1.0,
                max: f64::from(u32::MAX),
            });
        }
        // High word first, matching the module's expectations.
        self.transport
            .write(registers::CHANNEL_H, (channel >> 16) as u16)
            .await?;
        self.transport
            .write(registers::CHANNEL, (channel & 0xFFFF) as u16)
            .await?;
        self.settle("channel change").await?;
        Ok(())
    }

    // =========================================================================
    // Fine-tune offset
    // =========================================================================

    /// Fine-tune frequency offset in MHz.
    pub async fn fine_tune(&mut self) -> Result<u16> {
        self.transport.read(registers::FTF).await
    }

    /// Fine-tune range in MHz.
    pub async fn fine_tune_range(&mut self) -> Result<u16> {
        self.transport.read(registers::FTF_RANGE).await
    }

    /// Set the fine-tune offset in MHz, clamped to the device range.
    ///
    /// Unlike the central frequency this is adjustable while emitting.
    pub async fn set_fine_tune(&mut self, mhz: u16) -> Result<u16> {
        let range = self.fine_tune_range().await?;
        let target = if mhz > range {
            warn!(requested = mhz, range, "fine-tune offset clamped to range");
            range
        } else {
            mhz
        };
        self.transport.write(registers::FTF, target).await?;
        Ok(target)
    }

    /// Shift the fine-tune offset by a signed amount, flooring at zero.
    pub async fn adjust_fine_tune(&mut self, delta_mhz: i32) -> Result<u16> {
        let current = i64::from(self.fine_tune().await?);
        let next = (current + i64::from(delta_mhz)).max(0).min(i64::from(u16::MAX));
        self.set_fine_tune(next as u16).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_truncates_not_rounds() {
        // 299792458 / 193.5 THz = 1549315.028... -> 1549.31502 nm, the
        // third-from-last digit kept, the rest dropped.
        let w = frequency_to_wavelength(193.5);
        assert_eq!(w, 1549.31502);
    }

    #[test]
    fn conversion_is_its_own_approximate_inverse() {
        for w in [1530.0, 1540.12345, 1549.31502, 1565.4321] {
            let roundtrip = frequency_to_wavelength(wavelength_to_frequency(w));
            assert!(
                (roundtrip - w).abs() < 1e-5,
                "w = {w}, roundtrip = {roundtrip}"
            );
        }
    }

    #[test]
    fn dbm_conversion() {
        assert!((dbm_to_mw(0.0) - 1.0).abs() < 1e-12);
        assert!((dbm_to_mw(10.0) - 10.0).abs() < 1e-12);
        assert!((dbm_to_mw(13.5) - 22.387211).abs() < 1e-6);
    }

    #[test]
    fn bounds_clamp_and_contain() {
        let b = Bounds {
            min: 191.35,
            max: 196.25,
        };
        assert!(b.contains(193.5));
        assert!(!b.contains(200.0));
        assert_eq!(b.clamp(200.0), 196.25);
        assert_eq!(b.clamp(100.0), 191.35);
    }
}
