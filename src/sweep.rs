//! Clean-sweep controller: continuous frequency sweeps around the set
//! central frequency.
//!
//! The module sweeps on its own once armed; the driver's job is sequencing.
//! Starting a sweep writes speed and range, makes sure the output is on and
//! in whisper mode, honours the recommended settle time, and only then sets
//! the enable register. Stopping first waits for the live frequency offset
//! to come back near the centre, so the module re-locks close to where it
//! will end up, then disables the sweep and returns to dither mode.
//!
//! Transitions are validated: starting while a sweep is running, or stopping
//! while idle, is an error rather than a best-effort write.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::{LaserError, Result};
use crate::laser::{LaserMode, Ppcl550};
use crate::protocol::registers;
use crate::trigger;

/// Recommended pause between entering whisper mode and enabling the sweep.
const PRE_ENABLE_SETTLE: Duration = Duration::from_millis(500);

/// Live offset (100 MHz units) considered "back at the centre".
const OFFSET_SETTLE_LIMIT: i16 = 20;

/// Interval between offset polls while stopping.
const OFFSET_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Largest sweep range the device family accepts, in the vendor's range
/// units; values above the standard window need the extended-sweep
/// calibration.
const RANGE_LIMIT: u32 = 250_000;
const STANDARD_RANGE_LIMIT: u32 = 150_000;

/// Sweep controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    /// Speed and range written, sweep not yet enabled.
    Armed,
    Sweeping,
}

impl Ppcl550 {
    pub fn sweep_state(&self) -> SweepState {
        self.sweep
    }

    /// Last commanded sweep speed in GHz/s.
    ///
    /// The speed register is write-only, so this is the locally cached image
    /// and is `None` until a speed has been commanded.
    pub fn sweep_speed(&self) -> Option<f64> {
        self.sweep_speed
    }

    /// Command the sweep speed in GHz/s.
    ///
    /// The register takes MHz/s; values beyond its capacity are clamped to
    /// the maximum with a warning. Returns the speed actually commanded.
    pub async fn set_sweep_speed(&mut self, ghz_per_s: f64) -> Result<f64> {
        let mhz_per_s = ghz_per_s * 1000.0;
        let commanded = if mhz_per_s > 0.0 && mhz_per_s < f64::from(u16::MAX) {
            mhz_per_s
        } else {
            warn!(
                requested = ghz_per_s,
                max = f64::from(u16::MAX) / 1000.0,
                "sweep speed outside device capability, clamping"
            );
            f64::from(u16::MAX)
        };
        self.transport
            .write(registers::CS_SPEED, commanded as u16)
            .await?;
        let ghz = commanded / 1000.0;
        self.sweep_speed = Some(ghz);
        Ok(ghz)
    }

    /// Configured sweep range from the device.
    pub async fn sweep_range(&mut self) -> Result<u16> {
        self.transport.read(registers::CS_RANGE).await
    }

    /// Command the sweep range.
    ///
    /// Ranges above the standard window are accepted with a warning since
    /// they need the extended-sweep calibration; ranges beyond the device
    /// capability, or too large for the register, are rejected.
    pub async fn set_sweep_range(&mut self, range: u32) -> Result<()> {
        if range == 0 || range > RANGE_LIMIT {
            return Err(LaserError::OutOfRange {
                field: "sweep range",
                value: f64::from(range),
                min: 1.0,
                max: f64::from(RANGE_LIMIT),
            });
        }
        if range > STANDARD_RANGE_LIMIT {
            warn!(range, "extended sweep range, calibration files required");
        }
        let raw: u16 = range.try_into().map_err(|_| LaserError::OutOfRange {
            field: "sweep range register",
            value: f64::from(range),
            min: 0.0,
            max: f64::from(u16::MAX),
        })?;
        self.transport.write(registers::CS_RANGE, raw).await?;
        Ok(())
    }

    /// Live frequency offset from the sweep centre, in 100 MHz units.
    pub async fn sweep_offset(&mut self) -> Result<i16> {
        Ok(self.transport.read(registers::CS_OFFSET).await? as i16)
    }

    /// Arm and start a continuous sweep.
    ///
    /// If a trigger output is attached and enabled, a pulse fires after the
    /// time the first sweep excursion takes (1.5 range/speed) plus the
    /// configured delay.
    pub async fn clean_sweep_start(&mut self, speed_ghz_per_s: f64, range: u32) -> Result<()> {
        if self.sweep == SweepState::Sweeping {
            return Err(LaserError::InvalidState("sweep already running".into()));
        }

        let speed = self.set_sweep_speed(speed_ghz_per_s).await?;
        self.set_sweep_range(range).await?;
        self.sweep = SweepState::Armed;

        self.on().await?;
        self.set_mode(LaserMode::Whisper).await?;
        self.settle("whisper mode for sweep").await?;
        tokio::time::sleep(PRE_ENABLE_SETTLE).await;

        self.transport.write(registers::CS_ENABLE, 1).await?;
        self.sweep = SweepState::Sweeping;
        info!(speed_ghz_per_s = speed, range, "clean sweep enabled");

        if self.config.trigger.enabled {
            if let Some(output) = self.trigger.clone() {
                let excursion = Duration::from_secs_f64(1.5 * f64::from(range) / speed);
                tokio::time::sleep(excursion + self.config.trigger.sweep_delay).await;
                trigger::fire_pulse(output.as_ref(), &self.config.trigger).await?;
            }
        }
        Ok(())
    }

    /// Stop a running sweep.
    ///
    /// Waits (bounded) for the live offset to settle within the centre
    /// window before disabling, then returns the laser to dither mode. On a
    /// settle timeout nothing has been written and the sweep keeps running.
    pub async fn clean_sweep_stop(&mut self) -> Result<()> {
        if self.sweep != SweepState::Sweeping {
            return Err(LaserError::InvalidState("no sweep in progress".into()));
        }

        let deadline = tokio::time::Instant::now() + self.config.operation_timeout;
        loop {
            let offset = self.sweep_offset().await?;
            if offset.abs() <= OFFSET_SETTLE_LIMIT {
                break;
            }
            if tokio::time::Instant::now() + OFFSET_POLL_INTERVAL > deadline {
                return Err(LaserError::Timeout(format!(
                    "waiting for sweep offset to settle (still {offset} x 100 MHz)"
                )));
            }
            tokio::time::sleep(OFFSET_POLL_INTERVAL).await;
        }

        self.transport.write(registers::CS_ENABLE, 0).await?;
        self.settle("sweep disable").await?;
        self.set_mode(LaserMode::Dither).await?;
        self.settle("dither mode after sweep").await?;
        self.sweep = SweepState::Idle;
        info!("clean sweep disabled");
        Ok(())
    }
}
