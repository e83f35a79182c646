//! Clean-jump controller: fast, pre-computed frequency jumps.
//!
//! A jump retunes the laser without letting its internal loops hunt: the
//! target frequency is staged in write-only registers, the drive current and
//! sled temperature the target needs are computed from the calibration
//! tables and staged as well, and four commit pulses (one per staged
//! quantity) make the module take them all at once.
//!
//! Sequencing is everything here. The staging registers change nothing until
//! the commit pulses, so any failure — incomplete calibration, an
//! unresolvable filter discontinuity — aborts the jump before the first
//! pulse and leaves the laser at its previous frequency.

use tracing::{debug, info, warn};

use crate::calibration::{interp, Setpoint};
use crate::error::{LaserError, Result};
use crate::laser::{LaserMode, Ppcl550};
use crate::protocol::registers;
use crate::trigger;

/// Number of commit pulses: one per staged quantity (frequency, current,
/// sled temperature, plus the execute itself), by protocol convention.
const COMMIT_PULSES: usize = 4;

/// What a completed jump committed to the module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpOutcome {
    /// Frequency the module was told to jump to, THz.
    pub target_frequency: f64,
    /// Setpoints computed for the target and staged alongside it.
    pub setpoint: Setpoint,
}

impl Ppcl550 {
    /// Frequency currently staged in the next-frequency registers, if any.
    ///
    /// The physical registers are write-only; this is the local image of the
    /// last value written, authoritative until overwritten.
    pub fn next_frequency(&self) -> Option<f64> {
        self.next_frequency
    }

    /// Stage a target frequency in the next-frequency register pair.
    ///
    /// The value is clamped to the device frequency limits before anything
    /// touches the wire. Returns the frequency actually staged.
    pub async fn stage_next_frequency(&mut self, f_thz: f64) -> Result<f64> {
        let bounds = self.frequency_bounds();
        let staged = if bounds.contains(f_thz) {
            f_thz
        } else {
            let clamped = bounds.clamp(f_thz);
            warn!(
                requested = f_thz,
                clamped,
                "next frequency outside device limits, clamping"
            );
            clamped
        };

        let thz = staged.floor();
        let ghz10 = ((staged - thz) * 1e4).floor();
        self.transport.write(registers::CJ_FCF1, thz as u16).await?;
        self.transport
            .write(registers::CJ_FCF2, ghz10 as u16)
            .await?;
        self.next_frequency = Some(staged);
        debug!(staged, "next frequency staged");
        Ok(staged)
    }

    /// Sled temperature estimate from the module-reported tuning slope,
    /// for the currently staged frequency.
    pub async fn staged_sled_from_slope(&mut self) -> Result<f64> {
        let f = self.next_frequency.ok_or_else(|| {
            LaserError::InvalidState("no next frequency staged".into())
        })?;
        let raw = self.transport.read(registers::SLED_SLOPE).await? as i16;
        let slope = -f64::from(raw) / 1e4;

        let power = self.power().await?;
        let bounds = self.power_bounds();
        let calibration = self
            .calibration
            .as_ref()
            .ok_or_else(|| LaserError::MissingCalibration("no calibration set loaded".into()))?;
        interp::sled_from_slope(calibration, f, power, bounds.min, bounds.max, slope)
    }

    /// Execute a clean jump of `delta_thz` relative to the current output
    /// frequency.
    ///
    /// Turns the output on if needed, enters whisper mode, stages the target
    /// and its interpolated setpoints, then issues the commit pulses. Fails
    /// without committing if the calibration set is incomplete or the filter
    /// interpolation is undefined at the target.
    pub async fn clean_jump(&mut self, delta_thz: f64) -> Result<JumpOutcome> {
        // Calibration gate first: cheapest check, and no register traffic
        // happens for a jump that can never commit.
        let complete = self.calibration.as_ref().is_some_and(|c| c.is_complete());
        if !complete {
            let missing = self
                .calibration
                .as_ref()
                .map(|c| format!("{:?}", c.missing()))
                .unwrap_or_else(|| "all tables".into());
            return Err(LaserError::MissingCalibration(format!(
                "clean jump needs the full calibration set, missing: {missing}"
            )));
        }

        if !self.is_on().await? {
            self.on().await?;
        }
        self.set_mode(LaserMode::Whisper).await?;
        self.settle("whisper mode for jump").await?;

        let current = self.frequency().await?;
        let target = self.stage_next_frequency(current + delta_thz).await?;

        let power = self.power().await?;
        let bounds = self.power_bounds();
        let calibration = self
            .calibration
            .as_ref()
            .ok_or_else(|| LaserError::MissingCalibration("no calibration set loaded".into()))?;
        let setpoint = interp::setpoint(calibration, target, power, bounds.min, bounds.max)?;
        debug!(?setpoint, target, "jump setpoints computed");

        self.transport
            .write(registers::CJ_CURRENT, (setpoint.current * 10.0).round() as u16)
            .await?;
        self.transport
            .write(registers::CJ_SLED, (setpoint.sled * 100.0).round() as u16)
            .await?;

        for _ in 0..COMMIT_PULSES {
            self.transport.write(registers::CJ_EXECUTE, 1).await?;
        }
        self.settle("jump execution").await?;
        info!(from = current, to = target, "clean jump executed");

        if self.config.trigger.enabled {
            if let Some(output) = self.trigger.clone() {
                tokio::time::sleep(self.config.trigger.jump_delay).await;
                trigger::fire_pulse(output.as_ref(), &self.config.trigger).await?;
            }
        }

        Ok(JumpOutcome {
            target_frequency: target,
            setpoint,
        })
    }
}
