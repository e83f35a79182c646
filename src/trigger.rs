//! Trigger output seam.
//!
//! Sweeps and jumps can announce themselves to downstream acquisition
//! hardware with an analog voltage pulse. The peripheral that produces the
//! voltage (a DAC card, usually) is an external collaborator; the driver
//! only decides when to raise the line, to what level, and for how long.
//! This module defines that seam plus a recording implementation for tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::TriggerConfig;
use crate::error::Result;

/// An analog output line the driver can command to a voltage.
#[async_trait]
pub trait TriggerOutput: Send + Sync {
    /// Drive the output to `volts` and leave it there.
    async fn write_voltage(&self, volts: f64) -> Result<()>;
}

/// Raise the trigger line, hold it for the configured idle width, drop it.
pub async fn fire_pulse(output: &dyn TriggerOutput, config: &TriggerConfig) -> Result<()> {
    debug!(
        volts = config.pulse_voltage,
        width_ms = config.idle_width.as_millis() as u64,
        "firing trigger pulse"
    );
    output.write_voltage(config.pulse_voltage).await?;
    tokio::time::sleep(config.idle_width).await;
    output.write_voltage(0.0).await?;
    Ok(())
}

/// Trigger double that records every commanded voltage.
#[derive(Clone, Default)]
pub struct RecordingTrigger {
    written: Arc<Mutex<Vec<f64>>>,
}

impl RecordingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every voltage commanded so far, in order.
    pub async fn voltages(&self) -> Vec<f64> {
        self.written.lock().await.clone()
    }
}

#[async_trait]
impl TriggerOutput for RecordingTrigger {
    async fn write_voltage(&self, volts: f64) -> Result<()> {
        self.written.lock().await.push(volts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn pulse_raises_then_returns_to_zero() {
        let trigger = RecordingTrigger::new();
        let config = TriggerConfig {
            enabled: true,
            idle_width: Duration::from_millis(1),
            ..TriggerConfig::default()
        };
        fire_pulse(&trigger, &config).await.unwrap();
        assert_eq!(trigger.voltages().await, vec![5.0, 0.0]);
    }
}
