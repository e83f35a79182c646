//! Configuration loading for the laser driver.
//!
//! Strongly-typed configuration loaded with figment from:
//! 1. a TOML file (`config/ppcl550.toml` by default)
//! 2. environment variables prefixed with `PPCL_`
//!
//! # Example
//! ```no_run
//! use ppcl550::config::LaserConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LaserConfig::load()?;
//! println!("port: {}", config.port);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Driver configuration for one laser module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaserConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM3").
    pub port: String,

    /// Serial baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Bound on a single register transaction.
    #[serde(default = "default_transport_timeout", with = "humantime_serde")]
    pub transport_timeout: Duration,

    /// Bound on a completion wait after an asynchronous command.
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Interval between completion polls.
    #[serde(default = "default_operation_poll", with = "humantime_serde")]
    pub operation_poll_interval: Duration,

    /// Interval between module-ready polls.
    #[serde(default = "default_ready_poll", with = "humantime_serde")]
    pub ready_poll_interval: Duration,

    /// Directory holding the per-serial-number calibration files.
    #[serde(default = "default_calibration_dir")]
    pub calibration_dir: PathBuf,

    /// Trigger output settings.
    #[serde(default)]
    pub trigger: TriggerConfig,
}

/// Settings for the external analog trigger output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Fire a trigger pulse on sweep start and jump execution.
    #[serde(default)]
    pub enabled: bool,

    /// Output channel range, volts.
    #[serde(default)]
    pub min_voltage: f64,
    #[serde(default = "default_max_voltage")]
    pub max_voltage: f64,

    /// Pulse amplitude, volts.
    #[serde(default = "default_pulse_voltage")]
    pub pulse_voltage: f64,

    /// How long the pulse is held before returning to zero.
    #[serde(default = "default_idle_width", with = "humantime_serde")]
    pub idle_width: Duration,

    /// Extra delay between sweep enable and the trigger pulse.
    #[serde(default = "default_sweep_delay", with = "humantime_serde")]
    pub sweep_delay: Duration,

    /// Extra delay between jump execution and the trigger pulse.
    #[serde(default, with = "humantime_serde")]
    pub jump_delay: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_voltage: 0.0,
            max_voltage: default_max_voltage(),
            pulse_voltage: default_pulse_voltage(),
            idle_width: default_idle_width(),
            sweep_delay: default_sweep_delay(),
            jump_delay: Duration::ZERO,
        }
    }
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_transport_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_operation_poll() -> Duration {
    Duration::from_millis(500)
}

fn default_ready_poll() -> Duration {
    Duration::from_millis(250)
}

fn default_calibration_dir() -> PathBuf {
    PathBuf::from("calibration")
}

fn default_max_voltage() -> f64 {
    6.0
}

fn default_pulse_voltage() -> f64 {
    5.0
}

fn default_idle_width() -> Duration {
    Duration::from_millis(500)
}

fn default_sweep_delay() -> Duration {
    Duration::from_millis(100)
}

impl LaserConfig {
    /// Load from `config/ppcl550.toml` plus `PPCL_*` environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from("config/ppcl550.toml")
    }

    /// Load from a specific file path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: LaserConfig = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PPCL_").split("__"))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation after parsing.
    pub fn validate(&self) -> Result<()> {
        use crate::error::LaserError;

        if self.port.is_empty() {
            return Err(LaserError::Configuration("serial port path is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(LaserError::Configuration("baud rate must be non-zero".into()));
        }
        if self.trigger.pulse_voltage < self.trigger.min_voltage
            || self.trigger.pulse_voltage > self.trigger.max_voltage
        {
            return Err(LaserError::Configuration(format!(
                "trigger pulse voltage {} outside output range [{}, {}]",
                self.trigger.pulse_voltage, self.trigger.min_voltage, self.trigger.max_voltage
            )));
        }
        Ok(())
    }

    /// A configuration suitable for mock-backed sessions and tests.
    pub fn for_tests() -> Self {
        Self {
            port: "mock".into(),
            baud_rate: default_baud_rate(),
            transport_timeout: Duration::from_millis(200),
            operation_timeout: Duration::from_secs(2),
            operation_poll_interval: Duration::from_millis(10),
            ready_poll_interval: Duration::from_millis(10),
            calibration_dir: default_calibration_dir(),
            trigger: TriggerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_toml_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ppcl550.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "port = \"/dev/ttyUSB0\"").unwrap();
        drop(file);

        let config = LaserConfig::load_from(&path).unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.operation_poll_interval, Duration::from_millis(500));
        assert!(!config.trigger.enabled);
        assert_eq!(config.trigger.pulse_voltage, 5.0);
    }

    #[test]
    fn trigger_section_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ppcl550.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "port = \"COM3\"\n\n[trigger]\nenabled = true\npulse_voltage = 4.0\nidle_width = \"250ms\""
        )
        .unwrap();
        drop(file);

        let config = LaserConfig::load_from(&path).unwrap();
        assert!(config.trigger.enabled);
        assert_eq!(config.trigger.pulse_voltage, 4.0);
        assert_eq!(config.trigger.idle_width, Duration::from_millis(250));
    }

    #[test]
    fn pulse_voltage_outside_output_range_is_rejected() {
        let mut config = LaserConfig::for_tests();
        config.trigger.pulse_voltage = 9.0;
        assert!(config.validate().is_err());
    }
}
