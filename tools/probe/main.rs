//! Command-line probe for a connected laser module.
//!
//! Thin wrapper over the driver for bring-up and bench debugging: check
//! status, toggle the output, set frequency and power, run sweeps and jumps.
//! Everything here talks to real hardware, so the binary is gated on the
//! `instrument_serial` feature.
//!
//! Examples:
//! ```text
//! ppcl-probe --port /dev/ttyUSB0 status
//! ppcl-probe --port /dev/ttyUSB0 set-frequency 193.415
//! ppcl-probe --port /dev/ttyUSB0 jump --delta 0.0005
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

use ppcl550::config::LaserConfig;
use ppcl550::laser::Ppcl550;

#[derive(Parser)]
#[command(name = "ppcl-probe", about = "Probe and control a PPCL550 laser module")]
struct Cli {
    /// Serial port path; overrides the config file.
    #[arg(long)]
    port: Option<String>,

    /// Configuration file.
    #[arg(long, default_value = "config/ppcl550.toml")]
    config: String,

    /// Log level when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print identity, limits, status, and calibration state.
    Status,
    /// Enable the laser output.
    On,
    /// Disable the laser output.
    Off,
    /// Read the output frequency and wavelength.
    Frequency,
    /// Set the central frequency in THz (output must be off).
    SetFrequency { thz: f64 },
    /// Read the output power.
    Power,
    /// Set the output power in dBm.
    SetPower { dbm: f64 },
    /// Start a clean sweep.
    Sweep {
        /// Sweep speed in GHz/s.
        #[arg(long, default_value_t = 10.0)]
        speed: f64,
        /// Sweep range.
        #[arg(long, default_value_t = 50)]
        range: u32,
    },
    /// Stop a running clean sweep (start one first in the same session).
    SweepStop,
    /// Execute a clean jump relative to the current frequency.
    Jump {
        /// Frequency delta in THz.
        #[arg(long)]
        delta: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ppcl550::tracing_setup::init(&cli.log_level);

    let mut config = LaserConfig::load_from(&cli.config)?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let mut laser = Ppcl550::connect_serial(config, None).await?;

    match cli.command {
        Command::Status => {
            println!("serial number : {}", laser.serial_number());
            let fb = laser.frequency_bounds();
            let pb = laser.power_bounds();
            println!("frequency     : {:.4} .. {:.4} THz", fb.min, fb.max);
            println!("power         : {:.2} .. {:.2} dBm", pb.min, pb.max);
            println!("status        : {:#06x}", laser.status().await?.0);
            println!("output on     : {}", laser.is_on().await?);
            println!("calibrated    : {}", laser.is_calibrated());
        }
        Command::On => laser.on().await?,
        Command::Off => laser.off().await?,
        Command::Frequency => {
            let f = laser.frequency().await?;
            println!("{f:.6} THz ({:.5} nm)", ppcl550::laser::frequency_to_wavelength(f));
        }
        Command::SetFrequency { thz } => laser.set_frequency(thz).await?,
        Command::Power => println!("{:.2} dBm", laser.power().await?),
        Command::SetPower { dbm } => laser.set_power(dbm).await?,
        Command::Sweep { speed, range } => laser.clean_sweep_start(speed, range).await?,
        Command::SweepStop => laser.clean_sweep_stop().await?,
        Command::Jump { delta } => {
            let outcome = laser.clean_jump(delta).await?;
            println!(
                "jumped to {:.6} THz (current {:.1} mA, sled {:.2} C, filters {:.2}/{:.2} C)",
                outcome.target_frequency,
                outcome.setpoint.current,
                outcome.setpoint.sled,
                outcome.setpoint.filter1,
                outcome.setpoint.filter2,
            );
        }
    }

    laser.close(false).await?;
    Ok(())
}
