//! Register map for the tunable laser module.
//!
//! Addresses and scalings follow the module's MSA register documentation.
//! Values are 16-bit; wider quantities (channel, frequency) are split across
//! register pairs with the scaling noted on each constant.

/// Status register: pending-operation field and module-ready bit.
pub const NOP: u8 = 0x00;
/// Device serial number (extended-address string read).
pub const SERIAL_NUMBER: u8 = 0x04;
/// Extended-address data register, two string bytes per read.
pub const AEA_EAR: u8 = 0x0B;
/// Module status detail register.
pub const DL_STATUS: u8 = 0x20;

/// Channel, low 16 bits.
pub const CHANNEL: u8 = 0x30;
/// Channel, high 16 bits.
pub const CHANNEL_H: u8 = 0x65;
/// Optical power setpoint, 0.01 dBm units.
pub const POWER: u8 = 0x31;
/// Output enable: 8 = emitting, 0 = off.
pub const RESENA: u8 = 0x32;
/// Grid spacing, 0.1 GHz units.
pub const GRID: u8 = 0x34;
/// Grid spacing, MHz part.
pub const GRID_MHZ: u8 = 0x66;
/// Minimum grid spacing, 0.1 GHz units.
pub const GRID_MIN: u8 = 0x56;
/// Minimum grid spacing, MHz part.
pub const GRID_MIN_MHZ: u8 = 0x6B;

/// Central frequency, integer THz.
pub const FCF1: u8 = 0x35;
/// Central frequency, 1e-4 THz units.
pub const FCF2: u8 = 0x36;
/// Central frequency, MHz part.
pub const FCF_MHZ: u8 = 0x69;
/// Fine-tune frequency offset, MHz.
pub const FTF: u8 = 0x62;
/// Fine-tune frequency range, MHz.
pub const FTF_RANGE: u8 = 0x4F;

/// Measured output power, 0.01 dBm units.
pub const OOP: u8 = 0x42;
/// Minimum settable power, 0.01 dBm units.
pub const OPSL: u8 = 0x50;
/// Maximum settable power, 0.01 dBm units.
pub const OPSH: u8 = 0x51;
/// Frequency lower limit, integer THz.
pub const LFL1: u8 = 0x52;
/// Frequency lower limit, 1e-5 THz units.
pub const LFL2: u8 = 0x53;
/// Frequency upper limit, integer THz.
pub const LFH1: u8 = 0x54;
/// Frequency upper limit, 1e-5 THz units.
pub const LFH2: u8 = 0x55;

/// Tuning mode: reads 0 = dither, 2 = whisper; write 1 to enter whisper.
pub const MODE: u8 = 0x90;

/// Clean-sweep range, GHz.
pub const CS_RANGE: u8 = 0xE4;
/// Clean-sweep enable.
pub const CS_ENABLE: u8 = 0xE5;
/// Live clean-sweep frequency offset, 100 MHz units.
pub const CS_OFFSET: u8 = 0xE6;
/// Sled tuning slope, -1e-4 degC per GHz.
pub const SLED_SLOPE: u8 = 0xE8;
/// Clean-sweep speed, MHz/s. Write-only; the driver caches the last value.
pub const CS_SPEED: u8 = 0xF1;

/// Staged jump drive current, 0.1 mA units. Write-only.
pub const CJ_CURRENT: u8 = 0xE9;
/// Staged jump frequency, integer THz. Write-only.
pub const CJ_FCF1: u8 = 0xEA;
/// Staged jump frequency, 1e-4 THz units. Write-only.
pub const CJ_FCF2: u8 = 0xEB;
/// Staged jump sled temperature, 0.01 degC units. Write-only.
pub const CJ_SLED: u8 = 0xEC;
/// Jump commit register: one pulse per staged quantity.
pub const CJ_EXECUTE: u8 = 0xED;
