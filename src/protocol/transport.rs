//! Register transport over an exclusively-owned serial stream.
//!
//! One transaction per call: encode the 4-byte request, write it, read
//! exactly 4 response bytes under a bounded timeout, validate checksum and
//! echoed address, decode the status field. No retries happen here; retry
//! policy belongs to callers.
//!
//! The transport is written against `AsyncRead + AsyncWrite` rather than a
//! concrete serial type, so tests drive it over `tokio::io::duplex` while
//! hardware uses `tokio_serial::SerialStream` (behind the
//! `instrument_serial` feature).

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::error::{LaserError, Result};
use crate::protocol::frame::{
    self, Response, ResponseStatus, FRAME_LEN,
};
use crate::protocol::registers;

/// Trait alias for async serial port I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can carry
/// the register protocol: `tokio_serial::SerialStream` for hardware,
/// `tokio::io::DuplexStream` for tests.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Maximum read attempts for a best-effort buffer drain.
const DRAIN_ATTEMPTS: usize = 8;

/// Longest extended-address string the transport will collect.
const MAX_AEA_BYTES: usize = 64;

/// Exclusive owner of the serial link; one register transaction per call.
pub struct RegisterTransport {
    link: DynSerial,
    timeout: Duration,
}

impl RegisterTransport {
    /// Wrap an already-open serial stream.
    pub fn new(link: DynSerial, timeout: Duration) -> Self {
        Self { link, timeout }
    }

    /// Open a hardware serial port with the module's standard settings
    /// (9600 8N1 by default, no flow control).
    #[cfg(feature = "instrument_serial")]
    pub async fn open(port_path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        use tokio_serial::SerialPortBuilderExt;

        let path = port_path.to_string();
        let stream = tokio::task::spawn_blocking(move || {
            tokio_serial::new(&path, baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
        })
        .await
        .map_err(|e| LaserError::Protocol(format!("serial open task failed: {e}")))??;

        Ok(Self::new(Box::new(stream), timeout))
    }

    /// Best-effort drain of stale bytes left in the receive buffer.
    ///
    /// Reads until no data arrives within a short window, up to a bounded
    /// number of attempts. Read failures are logged and the drain continues;
    /// nothing here is allowed to fail the caller.
    pub async fn drain(&mut self) -> usize {
        let mut discard = [0u8; 64];
        let mut total = 0usize;
        for _ in 0..DRAIN_ATTEMPTS {
            match tokio::time::timeout(Duration::from_millis(50), self.link.read(&mut discard))
                .await
            {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => total += n,
                Ok(Err(e)) => {
                    debug!(error = %e, "drain read failed, continuing");
                    break;
                }
                Err(_) => break,
            }
        }
        if total > 0 {
            debug!(bytes = total, "discarded stale serial data");
        }
        total
    }

    /// Execute one transaction and return the decoded response.
    ///
    /// `data` must be 0 on a read. The response checksum and echoed register
    /// address are validated before anything else is interpreted.
    pub async fn transact_raw(&mut self, address: u8, data: u16, write: bool) -> Result<Response> {
        debug_assert!(write || data == 0, "read transactions carry no data");

        let request = frame::encode_request(address, data, write);
        self.link.write_all(&request).await?;

        let mut raw = [0u8; FRAME_LEN];
        match tokio::time::timeout(self.timeout, self.link.read_exact(&mut raw)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(LaserError::Protocol(format!(
                    "short response for register {address:#04x}"
                )));
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(LaserError::Timeout(format!(
                    "waiting for response to register {address:#04x} after {:?}",
                    self.timeout
                )));
            }
        }

        let response = frame::decode_response(&raw)?;
        if raw[1] != address {
            return Err(LaserError::Protocol(format!(
                "response register {:#04x} does not match request {address:#04x}",
                raw[1]
            )));
        }
        trace!(register = address, write, data, response = ?response);
        Ok(response)
    }

    /// Execute one transaction and return the register value.
    ///
    /// A device-reported execution error becomes `Protocol`. Pending and
    /// extended-address statuses return their data field; completion of a
    /// pending command is confirmed through the status register, and
    /// extended-address reads continue via [`read_string`](Self::read_string).
    pub async fn transact(&mut self, address: u8, data: u16, write: bool) -> Result<u16> {
        let response = self.transact_raw(address, data, write).await?;
        match response.status {
            ResponseStatus::ExecutionError => Err(LaserError::Protocol(format!(
                "device rejected {} of register {address:#04x}",
                if write { "write" } else { "read" },
            ))),
            _ => Ok(response.data),
        }
    }

    /// Read a register.
    pub async fn read(&mut self, address: u8) -> Result<u16> {
        self.transact(address, 0, false).await
    }

    /// Write a register, returning the device's acknowledgement value.
    pub async fn write(&mut self, address: u8, data: u16) -> Result<u16> {
        self.transact(address, data, true).await
    }

    /// Read a string-valued register through the extended-address mechanism.
    ///
    /// The initial read answers with the string byte count; the bytes then
    /// arrive two per transaction through the extended-address register.
    pub async fn read_string(&mut self, address: u8) -> Result<String> {
        let response = self.transact_raw(address, 0, false).await?;
        if response.status != ResponseStatus::ExtendedAddress {
            return Err(LaserError::Protocol(format!(
                "register {address:#04x} did not answer with an extended-address read"
            )));
        }

        let length = usize::from(response.data);
        if length > MAX_AEA_BYTES {
            warn!(length, "extended-address length clamped to {MAX_AEA_BYTES}");
        }
        let length = length.min(MAX_AEA_BYTES);

        let mut bytes = Vec::with_capacity(length + 1);
        while bytes.len() < length {
            let word = self.read(registers::AEA_EAR).await?;
            bytes.push((word >> 8) as u8);
            bytes.push((word & 0xFF) as u8);
        }
        bytes.truncate(length);

        Ok(String::from_utf8_lossy(&bytes)
            .trim_end_matches('\0')
            .trim()
            .to_string())
    }
}
