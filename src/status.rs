//! Device readiness tracking and bounded completion waits.
//!
//! The module exposes its state through a single status register: the low
//! nibble reports pending operations and fault bits, and one bit reports
//! that the module is ready for its output to be enabled. Frequency changes,
//! output toggles, and sweep/jump commands all complete asynchronously, so
//! after any such write the driver polls this register until the module
//! reports idle. Skipping the wait risks issuing a second command while the
//! first is still in flight.
//!
//! Status is read fresh on every poll and never cached across calls.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::error::{LaserError, Result};
use crate::protocol::{registers, RegisterTransport};

/// Default interval between completion polls.
pub const OPERATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default interval between module-ready polls.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Decoded view of the status register.
///
/// The module-ready flag is the bit the vendor's MSB-first register diagrams
/// label bit 11, i.e. mask 0x0010. A register reading exactly 0x0010 means
/// ready with nothing pending and no fault bits set; anything else is
/// treated as an operation still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus(pub u16);

impl DeviceStatus {
    const MODULE_READY: u16 = 0x0010;

    /// Module ready for its output to be turned on.
    pub fn module_ready(self) -> bool {
        self.0 & Self::MODULE_READY != 0
    }

    /// An operation is still pending (or a fault bit is set).
    pub fn operation_pending(self) -> bool {
        self.0 != Self::MODULE_READY
    }
}

/// Read the status register once.
pub async fn read_status(transport: &mut RegisterTransport) -> Result<DeviceStatus> {
    Ok(DeviceStatus(transport.read(registers::NOP).await?))
}

/// Poll until no operation is pending, or fail with `Timeout`.
///
/// The register is checked immediately, then at `poll_interval` until the
/// deadline. Callers that issued a state-changing write should surface an
/// expiry as `IndeterminateState` instead, since the command may still land
/// after the wait is abandoned.
pub async fn await_operation_complete(
    transport: &mut RegisterTransport,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let status = read_status(transport).await?;
        if !status.operation_pending() {
            return Ok(());
        }
        trace!(raw = status.0, "operation pending");
        if Instant::now() + poll_interval > deadline {
            return Err(LaserError::Timeout(format!(
                "waiting for operation completion after {timeout:?}"
            )));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Poll until the module reports ready for output, or fail with `Timeout`.
pub async fn await_module_ready(
    transport: &mut RegisterTransport,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let status = read_status(transport).await?;
        if status.module_ready() {
            return Ok(());
        }
        trace!(raw = status.0, "module not ready");
        if Instant::now() + poll_interval > deadline {
            return Err(LaserError::Timeout(format!(
                "waiting for module ready after {timeout:?}"
            )));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_bit_is_0x0010() {
        assert!(DeviceStatus(0x0010).module_ready());
        assert!(!DeviceStatus(0x0010).operation_pending());
        assert!(!DeviceStatus(0x0000).module_ready());
    }

    #[test]
    fn anything_but_idle_pattern_is_pending() {
        // Ready bit set but a pending-operation bit too.
        assert!(DeviceStatus(0x0011).operation_pending());
        // Not ready, nothing pending: still counts as in flight.
        assert!(DeviceStatus(0x0000).operation_pending());
        assert!(DeviceStatus(0x0110).operation_pending());
    }
}
