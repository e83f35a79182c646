//! Mock laser module for tests and hardware-free development.
//!
//! `MockLaser` emulates the register map behind a real serial stream: it
//! serves one end of an in-memory duplex pipe, decoding request frames,
//! validating their checksums, and answering with properly checksummed
//! responses. The driver connects to the other end exactly as it would to a
//! serial port.
//!
//! Emulated behaviour:
//! - status-register countdown: writes with asynchronous effects leave the
//!   module pending for a configurable number of status reads;
//! - extended-address serial-number read;
//! - write-only staging registers, with a write log for assertions;
//! - sweep offset decay toward the centre;
//! - fault injection (corrupted response checksums).
//!
//! A request frame with a bad checksum is answered with an execution-error
//! status and leaves the register map untouched.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::protocol::frame::{self, ResponseStatus, FRAME_LEN};
use crate::protocol::{registers, DynSerial};

/// Default number of status reads a command stays pending for.
const DEFAULT_PENDING_READS: u32 = 1;

#[derive(Debug)]
struct MockState {
    registers: HashMap<u8, u16>,
    serial_number: String,
    /// Remaining status reads that report an operation in flight.
    nop_pending: u32,
    /// How many pending reads each asynchronous command costs.
    pending_reads: u32,
    /// In-flight extended-address string read.
    aea: Vec<u8>,
    aea_cursor: usize,
    /// Every accepted register write, in order.
    writes: Vec<(u8, u16)>,
    commit_pulses: u32,
    corrupt_next_response: bool,
}

impl MockState {
    fn new(serial_number: &str) -> Self {
        let mut map = HashMap::new();
        // Frequency limits: 191.35 .. 196.25 THz.
        map.insert(registers::LFL1, 191);
        map.insert(registers::LFL2, 35000);
        map.insert(registers::LFH1, 196);
        map.insert(registers::LFH2, 25000);
        // Power limits: 7.00 .. 13.50 dBm.
        map.insert(registers::OPSL, 700);
        map.insert(registers::OPSH, 1350);
        // Central frequency 193.5 THz, channel 1, everything else quiet.
        map.insert(registers::FCF1, 193);
        map.insert(registers::FCF2, 5000);
        map.insert(registers::FCF_MHZ, 0);
        map.insert(registers::FTF, 0);
        map.insert(registers::FTF_RANGE, 15000);
        map.insert(registers::CHANNEL, 1);
        map.insert(registers::CHANNEL_H, 0);
        map.insert(registers::GRID, 0);
        map.insert(registers::GRID_MHZ, 0);
        map.insert(registers::GRID_MIN, 1);
        map.insert(registers::GRID_MIN_MHZ, 0);
        map.insert(registers::RESENA, 0);
        map.insert(registers::MODE, 0);
        map.insert(registers::POWER, 1000);
        map.insert(registers::OOP, 1000);
        map.insert(registers::CS_OFFSET, 0);
        map.insert(registers::SLED_SLOPE, 100);

        Self {
            registers: map,
            serial_number: serial_number.to_string(),
            nop_pending: 0,
            pending_reads: DEFAULT_PENDING_READS,
            aea: Vec::new(),
            aea_cursor: 0,
            writes: Vec::new(),
            commit_pulses: 0,
            corrupt_next_response: false,
        }
    }

    fn handle_read(&mut self, address: u8) -> (ResponseStatus, u16) {
        match address {
            registers::NOP => {
                if self.nop_pending > 0 {
                    self.nop_pending -= 1;
                    (ResponseStatus::Ok, 0x0000)
                } else {
                    (ResponseStatus::Ok, 0x0010)
                }
            }
            registers::SERIAL_NUMBER => {
                self.aea = self.serial_number.as_bytes().to_vec();
                if self.aea.len() % 2 != 0 {
                    self.aea.push(0);
                }
                self.aea_cursor = 0;
                (ResponseStatus::ExtendedAddress, self.serial_number.len() as u16)
            }
            registers::AEA_EAR => {
                let hi = self.aea.get(self.aea_cursor).copied().unwrap_or(0);
                let lo = self.aea.get(self.aea_cursor + 1).copied().unwrap_or(0);
                self.aea_cursor += 2;
                (ResponseStatus::Ok, u16::from(hi) << 8 | u16::from(lo))
            }
            registers::CS_OFFSET => {
                let value = self.registers.get(&address).copied().unwrap_or(0);
                // Drift back toward the centre after each observation.
                self.registers.insert(address, ((value as i16) / 2) as u16);
                (ResponseStatus::Ok, value)
            }
            registers::OOP => {
                // Measured power tracks the setpoint while emitting.
                let setpoint = self.registers.get(&registers::POWER).copied().unwrap_or(0);
                (ResponseStatus::Ok, setpoint)
            }
            _ => (
                ResponseStatus::Ok,
                self.registers.get(&address).copied().unwrap_or(0),
            ),
        }
    }

    fn handle_write(&mut self, address: u8, data: u16) -> (ResponseStatus, u16) {
        self.writes.push((address, data));
        match address {
            registers::MODE => {
                // Writing 1 requests whisper mode, which reads back as 2.
                let stored = if data == 1 { 2 } else { 0 };
                self.registers.insert(address, stored);
                self.nop_pending = self.pending_reads;
            }
            registers::CJ_EXECUTE => {
                self.commit_pulses += 1;
                self.nop_pending = self.pending_reads;
            }
            registers::RESENA
            | registers::FCF1
            | registers::FCF2
            | registers::CHANNEL
            | registers::CHANNEL_H
            | registers::CS_ENABLE => {
                self.registers.insert(address, data);
                self.nop_pending = self.pending_reads;
            }
            _ => {
                self.registers.insert(address, data);
            }
        }
        (ResponseStatus::Ok, data)
    }
}

/// Handle to a mock module; serves any number of spawned links.
#[derive(Clone)]
pub struct MockLaser {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockLaser {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLaser {
    pub fn new() -> Self {
        Self::with_serial("CRTM00PB0X")
    }

    pub fn with_serial(serial_number: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new(serial_number))),
        }
    }

    /// Open a link to the mock: returns the host end of a fresh duplex pipe
    /// while a background task serves the device end.
    pub fn spawn(&self) -> DynSerial {
        let (host, device) = tokio::io::duplex(256);
        let state = self.state.clone();
        tokio::spawn(async move {
            Self::serve(device, state).await;
        });
        Box::new(host)
    }

    async fn serve(mut link: tokio::io::DuplexStream, state: Arc<Mutex<MockState>>) {
        let mut raw = [0u8; FRAME_LEN];
        loop {
            if link.read_exact(&mut raw).await.is_err() {
                return; // host dropped
            }

            let reply = {
                let mut state = state.lock().await;
                match frame::decode_request(&raw) {
                    Ok((address, data, write)) => {
                        let (status, value) = if write {
                            state.handle_write(address, data)
                        } else {
                            state.handle_read(address)
                        };
                        frame::encode_response(status, address, value)
                    }
                    Err(_) => {
                        debug!(frame = ?raw, "mock rejecting corrupt request");
                        frame::encode_response(ResponseStatus::ExecutionError, raw[1], 0)
                    }
                }
            };

            let reply = {
                let mut state = state.lock().await;
                if state.corrupt_next_response {
                    state.corrupt_next_response = false;
                    let mut corrupted = reply;
                    corrupted[0] ^= 0x10;
                    corrupted
                } else {
                    reply
                }
            };

            if link.write_all(&reply).await.is_err() {
                return;
            }
        }
    }

    // =========================================================================
    // Test inspection and fault injection
    // =========================================================================

    /// Current value of a register in the emulated map.
    pub async fn register(&self, address: u8) -> u16 {
        self.state
            .lock()
            .await
            .registers
            .get(&address)
            .copied()
            .unwrap_or(0)
    }

    /// Force a register value.
    pub async fn set_register(&self, address: u8, value: u16) {
        self.state.lock().await.registers.insert(address, value);
    }

    /// Values written to one register, in order.
    pub async fn writes_to(&self, address: u8) -> Vec<u16> {
        self.state
            .lock()
            .await
            .writes
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Total accepted writes.
    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes.len()
    }

    /// Commit pulses received on the jump execute register.
    pub async fn commit_pulses(&self) -> u32 {
        self.state.lock().await.commit_pulses
    }

    /// How many status reads each asynchronous command stays pending for.
    pub async fn set_pending_reads(&self, reads: u32) {
        self.state.lock().await.pending_reads = reads;
    }

    /// Corrupt the checksum of the next response frame.
    pub async fn corrupt_next_response(&self) {
        self.state.lock().await.corrupt_next_response = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::encode_request;

    #[tokio::test]
    async fn serves_register_reads() {
        let mock = MockLaser::new();
        let mut link = mock.spawn();

        let request = encode_request(registers::LFL1, 0, false);
        link.write_all(&request).await.unwrap();
        let mut reply = [0u8; FRAME_LEN];
        link.read_exact(&mut reply).await.unwrap();

        let decoded = frame::decode_response(&reply).unwrap();
        assert_eq!(decoded.status, ResponseStatus::Ok);
        assert_eq!(decoded.data, 191);
    }

    #[tokio::test]
    async fn corrupt_request_leaves_state_untouched() {
        let mock = MockLaser::new();
        let mut link = mock.spawn();

        let mut request = encode_request(registers::RESENA, 8, true);
        request[0] ^= 0x20; // break the checksum
        link.write_all(&request).await.unwrap();
        let mut reply = [0u8; FRAME_LEN];
        link.read_exact(&mut reply).await.unwrap();

        let decoded = frame::decode_response(&reply).unwrap();
        assert_eq!(decoded.status, ResponseStatus::ExecutionError);
        assert_eq!(mock.register(registers::RESENA).await, 0);
        assert_eq!(mock.write_count().await, 0);
    }

    #[tokio::test]
    async fn async_writes_leave_status_pending() {
        let mock = MockLaser::new();
        let mut link = mock.spawn();

        let request = encode_request(registers::RESENA, 8, true);
        link.write_all(&request).await.unwrap();
        let mut reply = [0u8; FRAME_LEN];
        link.read_exact(&mut reply).await.unwrap();

        // First status read reports pending, second reports idle.
        for expected in [0x0000u16, 0x0010] {
            let request = encode_request(registers::NOP, 0, false);
            link.write_all(&request).await.unwrap();
            link.read_exact(&mut reply).await.unwrap();
            assert_eq!(frame::decode_response(&reply).unwrap().data, expected);
        }
    }
}
