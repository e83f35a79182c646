//! Binary register protocol: frame codec, register map, and the serial
//! transport that executes one checksummed transaction per call.

pub mod frame;
pub mod registers;
pub mod transport;

pub use frame::{Response, ResponseStatus, FRAME_LEN};
pub use transport::{DynSerial, RegisterTransport, SerialPortIO};
