//! SecuGen FMS protocol engine for Unity 20 BLE readers.
//!
//! Sits between a BLE stack that writes packets and delivers notification
//! frames, and a host application that issues biometric commands. Every
//! exchange starts with a 12-byte header; images and templates follow as a
//! pulled stream of raw chunks.

pub mod codec;
pub mod command;
pub mod driver;
pub mod error;
pub mod events;
pub mod header;
mod session;
pub mod transfer;
pub mod transport;
pub mod trigger;
pub mod types;


// Re-export public API
pub use codec::{NoWsqDecoder, WsqDecoder};
pub use command::{CaptureOptions, Command, WsqBitrate};
pub use driver::{SessionHandle, spawn};
pub use error::{Failure, FmsError};
pub use events::{DeviceEvent, DeviceInfo};
pub use header::Header;
pub use session::{Pending, Session};
pub use transport::{RecordingTransport, Transport};
