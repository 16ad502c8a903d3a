//! FMS protocol error types.

use thiserror::Error;

/// Framing and validation failures detected by the host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Header checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    InvalidChecksum { expected: u8, actual: u8 },

    #[error("Invalid declared payload size {size} (max {max})")]
    InvalidDeclaredSize { size: i64, max: u32 },

    #[error("Unexpected {len}-byte frame")]
    UnexpectedFrame { len: usize },
}

/// Error byte reported by the peripheral.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Flash memory error")]
    FlashOpen,
    #[error("Sensor initialization failed")]
    SensorOpen,
    #[error("Fingerprint registration failed")]
    RegisterFailed,
    #[error("Fingerprint verification failed")]
    VerifyFailed,
    #[error("User ID already registered")]
    AlreadyRegistered,
    #[error("User ID not found")]
    UserNotFound,
    #[error("Failed to capture fingerprint in time")]
    Timeout,
    #[error("Device database is full")]
    DatabaseFull,
    #[error("Wrong user ID")]
    WrongUserId,
    #[error("Device database is empty")]
    DatabaseEmpty,
    #[error("Wrong usage of command packet")]
    FunctionFail,
    #[error("Wrong length of extra data")]
    InsufficientData,
    #[error("Flash write error")]
    FlashWrite,
    #[error("Invalid parameter")]
    InvalidParam,
    #[error("Master authentication failed")]
    AuthenticationFail,
    #[error("Fingerprint identification failed")]
    IdentifyFailed,
    #[error("Device reported checksum error")]
    Checksum,
    #[error("Invalid fingerprint record")]
    InvalidRecord,
    #[error("Unknown command")]
    UnknownCommand,
    #[error("Device error {0:#04x}")]
    Other(u8),
}

impl DeviceError {
    /// Map a raw error byte. `0x00` means no error.
    pub fn from_code(code: u8) -> Option<Self> {
        let error = match code {
            0x00 => return None,
            0x01 => Self::FlashOpen,
            0x02 => Self::SensorOpen,
            0x03 => Self::RegisterFailed,
            0x04 => Self::VerifyFailed,
            0x05 => Self::AlreadyRegistered,
            0x06 => Self::UserNotFound,
            0x08 => Self::Timeout,
            0x09 => Self::DatabaseFull,
            0x0A => Self::WrongUserId,
            0x0B => Self::DatabaseEmpty,
            0x10 => Self::FunctionFail,
            0x11 => Self::InsufficientData,
            0x12 => Self::FlashWrite,
            0x14 => Self::InvalidParam,
            0x17 => Self::AuthenticationFail,
            0x1B => Self::IdentifyFailed,
            0x28 => Self::Checksum,
            0x30 => Self::InvalidRecord,
            0xFF => Self::UnknownCommand,
            other => Self::Other(other),
        };
        Some(error)
    }

    /// Raw error byte.
    pub fn code(&self) -> u8 {
        match self {
            Self::FlashOpen => 0x01,
            Self::SensorOpen => 0x02,
            Self::RegisterFailed => 0x03,
            Self::VerifyFailed => 0x04,
            Self::AlreadyRegistered => 0x05,
            Self::UserNotFound => 0x06,
            Self::Timeout => 0x08,
            Self::DatabaseFull => 0x09,
            Self::WrongUserId => 0x0A,
            Self::DatabaseEmpty => 0x0B,
            Self::FunctionFail => 0x10,
            Self::InsufficientData => 0x11,
            Self::FlashWrite => 0x12,
            Self::InvalidParam => 0x14,
            Self::AuthenticationFail => 0x17,
            Self::IdentifyFailed => 0x1B,
            Self::Checksum => 0x28,
            Self::InvalidRecord => 0x30,
            Self::UnknownCommand => 0xFF,
            Self::Other(code) => *code,
        }
    }
}

/// Failures at the transport boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read request failed: {0}")]
    ReadFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not connected")]
    NotConnected,
}

/// WSQ decode failures. Never fatal for a capture.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("No WSQ decoder available")]
    Unavailable,

    #[error("WSQ decode failed: {0}")]
    Decode(String),

    #[error("Decoded {len} pixels but dimensions are {width}x{height}")]
    DimensionMismatch { len: usize, width: u32, height: u32 },
}

/// Errors surfaced by the FMS session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FmsError {
    /// A command is already outstanding.
    #[error("Another command is in progress")]
    CommandBusy,

    #[error("User ID must be between 1-999, got {0}")]
    InvalidUserId(u16),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Device disconnected")]
    Disconnected,
}

impl FmsError {
    /// Raw device error byte, when the device caused this error.
    pub fn device_code(&self) -> Option<u8> {
        match self {
            Self::Device(e) => Some(e.code()),
            _ => None,
        }
    }
}

/// Structured failure handed to a caller instead of a result payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub error: FmsError,
    pub message: String,
    pub user_id: Option<u16>,
}

impl Failure {
    pub fn new(error: FmsError) -> Self {
        let message = error.to_string();
        Self {
            error,
            message,
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<u16>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl From<FmsError> for Failure {
    fn from(error: FmsError) -> Self {
        Self::new(error)
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Failure {}

/// Result type for FMS operations.
pub type Result<T> = std::result::Result<T, FmsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_codes_round_trip() {
        for code in 1..=255u8 {
            let error = DeviceError::from_code(code).unwrap();
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn test_no_error_code() {
        assert_eq!(DeviceError::from_code(0x00), None);
    }

    #[test]
    fn test_named_codes() {
        assert_eq!(DeviceError::from_code(0x04), Some(DeviceError::VerifyFailed));
        assert_eq!(DeviceError::from_code(0x05), Some(DeviceError::AlreadyRegistered));
        assert_eq!(DeviceError::from_code(0x06), Some(DeviceError::UserNotFound));
        assert_eq!(DeviceError::from_code(0x1B), Some(DeviceError::IdentifyFailed));
        assert_eq!(DeviceError::from_code(0x07), Some(DeviceError::Other(0x07)));
    }

    #[test]
    fn test_failure_carries_device_code() {
        let failure = Failure::new(DeviceError::VerifyFailed.into()).with_user(Some(5));
        assert_eq!(failure.error.device_code(), Some(0x04));
        assert_eq!(failure.user_id, Some(5));
        assert!(failure.message.contains("verification failed"));
    }
}
