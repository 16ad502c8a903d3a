//! Link abstraction between the session and the BLE stack.

use tracing::debug;

use super::error::TransportError;

// SecuGen SPP-over-BLE GATT layout
pub const SERVICE_UUID: &str = "0000fda0-0000-1000-8000-00805f9b34fb";
pub const NOTIFY_CHARACTERISTIC_UUID: &str = "00002bb1-0000-1000-8000-00805f9b34fb";
pub const WRITE_CHARACTERISTIC_UUID: &str = "00002bb2-0000-1000-8000-00805f9b34fb";

/// Advertised name fragments of supported readers.
pub const DEVICE_NAME_FILTERS: [&str; 2] = ["Unity", "SecuGen"];

/// Write side and notify-read side of the link.
///
/// Inbound frames are not pulled from here; the host pushes them into
/// [`Session::handle_frame`](super::session::Session::handle_frame) in
/// arrival order.
pub trait Transport {
    /// Write one packet on the write characteristic.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Ask for one read on the notify characteristic.
    fn read_next(&mut self) -> Result<(), TransportError>;

    /// Whether notifications are set up on the notify characteristic.
    fn notify_active(&self) -> bool;
}

/// In-memory transport that records traffic.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub writes: Vec<Vec<u8>>,
    pub read_requests: usize,
    pub notify: bool,
    /// Next write fails with this error.
    pub fail_write: Option<TransportError>,
    /// Next read request fails with this error.
    pub fail_read: Option<TransportError>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            notify: true,
            ..Default::default()
        }
    }

    pub fn last_write(&self) -> Option<&[u8]> {
        self.writes.last().map(Vec::as_slice)
    }
}

impl Transport for RecordingTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if let Some(e) = self.fail_write.take() {
            return Err(e);
        }
        debug!("[FMS] TX ({} bytes): {:02X?}", bytes.len(), bytes);
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn read_next(&mut self) -> Result<(), TransportError> {
        if let Some(e) = self.fail_read.take() {
            return Err(e);
        }
        self.read_requests += 1;
        Ok(())
    }

    fn notify_active(&self) -> bool {
        self.notify
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_writes_and_reads() {
        let mut transport = RecordingTransport::new();
        transport.write(&[1, 2]).unwrap();
        transport.read_next().unwrap();
        assert_eq!(transport.last_write(), Some(&[1u8, 2][..]));
        assert_eq!(transport.read_requests, 1);
        assert!(transport.notify_active());
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let mut transport = RecordingTransport::new();
        transport.fail_write = Some(TransportError::NotConnected);
        assert_eq!(transport.write(&[1]), Err(TransportError::NotConnected));
        assert!(transport.write(&[1]).is_ok());
    }
}
