//! FMS 12-byte packet header encoding and checksum calculation.

use super::error::{DeviceError, ProtocolError};
use super::types::{HEADER_SIZE, PACKET_CLASS};

/// Calculate FMS checksum (8-bit wraparound sum over bytes 0..11).
///
/// Shorter inputs are summed in full.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter()
        .take(HEADER_SIZE - 1)
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// Fixed 12-byte control header.
///
/// Layout (little-endian multi-byte fields):
/// - 0: class
/// - 1: command
/// - 2-3: param1 (i16)
/// - 4-5: param2 (i16)
/// - 6-7: datasize1 (low half of payload size)
/// - 8-9: datasize2 (high half of payload size)
/// - 10: error
/// - 11: checksum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub class: u8,
    pub command: u8,
    pub param1: i16,
    pub param2: i16,
    pub datasize1: u16,
    pub datasize2: u16,
    pub error: u8,
    pub checksum: u8,
}

impl Header {
    /// Request header for `command` with the two parameters.
    pub fn request(command: u8, param1: i16, param2: i16) -> Self {
        Self {
            class: PACKET_CLASS,
            command,
            param1,
            param2,
            ..Default::default()
        }
    }

    /// Serialize the header. The checksum is recomputed, never copied.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.class;
        buf[1] = self.command;
        // Parameters (2 bytes each, little-endian)
        buf[2..4].copy_from_slice(&self.param1.to_le_bytes());
        buf[4..6].copy_from_slice(&self.param2.to_le_bytes());
        // Payload size halves
        buf[6..8].copy_from_slice(&self.datasize1.to_le_bytes());
        buf[8..10].copy_from_slice(&self.datasize2.to_le_bytes());
        buf[10] = self.error;
        // Checksum over bytes 0..11
        buf[11] = checksum(&buf);
        buf
    }

    /// Parse a header without checking its checksum.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            class: buf[0],
            command: buf[1],
            param1: i16::from_le_bytes([buf[2], buf[3]]),
            param2: i16::from_le_bytes([buf[4], buf[5]]),
            datasize1: u16::from_le_bytes([buf[6], buf[7]]),
            datasize2: u16::from_le_bytes([buf[8], buf[9]]),
            error: buf[10],
            checksum: buf[11],
        }
    }

    /// Length-checked [`Header::decode`].
    pub fn parse(frame: &[u8]) -> Result<Self, ProtocolError> {
        let buf: &[u8; HEADER_SIZE] = frame
            .try_into()
            .map_err(|_| ProtocolError::UnexpectedFrame { len: frame.len() })?;
        Ok(Self::decode(buf))
    }

    /// Check the stored checksum against the header bytes.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let expected = self.encode()[HEADER_SIZE - 1];
        if expected != self.checksum {
            return Err(ProtocolError::InvalidChecksum {
                expected,
                actual: self.checksum,
            });
        }
        Ok(())
    }

    /// Payload size split across datasize1 (low) and datasize2 (high).
    pub fn extended_size(&self) -> u32 {
        u32::from(self.datasize1) | (u32::from(self.datasize2) << 16)
    }

    pub fn set_extended_size(&mut self, size: u32) {
        self.datasize1 = (size & 0xFFFF) as u16;
        self.datasize2 = (size >> 16) as u16;
    }

    /// Image payload is WSQ-compressed when the high byte of param1 is set.
    pub fn is_compressed(&self) -> bool {
        (self.param1 as u16) >> 8 != 0
    }

    pub fn device_error(&self) -> Option<DeviceError> {
        DeviceError::from_code(self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_empty() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_checksum_wraps() {
        let data = [0xFF, 0x02, 0x00];
        assert_eq!(checksum(&data), 0x01);
    }

    #[test]
    fn test_checksum_ignores_trailing_byte() {
        let mut buf = [1u8; HEADER_SIZE];
        let before = checksum(&buf);
        buf[11] = 0xAA;
        assert_eq!(checksum(&buf), before);
        assert_eq!(before, 11);
    }

    #[test]
    fn test_encode_layout() {
        let mut header = Header::request(0x55, 5, -1);
        header.set_extended_size(0x0001_0203);
        header.error = 0x04;
        let buf = header.encode();

        assert_eq!(buf[0], 0x00);
        assert_eq!(buf[1], 0x55);
        assert_eq!(&buf[2..4], &[0x05, 0x00]);
        assert_eq!(&buf[4..6], &[0xFF, 0xFF]);
        assert_eq!(&buf[6..8], &[0x03, 0x02]);
        assert_eq!(&buf[8..10], &[0x01, 0x00]);
        assert_eq!(buf[10], 0x04);
        assert_eq!(buf[11], checksum(&buf[..11]));
    }

    #[test]
    fn test_decode_keeps_bad_checksum() {
        let mut buf = Header::request(0x05, 0, 0).encode();
        buf[11] = buf[11].wrapping_add(1);
        let header = Header::decode(&buf);
        assert_eq!(header.checksum, buf[11]);
        assert!(matches!(
            header.validate(),
            Err(ProtocolError::InvalidChecksum { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_short_frame() {
        assert_eq!(
            Header::parse(&[0u8; 11]),
            Err(ProtocolError::UnexpectedFrame { len: 11 })
        );
    }

    #[test]
    fn test_round_trip_all_class_command_pairs() {
        let samples: [(i16, i16, u32); 4] = [
            (0, 0, 0),
            (5, 80, 3),
            (-1, i16::MIN, 0xFFFF_FFFF),
            (0x0100, 0x0201, 120_000),
        ];
        for class in 0..=255u8 {
            for command in 0..=255u8 {
                for (param1, param2, size) in samples {
                    let mut header = Header::request(command, param1, param2);
                    header.class = class;
                    header.set_extended_size(size);
                    let buf = header.encode();
                    let decoded = Header::decode(&buf);

                    assert_eq!(decoded.class, class);
                    assert_eq!(decoded.command, command);
                    assert_eq!(decoded.param1, param1);
                    assert_eq!(decoded.param2, param2);
                    assert_eq!(decoded.extended_size(), size);
                    assert!(decoded.validate().is_ok());
                    // Re-encoding reproduces the identical checksum byte
                    assert_eq!(decoded.encode()[11], buf[11]);
                }
            }
        }
    }

    #[test]
    fn test_compressed_flag_from_param1_high_byte() {
        assert!(!Header::request(0x43, 0x0001, 0).is_compressed());
        assert!(Header::request(0x43, 0x0100, 0).is_compressed());
        assert!(Header::request(0x43, -1, 0).is_compressed());
    }
}
