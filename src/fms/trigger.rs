//! Classification of inbound notification frames.
//!
//! A 12-byte frame starting with `'N'` while the notify channel is set up is
//! the device asking the host to read the next chunk. This overlaps with a
//! real header whose class byte is 0x4E; the device family always sends
//! class 0x00, so the overlap is accepted rather than resolved here.

use super::types::{HEADER_SIZE, NOTIFY_SENTINEL};

/// What an inbound frame is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Issue an explicit read on the notify channel; no other processing.
    PullTrigger,
    /// A 12-byte control header.
    Header,
    /// Raw payload bytes for the streaming transfer.
    Chunk,
    /// Zero-length frame.
    Empty,
}

/// Classify by exact length and leading byte.
pub fn classify(frame: &[u8], notify_active: bool) -> FrameKind {
    match frame.len() {
        0 => FrameKind::Empty,
        HEADER_SIZE if notify_active && frame[0] == NOTIFY_SENTINEL => FrameKind::PullTrigger,
        HEADER_SIZE => FrameKind::Header,
        _ => FrameKind::Chunk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_with_notify_is_trigger() {
        let mut frame = [0u8; HEADER_SIZE];
        frame[0] = b'N';
        assert_eq!(classify(&frame, true), FrameKind::PullTrigger);
    }

    #[test]
    fn test_sentinel_without_notify_is_header() {
        let mut frame = [0u8; HEADER_SIZE];
        frame[0] = b'N';
        assert_eq!(classify(&frame, false), FrameKind::Header);
    }

    #[test]
    fn test_other_leading_bytes_are_headers() {
        for first in (0..=255u8).filter(|b| *b != NOTIFY_SENTINEL) {
            let mut frame = [0u8; HEADER_SIZE];
            frame[0] = first;
            assert_eq!(classify(&frame, true), FrameKind::Header);
        }
    }

    #[test]
    fn test_non_header_lengths_are_chunks() {
        assert_eq!(classify(&[b'N'; 11], true), FrameKind::Chunk);
        assert_eq!(classify(&[b'N'; 13], true), FrameKind::Chunk);
        assert_eq!(classify(&[0u8; 244], false), FrameKind::Chunk);
        assert_eq!(classify(&[], true), FrameKind::Empty);
    }
}
