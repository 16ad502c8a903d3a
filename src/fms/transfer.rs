//! Chunked payload reassembly for image and template downloads.
//!
//! After the size-bearing header the device only sends a chunk when the
//! host asks for it. The session issues those reads; this module keeps the
//! byte accounting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

use super::error::{DeviceError, ProtocolError, Result};
use super::types::{HEADER_SIZE, TEMPLATE_SIZE_OFFSET};

/// Which pipeline a transfer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Image,
    Template,
}

impl TransferKind {
    /// Decode the declared payload size from a response header frame.
    ///
    /// Images carry it in datasize1 (low) / datasize2 (high). Templates carry
    /// it as four signed little-endian bytes read straight from the frame.
    pub fn declared_size(self, frame: &[u8; HEADER_SIZE]) -> i64 {
        match self {
            Self::Image => {
                let low = u16::from_le_bytes([frame[6], frame[7]]);
                let high = u16::from_le_bytes([frame[8], frame[9]]);
                i64::from(u32::from(low) | (u32::from(high) << 16))
            }
            Self::Template => {
                let o = TEMPLATE_SIZE_OFFSET;
                i64::from(i32::from_le_bytes([frame[o], frame[o + 1], frame[o + 2], frame[o + 3]]))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingHeader,
    Streaming,
}

/// Progress after one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Bytes taken from the chunk.
    pub copied: u32,
    pub percent: u8,
    pub complete: bool,
}

/// Reassembly state of one pipeline.
#[derive(Debug)]
pub struct Transfer {
    kind: TransferKind,
    phase: Phase,
    total: u32,
    remaining: u32,
    received: u32,
    max_size: u32,
    buffer: Vec<u8>,
    compressed: bool,
    started_at: Option<DateTime<Utc>>,
}

impl Transfer {
    pub fn new(kind: TransferKind, max_size: u32) -> Self {
        Self {
            kind,
            phase: Phase::Idle,
            total: 0,
            remaining: 0,
            received: 0,
            max_size,
            buffer: Vec::new(),
            compressed: false,
            started_at: None,
        }
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Milliseconds since [`Transfer::begin`].
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|t| (Utc::now() - t).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Start a new transfer; the command has just been sent.
    pub fn begin(&mut self) {
        self.reset();
        // Grown to the bound once, then reused
        if self.buffer.len() < self.max_size as usize {
            self.buffer.resize(self.max_size as usize, 0);
        }
        self.phase = Phase::AwaitingHeader;
        self.started_at = Some(Utc::now());
        debug!("{:?} transfer awaiting header", self.kind);
    }

    /// Accept the size-bearing response header.
    ///
    /// Any rejection puts the transfer back to idle.
    pub fn accept_header(&mut self, declared: i64, error_code: u8, compressed: bool) -> Result<u32> {
        if let Some(device_error) = DeviceError::from_code(error_code) {
            error!("{:?} transfer rejected by device: {device_error}", self.kind);
            self.reset();
            return Err(device_error.into());
        }

        if declared <= 0 || declared > i64::from(self.max_size) {
            error!(
                "{:?} transfer declared invalid size {declared} (max {})",
                self.kind, self.max_size
            );
            self.reset();
            return Err(ProtocolError::InvalidDeclaredSize {
                size: declared,
                max: self.max_size,
            }
            .into());
        }

        let total = declared as u32;
        self.total = total;
        self.remaining = total;
        self.received = 0;
        self.compressed = compressed;
        self.phase = Phase::Streaming;
        debug!("{:?} transfer streaming {total} bytes (compressed={compressed})", self.kind);
        Ok(total)
    }

    /// Copy one chunk into the payload buffer.
    pub fn accept_chunk(&mut self, chunk: &[u8]) -> ChunkProgress {
        let take = (chunk.len() as u64).min(u64::from(self.remaining)) as u32;
        let start = self.received as usize;
        let end = start + take as usize;
        self.buffer[start..end].copy_from_slice(&chunk[..take as usize]);

        self.remaining -= take;
        self.received += take;

        let complete = self.remaining == 0;
        let percent = if complete {
            100
        } else {
            (u64::from(self.received) * 100 / u64::from(self.received + self.remaining)) as u8
        };

        if complete {
            self.phase = Phase::Idle;
        }

        debug!(
            "{:?} chunk {} bytes, {}/{} ({percent}%)",
            self.kind,
            chunk.len(),
            self.received,
            self.total
        );

        ChunkProgress {
            copied: take,
            percent,
            complete,
        }
    }

    /// Bytes of the finished transfer.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[..self.received as usize]
    }

    /// Back to idle without a result. The buffer is kept.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.total = 0;
        self.remaining = 0;
        self.received = 0;
        self.compressed = false;
        self.started_at = None;
    }
}
