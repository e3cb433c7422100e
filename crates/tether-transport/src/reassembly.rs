//! Frame reassembly across init and continuation reports.
//!
//! Each channel owns one reassembler. The buffer holds the 5-byte header
//! followed by the framed payload and is reused across frames: it grows on
//! demand up to the payload cap and never shrinks within a session, so a
//! completed frame can be decrypted in place without reallocation.

use tether_core::wire::{
    InitHeader, Report, CONT_DATA_OFFSET, INIT_DATA_OFFSET, MAX_PAYLOAD_LEN, REPORT_LEN,
};

use crate::error::FramingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// The frame is fully buffered; `frame()` is valid.
    Complete,
    /// Continuation reports are still expected.
    Incomplete,
}

pub struct Reassembler {
    buffer: Vec<u8>,
    expected_payload_len: usize,
    bytes_read: usize,
    expecting_cont: bool,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            expected_payload_len: 0,
            bytes_read: 0,
            expecting_cont: false,
        }
    }

    /// Start a frame from an init report. Any frame already in progress is
    /// discarded; the caller decides when an interruption is acceptable.
    pub fn feed_init(&mut self, report: &Report) -> Result<FeedOutcome, FramingError> {
        let header = InitHeader::parse(report).ok_or(FramingError::Truncated)?;
        let payload_len = header.length.get() as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(FramingError::Oversized(payload_len));
        }

        let message_len = payload_len + INIT_DATA_OFFSET;
        if message_len > self.buffer.len() {
            self.buffer.resize(message_len, 0);
        }

        self.expected_payload_len = payload_len;
        self.bytes_read = report.len().min(message_len);
        self.buffer[..self.bytes_read].copy_from_slice(&report[..self.bytes_read]);
        self.expecting_cont = self.bytes_read < message_len;

        Ok(self.outcome())
    }

    /// Append a continuation report to the frame in progress.
    pub fn feed_cont(&mut self, report: &Report) -> Result<FeedOutcome, FramingError> {
        if !self.expecting_cont {
            return Err(FramingError::UnexpectedContinuation);
        }

        let message_len = self.message_len();
        if self.bytes_read > message_len {
            return Err(FramingError::Overrun);
        }

        let chunk = (message_len - self.bytes_read).min(REPORT_LEN - CONT_DATA_OFFSET);
        self.buffer[self.bytes_read..self.bytes_read + chunk]
            .copy_from_slice(&report[CONT_DATA_OFFSET..CONT_DATA_OFFSET + chunk]);
        self.bytes_read += chunk;
        self.expecting_cont = self.bytes_read < message_len;

        Ok(self.outcome())
    }

    /// Whether a frame is partially buffered and awaiting continuations.
    pub fn is_midstream(&self) -> bool {
        self.expecting_cont
    }

    /// Header length plus declared payload length of the current frame.
    pub fn message_len(&self) -> usize {
        self.expected_payload_len + INIT_DATA_OFFSET
    }

    /// The completed frame: header followed by payload and checksum.
    pub fn frame(&self) -> &[u8] {
        &self.buffer[..self.message_len()]
    }

    /// Mutable view for in-place decryption of the completed frame.
    pub fn frame_mut(&mut self) -> &mut [u8] {
        let len = self.message_len();
        &mut self.buffer[..len]
    }

    /// Forget the current frame. The buffer capacity is retained.
    pub fn reset(&mut self) {
        self.expected_payload_len = 0;
        self.bytes_read = 0;
        self.expecting_cont = false;
    }

    fn outcome(&self) -> FeedOutcome {
        if self.expecting_cont {
            FeedOutcome::Incomplete
        } else {
            FeedOutcome::Complete
        }
    }
}
