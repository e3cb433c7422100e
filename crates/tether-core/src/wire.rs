//! Tether wire format — on-wire types for the report-level protocol.
//!
//! These types ARE the protocol. Every constant here is part of the wire
//! format shared with hosts; changing anything is a breaking change.
//!
//! A message travels as one *init report* followed by zero or more
//! *continuation reports*, all exactly 64 bytes. The init report carries a
//! 5-byte header (control byte, channel id, length); continuations repeat
//! only the control byte and channel id. `length` counts the framed payload
//! including the trailing 4-byte big-endian CRC-32.
//!
//! All header types use zerocopy derives for safe, allocation-free
//! serialization. There is no unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Report layout ─────────────────────────────────────────────────────────────

/// Every report on the wire is exactly this long.
pub const REPORT_LEN: usize = 64;

/// Payload bytes start here in an init report (after ctrl, cid, length).
pub const INIT_DATA_OFFSET: usize = 5;

/// Payload bytes start here in a continuation report (after ctrl, cid).
pub const CONT_DATA_OFFSET: usize = 3;

/// Upper bound on `length`. Frames declaring more are rejected before any
/// buffer grows past a single report.
pub const MAX_PAYLOAD_LEN: usize = 60_000;

/// The channel id reserved for allocation traffic. Never stored as a channel.
pub const BROADCAST_CID: u16 = 0xFFFF;

/// A single fixed-size report.
pub type Report = [u8; REPORT_LEN];

// ── Control byte ──────────────────────────────────────────────────────────────

/// Control byte values and masks.
///
/// Bit 7 marks a continuation report. Bit 4 is the synchronization bit of
/// the stop-and-wait protocol; masking it off with `KIND_MASK` yields the
/// frame kind.
pub mod ctrl {
    pub const HANDSHAKE_INIT: u8 = 0x00;
    pub const PLAINTEXT: u8 = 0x01;
    pub const ENCRYPTED_TRANSPORT: u8 = 0x02;
    pub const ACK: u8 = 0x20;
    pub const CHANNEL_ALLOCATION_REQ: u8 = 0x40;
    pub const CHANNEL_ALLOCATION_RES: u8 = 0x40;
    pub const ERROR: u8 = 0x41;
    pub const CONTINUATION: u8 = 0x80;

    pub const SYNC_BIT: u8 = 0x10;
    pub const KIND_MASK: u8 = 0xEF;
}

pub fn is_continuation(ctrl_byte: u8) -> bool {
    ctrl_byte & 0x80 == ctrl::CONTINUATION
}

pub fn is_ack(ctrl_byte: u8) -> bool {
    ctrl_byte & 0x20 == ctrl::ACK
}

pub fn is_handshake_init(ctrl_byte: u8) -> bool {
    ctrl_byte & ctrl::KIND_MASK == ctrl::HANDSHAKE_INIT
}

pub fn is_encrypted_transport(ctrl_byte: u8) -> bool {
    ctrl_byte & ctrl::KIND_MASK == ctrl::ENCRYPTED_TRANSPORT
}

/// Extract the synchronization bit (0 or 1).
pub fn sync_bit(ctrl_byte: u8) -> u8 {
    (ctrl_byte & ctrl::SYNC_BIT) >> 4
}

/// Set or clear the synchronization bit on a kind byte.
pub fn with_sync_bit(ctrl_byte: u8, bit: u8) -> u8 {
    if bit == 0 {
        ctrl_byte & ctrl::KIND_MASK
    } else {
        ctrl_byte | ctrl::SYNC_BIT
    }
}

// ── Init header ───────────────────────────────────────────────────────────────

/// The 5-byte header opening every message.
///
/// `length` covers the framed payload including the 4-byte CRC suffix, but
/// not this header. Multi-byte fields are big-endian on the wire.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct InitHeader {
    pub ctrl_byte: u8,
    pub cid: U16<BigEndian>,
    pub length: U16<BigEndian>,
}

assert_eq_size!(InitHeader, [u8; 5]);

impl InitHeader {
    pub fn new(ctrl_byte: u8, cid: u16, length: u16) -> Self {
        Self {
            ctrl_byte,
            cid: U16::new(cid),
            length: U16::new(length),
        }
    }

    /// Parse a header from the front of an init report.
    pub fn parse(report: &[u8]) -> Option<Self> {
        Self::read_from_prefix(report)
    }

    pub fn to_bytes(&self) -> [u8; INIT_DATA_OFFSET] {
        let mut out = [0u8; INIT_DATA_OFFSET];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Write the full header into the first 5 bytes of a report.
    pub fn pack_init(&self, report: &mut Report) {
        report[..INIT_DATA_OFFSET].copy_from_slice(self.as_bytes());
    }

    /// Write a continuation prefix (`CONTINUATION | cid`) into the first
    /// 3 bytes of a report. The length field is omitted on continuations.
    pub fn pack_cont(&self, report: &mut Report) {
        report[0] = ctrl::CONTINUATION;
        report[1..CONT_DATA_OFFSET].copy_from_slice(self.cid.as_bytes());
    }
}

/// Read the channel id out of any report (init or continuation).
pub fn report_cid(report: &Report) -> u16 {
    u16::from_be_bytes([report[1], report[2]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
