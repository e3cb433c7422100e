//! Error taxonomy for the transport core.
//!
//! Recoverable errors (framing, sync, session) are absorbed by the read
//! loop: the frame is dropped and reading continues. Fatal errors tear the
//! offending channel down to unallocated but never stop the core.

use thiserror::Error;

use tether_core::crypto::CryptoError;
use tether_core::wire::MAX_PAYLOAD_LEN;

/// Error-frame body for traffic aimed at a session or channel that does
/// not exist.
pub const UNALLOCATED_SESSION: &[u8] = b"UNALLOCATED_SESSION";

/// I/O failure on the wire. Non-recoverable for the current frame.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("wire read failed")]
    Read,
    #[error("wire write failed")]
    Write,
    #[error("wire interface closed")]
    Closed,
}

/// Malformed report sequences. Recoverable: the frame is dropped.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("declared payload length {0} exceeds the {MAX_PAYLOAD_LEN}-byte maximum")]
    Oversized(usize),
    #[error("continuation report outside an active reassembly")]
    UnexpectedContinuation,
    #[error("reassembly read past the declared frame length")]
    Overrun,
    #[error("checksum mismatch")]
    Checksum,
    #[error("report too short for a header")]
    Truncated,
}

/// Frame kind or shape invalid for the channel's state. Fatal to the channel.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("control byte 0x{0:02x} not valid in channel state {1}")]
    UnexpectedCtrlByte(u8, &'static str),
    #[error("handshake message has invalid length {0}")]
    BadHandshakeLength(usize),
    #[error("unknown control byte 0x{0:02x} on the broadcast channel")]
    UnknownBroadcastCtrl(u8),
    #[error("malformed channel allocation request")]
    MalformedAllocationRequest,
    #[error("malformed channel-control message")]
    MalformedControlMessage,
    #[error("decrypted frame too short for an inner message ({0} bytes)")]
    ShortInnerMessage(usize),
    #[error("channel is not ready for encrypted writes")]
    ChannelNotReady,
    #[error("no channel with id 0x{0:04x}")]
    UnknownChannel(u16),
}

/// Stop-and-wait breakdown. Duplicates are handled inline; a send that
/// exhausts its retransmission budget is fatal for the channel's send side.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no acknowledgement after {0} transmissions")]
    RetransmissionsExhausted(u32),
}

/// Session-level problems. The channel stays up.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} is not allocated on this channel")]
    Unallocated(u8),
    #[error("no free session id on this channel")]
    Exhausted,
    #[error("session inbox closed")]
    Closed,
}

/// Allocation failures.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("channel id space exhausted")]
    ChannelIdsExhausted,
}

/// Umbrella error for the whole transport.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl LinkError {
    /// Whether the channel this error arose on must be torn down.
    ///
    /// Framing and session errors drop the frame only; protocol violations
    /// and authentication failures poison the channel (a failed tag means
    /// the key material can no longer be trusted).
    pub fn is_fatal_to_channel(&self) -> bool {
        matches!(
            self,
            LinkError::Protocol(_) | LinkError::Crypto(_) | LinkError::Sync(_)
        )
    }

    /// Short ASCII reason placed in the body of an outgoing error frame,
    /// or `None` for errors that are dropped silently (a corrupt frame
    /// gets no answer at all).
    pub fn wire_reason(&self) -> Option<&'static [u8]> {
        match self {
            LinkError::Crypto(_) => Some(b"DECRYPTION_FAILED"),
            LinkError::Session(SessionError::Unallocated(_)) => Some(UNALLOCATED_SESSION),
            LinkError::Protocol(_) | LinkError::Sync(_) => Some(b"PROTOCOL_ERROR"),
            _ => None,
        }
    }
}
