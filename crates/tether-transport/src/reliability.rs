//! Stop-and-wait reliability: the sync byte and the transmission loop.
//!
//! Each channel tracks three bits in one persisted byte:
//!   bit 7 — can_send: no unacknowledged frame is in flight
//!   bit 6 — the sync bit expected on the next inbound data frame
//!   bit 5 — the sync bit the next outbound frame will carry
//!
//! A send writes the frame, then rewrites it on a slowly lengthening
//! schedule until the matching ACK cancels the loop or the budget runs out.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use tether_core::wire::InitHeader;

use crate::error::TransportError;
use crate::iface::WireInterface;
use crate::transport::Transport;

pub const MAX_RETRANSMISSIONS: u32 = 50;
pub const MIN_RETRANSMISSIONS: u32 = 2;

/// Sync byte of a freshly allocated channel: can_send set, first expected
/// receive bit 1, first send bit 0.
pub const INITIAL_SYNC: u8 = 0xC0;

const CAN_SEND: u8 = 0x80;
const RECV_BIT: u8 = 0x40;
const SEND_BIT: u8 = 0x20;

/// Delay before transmission `attempt + 1`. Starts at 100 ms and climbs
/// toward ten seconds as attempts accumulate.
pub fn retransmission_delay(attempt: u32) -> Duration {
    let ms = (10_200.0 - 1_010_000.0 / (attempt as f64 + 100.0)).round() as u64;
    Duration::from_millis(ms)
}

// ── Sync byte ─────────────────────────────────────────────────────────────────

/// The per-channel sync bits, packed as persisted.
pub struct SyncState(AtomicU8);

impl SyncState {
    pub fn new(raw: u8) -> Self {
        Self(AtomicU8::new(raw))
    }

    /// The raw byte, for the channel record.
    pub fn raw(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn can_send(&self) -> bool {
        self.raw() & CAN_SEND != 0
    }

    pub fn set_can_send(&self, can_send: bool) {
        if can_send {
            self.0.fetch_or(CAN_SEND, Ordering::Relaxed);
        } else {
            self.0.fetch_and(!CAN_SEND, Ordering::Relaxed);
        }
    }

    pub fn expected_receive_bit(&self) -> u8 {
        (self.raw() & RECV_BIT) >> 6
    }

    pub fn set_expected_receive_bit(&self, bit: u8) {
        debug_assert!(bit <= 1);
        if bit == 0 {
            self.0.fetch_and(!RECV_BIT, Ordering::Relaxed);
        } else {
            self.0.fetch_or(RECV_BIT, Ordering::Relaxed);
        }
    }

    pub fn send_bit(&self) -> u8 {
        (self.raw() & SEND_BIT) >> 5
    }

    /// Alternate the outbound sync bit after a completed send.
    pub fn flip_send_bit(&self) {
        self.0.fetch_xor(SEND_BIT, Ordering::Relaxed);
    }
}

// ── Transmission loop ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitOutcome {
    /// The peer acknowledged the in-flight sync bit.
    Acked,
    /// The loop was stopped cooperatively (channel teardown).
    Closed,
    /// The retransmission budget ran out without an ACK.
    Exhausted,
}

/// Supervises one in-flight frame: writes it, then rewrites the same bytes
/// (same sync bit) until acknowledged, stopped, or out of budget.
///
/// The channel keeps a handle to the running loop: the ACK path calls
/// [`acknowledge`](Self::acknowledge), teardown calls
/// [`stop_after_min_retransmissions`](Self::stop_after_min_retransmissions).
pub struct TransmissionLoop<W> {
    transport: Transport<W>,
    header: InitHeader,
    frame: Vec<u8>,
    ack: Notify,
    closed: Notify,
    min_reached: AtomicBool,
    finished: AtomicBool,
}

impl<W: WireInterface> TransmissionLoop<W> {
    pub fn new(transport: Transport<W>, header: InitHeader, frame: Vec<u8>) -> Self {
        Self {
            transport,
            header,
            frame,
            ack: Notify::new(),
            closed: Notify::new(),
            min_reached: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    pub async fn run(&self, max: u32, min: u32) -> Result<TransmitOutcome, TransportError> {
        let outcome = self.run_inner(max, min).await;
        self.finished.store(true, Ordering::Relaxed);
        outcome
    }

    async fn run_inner(&self, max: u32, min: u32) -> Result<TransmitOutcome, TransportError> {
        for attempt in 0..max {
            if attempt >= min {
                self.min_reached.store(true, Ordering::Relaxed);
            }
            self.transport.write_payload(&self.header, &self.frame).await?;

            tokio::select! {
                _ = self.ack.notified() => return Ok(TransmitOutcome::Acked),
                _ = self.closed.notified() => return Ok(TransmitOutcome::Closed),
                _ = tokio::time::sleep(retransmission_delay(attempt)) => {}
            }
        }
        Ok(TransmitOutcome::Exhausted)
    }

    /// Report the matching peer ACK: the loop stops before its next write.
    pub fn acknowledge(&self) {
        self.ack.notify_one();
    }

    /// Cancel the loop now. Safe to call whether or not it is running.
    pub fn stop_immediately(&self) {
        self.closed.notify_one();
    }

    /// Cancel the loop, but only once the frame has been written at least
    /// the minimum number of times.
    pub async fn stop_after_min_retransmissions(&self) {
        while !self.min_reached.load(Ordering::Relaxed) && !self.finished.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.stop_immediately();
    }
}
