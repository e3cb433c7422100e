//! Wire interface capability.
//!
//! USB, mock and future Bluetooth transports form a closed set of variants
//! sharing one capability: a tag byte, a report read and a report write.
//! The write reports how many bytes the hardware accepted; callers loop
//! until the full report is taken.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, Mutex};

use tether_core::wire::{Report, REPORT_LEN};

use crate::error::TransportError;

/// Interface tag persisted with each channel record.
pub const IFACE_TAG_MOCK: u8 = 0x00;
pub const IFACE_TAG_USB: u8 = 0x01;
pub const IFACE_TAG_BLE: u8 = 0x02;

pub trait WireInterface: Send + Sync + 'static {
    /// Tag byte identifying this interface in persisted channel records.
    fn iface_tag(&self) -> u8;

    /// Wait for the next report from the host.
    fn poll_read(&self) -> impl Future<Output = Result<Report, TransportError>> + Send;

    /// Offer one report to the hardware. Returns the number of bytes
    /// accepted, which may be less than the report length when the
    /// endpoint is busy.
    fn write(&self, report: &Report) -> impl Future<Output = Result<usize, TransportError>> + Send;
}

// ── Mock interface ────────────────────────────────────────────────────────────

/// In-memory wire used by the test suites: reports travel over bounded
/// channels, and writes can be made to report zero accepted bytes to
/// exercise the write-retry path.
pub struct MockWire {
    from_host: Mutex<mpsc::Receiver<Report>>,
    to_host: mpsc::Sender<Report>,
    reject_writes: AtomicUsize,
}

/// The host end of a [`MockWire`] pair.
pub struct MockHost {
    to_device: mpsc::Sender<Report>,
    from_device: Mutex<mpsc::Receiver<Report>>,
}

/// Create a connected device/host pair. The queues hold a full maximum-size
/// message worth of reports in each direction.
pub fn mock_wire() -> (MockWire, MockHost) {
    let (host_tx, device_rx) = mpsc::channel(2048);
    let (device_tx, host_rx) = mpsc::channel(2048);
    (
        MockWire {
            from_host: Mutex::new(device_rx),
            to_host: device_tx,
            reject_writes: AtomicUsize::new(0),
        },
        MockHost {
            to_device: host_tx,
            from_device: Mutex::new(host_rx),
        },
    )
}

impl MockWire {
    /// Make the next `n` writes report zero accepted bytes.
    pub fn reject_next_writes(&self, n: usize) {
        self.reject_writes.store(n, Ordering::Relaxed);
    }
}

impl WireInterface for MockWire {
    fn iface_tag(&self) -> u8 {
        IFACE_TAG_MOCK
    }

    async fn poll_read(&self) -> Result<Report, TransportError> {
        self.from_host
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }

    async fn write(&self, report: &Report) -> Result<usize, TransportError> {
        let rejected = self.reject_writes.load(Ordering::Relaxed);
        if rejected > 0 {
            self.reject_writes.store(rejected - 1, Ordering::Relaxed);
            return Ok(0);
        }
        self.to_host
            .send(*report)
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok(REPORT_LEN)
    }
}

impl MockHost {
    pub async fn send(&self, report: Report) -> Result<(), TransportError> {
        self.to_device
            .send(report)
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub async fn recv(&self) -> Option<Report> {
        self.from_device.lock().await.recv().await
    }
}
