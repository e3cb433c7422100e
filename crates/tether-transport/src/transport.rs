//! Report reads and writes over a [`WireInterface`].
//!
//! `write_full` retries a report until the interface accepts all 64 bytes.
//! `write_payload` fans a framed payload out into one init report plus
//! continuation reports. Both are suspension points; there are no timeouts
//! at this layer.

use std::sync::Arc;

use tether_core::wire::{InitHeader, Report, CONT_DATA_OFFSET, INIT_DATA_OFFSET, REPORT_LEN};

use crate::error::TransportError;
use crate::iface::WireInterface;

pub struct Transport<W> {
    iface: Arc<W>,
}

// Manual impl: `W` itself need not be Clone behind the Arc.
impl<W> Clone for Transport<W> {
    fn clone(&self) -> Self {
        Self {
            iface: self.iface.clone(),
        }
    }
}

impl<W: WireInterface> Transport<W> {
    pub fn new(iface: Arc<W>) -> Self {
        Self { iface }
    }

    pub fn iface_tag(&self) -> u8 {
        self.iface.iface_tag()
    }

    pub async fn poll_read(&self) -> Result<Report, TransportError> {
        self.iface.poll_read().await
    }

    /// Write one report, retrying until the interface accepts all of it.
    pub async fn write_full(&self, report: &Report) -> Result<(), TransportError> {
        loop {
            if self.iface.write(report).await? == REPORT_LEN {
                return Ok(());
            }
        }
    }

    /// Write a framed payload: header plus payload split across an init
    /// report and as many continuation reports as needed. Trailing report
    /// bytes beyond the payload are zero.
    pub async fn write_payload(
        &self,
        header: &InitHeader,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let mut report: Report = [0u8; REPORT_LEN];
        header.pack_init(&mut report);

        let mut written = payload.len().min(REPORT_LEN - INIT_DATA_OFFSET);
        report[INIT_DATA_OFFSET..INIT_DATA_OFFSET + written].copy_from_slice(&payload[..written]);
        self.write_full(&report).await?;

        if written < payload.len() {
            header.pack_cont(&mut report);
        }
        while written < payload.len() {
            let chunk = (payload.len() - written).min(REPORT_LEN - CONT_DATA_OFFSET);
            report[CONT_DATA_OFFSET..CONT_DATA_OFFSET + chunk]
                .copy_from_slice(&payload[written..written + chunk]);
            report[CONT_DATA_OFFSET + chunk..].fill(0);
            self.write_full(&report).await?;
            written += chunk;
        }
        Ok(())
    }
}
