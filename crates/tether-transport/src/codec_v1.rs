//! Legacy single-stream codec.
//!
//! The pre-channel framing: one message at a time, no channels, no
//! acknowledgements. The first report opens with the `?##` magic followed
//! by a big-endian message type (2 bytes) and length (4 bytes);
//! continuation reports repeat only the `?` prefix. Selected by the
//! router when the configuration asks for the legacy protocol.

use tether_core::wire::{Report, MAX_PAYLOAD_LEN, REPORT_LEN};

use crate::error::{FramingError, LinkError, TransportError};
use crate::iface::WireInterface;
use crate::transport::Transport;

const REP_MARKER: u8 = b'?';
const MAGIC: [u8; 2] = [b'#', b'#'];
const INIT_DATA_OFFSET: usize = 9;
const CONT_DATA_OFFSET: usize = 1;

/// A message read from or written to the legacy stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMessage {
    pub message_type: u16,
    pub data: Vec<u8>,
}

/// Read one message, skipping reports until the magic appears.
pub async fn read_message<W: WireInterface>(
    transport: &Transport<W>,
) -> Result<LegacyMessage, LinkError> {
    let (message_type, length, mut data) = loop {
        let report = transport.poll_read().await?;
        if report[0] != REP_MARKER || report[1..3] != MAGIC {
            tracing::trace!("skipping report without magic");
            continue;
        }
        let message_type = u16::from_be_bytes([report[3], report[4]]);
        let length = u32::from_be_bytes([report[5], report[6], report[7], report[8]]) as usize;
        if length > MAX_PAYLOAD_LEN {
            return Err(FramingError::Oversized(length).into());
        }
        let take = length.min(REPORT_LEN - INIT_DATA_OFFSET);
        break (message_type, length, report[INIT_DATA_OFFSET..INIT_DATA_OFFSET + take].to_vec());
    };

    while data.len() < length {
        let report = transport.poll_read().await?;
        if report[0] != REP_MARKER {
            tracing::trace!("skipping non-continuation report");
            continue;
        }
        let take = (length - data.len()).min(REPORT_LEN - CONT_DATA_OFFSET);
        data.extend_from_slice(&report[CONT_DATA_OFFSET..CONT_DATA_OFFSET + take]);
    }

    Ok(LegacyMessage { message_type, data })
}

/// Write one message as an init report plus continuations.
pub async fn write_message<W: WireInterface>(
    transport: &Transport<W>,
    message_type: u16,
    data: &[u8],
) -> Result<(), TransportError> {
    let mut report: Report = [0u8; REPORT_LEN];
    report[0] = REP_MARKER;
    report[1..3].copy_from_slice(&MAGIC);
    report[3..5].copy_from_slice(&message_type.to_be_bytes());
    report[5..9].copy_from_slice(&(data.len() as u32).to_be_bytes());

    let mut written = data.len().min(REPORT_LEN - INIT_DATA_OFFSET);
    report[INIT_DATA_OFFSET..INIT_DATA_OFFSET + written].copy_from_slice(&data[..written]);
    transport.write_full(&report).await?;

    while written < data.len() {
        report.fill(0);
        report[0] = REP_MARKER;
        let chunk = (data.len() - written).min(REPORT_LEN - CONT_DATA_OFFSET);
        report[CONT_DATA_OFFSET..CONT_DATA_OFFSET + chunk]
            .copy_from_slice(&data[written..written + chunk]);
        transport.write_full(&report).await?;
        written += chunk;
    }
    Ok(())
}
