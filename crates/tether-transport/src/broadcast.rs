//! Channel allocation on the broadcast channel id.
//!
//! The broadcast cid carries exactly one request kind: a host sends an
//! 8-byte nonce and gets back the nonce, a fresh channel id, and the
//! device properties. Allocation requests fit a single report and may
//! arrive in the middle of another channel's reassembly without
//! disturbing it — the response is written directly, outside any
//! reliability state.

use tether_core::checksum::{self, CHECKSUM_LEN};
use tether_core::wire::{self, InitHeader, Report, BROADCAST_CID, INIT_DATA_OFFSET};

use crate::channel::ChannelState;
use crate::error::{LinkError, ProtocolError, ResourceError};
use crate::iface::WireInterface;
use crate::reliability::INITIAL_SYNC;
use crate::router::Router;
use crate::store::ChannelRecord;

const NONCE_LEN: usize = 8;

/// Handle one report addressed to the broadcast cid.
pub(crate) async fn handle_broadcast<W: WireInterface>(
    router: &Router<W>,
    report: &Report,
) -> Result<(), LinkError> {
    let header = InitHeader::parse(report).ok_or(ProtocolError::MalformedAllocationRequest)?;
    if header.ctrl_byte != wire::ctrl::CHANNEL_ALLOCATION_REQ {
        return Err(ProtocolError::UnknownBroadcastCtrl(header.ctrl_byte).into());
    }
    if header.length.get() as usize != NONCE_LEN + CHECKSUM_LEN {
        return Err(ProtocolError::MalformedAllocationRequest.into());
    }

    let message_len = INIT_DATA_OFFSET + NONCE_LEN + CHECKSUM_LEN;
    let (covered, rest) = report[..message_len].split_at(message_len - CHECKSUM_LEN);
    if !checksum::is_valid(&rest[..CHECKSUM_LEN], covered) {
        return Err(ProtocolError::MalformedAllocationRequest.into());
    }

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&report[INIT_DATA_OFFSET..INIT_DATA_OFFSET + NONCE_LEN]);

    let cid = router
        .store()
        .allocate_cid()
        .ok_or(ResourceError::ChannelIdsExhausted)?;

    router.store().insert_channel(ChannelRecord {
        cid,
        iface_tag: router.iface_tag(),
        state: ChannelState::Th1 as u8,
        sync: INITIAL_SYNC,
        host_ephemeral_key: None,
        noise_keys: None,
    });
    router.install_channel(cid, ChannelState::Th1, INITIAL_SYNC);

    let mut response = Vec::with_capacity(
        NONCE_LEN + 2 + router.device_properties().len() + CHECKSUM_LEN,
    );
    response.extend_from_slice(&nonce);
    response.extend_from_slice(&cid.to_be_bytes());
    response.extend_from_slice(router.device_properties());

    let header = InitHeader::new(
        wire::ctrl::CHANNEL_ALLOCATION_RES,
        BROADCAST_CID,
        (response.len() + CHECKSUM_LEN) as u16,
    );
    let crc = checksum::compute_parts(&[&header.to_bytes(), &response]);
    response.extend_from_slice(&crc);

    router.transport().write_payload(&header, &response).await?;

    tracing::info!(cid, nonce = %hex::encode(nonce), "channel allocated");
    Ok(())
}
