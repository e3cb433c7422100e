//! Channel allocation over the broadcast cid.

use crate::*;

use tether_transport::ChannelState;

#[tokio::test]
async fn allocation_echoes_nonce_and_returns_first_cid() {
    let device = device();

    send_frame(
        &device.host,
        ctrl::CHANNEL_ALLOCATION_REQ,
        BROADCAST_CID,
        &NONCE,
    )
    .await;

    let (ctrl_byte, cid, payload) = recv_frame(&device.host).await;
    assert_eq!(ctrl_byte, ctrl::CHANNEL_ALLOCATION_RES);
    assert_eq!(cid, BROADCAST_CID);
    assert_eq!(&payload[..8], &NONCE);

    let new_cid = u16::from_be_bytes([payload[8], payload[9]]);
    assert_eq!(new_cid, 0x1000);

    // The rest of the payload is the device properties message.
    let props = proto::DeviceProperties::decode(&payload[10..]).unwrap();
    assert_eq!(props.internal_model, "T3W1");
    assert_eq!(props.pairing_methods, vec![1, 2]);
}

#[tokio::test]
async fn allocated_channel_starts_in_th1_with_fresh_sync() {
    let device = device();
    let cid = allocate(&device).await;

    let channel = device.router.channel(cid).expect("channel exists");
    assert_eq!(channel.state(), ChannelState::Th1);

    let record = device.router.store().channel(cid).expect("record persisted");
    assert_eq!(record.state, ChannelState::Th1 as u8);
    assert_eq!(record.sync, 0xC0, "can_send=1, expected first receive bit 1");
}

#[tokio::test]
async fn consecutive_allocations_get_distinct_cids() {
    let device = device();
    let first = allocate(&device).await;
    let second = allocate(&device).await;
    assert_eq!(first, 0x1000);
    assert_eq!(second, 0x1001);
    assert!(device.router.channel(first).is_some());
    assert!(device.router.channel(second).is_some());
}

#[tokio::test]
async fn corrupted_allocation_request_is_ignored() {
    let device = device();

    let mut reports = build_reports(ctrl::CHANNEL_ALLOCATION_REQ, BROADCAST_CID, &NONCE);
    reports[0][7] ^= 0x01;
    device.host.send(reports[0]).await.unwrap();

    expect_silence(&device.host, 200).await;
    assert!(device.router.channel(0x1000).is_none());
}

#[tokio::test]
async fn non_allocation_ctrl_byte_on_broadcast_is_fatal_for_the_frame() {
    let device = device();

    send_frame(&device.host, ctrl::ERROR, BROADCAST_CID, &NONCE).await;
    expect_silence(&device.host, 200).await;

    // The core keeps reading: a well-formed request still succeeds.
    let cid = allocate(&device).await;
    assert_eq!(cid, 0x1000);
}
