//! Stop-and-wait behavior: duplicate ACKs, replayed frames, retransmission.

use crate::*;

#[tokio::test]
async fn duplicate_ack_is_idempotent() {
    let device = device();
    let cid = allocate(&device).await;
    let (mut initiator, ephemeral) = HandshakeInitiator::new(&device.host_keypair).unwrap();

    send_frame(
        &device.host,
        wire::with_sync_bit(ctrl::HANDSHAKE_INIT, 1),
        cid,
        &ephemeral,
    )
    .await;
    expect_ack(&device.host, cid, 1).await;
    let (_, _, response) = recv_frame(&device.host).await;
    initiator.process_response(&response).unwrap();

    // First ACK completes the send: can_send=1, send bit flipped to 1.
    send_ack(&device.host, cid, 0).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let sync = device.router.store().channel(cid).unwrap().sync;
    assert_eq!(sync & 0x80, 0x80, "can_send set");
    assert_eq!(sync & 0x20, 0x20, "send bit flipped");

    // Second, identical ACK is ignored.
    send_ack(&device.host, cid, 0).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(device.router.store().channel(cid).unwrap().sync, sync);

    // The handshake still completes normally afterwards.
    let (completion, _) = initiator.finish(&[]).unwrap();
    send_frame(
        &device.host,
        wire::with_sync_bit(ctrl::ENCRYPTED_TRANSPORT, 0),
        cid,
        &completion,
    )
    .await;
    expect_ack(&device.host, cid, 0).await;
    let (ctrl_byte, _, _) = recv_frame(&device.host).await;
    assert!(wire::is_encrypted_transport(ctrl_byte));
    send_ack(&device.host, cid, 1).await;
}

#[tokio::test]
async fn replayed_frame_is_acked_but_not_delivered_twice() {
    let device = device();
    let mut chan = establish(&device, None).await;
    let (session_id, handle) = open_session(&device, &mut chan).await;

    // Deliver a frame normally (sync bit 1 after the handshake).
    let payload = chan.encrypt_inner(session_id, 0x0042, b"once");
    let bit = chan.send_bit;
    chan.send_payload(&device.host, &payload).await;
    let first = handle.recv().await.unwrap();
    assert_eq!(first.body.as_ref(), b"once");

    // Replay the identical frame bytes with the now-stale sync bit.
    send_frame(
        &device.host,
        wire::with_sync_bit(ctrl::ENCRYPTED_TRANSPORT, bit),
        chan.cid,
        &payload,
    )
    .await;
    // Exactly one ACK, carrying the replayed bit.
    expect_ack(&device.host, chan.cid, bit).await;
    expect_silence(&device.host, 200).await;

    // Nothing was delivered upward a second time.
    let empty = tokio::time::timeout(Duration::from_millis(100), handle.recv()).await;
    assert!(empty.is_err(), "replay must not be delivered");

    // The expected bit is unchanged: the next in-sequence frame lands.
    chan.send_inner(&device.host, session_id, 0x0043, b"next").await;
    let second = handle.recv().await.unwrap();
    assert_eq!(second.body.as_ref(), b"next");
}

#[tokio::test]
async fn response_is_retransmitted_until_acked() {
    let mut config = TransportConfig::default();
    config.max_retransmissions = 3;
    let device = device_with(config);
    let cid = allocate(&device).await;

    send_frame(
        &device.host,
        wire::with_sync_bit(ctrl::HANDSHAKE_INIT, 1),
        cid,
        &[0xAA; 32],
    )
    .await;
    expect_ack(&device.host, cid, 1).await;

    // Never ACK: the device rewrites the same response until the budget
    // runs out, then gives up with the send side blocked.
    let (_, _, first) = recv_frame(&device.host).await;
    let (_, _, second) = recv_frame(&device.host).await;
    let (_, _, third) = recv_frame(&device.host).await;
    assert_eq!(first, second);
    assert_eq!(second, third);
    expect_silence(&device.host, 500).await;

    let sync = device.router.store().channel(cid).unwrap().sync;
    assert_eq!(sync & 0x80, 0, "send side stays blocked after exhaustion");
}

#[tokio::test]
async fn ack_with_wrong_bit_does_not_complete_the_send() {
    let device = device();
    let cid = allocate(&device).await;

    send_frame(
        &device.host,
        wire::with_sync_bit(ctrl::HANDSHAKE_INIT, 1),
        cid,
        &[0xAA; 32],
    )
    .await;
    expect_ack(&device.host, cid, 1).await;
    let (ctrl_byte, _, _) = recv_frame(&device.host).await;
    assert_eq!(wire::sync_bit(ctrl_byte), 0, "response rides bit 0");

    // ACK with the wrong bit: the device keeps retransmitting.
    send_ack(&device.host, cid, 1).await;
    let (ctrl_byte, _, _) = recv_frame(&device.host).await;
    assert_eq!(wire::sync_bit(ctrl_byte), 0, "same frame, same bit");

    // The right bit finally completes the send.
    send_ack(&device.host, cid, 0).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let sync = device.router.store().channel(cid).unwrap().sync;
    assert_eq!(sync & 0x80, 0x80, "can_send restored");
}
