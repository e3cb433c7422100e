//! Multi-report frames, broadcast interleaving, interrupted reassembly.

use crate::*;

#[tokio::test]
async fn multi_report_message_round_trips() {
    let device = device();
    let mut chan = establish(&device, None).await;
    let (session_id, handle) = open_session(&device, &mut chan).await;

    // 200 payload bytes arrive as one init report plus three continuations.
    let body: Vec<u8> = (0..200u16).map(|i| i as u8).collect();
    chan.send_inner(&device.host, session_id, 0x0100, &body).await;

    let message = handle.recv().await.unwrap();
    assert_eq!(message.message_type, 0x0100);
    assert_eq!(message.body.as_ref(), body.as_slice());
}

#[tokio::test]
async fn large_message_round_trips_both_ways() {
    let device = device();
    let mut chan = establish(&device, None).await;
    let (session_id, handle) = open_session(&device, &mut chan).await;

    let body: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    chan.send_inner(&device.host, session_id, 0x0101, &body).await;
    let inbound = handle.recv().await.unwrap();
    assert_eq!(inbound.body.as_ref(), body.as_slice());

    // Echo it back through the device write path.
    let echo_body = inbound.body.clone();
    let echo = tokio::spawn(async move {
        handle.send_raw(0x0102, &echo_body).await.unwrap();
        handle
    });

    let (sid, message_type, data) = chan.recv_inner(&device.host).await;
    assert_eq!(sid, session_id);
    assert_eq!(message_type, 0x0102);
    assert_eq!(data, body);
    echo.await.unwrap();
}

#[tokio::test]
async fn broadcast_allocation_mid_reassembly_leaves_the_frame_intact() {
    let device = device();
    let mut chan = establish(&device, None).await;
    let (session_id, handle) = open_session(&device, &mut chan).await;

    let body: Vec<u8> = (0..200u16).map(|i| (i as u8) ^ 0x5A).collect();
    let payload = chan.encrypt_inner(session_id, 0x0200, &body);
    let reports = build_reports(
        wire::with_sync_bit(ctrl::ENCRYPTED_TRANSPORT, chan.send_bit),
        chan.cid,
        &payload,
    );
    assert!(reports.len() >= 3, "test needs a multi-report frame");

    // First two reports of the frame...
    device.host.send(reports[0]).await.unwrap();
    device.host.send(reports[1]).await.unwrap();

    // ...a complete allocation exchange in the middle...
    let new_cid = allocate(&device).await;
    assert_ne!(new_cid, chan.cid);

    // ...and the rest of the frame.
    for report in &reports[2..] {
        device.host.send(*report).await.unwrap();
    }
    expect_ack(&device.host, chan.cid, chan.send_bit).await;
    chan.send_bit = 1 - chan.send_bit;

    let message = handle.recv().await.unwrap();
    assert_eq!(message.body.as_ref(), body.as_slice(), "payload unchanged");
}

#[tokio::test]
async fn interrupting_init_drops_the_partial_frame() {
    let device = device();
    let mut chan = establish(&device, None).await;
    let (session_id, handle) = open_session(&device, &mut chan).await;

    let body: Vec<u8> = (0..200u16).map(|i| i as u8).collect();
    let payload = chan.encrypt_inner(session_id, 0x0300, &body);
    let reports = build_reports(
        wire::with_sync_bit(ctrl::ENCRYPTED_TRANSPORT, chan.send_bit),
        chan.cid,
        &payload,
    );

    // Begin the frame, then interrupt with an init report for a channel
    // that does not exist.
    device.host.send(reports[0]).await.unwrap();
    send_frame(&device.host, ctrl::PLAINTEXT, 0x7777, b"intruder").await;

    let (ctrl_byte, frame_cid, reason) = recv_frame(&device.host).await;
    assert_eq!(ctrl_byte, ctrl::ERROR);
    assert_eq!(frame_cid, 0x7777);
    assert_eq!(reason, b"UNALLOCATED_SESSION");

    // The partial frame is gone; retransmitting the same bytes in full
    // succeeds (same ciphertext, same sync bit — nothing was consumed).
    for report in &reports {
        device.host.send(*report).await.unwrap();
    }
    expect_ack(&device.host, chan.cid, chan.send_bit).await;
    chan.send_bit = 1 - chan.send_bit;

    let message = handle.recv().await.unwrap();
    assert_eq!(message.body.as_ref(), body.as_slice());
}

#[tokio::test]
async fn corrupted_frame_is_dropped_without_state_change() {
    let device = device();
    let mut chan = establish(&device, None).await;
    let (session_id, handle) = open_session(&device, &mut chan).await;

    let payload = chan.encrypt_inner(session_id, 0x0400, b"checksummed");
    let mut reports = build_reports(
        wire::with_sync_bit(ctrl::ENCRYPTED_TRANSPORT, chan.send_bit),
        chan.cid,
        &payload,
    );
    // Flip one payload bit.
    reports[0][20] ^= 0x01;
    for report in &reports {
        device.host.send(*report).await.unwrap();
    }

    // No ACK for a corrupt frame, no delivery, no sync movement.
    expect_silence(&device.host, 200).await;
    let empty = tokio::time::timeout(Duration::from_millis(100), handle.recv()).await;
    assert!(empty.is_err());

    // The undamaged frame still goes through with the same sync bit.
    let reports = build_reports(
        wire::with_sync_bit(ctrl::ENCRYPTED_TRANSPORT, chan.send_bit),
        chan.cid,
        &payload,
    );
    for report in &reports {
        device.host.send(*report).await.unwrap();
    }
    expect_ack(&device.host, chan.cid, chan.send_bit).await;
    chan.send_bit = 1 - chan.send_bit;
    let message = handle.recv().await.unwrap();
    assert_eq!(message.body.as_ref(), b"checksummed");
}
