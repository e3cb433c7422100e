//! Session multiplexing over an established channel.

use crate::*;

#[tokio::test]
async fn create_new_session_allocates_id_one() {
    let device = device();
    let mut chan = establish(&device, None).await;

    let (session_id, _handle) = open_session(&device, &mut chan).await;
    assert_eq!(session_id, 1);

    let records = device.router.store().sessions_for(chan.cid);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].session_id, 1);
}

#[tokio::test]
async fn sessions_get_consecutive_ids() {
    let device = device();
    let mut chan = establish(&device, None).await;

    let (first, _h1) = open_session(&device, &mut chan).await;
    let (second, _h2) = open_session(&device, &mut chan).await;
    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_eq!(device.router.channel(chan.cid).unwrap().session_count(), 2);
}

#[tokio::test]
async fn unallocated_session_draws_error_and_channel_survives() {
    let device = device();
    let mut chan = establish(&device, None).await;

    // Inner session id 0x07 was never created.
    chan.send_inner(&device.host, 0x07, 0x0042, b"hello").await;

    let (ctrl_byte, frame_cid, reason) = recv_frame(&device.host).await;
    assert_eq!(ctrl_byte, ctrl::ERROR);
    assert_eq!(frame_cid, chan.cid);
    assert_eq!(reason.len(), 19);
    assert_eq!(reason, b"UNALLOCATED_SESSION");

    // The channel is still up: opening a session works afterwards.
    assert!(device.router.channel(chan.cid).is_some());
    let (session_id, _handle) = open_session(&device, &mut chan).await;
    assert_eq!(session_id, 1);
}

#[tokio::test]
async fn messages_are_delivered_in_ack_order() {
    let device = device();
    let mut chan = establish(&device, None).await;
    let (session_id, handle) = open_session(&device, &mut chan).await;

    for i in 0..5u16 {
        chan.send_inner(&device.host, session_id, 0x1000 + i, &[i as u8])
            .await;
    }
    for i in 0..5u16 {
        let message = handle.recv().await.unwrap();
        assert_eq!(message.message_type, 0x1000 + i);
        assert_eq!(message.body.as_ref(), &[i as u8]);
    }
}

#[tokio::test]
async fn two_sessions_keep_their_streams_apart() {
    let device = device();
    let mut chan = establish(&device, None).await;
    let (first, handle_a) = open_session(&device, &mut chan).await;
    let (second, handle_b) = open_session(&device, &mut chan).await;

    chan.send_inner(&device.host, second, 0x0002, b"to b").await;
    chan.send_inner(&device.host, first, 0x0001, b"to a").await;

    let b = handle_b.recv().await.unwrap();
    assert_eq!(b.body.as_ref(), b"to b");
    let a = handle_a.recv().await.unwrap();
    assert_eq!(a.body.as_ref(), b"to a");
}

#[tokio::test]
async fn closed_session_refuses_further_traffic() {
    let device = device();
    let mut chan = establish(&device, None).await;
    let (session_id, handle) = open_session(&device, &mut chan).await;

    handle.close();
    assert_eq!(device.router.channel(chan.cid).unwrap().session_count(), 0);

    chan.send_inner(&device.host, session_id, 0x0042, b"late").await;
    let (ctrl_byte, _, reason) = recv_frame(&device.host).await;
    assert_eq!(ctrl_byte, ctrl::ERROR);
    assert_eq!(reason, b"UNALLOCATED_SESSION");
}

#[tokio::test]
async fn device_replies_travel_on_the_session() {
    let device = device();
    let mut chan = establish(&device, None).await;
    let (session_id, handle) = open_session(&device, &mut chan).await;

    chan.send_inner(&device.host, session_id, 0x0050, b"ping").await;
    let inbound = handle.recv().await.unwrap();
    assert_eq!(inbound.body.as_ref(), b"ping");

    let reply = tokio::spawn(async move {
        handle.send_raw(0x0051, b"pong").await.unwrap();
    });

    let (sid, message_type, body) = chan.recv_inner(&device.host).await;
    assert_eq!(sid, session_id);
    assert_eq!(message_type, 0x0051);
    assert_eq!(body, b"pong");
    reply.await.unwrap();
}

#[tokio::test]
async fn full_inbox_backpressures_without_losing_frames() {
    let mut config = TransportConfig::default();
    config.inbox_capacity = 2;
    let device = device_with(config);
    let mut chan = establish(&device, None).await;
    let (session_id, handle) = open_session(&device, &mut chan).await;

    // Two frames fill the inbox; the third is ACKed but its delivery
    // parks the read loop on the full inbox.
    for i in 0..3u8 {
        chan.send_inner(&device.host, session_id, 0x2000, &[i]).await;
    }

    // A fourth frame gets no ACK while the loop is parked.
    let payload = chan.encrypt_inner(session_id, 0x2000, &[3]);
    send_frame(
        &device.host,
        wire::with_sync_bit(ctrl::ENCRYPTED_TRANSPORT, chan.send_bit),
        chan.cid,
        &payload,
    )
    .await;
    expect_silence(&device.host, 200).await;

    // Draining one slot unblocks delivery, and the fourth frame is ACKed.
    let first = handle.recv().await.unwrap();
    assert_eq!(first.body.as_ref(), &[0]);
    expect_ack(&device.host, chan.cid, chan.send_bit).await;
    chan.send_bit = 1 - chan.send_bit;

    for expected in 1..=3u8 {
        let message = handle.recv().await.unwrap();
        assert_eq!(message.body.as_ref(), &[expected]);
    }
}
