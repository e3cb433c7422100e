//! Handshake walk-through: TH1, TH2, credential presentation.

use crate::*;

use tether_core::proto::CredentialMetadata;
use tether_transport::ChannelState;

#[tokio::test]
async fn th1_stores_ephemeral_and_schedules_response_after_ack() {
    let device = device();
    let cid = allocate(&device).await;

    let ephemeral = [0xAA; 32];
    send_frame(
        &device.host,
        wire::with_sync_bit(ctrl::HANDSHAKE_INIT, 1),
        cid,
        &ephemeral,
    )
    .await;

    // The ACK precedes the scheduled response.
    expect_ack(&device.host, cid, 1).await;
    let (ctrl_byte, frame_cid, response) = recv_frame(&device.host).await;
    assert!(wire::is_encrypted_transport(ctrl_byte));
    assert_eq!(frame_cid, cid);
    assert_eq!(response.len(), 96, "e, ee, s, es with an empty payload");
    send_ack(&device.host, cid, 0).await;

    let channel = device.router.channel(cid).unwrap();
    assert_eq!(channel.state(), ChannelState::Th2);
    assert_eq!(
        device.router.store().channel(cid).unwrap().host_ephemeral_key,
        Some(ephemeral)
    );
}

#[tokio::test]
async fn th1_with_wrong_payload_length_tears_the_channel_down() {
    let device = device();
    let cid = allocate(&device).await;

    send_frame(
        &device.host,
        wire::with_sync_bit(ctrl::HANDSHAKE_INIT, 1),
        cid,
        &[0xAA; 16],
    )
    .await;
    expect_ack(&device.host, cid, 1).await;

    let (ctrl_byte, frame_cid, payload) = recv_frame(&device.host).await;
    assert_eq!(ctrl_byte, ctrl::ERROR);
    assert_eq!(frame_cid, cid);
    assert_eq!(payload, b"PROTOCOL_ERROR");
    assert!(device.router.channel(cid).is_none(), "channel gone");
    assert!(device.router.store().channel(cid).is_none(), "record gone");
}

#[tokio::test]
async fn th1_with_wrong_ctrl_byte_tears_the_channel_down() {
    let device = device();
    let cid = allocate(&device).await;

    send_frame(
        &device.host,
        wire::with_sync_bit(ctrl::PLAINTEXT, 1),
        cid,
        &[0xAA; 32],
    )
    .await;
    expect_ack(&device.host, cid, 1).await;

    let (ctrl_byte, _, _) = recv_frame(&device.host).await;
    assert_eq!(ctrl_byte, ctrl::ERROR);
    assert!(device.router.channel(cid).is_none());
}

#[tokio::test]
async fn full_handshake_reaches_encrypted_transport() {
    let device = device();
    let chan = establish(&device, None).await;

    let channel = device.router.channel(chan.cid).unwrap();
    assert_eq!(channel.state(), ChannelState::EncryptedTransport);
    assert!(!channel.is_paired(), "no credential was presented");
    assert_eq!(
        channel.host_static_pubkey(),
        Some(device.host_keypair.public),
        "host static key authenticated by the handshake"
    );
}

#[tokio::test]
async fn valid_credential_in_th2_marks_the_channel_paired() {
    let device = device();
    let credential = device.credentials.issue(
        &device.host_keypair.public,
        CredentialMetadata {
            host_name: Some("workstation".to_owned()),
        },
    );

    let chan = establish(&device, Some(&credential)).await;
    assert!(device.router.channel(chan.cid).unwrap().is_paired());
}

#[tokio::test]
async fn foreign_credential_is_rejected() {
    let device = device();
    // Credential bound to a different host key.
    let credential = device.credentials.issue(
        &[0xEE; 32],
        CredentialMetadata {
            host_name: Some("someone else".to_owned()),
        },
    );

    let chan = establish(&device, Some(&credential)).await;
    assert!(!device.router.channel(chan.cid).unwrap().is_paired());
}

#[tokio::test]
async fn rotated_key_invalidates_presented_credential() {
    let device = device();
    let credential = device.credentials.issue(
        &device.host_keypair.public,
        CredentialMetadata { host_name: None },
    );
    device.credentials.invalidate_auth_key();

    let chan = establish(&device, Some(&credential)).await;
    assert!(!device.router.channel(chan.cid).unwrap().is_paired());
}

#[tokio::test]
async fn tampered_completion_is_fatal() {
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
    send_ack(&device.host, cid, 0).await;
    initiator.process_response(&response).unwrap();

    let (mut completion, _) = initiator.finish(&[]).unwrap();
    completion[10] ^= 0xFF;
    send_frame(
        &device.host,
        wire::with_sync_bit(ctrl::ENCRYPTED_TRANSPORT, 0),
        cid,
        &completion,
    )
    .await;
    expect_ack(&device.host, cid, 0).await;

    let (ctrl_byte, _, payload) = recv_frame(&device.host).await;
    assert_eq!(ctrl_byte, ctrl::ERROR);
    assert_eq!(payload, b"DECRYPTION_FAILED");
    assert!(device.router.channel(cid).is_none());
}
