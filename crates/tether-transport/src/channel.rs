//! Per-channel state machine.
//!
//! A channel is created by a broadcast allocation, walks the handshake
//! (TH1 → TH2), and settles into encrypted transport where it multiplexes
//! sessions. The channel owns its reassembly buffer and its sessions; a
//! session handle holds the channel behind an `Arc`, never the reverse.
//!
//! Inbound frames are acknowledged before they are acted on, so a peer
//! always sees the ACK ahead of any scheduled response. Outbound frames
//! take the single send slot and ride the retransmission loop until the
//! matching ACK arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use prost::Message;
use tokio::sync::mpsc;

use tether_core::checksum::{self, CHECKSUM_LEN};
use tether_core::config::TransportConfig;
use tether_core::credential::CredentialManager;
use tether_core::crypto::{
    CompletedHandshake, HandshakeResponder, Keypair, TransportCipher, KEY_LEN, TAG_LEN,
};
use tether_core::proto::{self, CreateNewSession, NewSession};
use tether_core::wire::{self, InitHeader, Report, INIT_DATA_OFFSET, MAX_PAYLOAD_LEN};

use crate::error::{
    FramingError, LinkError, ProtocolError, SessionError, SyncError, TransportError,
};
use crate::iface::WireInterface;
use crate::reassembly::{FeedOutcome, Reassembler};
use crate::reliability::{SyncState, TransmissionLoop, TransmitOutcome};
use crate::session::{InnerMessage, SessionEntry, SessionHandle, SessionState, CONTROL_SESSION_ID};
use crate::store::{ChannelCacheStore, SessionRecord};
use crate::transport::Transport;

const MESSAGE_TYPE_LEN: usize = 2;
const SESSION_ID_LEN: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Unallocated = 0,
    Th1 = 1,
    Th2 = 2,
    Tp1 = 3,
    Tp2 = 4,
    Tp3 = 5,
    Tp4 = 6,
    Tp5 = 7,
    EncryptedTransport = 8,
}

impl ChannelState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unallocated),
            1 => Some(Self::Th1),
            2 => Some(Self::Th2),
            3 => Some(Self::Tp1),
            4 => Some(Self::Tp2),
            5 => Some(Self::Tp3),
            6 => Some(Self::Tp4),
            7 => Some(Self::Tp5),
            8 => Some(Self::EncryptedTransport),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unallocated => "unallocated",
            Self::Th1 => "th1",
            Self::Th2 => "th2",
            Self::Tp1 => "tp1",
            Self::Tp2 => "tp2",
            Self::Tp3 => "tp3",
            Self::Tp4 => "tp4",
            Self::Tp5 => "tp5",
            Self::EncryptedTransport => "encrypted-transport",
        }
    }
}

/// Where the channel's key material currently lives.
enum HandshakePhase {
    /// Nothing yet — waiting for the host ephemeral.
    Idle,
    /// TH1 consumed; waiting for the host's encrypted static key.
    AwaitingStatic(HandshakeResponder),
    /// Handshake settled; encrypted transport is live.
    Transport(TransportCipher),
}

/// Result of feeding one report into a channel.
pub(crate) enum ReceiveOutcome {
    /// More continuation reports are expected.
    Incomplete,
    /// A full frame was processed; an inner message may have surfaced.
    Handled(Option<InnerMessage>),
}

pub struct Channel<W: WireInterface> {
    /// Self-handle for scheduling response tasks and minting session
    /// handles. Set once at construction.
    me: Weak<Self>,
    cid: u16,
    transport: Transport<W>,
    config: TransportConfig,
    store: Arc<dyn ChannelCacheStore>,
    credentials: Arc<CredentialManager>,
    keypair: Arc<Keypair>,

    state: Mutex<ChannelState>,
    sync: SyncState,
    reassembler: tokio::sync::Mutex<Reassembler>,
    handshake: Mutex<HandshakePhase>,
    host_ephemeral_key: Mutex<Option<[u8; KEY_LEN]>>,
    host_static_pubkey: Mutex<Option<[u8; KEY_LEN]>>,
    paired: AtomicBool,

    sessions: DashMap<u8, SessionEntry>,
    new_sessions: mpsc::Sender<SessionHandle<W>>,

    /// Supervisor of the in-flight send, if any. The ACK path cancels it
    /// immediately; teardown stops it after the retransmission floor.
    in_flight_send: Mutex<Option<Arc<TransmissionLoop<W>>>>,
    /// Outbound sends are strict FIFO per channel.
    send_slot: tokio::sync::Mutex<()>,
}

impl<W: WireInterface> Channel<W> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cid: u16,
        transport: Transport<W>,
        config: TransportConfig,
        store: Arc<dyn ChannelCacheStore>,
        credentials: Arc<CredentialManager>,
        keypair: Arc<Keypair>,
        new_sessions: mpsc::Sender<SessionHandle<W>>,
        state: ChannelState,
        sync: u8,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            cid,
            transport,
            config,
            store,
            credentials,
            keypair,
            state: Mutex::new(state),
            sync: SyncState::new(sync),
            reassembler: tokio::sync::Mutex::new(Reassembler::new()),
            handshake: Mutex::new(HandshakePhase::Idle),
            host_ephemeral_key: Mutex::new(None),
            host_static_pubkey: Mutex::new(None),
            paired: AtomicBool::new(false),
            sessions: DashMap::new(),
            new_sessions,
            in_flight_send: Mutex::new(None),
            send_slot: tokio::sync::Mutex::new(()),
        })
    }

    pub fn cid(&self) -> u16 {
        self.cid
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock().unwrap()
    }

    /// Whether the handshake authenticated a known pairing credential.
    pub fn is_paired(&self) -> bool {
        self.paired.load(Ordering::Relaxed)
    }

    pub fn host_static_pubkey(&self) -> Option<[u8; KEY_LEN]> {
        *self.host_static_pubkey.lock().unwrap()
    }

    fn set_state(&self, state: ChannelState) {
        tracing::debug!(cid = self.cid, state = state.name(), "channel state");
        *self.state.lock().unwrap() = state;
        self.store.update_channel_state(self.cid, state as u8);
    }

    fn persist_sync(&self) {
        self.store.update_channel_sync(self.cid, self.sync.raw());
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    /// Feed one report. The router guarantees report ordering; the channel
    /// guarantees ACK-before-action and at-most-once delivery.
    pub(crate) async fn receive_report(
        &self,
        report: &Report,
    ) -> Result<ReceiveOutcome, LinkError> {
        let mut reassembler = self.reassembler.lock().await;

        let outcome = if wire::is_continuation(report[0]) {
            reassembler.feed_cont(report)?
        } else {
            reassembler.feed_init(report)?
        };

        match outcome {
            FeedOutcome::Incomplete => Ok(ReceiveOutcome::Incomplete),
            FeedOutcome::Complete => {
                let result = self.handle_completed(&mut reassembler).await;
                reassembler.reset();
                result.map(ReceiveOutcome::Handled)
            }
        }
    }

    /// Drop a partially reassembled frame (init-report interruption).
    pub(crate) async fn abort_reassembly(&self) {
        let mut reassembler = self.reassembler.lock().await;
        if reassembler.is_midstream() {
            tracing::warn!(cid = self.cid, "reassembly aborted by interrupting init report");
            reassembler.reset();
        }
    }

    async fn handle_completed(
        &self,
        reassembler: &mut Reassembler,
    ) -> Result<Option<InnerMessage>, LinkError> {
        let frame_len = reassembler.message_len();
        if frame_len < INIT_DATA_OFFSET + CHECKSUM_LEN {
            return Err(FramingError::Truncated.into());
        }

        let ctrl_byte = reassembler.frame()[0];
        {
            let (covered, crc) = reassembler.frame().split_at(frame_len - CHECKSUM_LEN);
            if !checksum::is_valid(crc, covered) {
                return Err(FramingError::Checksum.into());
            }
        }

        let bit = wire::sync_bit(ctrl_byte);

        if wire::is_ack(ctrl_byte) {
            self.on_ack(bit);
            return Ok(None);
        }

        if bit != self.sync.expected_receive_bit() {
            // Peer duplicate: re-acknowledge with its bit, drop the payload.
            tracing::debug!(cid = self.cid, bit, "unexpected sync bit, re-acking");
            self.send_ack(bit).await?;
            return Ok(None);
        }

        self.send_ack(bit).await?;
        self.sync.set_expected_receive_bit(1 - bit);
        self.persist_sync();

        self.dispatch_frame(ctrl_byte, reassembler).await
    }

    async fn dispatch_frame(
        &self,
        ctrl_byte: u8,
        reassembler: &mut Reassembler,
    ) -> Result<Option<InnerMessage>, LinkError> {
        let state = self.state();
        match state {
            ChannelState::Th1 => {
                self.handle_th1(ctrl_byte, reassembler)?;
                Ok(None)
            }
            ChannelState::Th2 => {
                if !wire::is_encrypted_transport(ctrl_byte) {
                    return Err(ProtocolError::UnexpectedCtrlByte(ctrl_byte, state.name()).into());
                }
                self.handle_th2(reassembler)?;
                Ok(None)
            }
            ChannelState::EncryptedTransport => {
                if !wire::is_encrypted_transport(ctrl_byte) {
                    return Err(ProtocolError::UnexpectedCtrlByte(ctrl_byte, state.name()).into());
                }
                self.handle_encrypted(reassembler).await
            }
            _ => Err(ProtocolError::UnexpectedCtrlByte(ctrl_byte, state.name()).into()),
        }
    }

    /// TH1: the frame carries the host's plaintext ephemeral key.
    fn handle_th1(
        &self,
        ctrl_byte: u8,
        reassembler: &mut Reassembler,
    ) -> Result<(), LinkError> {
        if !wire::is_handshake_init(ctrl_byte) {
            return Err(ProtocolError::UnexpectedCtrlByte(ctrl_byte, "th1").into());
        }
        let payload_len = reassembler.message_len() - INIT_DATA_OFFSET;
        if payload_len != KEY_LEN + CHECKSUM_LEN {
            return Err(ProtocolError::BadHandshakeLength(payload_len).into());
        }

        let mut host_ephemeral = [0u8; KEY_LEN];
        host_ephemeral
            .copy_from_slice(&reassembler.frame()[INIT_DATA_OFFSET..INIT_DATA_OFFSET + KEY_LEN]);
        *self.host_ephemeral_key.lock().unwrap() = Some(host_ephemeral);
        self.store.set_host_ephemeral_key(self.cid, host_ephemeral);

        let mut responder = HandshakeResponder::new(&self.keypair)?;
        let response = responder.process_ephemeral(&host_ephemeral)?;
        *self.handshake.lock().unwrap() = HandshakePhase::AwaitingStatic(responder);

        self.set_state(ChannelState::Th2);
        self.spawn_framed_send(response);
        Ok(())
    }

    /// TH2: encrypted host static key plus the trailing noise payload.
    fn handle_th2(&self, reassembler: &mut Reassembler) -> Result<(), LinkError> {
        let frame_len = reassembler.message_len();
        let payload_len = frame_len - INIT_DATA_OFFSET;
        let static_len = KEY_LEN + TAG_LEN;
        if payload_len < static_len + TAG_LEN + CHECKSUM_LEN {
            return Err(ProtocolError::BadHandshakeLength(payload_len).into());
        }

        let responder = {
            let mut phase = self.handshake.lock().unwrap();
            match std::mem::replace(&mut *phase, HandshakePhase::Idle) {
                HandshakePhase::AwaitingStatic(responder) => responder,
                other => {
                    *phase = other;
                    return Err(ProtocolError::UnexpectedCtrlByte(0x02, "th2").into());
                }
            }
        };

        let frame = reassembler.frame();
        let encrypted_static = &frame[INIT_DATA_OFFSET..INIT_DATA_OFFSET + static_len];
        let noise_payload = &frame[INIT_DATA_OFFSET + static_len..frame_len - CHECKSUM_LEN];

        let CompletedHandshake {
            cipher,
            host_static_pubkey,
            noise_payload,
        } = responder.process_static(encrypted_static, noise_payload)?;

        *self.host_static_pubkey.lock().unwrap() = Some(host_static_pubkey);
        if !noise_payload.is_empty() {
            let valid = self.credentials.validate(&noise_payload, &host_static_pubkey);
            self.paired.store(valid, Ordering::Relaxed);
            if valid {
                tracing::info!(cid = self.cid, "host presented a valid pairing credential");
            } else {
                tracing::warn!(cid = self.cid, "pairing credential rejected");
            }
        }

        *self.handshake.lock().unwrap() = HandshakePhase::Transport(cipher);
        self.set_state(ChannelState::EncryptedTransport);

        // Completion response: the first transport message, empty plaintext.
        self.spawn_encrypted_send(Vec::new());
        Ok(())
    }

    /// Encrypted transport: decrypt in place and route by session id.
    async fn handle_encrypted(
        &self,
        reassembler: &mut Reassembler,
    ) -> Result<Option<InnerMessage>, LinkError> {
        let frame_len = reassembler.message_len();
        let ciphertext_len = frame_len - INIT_DATA_OFFSET - CHECKSUM_LEN;

        let plaintext_len = {
            let mut phase = self.handshake.lock().unwrap();
            let HandshakePhase::Transport(cipher) = &mut *phase else {
                return Err(ProtocolError::ChannelNotReady.into());
            };
            cipher.decrypt_in_place(reassembler.frame_mut(), INIT_DATA_OFFSET, ciphertext_len)?
        };
        if plaintext_len < SESSION_ID_LEN + MESSAGE_TYPE_LEN {
            return Err(ProtocolError::ShortInnerMessage(plaintext_len).into());
        }

        let frame = reassembler.frame();
        let session_id = frame[INIT_DATA_OFFSET];
        let message_type = u16::from_be_bytes([
            frame[INIT_DATA_OFFSET + 1],
            frame[INIT_DATA_OFFSET + 2],
        ]);
        let body = &frame[INIT_DATA_OFFSET + SESSION_ID_LEN + MESSAGE_TYPE_LEN
            ..INIT_DATA_OFFSET + plaintext_len];

        if session_id == CONTROL_SESSION_ID {
            self.handle_control(message_type, body)?;
            return Ok(None);
        }

        let message = InnerMessage {
            session_id,
            message_type,
            body: bytes::Bytes::copy_from_slice(body),
        };
        self.deliver(message).await
    }

    /// Hand a decrypted message to its session inbox.
    ///
    /// An unallocated session id surfaces as a typed error; the router
    /// answers it with the error frame and the channel stays up.
    async fn deliver(
        &self,
        message: InnerMessage,
    ) -> Result<Option<InnerMessage>, LinkError> {
        let session_id = message.session_id;
        let inbox = match self.sessions.get(&session_id) {
            Some(entry) if entry.state != SessionState::Unallocated => entry.inbox.clone(),
            _ => return Err(SessionError::Unallocated(session_id).into()),
        };

        // Suspends when the inbox is full: no further frames are ACKed
        // until the application drains the session.
        if inbox.send(message.clone()).await.is_err() {
            tracing::warn!(cid = self.cid, session_id, "session handle dropped, ending session");
            self.close_session(session_id);
            return Err(SessionError::Unallocated(session_id).into());
        }
        Ok(Some(message))
    }

    /// Channel-control messages arrive on session id 0.
    fn handle_control(&self, message_type: u16, body: &[u8]) -> Result<(), LinkError> {
        match message_type {
            proto::msg_type::CREATE_NEW_SESSION => {
                let request = CreateNewSession::decode(body)
                    .map_err(|_| ProtocolError::MalformedControlMessage)?;
                let handle = self.create_session(request.passphrase.as_deref())?;
                let session_id = handle.session_id();

                if self.new_sessions.try_send(handle).is_err() {
                    tracing::warn!(cid = self.cid, session_id, "session accept queue full");
                }

                let reply = NewSession {
                    new_session_id: Some(session_id as u32),
                };
                let payload = control_payload(proto::msg_type::NEW_SESSION, &reply);
                self.spawn_encrypted_send(payload);
                Ok(())
            }
            other => {
                tracing::warn!(cid = self.cid, message_type = other, "unsupported channel-control message");
                Ok(())
            }
        }
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    /// Allocate a new session on this channel. Ids start at 1; id 0 is the
    /// control stream.
    pub fn create_session(
        &self,
        passphrase: Option<&str>,
    ) -> Result<SessionHandle<W>, SessionError> {
        let session_id = (1..=u8::MAX)
            .find(|id| !self.sessions.contains_key(id))
            .ok_or(SessionError::Exhausted)?;

        let state = if self.is_paired() {
            SessionState::Paired
        } else {
            SessionState::Initialized
        };

        let (tx, rx) = mpsc::channel(self.config.inbox_capacity);
        self.sessions.insert(session_id, SessionEntry { state, inbox: tx });
        self.store.insert_session(SessionRecord {
            channel_cid: self.cid,
            session_id,
            state: state as u8,
        });

        tracing::info!(
            cid = self.cid,
            session_id,
            with_passphrase = passphrase.is_some(),
            "session created"
        );
        let channel = self.me.upgrade().ok_or(SessionError::Closed)?;
        Ok(SessionHandle::new(channel, session_id, rx))
    }

    pub fn close_session(&self, session_id: u8) {
        if self.sessions.remove(&session_id).is_some() {
            self.store.remove_session(self.cid, session_id);
            tracing::info!(cid = self.cid, session_id, "session ended");
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    /// Encode and send a typed message on a session of this channel.
    pub async fn write(
        &self,
        session_id: u8,
        message_type: u16,
        msg: &impl prost::Message,
    ) -> Result<(), LinkError> {
        let mut payload = Vec::with_capacity(
            SESSION_ID_LEN + MESSAGE_TYPE_LEN + msg.encoded_len() + TAG_LEN,
        );
        payload.push(session_id);
        payload.extend_from_slice(&message_type.to_be_bytes());
        msg.encode(&mut payload)
            .expect("encoding into a Vec cannot fail");
        self.write_and_encrypt(payload).await
    }

    /// Send an already-encoded body on a session of this channel.
    pub async fn write_raw(
        &self,
        session_id: u8,
        message_type: u16,
        body: &[u8],
    ) -> Result<(), LinkError> {
        let mut payload =
            Vec::with_capacity(SESSION_ID_LEN + MESSAGE_TYPE_LEN + body.len() + TAG_LEN);
        payload.push(session_id);
        payload.extend_from_slice(&message_type.to_be_bytes());
        payload.extend_from_slice(body);
        self.write_and_encrypt(payload).await
    }

    /// Encrypt a plaintext payload and send it as one encrypted-transport
    /// frame. Encryption happens under the send slot so ciphertexts leave
    /// in nonce order.
    pub(crate) async fn write_and_encrypt(
        &self,
        mut payload: Vec<u8>,
    ) -> Result<(), LinkError> {
        let slot = self.send_slot.lock().await;

        let plaintext_len = payload.len();
        let tag = {
            let mut phase = self.handshake.lock().unwrap();
            let HandshakePhase::Transport(cipher) = &mut *phase else {
                return Err(ProtocolError::ChannelNotReady.into());
            };
            payload.reserve(TAG_LEN);
            cipher.encrypt_in_place(&mut payload, 0, plaintext_len)?
        };
        payload.extend_from_slice(&tag);

        self.transmit_locked(slot, wire::ctrl::ENCRYPTED_TRANSPORT, payload)
            .await
    }

    /// Send raw handshake material (already ciphered or public) as one
    /// encrypted-transport frame without touching the channel cipher.
    pub(crate) async fn send_framed(&self, payload: Vec<u8>) -> Result<(), LinkError> {
        let slot = self.send_slot.lock().await;
        self.transmit_locked(slot, wire::ctrl::ENCRYPTED_TRANSPORT, payload)
            .await
    }

    /// Reliability send side. The caller holds the send slot.
    async fn transmit_locked(
        &self,
        _slot: tokio::sync::MutexGuard<'_, ()>,
        kind: u8,
        payload: Vec<u8>,
    ) -> Result<(), LinkError> {
        if payload.len() + CHECKSUM_LEN > MAX_PAYLOAD_LEN {
            return Err(FramingError::Oversized(payload.len() + CHECKSUM_LEN).into());
        }

        self.sync.set_can_send(false);
        self.persist_sync();

        let bit = self.sync.send_bit();
        let header = InitHeader::new(
            wire::with_sync_bit(kind, bit),
            self.cid,
            (payload.len() + CHECKSUM_LEN) as u16,
        );
        let crc = checksum::compute_parts(&[&header.to_bytes(), &payload]);
        let mut frame = payload;
        frame.extend_from_slice(&crc);

        let transmission = Arc::new(TransmissionLoop::new(self.transport.clone(), header, frame));
        *self.in_flight_send.lock().unwrap() = Some(transmission.clone());

        let outcome = transmission
            .run(self.config.max_retransmissions, self.config.min_retransmissions)
            .await;
        *self.in_flight_send.lock().unwrap() = None;

        match outcome? {
            TransmitOutcome::Acked | TransmitOutcome::Closed => {
                self.sync.flip_send_bit();
                self.persist_sync();
                Ok(())
            }
            TransmitOutcome::Exhausted => {
                // can_send stays false until the channel is reset.
                Err(SyncError::RetransmissionsExhausted(self.config.max_retransmissions).into())
            }
        }
    }

    /// Schedule a frame of raw handshake material.
    fn spawn_framed_send(&self, payload: Vec<u8>) {
        let Some(channel) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = channel.send_framed(payload).await {
                tracing::warn!(cid = channel.cid(), error = %e, "scheduled send failed");
            }
        });
    }

    /// Schedule an encrypted frame (control replies, handshake completion).
    fn spawn_encrypted_send(&self, payload: Vec<u8>) {
        let Some(channel) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = channel.write_and_encrypt(payload).await {
                tracing::warn!(cid = channel.cid(), error = %e, "scheduled encrypted send failed");
            }
        });
    }

    /// Receive-side ACK handling: cancel the in-flight retransmission loop
    /// when the bit matches; ignore duplicates and strays.
    fn on_ack(&self, bit: u8) {
        if self.sync.can_send() {
            tracing::trace!(cid = self.cid, bit, "ack with nothing in flight, ignoring");
            return;
        }
        if self.sync.send_bit() != bit {
            tracing::trace!(cid = self.cid, bit, "ack with stale sync bit, ignoring");
            return;
        }
        if let Some(transmission) = self.in_flight_send.lock().unwrap().as_ref() {
            transmission.acknowledge();
        }
        self.sync.set_can_send(true);
        self.persist_sync();
    }

    async fn send_ack(&self, bit: u8) -> Result<(), TransportError> {
        tracing::debug!(cid = self.cid, bit, "acknowledging");
        let header = InitHeader::new(
            wire::with_sync_bit(wire::ctrl::ACK, bit),
            self.cid,
            CHECKSUM_LEN as u16,
        );
        let crc = checksum::compute(&header.to_bytes());
        self.transport.write_payload(&header, &crc).await
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Tear the channel down to a clean unallocated state: stop the
    /// in-flight send, drop all sessions, forget the persisted record.
    ///
    /// An in-flight send is not cut off mid-air — it still gets its
    /// minimum number of writes before the loop stops.
    pub(crate) async fn teardown(&self) {
        let in_flight = self.in_flight_send.lock().unwrap().take();
        if let Some(transmission) = in_flight {
            transmission.stop_after_min_retransmissions().await;
        }
        self.sessions.clear();
        self.store.remove_channel(self.cid);
        *self.state.lock().unwrap() = ChannelState::Unallocated;
        *self.handshake.lock().unwrap() = HandshakePhase::Idle;
        tracing::info!(cid = self.cid, "channel torn down");
    }
}

/// Write an error frame. Error frames ride outside the reliability loop.
pub(crate) async fn send_error_frame<W: WireInterface>(
    transport: &Transport<W>,
    cid: u16,
    reason: &[u8],
) -> Result<(), TransportError> {
    let header = InitHeader::new(
        wire::ctrl::ERROR,
        cid,
        (reason.len() + CHECKSUM_LEN) as u16,
    );
    let crc = checksum::compute_parts(&[&header.to_bytes(), reason]);
    let mut payload = reason.to_vec();
    payload.extend_from_slice(&crc);
    transport.write_payload(&header, &payload).await
}

/// Build a `session_id 0` control payload.
fn control_payload(message_type: u16, msg: &impl prost::Message) -> Vec<u8> {
    let mut payload =
        Vec::with_capacity(SESSION_ID_LEN + MESSAGE_TYPE_LEN + msg.encoded_len() + TAG_LEN);
    payload.push(CONTROL_SESSION_ID);
    payload.extend_from_slice(&message_type.to_be_bytes());
    msg.encode(&mut payload)
        .expect("encoding into a Vec cannot fail");
    payload
}
