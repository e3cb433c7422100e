//! Top-level entry points: the read loop, the channel table, and protocol
//! selection.
//!
//! One report at a time: broadcast traffic is answered inline (it may
//! interrupt a reassembly on another channel without corrupting it),
//! continuations are routed to whichever reassembly is active, and init
//! reports either reach their channel or an orphan buffer whose only
//! purpose is to answer unknown channels with an error frame.
//!
//! Recoverable errors are absorbed here — the frame is dropped and the
//! loop keeps reading. Fatal errors tear down the one channel involved.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use tether_core::checksum::CHECKSUM_LEN;
use tether_core::config::{Protocol, TransportConfig};
use tether_core::credential::CredentialManager;
use tether_core::crypto::Keypair;
use tether_core::proto::{encode_to_vec, DeviceProperties};
use tether_core::wire::{self, Report, BROADCAST_CID, INIT_DATA_OFFSET};

use crate::broadcast;
use crate::channel::{self, Channel, ChannelState, ReceiveOutcome};
use crate::codec_v1;
use crate::error::{LinkError, ProtocolError, TransportError, UNALLOCATED_SESSION};
use crate::iface::WireInterface;
use crate::reassembly::{FeedOutcome, Reassembler};
use crate::session::SessionHandle;
use crate::store::ChannelCacheStore;
use crate::transport::Transport;

/// A message surfaced by [`Router::read_message`].
#[derive(Debug, Clone)]
pub struct Message {
    pub cid: u16,
    pub session_id: u8,
    pub message_type: u16,
    pub data: Bytes,
}

/// Which reassembly the next continuation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    Channel(u16),
    Orphan(u16),
}

pub struct Router<W: WireInterface> {
    transport: Transport<W>,
    config: TransportConfig,
    store: Arc<dyn ChannelCacheStore>,
    credentials: Arc<CredentialManager>,
    keypair: Arc<Keypair>,
    device_properties: Vec<u8>,

    channels: DashMap<u16, Arc<Channel<W>>>,
    in_flight: Mutex<Option<InFlight>>,
    /// Buffers frames aimed at channels that do not exist, so they can be
    /// checksummed and answered with an error frame.
    orphan: tokio::sync::Mutex<Reassembler>,

    new_sessions_tx: mpsc::Sender<SessionHandle<W>>,
    new_sessions_rx: tokio::sync::Mutex<mpsc::Receiver<SessionHandle<W>>>,
}

impl<W: WireInterface> Router<W> {
    pub fn new(
        iface: Arc<W>,
        store: Arc<dyn ChannelCacheStore>,
        keypair: Arc<Keypair>,
        credentials: Arc<CredentialManager>,
        config: TransportConfig,
    ) -> Self {
        let (new_sessions_tx, new_sessions_rx) = mpsc::channel(8);
        Self {
            transport: Transport::new(iface),
            config,
            store,
            credentials,
            keypair,
            device_properties: encode_to_vec(&DeviceProperties::this_device()),
            channels: DashMap::new(),
            in_flight: Mutex::new(None),
            orphan: tokio::sync::Mutex::new(Reassembler::new()),
            new_sessions_tx,
            new_sessions_rx: tokio::sync::Mutex::new(new_sessions_rx),
        }
    }

    pub(crate) fn transport(&self) -> &Transport<W> {
        &self.transport
    }

    pub fn store(&self) -> &Arc<dyn ChannelCacheStore> {
        &self.store
    }

    pub(crate) fn device_properties(&self) -> &[u8] {
        &self.device_properties
    }

    pub fn iface_tag(&self) -> u8 {
        self.transport.iface_tag()
    }

    pub fn channel(&self, cid: u16) -> Option<Arc<Channel<W>>> {
        self.channels.get(&cid).map(|c| c.clone())
    }

    /// Reload live channels from the store at boot. Only channels still
    /// waiting for a handshake can resume — transport keys do not survive
    /// a reboot, so later-state records are discarded.
    pub fn rehydrate(&self) {
        for record in self.store.channels() {
            if record.iface_tag != self.iface_tag() {
                continue;
            }
            match ChannelState::from_u8(record.state) {
                Some(ChannelState::Th1) => {
                    self.install_channel(record.cid, ChannelState::Th1, record.sync);
                    tracing::info!(cid = record.cid, "channel rehydrated");
                }
                _ => {
                    tracing::debug!(cid = record.cid, "dropping non-resumable channel record");
                    self.store.remove_channel(record.cid);
                }
            }
        }
    }

    pub(crate) fn install_channel(
        &self,
        cid: u16,
        state: ChannelState,
        sync: u8,
    ) -> Arc<Channel<W>> {
        let channel = Channel::new(
            cid,
            self.transport.clone(),
            self.config.clone(),
            self.store.clone(),
            self.credentials.clone(),
            self.keypair.clone(),
            self.new_sessions_tx.clone(),
            state,
            sync,
        );
        self.channels.insert(cid, channel.clone());
        channel
    }

    /// Wait for the next session opened by a host control message.
    pub async fn accept_session(&self) -> Option<SessionHandle<W>> {
        self.new_sessions_rx.lock().await.recv().await
    }

    // ── Read path ─────────────────────────────────────────────────────────────

    /// Read one message, per the configured protocol.
    pub async fn read_message(&self) -> Result<Message, LinkError> {
        match self.config.protocol {
            Protocol::Channeled => loop {
                if let Some(message) = self.poll().await? {
                    return Ok(message);
                }
            },
            Protocol::LegacyV1 => {
                let message = codec_v1::read_message(&self.transport).await?;
                Ok(Message {
                    cid: 0,
                    session_id: 0,
                    message_type: message.message_type,
                    data: Bytes::from(message.data),
                })
            }
        }
    }

    /// Write one message, per the configured protocol.
    pub async fn write_message(
        &self,
        cid: u16,
        session_id: u8,
        message_type: u16,
        data: &[u8],
    ) -> Result<(), LinkError> {
        match self.config.protocol {
            Protocol::Channeled => {
                let channel = self
                    .channel(cid)
                    .ok_or(ProtocolError::UnknownChannel(cid))?;
                channel.write_raw(session_id, message_type, data).await
            }
            Protocol::LegacyV1 => {
                codec_v1::write_message(&self.transport, message_type, data)
                    .await
                    .map_err(Into::into)
            }
        }
    }

    /// Drive the read loop until the wire closes. Applications that
    /// consume sessions through handles use this as the pump.
    pub async fn run(&self) -> Result<(), LinkError> {
        loop {
            match self.poll().await {
                Ok(_) => {}
                Err(LinkError::Transport(TransportError::Closed)) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Process exactly one report. Returns a message when one was
    /// delivered to a session by this report.
    pub async fn poll(&self) -> Result<Option<Message>, LinkError> {
        let report = self.transport.poll_read().await?;
        self.handle_report(&report).await
    }

    async fn handle_report(&self, report: &Report) -> Result<Option<Message>, LinkError> {
        let ctrl_byte = report[0];
        let cid = wire::report_cid(report);

        // Broadcast allocation is answered inline and never touches the
        // reassembly in progress on any other channel.
        if cid == BROADCAST_CID {
            if let Err(e) = broadcast::handle_broadcast(self, report).await {
                if matches!(e, LinkError::Transport(_)) {
                    return Err(e);
                }
                tracing::warn!(error = %e, "broadcast request rejected");
            }
            return Ok(None);
        }

        if wire::is_continuation(ctrl_byte) {
            let current = *self.in_flight.lock().unwrap();
            return match current {
                Some(InFlight::Channel(active)) if active == cid => {
                    match self.channel(cid) {
                        Some(channel) => self.feed_channel(channel, report).await,
                        None => {
                            self.clear_in_flight(cid);
                            Ok(None)
                        }
                    }
                }
                Some(InFlight::Orphan(active)) if active == cid => {
                    self.feed_orphan(report, cid).await
                }
                _ => {
                    tracing::trace!(cid, "continuation outside a reassembly, ignoring");
                    Ok(None)
                }
            };
        }

        // An init report interrupts whatever reassembly was in progress.
        self.interrupt_in_flight().await;
        match self.channel(cid) {
            Some(channel) => self.feed_channel(channel, report).await,
            None => self.start_orphan(report, cid).await,
        }
    }

    async fn feed_channel(
        &self,
        channel: Arc<Channel<W>>,
        report: &Report,
    ) -> Result<Option<Message>, LinkError> {
        let cid = channel.cid();
        match channel.receive_report(report).await {
            Ok(ReceiveOutcome::Incomplete) => {
                self.set_in_flight(InFlight::Channel(cid));
                Ok(None)
            }
            Ok(ReceiveOutcome::Handled(inner)) => {
                self.clear_in_flight(cid);
                Ok(inner.map(|m| Message {
                    cid,
                    session_id: m.session_id,
                    message_type: m.message_type,
                    data: m.body,
                }))
            }
            Err(LinkError::Transport(e)) => Err(e.into()),
            Err(e) => {
                self.clear_in_flight(cid);
                if let Some(reason) = e.wire_reason() {
                    let _ = channel::send_error_frame(&self.transport, cid, reason).await;
                }
                if e.is_fatal_to_channel() {
                    tracing::warn!(cid, error = %e, "fatal channel error, tearing down");
                    channel.teardown().await;
                    self.channels.remove(&cid);
                } else {
                    tracing::debug!(cid, error = %e, "frame dropped");
                }
                Ok(None)
            }
        }
    }

    // ── Orphan frames (unknown channels) ──────────────────────────────────────

    async fn start_orphan(&self, report: &Report, cid: u16) -> Result<Option<Message>, LinkError> {
        let mut orphan = self.orphan.lock().await;
        match orphan.feed_init(report) {
            Ok(FeedOutcome::Complete) => {
                self.answer_orphan(&orphan, cid).await;
                orphan.reset();
                Ok(None)
            }
            Ok(FeedOutcome::Incomplete) => {
                self.set_in_flight(InFlight::Orphan(cid));
                Ok(None)
            }
            Err(e) => {
                orphan.reset();
                tracing::debug!(cid, error = %e, "unparseable frame for unknown channel");
                Ok(None)
            }
        }
    }

    async fn feed_orphan(&self, report: &Report, cid: u16) -> Result<Option<Message>, LinkError> {
        let mut orphan = self.orphan.lock().await;
        match orphan.feed_cont(report) {
            Ok(FeedOutcome::Complete) => {
                self.clear_in_flight(cid);
                self.answer_orphan(&orphan, cid).await;
                orphan.reset();
            }
            Ok(FeedOutcome::Incomplete) => {}
            Err(e) => {
                self.clear_in_flight(cid);
                orphan.reset();
                tracing::debug!(cid, error = %e, "orphan reassembly failed");
            }
        }
        Ok(None)
    }

    /// A complete frame for a channel that does not exist: answer with the
    /// unallocated-session error if it checks out, drop it otherwise.
    async fn answer_orphan(&self, orphan: &Reassembler, cid: u16) {
        let frame = orphan.frame();
        let len = orphan.message_len();
        if len < INIT_DATA_OFFSET + CHECKSUM_LEN {
            return;
        }
        let (covered, crc) = frame.split_at(len - CHECKSUM_LEN);
        if !tether_core::checksum::is_valid(crc, covered) {
            tracing::debug!(cid, "bad checksum on frame for unknown channel");
            return;
        }
        tracing::warn!(cid, "frame for unallocated channel");
        let _ = channel::send_error_frame(&self.transport, cid, UNALLOCATED_SESSION).await;
    }

    fn set_in_flight(&self, entry: InFlight) {
        *self.in_flight.lock().unwrap() = Some(entry);
    }

    fn clear_in_flight(&self, cid: u16) {
        let mut guard = self.in_flight.lock().unwrap();
        if matches!(
            *guard,
            Some(InFlight::Channel(active) | InFlight::Orphan(active)) if active == cid
        ) {
            *guard = None;
        }
    }

    async fn interrupt_in_flight(&self) {
        let current = self.in_flight.lock().unwrap().take();
        match current {
            Some(InFlight::Channel(cid)) => {
                if let Some(channel) = self.channel(cid) {
                    channel.abort_reassembly().await;
                }
            }
            Some(InFlight::Orphan(_)) => self.orphan.lock().await.reset(),
            None => {}
        }
    }
}
