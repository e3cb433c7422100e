//! Sessions multiplexed over one channel.
//!
//! A session is a logical stream identified by one byte inside the
//! encrypted payload; id 0 is the channel-control stream and never appears
//! in the session map. Sessions hold no key material — keys live at the
//! channel level — so a handle is just an id, a borrowed channel, and the
//! receiving half of a bounded inbox.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::channel::Channel;
use crate::error::{LinkError, SessionError};
use crate::iface::WireInterface;

/// The channel-control stream id.
pub const CONTROL_SESSION_ID: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Unallocated = 0,
    Initialized = 1,
    Paired = 2,
    Unpaired = 3,
    Pairing = 4,
    AppTraffic = 5,
}

impl SessionState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unallocated),
            1 => Some(Self::Initialized),
            2 => Some(Self::Paired),
            3 => Some(Self::Unpaired),
            4 => Some(Self::Pairing),
            5 => Some(Self::AppTraffic),
            _ => None,
        }
    }
}

/// A decrypted message, as delivered to a session inbox.
#[derive(Debug, Clone)]
pub struct InnerMessage {
    pub session_id: u8,
    pub message_type: u16,
    pub body: Bytes,
}

/// The channel's side of a session: its state and the sending half of the
/// inbox. Delivery awaits inbox capacity, which is what backpressures the
/// read loop when an application stops draining.
pub(crate) struct SessionEntry {
    pub state: SessionState,
    pub inbox: mpsc::Sender<InnerMessage>,
}

/// The application's side of a session.
pub struct SessionHandle<W: WireInterface> {
    channel: Arc<Channel<W>>,
    session_id: u8,
    inbox: Mutex<mpsc::Receiver<InnerMessage>>,
}

impl<W: WireInterface> SessionHandle<W> {
    pub(crate) fn new(
        channel: Arc<Channel<W>>,
        session_id: u8,
        inbox: mpsc::Receiver<InnerMessage>,
    ) -> Self {
        Self {
            channel,
            session_id,
            inbox: Mutex::new(inbox),
        }
    }

    pub fn session_id(&self) -> u8 {
        self.session_id
    }

    pub fn channel_id(&self) -> u16 {
        self.channel.cid()
    }

    /// Wait for the next message addressed to this session.
    pub async fn recv(&self) -> Result<InnerMessage, SessionError> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or(SessionError::Closed)
    }

    /// Encode and send a typed message on this session.
    pub async fn send(
        &self,
        message_type: u16,
        msg: &impl prost::Message,
    ) -> Result<(), LinkError> {
        self.channel.write(self.session_id, message_type, msg).await
    }

    /// Send an already-encoded body on this session.
    pub async fn send_raw(&self, message_type: u16, body: &[u8]) -> Result<(), LinkError> {
        self.channel
            .write_raw(self.session_id, message_type, body)
            .await
    }

    /// End this session. The channel stays up.
    pub fn close(&self) {
        self.channel.close_session(self.session_id);
    }
}
