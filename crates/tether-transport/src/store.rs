//! Persistable per-channel state.
//!
//! The store is a capability handed to the router: channels write
//! individual fields as they change, and the router replays live records
//! at boot. The in-memory implementation backs tests and hosts without
//! flash; a firmware build supplies its own implementation with the same
//! atomic field-update contract.

use std::sync::atomic::{AtomicU16, Ordering};

use dashmap::DashMap;

use tether_core::wire::BROADCAST_CID;

/// First channel id handed out by a fresh store.
pub const FIRST_CID: u16 = 0x1000;

/// Everything a channel needs to survive a reboot. The noise keys are
/// opaque to the store.
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub cid: u16,
    pub iface_tag: u8,
    pub state: u8,
    pub sync: u8,
    pub host_ephemeral_key: Option<[u8; 32]>,
    pub noise_keys: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub channel_cid: u16,
    pub session_id: u8,
    pub state: u8,
}

pub trait ChannelCacheStore: Send + Sync {
    /// Allocate the next channel id. Monotonic, never the broadcast id;
    /// returns `None` once the id space is spent (no wrap-around).
    fn allocate_cid(&self) -> Option<u16>;

    fn insert_channel(&self, record: ChannelRecord);
    fn channel(&self, cid: u16) -> Option<ChannelRecord>;
    /// Snapshot of all live channel records, for boot rehydration.
    fn channels(&self) -> Vec<ChannelRecord>;
    /// Drop a channel and every session on it.
    fn remove_channel(&self, cid: u16);

    fn update_channel_state(&self, cid: u16, state: u8);
    fn update_channel_sync(&self, cid: u16, sync: u8);
    fn set_host_ephemeral_key(&self, cid: u16, key: [u8; 32]);

    fn insert_session(&self, record: SessionRecord);
    fn sessions_for(&self, cid: u16) -> Vec<SessionRecord>;
    fn remove_session(&self, cid: u16, session_id: u8);
}

// ── In-memory store ───────────────────────────────────────────────────────────

pub struct MemoryCache {
    channels: DashMap<u16, ChannelRecord>,
    sessions: DashMap<(u16, u8), SessionRecord>,
    next_cid: AtomicU16,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            sessions: DashMap::new(),
            next_cid: AtomicU16::new(FIRST_CID),
        }
    }
}

impl ChannelCacheStore for MemoryCache {
    fn allocate_cid(&self) -> Option<u16> {
        let cid = self.next_cid.fetch_add(1, Ordering::Relaxed);
        if cid >= BROADCAST_CID {
            // Id space spent. Leave the counter pinned so later calls
            // keep failing instead of wrapping into live ids.
            self.next_cid.store(BROADCAST_CID, Ordering::Relaxed);
            return None;
        }
        Some(cid)
    }

    fn insert_channel(&self, record: ChannelRecord) {
        self.channels.insert(record.cid, record);
    }

    fn channel(&self, cid: u16) -> Option<ChannelRecord> {
        self.channels.get(&cid).map(|r| r.value().clone())
    }

    fn channels(&self) -> Vec<ChannelRecord> {
        self.channels.iter().map(|r| r.value().clone()).collect()
    }

    fn remove_channel(&self, cid: u16) {
        self.channels.remove(&cid);
        self.sessions.retain(|(channel_cid, _), _| *channel_cid != cid);
    }

    fn update_channel_state(&self, cid: u16, state: u8) {
        if let Some(mut record) = self.channels.get_mut(&cid) {
            record.state = state;
        }
    }

    fn update_channel_sync(&self, cid: u16, sync: u8) {
        if let Some(mut record) = self.channels.get_mut(&cid) {
            record.sync = sync;
        }
    }

    fn set_host_ephemeral_key(&self, cid: u16, key: [u8; 32]) {
        if let Some(mut record) = self.channels.get_mut(&cid) {
            record.host_ephemeral_key = Some(key);
        }
    }

    fn insert_session(&self, record: SessionRecord) {
        self.sessions
            .insert((record.channel_cid, record.session_id), record);
    }

    fn sessions_for(&self, cid: u16) -> Vec<SessionRecord> {
        self.sessions
            .iter()
            .filter(|entry| entry.key().0 == cid)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn remove_session(&self, cid: u16, session_id: u8) {
        self.sessions.remove(&(cid, session_id));
    }
}
