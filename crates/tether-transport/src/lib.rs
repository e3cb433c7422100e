//! Report-level transport: multiplexing, handshake, encrypted transport,
//! reliability and session multiplexing between a host and a device.
//!
//! Data flows `WireInterface → Transport → Reassembler → sync handling →
//! Channel → (decrypt) → sessions`; outbound reverses the chain with the
//! transmission loop supervising retransmissions. The [`router::Router`]
//! owns the read loop and the channel table.

pub mod broadcast;
pub mod channel;
pub mod codec_v1;
pub mod error;
pub mod iface;
pub mod reassembly;
pub mod reliability;
pub mod router;
pub mod session;
pub mod store;
pub mod transport;

pub use channel::{Channel, ChannelState};
pub use error::LinkError;
pub use iface::{MockHost, MockWire, WireInterface};
pub use router::{Message, Router};
pub use session::{InnerMessage, SessionHandle, SessionState};
pub use store::{ChannelCacheStore, ChannelRecord, MemoryCache, SessionRecord};
