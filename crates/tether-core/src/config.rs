//! Configuration for the transport core.
//!
//! Resolution order: $TETHER_CONFIG file → defaults. Unparseable files fall
//! back to defaults with a warning rather than refusing to start.

use serde::{Deserialize, Serialize};

/// Which framing the router speaks on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Channel-multiplexed framing with handshake and encrypted transport.
    Channeled,
    /// Single-stream length-prefixed legacy codec.
    LegacyV1,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Protocol selection (the build-time switch of older firmwares,
    /// lifted into configuration).
    pub protocol: Protocol,

    /// Give up on a send after this many transmissions without an ACK.
    pub max_retransmissions: u32,

    /// A transmission loop being stopped early still writes the frame at
    /// least this many times.
    pub min_retransmissions: u32,

    /// Bounded depth of each session inbox. A full inbox suspends the read
    /// loop until the application drains it.
    pub inbox_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Channeled,
            max_retransmissions: 50,
            min_retransmissions: 2,
            inbox_capacity: 16,
        }
    }
}

impl TransportConfig {
    /// Load configuration from the file named by $TETHER_CONFIG, if set.
    pub fn load() -> Self {
        let Some(path) = std::env::var_os("TETHER_CONFIG") else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(error = %e, "config file unparseable, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "config file unreadable, using defaults");
                Self::default()
            }
        }
    }
}
