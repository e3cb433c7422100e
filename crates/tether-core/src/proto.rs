//! Protocol messages carried inside frames.
//!
//! Everything a host and device exchange above the framing layer is a
//! prost message: device properties in the allocation response, the
//! channel-control messages on session id 0, and the pairing credential
//! material. Field tags are part of the wire format.

use prost::Message;

/// Message-type codes carried in the 2-byte type field of an inner message.
pub mod msg_type {
    /// Host asks the channel to open a new session (session id 0 only).
    pub const CREATE_NEW_SESSION: u16 = 1000;
    /// Device answer carrying the freshly allocated session id.
    pub const NEW_SESSION: u16 = 1001;
}

// ── Device properties ─────────────────────────────────────────────────────────

/// Advertised in every channel-allocation response, after the nonce and the
/// new channel id.
#[derive(Clone, PartialEq, Message)]
pub struct DeviceProperties {
    #[prost(string, tag = "1")]
    pub internal_model: String,
    #[prost(uint32, tag = "2")]
    pub model_variant: u32,
    #[prost(bool, tag = "3")]
    pub bootloader_mode: bool,
    #[prost(uint32, tag = "4")]
    pub protocol_version: u32,
    #[prost(uint32, repeated, tag = "5")]
    pub pairing_methods: Vec<u32>,
}

impl DeviceProperties {
    /// The properties this firmware reports.
    pub fn this_device() -> Self {
        Self {
            internal_model: "T3W1".to_owned(),
            model_variant: 5,
            bootloader_mode: false,
            protocol_version: 1,
            pairing_methods: vec![1, 2],
        }
    }
}

// ── Channel-control messages ──────────────────────────────────────────────────

/// Session id 0 request: open a new session on this channel.
#[derive(Clone, PartialEq, Message)]
pub struct CreateNewSession {
    #[prost(string, optional, tag = "1")]
    pub passphrase: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub on_device: Option<bool>,
}

/// Session id 0 response to [`CreateNewSession`].
#[derive(Clone, PartialEq, Message)]
pub struct NewSession {
    #[prost(uint32, optional, tag = "1")]
    pub new_session_id: Option<u32>,
}

// ── Credential material ───────────────────────────────────────────────────────

/// Host-chosen metadata bound into a pairing credential.
#[derive(Clone, PartialEq, Message)]
pub struct CredentialMetadata {
    #[prost(string, optional, tag = "1")]
    pub host_name: Option<String>,
}

/// The MAC'd tuple: this is what the credential authentication key signs.
/// Never travels on the wire itself — only its MAC does.
#[derive(Clone, PartialEq, Message)]
pub struct AuthenticatedCredentialData {
    #[prost(bytes = "vec", tag = "1")]
    pub host_static_pubkey: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub cred_metadata: Option<CredentialMetadata>,
}

/// The credential a host presents on later handshakes.
#[derive(Clone, PartialEq, Message)]
pub struct PairingCredential {
    #[prost(message, optional, tag = "1")]
    pub cred_metadata: Option<CredentialMetadata>,
    #[prost(bytes = "vec", tag = "2")]
    pub mac: Vec<u8>,
}

/// Encode a message into a fresh buffer.
pub fn encode_to_vec(msg: &impl Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(msg.encoded_len());
    msg.encode(&mut buf).expect("Vec<u8> encoding is infallible");
    buf
}
