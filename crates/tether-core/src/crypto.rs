//! Cryptographic primitives for Tether.
//!
//! Provides three things:
//!   1. Noise XX channel establishment — the device is the responder,
//!      the host the initiator
//!   2. HMAC-SHA256 and SLIP-21 key derivation — credential MACs
//!   3. The in-place transport cipher used for encrypted frames
//!
//! Keypairs are managed via x25519-dalek for explicit key control.
//! snow drives the Noise XX state machine using those keys.
//!
//! All key material derives ZeroizeOnDrop — wiped from memory when dropped.
//! There is no unsafe code in this module.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Sha256, Sha512};
use snow::{Builder, HandshakeState, TransportState};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// X25519 public key length, and the plaintext length of the host
/// ephemeral in a handshake-init frame.
pub const KEY_LEN: usize = 32;

/// Poly1305 authentication tag length appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// The Noise pattern Tether uses.
///
/// Noise XX: mutual authentication, both static keys transmitted encrypted.
/// Neither key is visible to a passive observer.
const NOISE_PATTERN: &str = "Noise_XX_25519_ChaChaPoly_SHA256";

// ── Keypair ───────────────────────────────────────────────────────────────────

/// A device's long-term static X25519 keypair.
///
/// Generated once per device and stored persistently. The private key never
/// leaves this struct.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    /// Private key — zeroized on drop, never exposed directly.
    private: Zeroizing<[u8; KEY_LEN]>,
    /// Public key — sent encrypted during the handshake.
    pub public: [u8; KEY_LEN],
}

impl Keypair {
    /// Generate a new random X25519 keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(secret.to_bytes()),
            public: *public.as_bytes(),
        }
    }

    /// Reconstruct a keypair from stored private key bytes.
    /// The public key is derived deterministically from the private key.
    pub fn from_private(private_bytes: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(private_bytes);
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(private_bytes),
            public: *public.as_bytes(),
        }
    }

    /// Serialize the private key for persistent storage.
    pub fn private_bytes(&self) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(*self.private)
    }
}

/// Generate a cryptographically random 8-byte allocation nonce.
pub fn generate_nonce() -> [u8; 8] {
    let mut nonce = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

// ── Handshake: device (responder) side ────────────────────────────────────────

/// Responder side of the Noise XX handshake, driven by the channel FSM.
///
/// Created when a handshake-init frame arrives on a fresh channel. Consumes
/// the host ephemeral, produces the init response, then consumes the host's
/// encrypted static key to yield the transport cipher.
pub struct HandshakeResponder {
    state: HandshakeState,
}

impl HandshakeResponder {
    pub fn new(keypair: &Keypair) -> Result<Self, CryptoError> {
        let state = Builder::new(NOISE_PATTERN.parse().map_err(|_| CryptoError::BadPattern)?)
            .local_private_key(&*keypair.private)
            .build_responder()
            .map_err(CryptoError::Noise)?;
        Ok(Self { state })
    }

    /// Process the host's ephemeral key and produce the handshake-init
    /// response (`e, ee, s, es` — 96 bytes with an empty payload).
    pub fn process_ephemeral(
        &mut self,
        host_ephemeral: &[u8; KEY_LEN],
    ) -> Result<Vec<u8>, CryptoError> {
        let mut payload = [0u8; KEY_LEN];
        self.state
            .read_message(host_ephemeral, &mut payload)
            .map_err(CryptoError::Noise)?;

        let mut response = vec![0u8; 128];
        let len = self
            .state
            .write_message(&[], &mut response)
            .map_err(CryptoError::Noise)?;
        response.truncate(len);
        Ok(response)
    }

    /// Process the host's encrypted static key (`s, se`) plus the trailing
    /// noise payload and complete the handshake.
    ///
    /// Returns the transport cipher, the authenticated host static public
    /// key, and the decrypted payload (possibly empty — it carries a pairing
    /// credential when the host has one).
    pub fn process_static(
        mut self,
        encrypted_static: &[u8],
        noise_payload: &[u8],
    ) -> Result<CompletedHandshake, CryptoError> {
        let mut message = Vec::with_capacity(encrypted_static.len() + noise_payload.len());
        message.extend_from_slice(encrypted_static);
        message.extend_from_slice(noise_payload);

        let mut payload = vec![0u8; message.len()];
        let payload_len = self
            .state
            .read_message(&message, &mut payload)
            .map_err(CryptoError::Noise)?;
        payload.truncate(payload_len);

        let host_static_pubkey = self
            .state
            .get_remote_static()
            .and_then(|key| <[u8; KEY_LEN]>::try_from(key).ok())
            .ok_or(CryptoError::MissingRemoteStatic)?;

        let transport = self
            .state
            .into_transport_mode()
            .map_err(CryptoError::Noise)?;

        Ok(CompletedHandshake {
            cipher: TransportCipher::new(transport),
            host_static_pubkey,
            noise_payload: payload,
        })
    }
}

/// Everything the channel needs after the handshake settles.
pub struct CompletedHandshake {
    pub cipher: TransportCipher,
    pub host_static_pubkey: [u8; KEY_LEN],
    pub noise_payload: Vec<u8>,
}

// ── Handshake: host (initiator) side ──────────────────────────────────────────

/// Initiator side of the Noise XX handshake.
///
/// Hosts drive this; the device core only needs it for loopback tests, but
/// it lives here so both halves of the protocol share one pattern string.
pub struct HandshakeInitiator {
    state: HandshakeState,
}

impl HandshakeInitiator {
    /// Begin a handshake. Returns the initiator state and the 32-byte
    /// ephemeral key to place in the handshake-init frame.
    pub fn new(keypair: &Keypair) -> Result<(Self, [u8; KEY_LEN]), CryptoError> {
        let state = Builder::new(NOISE_PATTERN.parse().map_err(|_| CryptoError::BadPattern)?)
            .local_private_key(&*keypair.private)
            .build_initiator()
            .map_err(CryptoError::Noise)?;

        let mut initiator = Self { state };
        // snow requires the output buffer to have room for a trailing tag
        // even on this unkeyed first message, though none is written.
        let mut scratch = [0u8; KEY_LEN + TAG_LEN];
        let len = initiator
            .state
            .write_message(&[], &mut scratch)
            .map_err(CryptoError::Noise)?;
        debug_assert_eq!(len, KEY_LEN);
        let mut msg = [0u8; KEY_LEN];
        msg.copy_from_slice(&scratch[..KEY_LEN]);
        Ok((initiator, msg))
    }

    /// Consume the device's handshake-init response.
    pub fn process_response(&mut self, response: &[u8]) -> Result<(), CryptoError> {
        let mut payload = vec![0u8; response.len()];
        self.state
            .read_message(response, &mut payload)
            .map_err(CryptoError::Noise)?;
        Ok(())
    }

    /// Produce the completion message (`s, se` plus `noise_payload`) and the
    /// transport cipher.
    pub fn finish(
        mut self,
        noise_payload: &[u8],
    ) -> Result<(Vec<u8>, TransportCipher), CryptoError> {
        let mut msg = vec![0u8; noise_payload.len() + 2 * KEY_LEN + 2 * TAG_LEN];
        let len = self
            .state
            .write_message(noise_payload, &mut msg)
            .map_err(CryptoError::Noise)?;
        msg.truncate(len);

        let transport = self
            .state
            .into_transport_mode()
            .map_err(CryptoError::Noise)?;
        Ok((msg, TransportCipher::new(transport)))
    }
}

// ── Transport cipher ──────────────────────────────────────────────────────────

/// A completed Noise session, operating in place on the channel buffer.
///
/// The report transport is reliable and ordered, so the stateful transport
/// mode with implicit nonce counters applies — no per-frame nonce travels
/// on the wire. The scratch buffer is reused across frames; it grows on
/// demand and never shrinks within a session.
pub struct TransportCipher {
    state: TransportState,
    scratch: Vec<u8>,
}

impl TransportCipher {
    fn new(state: TransportState) -> Self {
        Self {
            state,
            scratch: Vec::new(),
        }
    }

    /// Encrypt `buf[offset..offset + len]` in place and return the 16-byte
    /// authentication tag. The caller appends the tag after the ciphertext.
    pub fn encrypt_in_place(
        &mut self,
        buf: &mut [u8],
        offset: usize,
        len: usize,
    ) -> Result<[u8; TAG_LEN], CryptoError> {
        self.scratch.resize(len + TAG_LEN, 0);
        let written = self
            .state
            .write_message(&buf[offset..offset + len], &mut self.scratch)
            .map_err(CryptoError::Noise)?;
        debug_assert_eq!(written, len + TAG_LEN);

        buf[offset..offset + len].copy_from_slice(&self.scratch[..len]);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&self.scratch[len..len + TAG_LEN]);
        Ok(tag)
    }

    /// Decrypt `buf[offset..offset + len]` in place, where `len` includes
    /// the trailing tag. Returns the plaintext length (`len - TAG_LEN`).
    /// A tag failure leaves the buffer contents unspecified.
    pub fn decrypt_in_place(
        &mut self,
        buf: &mut [u8],
        offset: usize,
        len: usize,
    ) -> Result<usize, CryptoError> {
        if len < TAG_LEN {
            return Err(CryptoError::TooShort);
        }
        self.scratch.resize(len, 0);
        let written = self
            .state
            .read_message(&buf[offset..offset + len], &mut self.scratch)
            .map_err(CryptoError::Noise)?;
        buf[offset..offset + written].copy_from_slice(&self.scratch[..written]);
        Ok(written)
    }
}

// ── HMAC-SHA256 ───────────────────────────────────────────────────────────────

/// One-shot HMAC-SHA256. Credential MACs and SLIP-21 both build on the
/// `hmac` crate's constant-time machinery.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Constant-time HMAC-SHA256 verification.
pub fn hmac_sha256_verify(key: &[u8], data: &[u8], expected: &[u8]) -> bool {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.verify_slice(expected).is_ok()
}

// ── SLIP-21 ───────────────────────────────────────────────────────────────────

/// A SLIP-0021 symmetric key derivation node.
///
/// The master node is `HMAC-SHA512("Symmetric key seed", seed)`; each child
/// is `HMAC-SHA512(node[0..32], 0x00 ∥ label)`. The usable key of a node is
/// its second half.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Slip21Node {
    data: [u8; 64],
}

impl Slip21Node {
    pub fn from_seed(seed: &[u8]) -> Self {
        Self {
            data: hmac_sha512(b"Symmetric key seed", seed),
        }
    }

    pub fn derive(&self, label: &[u8]) -> Self {
        let mut msg = Vec::with_capacity(1 + label.len());
        msg.push(0x00);
        msg.extend_from_slice(label);
        Self {
            data: hmac_sha512(&self.data[..32], &msg),
        }
    }

    pub fn key(&self) -> [u8; 32] {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.data[32..]);
        key
    }
}

/// Derive a node by walking `path` from the master node of `seed`.
pub fn slip21_derive(seed: &[u8], path: &[&[u8]]) -> Slip21Node {
    let mut node = Slip21Node::from_seed(seed);
    for label in path {
        node = node.derive(label);
    }
    node
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = Hmac::<Sha512>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid Noise pattern string — this is a bug")]
    BadPattern,

    #[error("Noise protocol error: {0}")]
    Noise(#[from] snow::Error),

    #[error("ciphertext shorter than the authentication tag")]
    TooShort,

    #[error("handshake finished without a host static key")]
    MissingRemoteStatic,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
