//! Pairing credential issuance and validation.
//!
//! A credential binds a host static public key and host-chosen metadata
//! under HMAC-SHA256 with a key derived from the device secret via SLIP-21:
//!
//!   cred_auth_key = slip21(secret, ["Credential authentication key", counter])
//!
//! Bumping the counter rotates the key and atomically invalidates every
//! credential issued before the bump.

use std::sync::atomic::{AtomicU32, Ordering};

use prost::Message;
use zeroize::Zeroizing;

use crate::crypto::{hmac_sha256, hmac_sha256_verify, slip21_derive};
use crate::proto::{encode_to_vec, AuthenticatedCredentialData, CredentialMetadata, PairingCredential};

const CRED_AUTH_KEY_LABEL: &[u8] = b"Credential authentication key";

pub struct CredentialManager {
    device_secret: Zeroizing<[u8; 32]>,
    counter: AtomicU32,
}

impl CredentialManager {
    pub fn new(device_secret: [u8; 32]) -> Self {
        Self::with_counter(device_secret, 0)
    }

    /// Restore a manager with a persisted rotation counter.
    pub fn with_counter(device_secret: [u8; 32], counter: u32) -> Self {
        Self {
            device_secret: Zeroizing::new(device_secret),
            counter: AtomicU32::new(counter),
        }
    }

    /// Issue a credential bound to `host_static_pubkey` and `metadata`.
    /// Returns the encoded [`PairingCredential`] for the host to store.
    pub fn issue(&self, host_static_pubkey: &[u8; 32], metadata: CredentialMetadata) -> Vec<u8> {
        let authenticated = AuthenticatedCredentialData {
            host_static_pubkey: host_static_pubkey.to_vec(),
            cred_metadata: Some(metadata.clone()),
        };
        let mac = hmac_sha256(&self.cred_auth_key(), &encode_to_vec(&authenticated));

        let credential = PairingCredential {
            cred_metadata: Some(metadata),
            mac: mac.to_vec(),
        };
        tracing::debug!(counter = self.counter(), "pairing credential issued");
        encode_to_vec(&credential)
    }

    /// Validate an encoded credential against the presenting host's static
    /// public key. Malformed credentials simply fail validation.
    pub fn validate(&self, encoded_credential: &[u8], host_static_pubkey: &[u8; 32]) -> bool {
        let credential = match PairingCredential::decode(encoded_credential) {
            Ok(c) => c,
            Err(_) => return false,
        };
        let authenticated = AuthenticatedCredentialData {
            host_static_pubkey: host_static_pubkey.to_vec(),
            cred_metadata: credential.cred_metadata,
        };
        hmac_sha256_verify(
            &self.cred_auth_key(),
            &encode_to_vec(&authenticated),
            &credential.mac,
        )
    }

    /// Rotate the credential authentication key, invalidating every
    /// credential issued so far.
    pub fn invalidate_auth_key(&self) {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(counter, "credential authentication key rotated");
    }

    /// Current rotation counter, for persistence.
    pub fn counter(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }

    fn cred_auth_key(&self) -> [u8; 32] {
        let counter = self.counter().to_be_bytes();
        slip21_derive(&*self.device_secret, &[CRED_AUTH_KEY_LABEL, &counter]).key()
    }
}
