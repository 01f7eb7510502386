//! Per-session key material
//!
//! A fresh MAC key is generated at every session start and used to derive
//! opaque document ids for the encrypted vault backend.

use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Secret material owned by one session
pub struct SessionKeys {
    mac: HmacSha256,
}

impl SessionKeys {
    /// Generate fresh key material from random UUIDs and the current time
    pub fn generate() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(Uuid::new_v4().as_bytes());
        hasher.update(Uuid::new_v4().as_bytes());
        hasher.update(
            chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        Self::with_key(&hasher.finalize())
    }

    #[cfg(test)]
    pub(crate) fn from_key(mac_key: [u8; 32]) -> Self {
        Self::with_key(&mac_key)
    }

    // Keys shorter than the SHA-256 block are zero padded, exactly as HMAC does itself.
    fn with_key(mac_key: &[u8]) -> Self {
        let mut key = Key::<HmacSha256>::default();
        key[..mac_key.len()].copy_from_slice(mac_key);
        Self {
            mac: <HmacSha256 as KeyInit>::new(&key),
        }
    }

    /// HMAC-SHA256 of `data` under the session MAC key
    pub fn mac(&self, data: &[u8]) -> [u8; 32] {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    /// Hex-encoded [`mac`](Self::mac)
    pub fn mac_hex(&self, data: &[u8]) -> String {
        hex::encode(self.mac(data))
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").field("mac_key", &"[MASKED]").finish()
    }
}
