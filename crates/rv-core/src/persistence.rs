//! `ClientData` — the single serialized blob a caller persists between
//! runs, plus an optional Argon2id/AES-GCM wrapping layer following a
//! password-vault unlock/lock pattern.
//!
//! Private key material is never given a `Serialize` impl on the typed
//! wrappers in `rv-crypto` by design; this module is the one place that
//! flattens key material to raw bytes for storage, and the one place
//! that reconstructs typed keys from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rv_crypto::SigningPublicKey;
use rv_error::Error;
use rv_proto::{FileDescriptor, TopicMember, UserInfo};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPrekey {
    pub public: [u8; 32],
    pub secret: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTopicKeys {
    pub signing_priv: [u8; 32],
    pub enc_priv: [u8; 32],
    pub bundle: rv_proto::TopicKeyPublicBundle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredUpdate {
    pub chain_index: u32,
    pub output: [u8; 32],
    pub metadata: Vec<u8>,
    pub files: Vec<FileDescriptor>,
    /// Base64 — see `rv_crypto::encode_signature`.
    pub signature: String,
    pub sender_user_key: SigningPublicKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTopic {
    pub topic_id: [u8; 12],
    pub creation_time: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub members: Vec<TopicMember>,
    pub message_key: [u8; 32],
    pub signing_priv: [u8; 32],
    pub enc_priv: [u8; 32],
    pub chain_index: u32,
    pub verified_output: Vec<u8>,
    pub unverified_updates: Vec<StoredUpdate>,
}

/// Everything a `Device` needs to resume without re-registering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientData {
    pub server_url: String,
    pub app_id: String,
    pub user_priv: [u8; 32],
    pub device_priv: [u8; 32],
    pub user_info: UserInfo,
    pub auth_token: [u8; 16],
    pub prekeys: Vec<StoredPrekey>,
    pub topic_keys_pool: Vec<StoredTopicKeys>,
    pub topics: Vec<StoredTopic>,
}

impl ClientData {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        bincode::serialize(self).map_err(|e| Error::SerializationFailed(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        bincode::deserialize(bytes).map_err(|e| Error::SerializationFailed(e.to_string()))
    }

    /// Encrypt the encoded blob under a password-derived vault key
    /// (Argon2id). Output: `salt(16) ‖ nonce(12) ‖ ct ‖ tag(16)`.
    pub fn seal(&self, password: &[u8]) -> Result<Vec<u8>, Error> {
        let salt = rv_crypto::generate_vault_salt();
        let vault_key = rv_crypto::vault_key_from_password(password, &salt)?;
        let plaintext = self.encode()?;
        let combined = rv_crypto::seal_combined(&vault_key.0, &plaintext, None)?;
        let mut out = Vec::with_capacity(16 + combined.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&combined);
        Ok(out)
    }

    /// Reverse of [`Self::seal`].
    pub fn open(blob: &[u8], password: &[u8]) -> Result<Self, Error> {
        if blob.len() < 16 {
            return Err(Error::InvalidRequest("sealed client data too short".into()));
        }
        let (salt_bytes, combined) = blob.split_at(16);
        let mut salt = [0u8; 16];
        salt.copy_from_slice(salt_bytes);
        let vault_key = rv_crypto::vault_key_from_password(password, &salt)?;
        let plaintext = rv_crypto::open_combined(&vault_key.0, combined)?;
        Self::decode(&plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_crypto::SigningPrivateKey;

    fn sample() -> ClientData {
        let now = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let user = SigningPrivateKey::generate();
        ClientData {
            server_url: "https://x.invalid".into(),
            app_id: "rendezvous".into(),
            user_priv: *user.secret_bytes(),
            device_priv: *SigningPrivateKey::generate().secret_bytes(),
            user_info: UserInfo {
                user_public_key: user.public(),
                name: "alice".into(),
                creation_time: now,
                timestamp: now,
                devices: vec![],
                signature: String::new(),
            },
            auth_token: [7u8; 16],
            prekeys: vec![],
            topic_keys_pool: vec![],
            topics: vec![],
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let data = sample();
        let bytes = data.encode().unwrap();
        let back = ClientData::decode(&bytes).unwrap();
        assert_eq!(back.auth_token, data.auth_token);
        assert_eq!(back.user_priv, data.user_priv);
    }

    #[test]
    fn seal_open_roundtrip() {
        let data = sample();
        let sealed = data.seal(b"hunter2").unwrap();
        let back = ClientData::open(&sealed, b"hunter2").unwrap();
        assert_eq!(back.auth_token, data.auth_token);
    }

    #[test]
    fn open_rejects_wrong_password() {
        let data = sample();
        let sealed = data.seal(b"hunter2").unwrap();
        assert!(ClientData::open(&sealed, b"wrong").is_err());
    }
}
