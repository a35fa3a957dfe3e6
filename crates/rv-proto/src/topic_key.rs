//! Topic-key wire types.
//!
//! The private halves of a `TopicKeys` pair never appear here — they are
//! key material owned by `rv-core`. This module only carries what crosses
//! the wire: the signed public bundle and the encrypted delivery packet.

use serde::{Deserialize, Serialize};

use rv_crypto::{AgreementPublicKey, SigningPublicKey};

/// `PublicBundle` — the signed, publishable half of a user's topic key.
/// `signature = Sign_user(signature_key ‖ encryption_key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicKeyPublicBundle {
    pub user_key: SigningPublicKey,
    pub signature_key: SigningPublicKey,
    pub encryption_key: AgreementPublicKey,
    /// Base64 — see `rv_crypto::encode_signature`.
    pub signature: String,
}

impl TopicKeyPublicBundle {
    /// Bytes signed by `user_key`: `signature_key ‖ encryption_key`.
    pub fn signed_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.signature_key.as_bytes());
        out[32..].copy_from_slice(self.encryption_key.as_bytes());
        out
    }
}

/// Packet delivering one user's topic key to another of that user's
/// devices.
///
/// Invariant: the decrypted plaintext is exactly `signing_priv ‖ enc_priv`
/// (2 × 32 bytes), and each recovers the public half named in `bundle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicKeyMessage {
    /// Recipient device's prekey consumed for this delivery.
    pub device_prekey: AgreementPublicKey,
    pub bundle: TopicKeyPublicBundle,
    /// `encrypt_to(peer_prekey_pub, signing_priv ‖ enc_priv)`.
    pub encrypted_private_keys: Vec<u8>,
}

/// Per-device message list for `user/topickeys`: `{topic_keys, messages}`,
/// keyed by recipient device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicKeyBundle {
    pub topic_keys: Vec<TopicKeyPublicBundle>,
    pub messages: Vec<DeviceTopicKeyMessages>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTopicKeyMessages {
    pub device_key: SigningPublicKey,
    pub messages: Vec<TopicKeyMessage>,
}

/// Request for other users' available topic keys (`users/topickey`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicKeyRequest {
    pub user_keys: Vec<SigningPublicKey>,
}

/// One entry per user that had an available topic key; users with none
/// available are simply absent — `create_topic` drops them silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicKeyResponse {
    pub keys: Vec<TopicKeyPublicBundle>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_crypto::SigningPrivateKey;

    #[test]
    fn signed_bytes_layout_is_stable() {
        let user = SigningPrivateKey::generate();
        let sig_key = SigningPrivateKey::generate().public();
        let enc_key = rv_crypto::AgreementPrivateKey::generate().public();
        let sig = rv_crypto::sign(&user, &{
            let mut b = Vec::new();
            b.extend_from_slice(sig_key.as_bytes());
            b.extend_from_slice(enc_key.as_bytes());
            b
        });
        let bundle = TopicKeyPublicBundle {
            user_key: user.public(),
            signature_key: sig_key,
            encryption_key: enc_key,
            signature: rv_crypto::encode_signature(&sig),
        };
        assert_eq!(&bundle.signed_bytes()[..32], sig_key.as_bytes());
        assert_eq!(&bundle.signed_bytes()[32..], enc_key.as_bytes());
    }
}
