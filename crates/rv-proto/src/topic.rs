//! Topic, membership, and update wire types.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use rv_crypto::{AgreementPublicKey, SigningPublicKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Participant,
    Observer,
}

/// One member's admission record inside a topic.
/// `signature_key`/`encryption_key` are the member's own topic-key halves —
/// `signature_key` is what their sent updates are verified against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMember {
    pub user_key: SigningPublicKey,
    pub signature_key: SigningPublicKey,
    pub encryption_key: AgreementPublicKey,
    pub role: Role,
    /// `encrypt_to(encryption_key, message_key)`.
    pub encrypted_message_key: Vec<u8>,
    /// `Sign_user(signature_key ‖ encryption_key)` — carried over unchanged
    /// from the member's `TopicKeyPublicBundle.signature`. Verified on
    /// ingestion against `binding_bytes()`. Base64.
    pub signature: String,
}

impl TopicMember {
    /// Bytes bound by `Verify(user_key, signature, signature_key ‖ encryption_key)`.
    pub fn binding_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.signature_key.as_bytes());
        out[32..].copy_from_slice(self.encryption_key.as_bytes());
        out
    }
}

/// The signed topic posted to `topic/create` and carried in topic
/// add/update notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRecord {
    /// 12 random bytes.
    pub topic_id: [u8; 12],
    pub creation_time: chrono::DateTime<chrono::Utc>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub members: Vec<TopicMember>,
    /// Ed25519 signature over `canonical_bytes()`, made by the creator's
    /// topic signing key. Base64 — see `rv_crypto::encode_signature`.
    pub signature: String,
}

impl TopicRecord {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let canonical = serde_json::json!({
            "topic_id": hex::encode(self.topic_id),
            "creation_time": self.creation_time.to_rfc3339(),
            "timestamp": self.timestamp.to_rfc3339(),
            "members": self.members,
        });
        serde_json::to_vec(&canonical).unwrap_or_default()
    }
}

/// A content-update file descriptor.
/// `id` doubles as the AES-GCM nonce; `hash = SHA-256(ciphertext)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: [u8; 12],
    pub tag: [u8; 16],
    pub hash: [u8; 32],
}

/// Posted to `topic/message`. `sender_index` is
/// the caller's own index in the topic's member list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUpload {
    pub sender_index: u32,
    /// Combined-form AES-GCM ciphertext (`nonce ‖ ct ‖ tag`), ≤100 bytes plaintext.
    pub metadata: Vec<u8>,
    pub files: Vec<FileDescriptor>,
    /// Signature over the canonical unsigned bytes, by the sender's topic
    /// signing key. Base64 — see `rv_crypto::encode_signature`.
    pub signature: String,
}

impl UpdateUpload {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let canonical = serde_json::json!({
            "sender_index": self.sender_index,
            "metadata": STANDARD.encode(&self.metadata),
            "files": self.files.iter().map(|f| serde_json::json!({
                "id": hex::encode(f.id),
                "tag": hex::encode(f.tag),
                "hash": hex::encode(f.hash),
            })).collect::<Vec<_>>(),
        });
        serde_json::to_vec(&canonical).unwrap_or_default()
    }
}

/// Server's authoritative response to `topic/message`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChainState {
    pub chain_index: u32,
    pub output: [u8; 32],
}

/// A content update as it arrives inside a `DeviceDownload` batch, before
/// the client has resolved `sender_index` into a `sender_user_key` and
/// decrypted `metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingUpdate {
    pub topic_id: [u8; 12],
    pub chain_index: u32,
    pub output: [u8; 32],
    pub sender_index: u32,
    pub metadata: Vec<u8>,
    pub files: Vec<FileDescriptor>,
    /// Base64 — see `rv_crypto::encode_signature`.
    pub signature: String,
}

impl IncomingUpdate {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let upload = UpdateUpload {
            sender_index: self.sender_index,
            metadata: self.metadata.clone(),
            files: self.files.clone(),
            signature: self.signature.clone(),
        };
        upload.canonical_bytes()
    }
}

/// One file's ciphertext, carried alongside `UpdateUpload` so the server
/// has bytes to store for later `files/{topic}/{file}` retrieval. This is
/// the minimal shape needed to drive the request/response round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePayload {
    pub id: [u8; 12],
    pub ciphertext: Vec<u8>,
}

/// Full body posted to `topic/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMessageRequest {
    pub upload: UpdateUpload,
    pub file_payloads: Vec<FilePayload>,
}

/// A fully verified, decrypted content update — the materialized/local
/// shape surfaced to callers.
#[derive(Debug, Clone)]
pub struct Update {
    pub chain_index: u32,
    pub output: [u8; 32],
    /// Decrypted metadata bytes.
    pub metadata: Vec<u8>,
    pub files: Vec<FileDescriptor>,
    pub signature: [u8; 64],
    pub sender_user_key: SigningPublicKey,
}
