//! `device/messages` batch envelope.

use serde::{Deserialize, Serialize};

use rv_crypto::SigningPublicKey;

use crate::{identity::UserInfo, topic::{IncomingUpdate, TopicRecord}, topic_key::TopicKeyMessage};

/// One member's observation that it has seen the topic chain up to
/// `chain_index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub topic_id: [u8; 12],
    pub chain_index: u32,
    /// 32-byte signing public key of the observing device's user.
    pub sender: Vec<u8>,
}

impl Receipt {
    /// Parse `sender` into a typed key; malformed receipts are dropped
    /// silently by the caller, never treated as a fatal batch error.
    pub fn sender_key(&self) -> Option<SigningPublicKey> {
        SigningPublicKey::from_bytes(&self.sender).ok()
    }
}

/// Full batch returned by `device/messages`, processed strictly in field
/// order: `user_info` → `topic_key_messages` → `topic_updates` → `messages`
/// → `receipts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDownload {
    #[serde(default)]
    pub user_info: Option<UserInfo>,
    #[serde(default)]
    pub topic_key_messages: Vec<TopicKeyMessage>,
    #[serde(default)]
    pub topic_updates: Vec<TopicRecord>,
    #[serde(default)]
    pub messages: Vec<IncomingUpdate>,
    #[serde(default)]
    pub receipts: Vec<Receipt>,
}
