//! `UserInfo` and device-list records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rv_crypto::SigningPublicKey;

/// One device entry inside a `UserInfo` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_public_key: SigningPublicKey,
    pub creation_time: DateTime<Utc>,
    pub is_active: bool,
    /// App identifier, truncated to 10 chars.
    pub app_id: String,
}

/// Signed, user-wide device roster. The public half of the user identity
/// key is the stable user identifier.
///
/// Invariants: `devices` sorted ascending by `creation_time`;
/// `timestamp` strictly increases across updates; `signature` verifies
/// under `user_public_key`; `user_public_key`, `name`, `creation_time` are
/// immutable once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_public_key: SigningPublicKey,
    pub name: String,
    pub creation_time: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub devices: Vec<DeviceRecord>,
    /// Ed25519 signature over the canonical unsigned bytes, base64.
    pub signature: String,
}

impl UserInfo {
    /// Bytes signed by `user_public_key` — every field except the
    /// signature itself, in a fixed order.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let canonical = serde_json::json!({
            "user_public_key": self.user_public_key.to_b64(),
            "name": self.name,
            "creation_time": self.creation_time.to_rfc3339(),
            "timestamp": self.timestamp.to_rfc3339(),
            "devices": self.devices,
        });
        serde_json::to_vec(&canonical).unwrap_or_default()
    }
}

/// Per-device diff produced by merging an incoming `UserInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceDiff {
    Added(DeviceRecord),
    Changed(DeviceRecord),
    Removed(SigningPublicKey),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_crypto::SigningPrivateKey;

    #[test]
    fn canonical_bytes_are_stable_for_equal_input() {
        let user = SigningPrivateKey::generate();
        let now = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let info = UserInfo {
            user_public_key: user.public(),
            name: "alice".into(),
            creation_time: now,
            timestamp: now,
            devices: vec![],
            signature: String::new(),
        };
        assert_eq!(info.canonical_bytes(), info.canonical_bytes());
    }
}
