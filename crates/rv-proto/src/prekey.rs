//! Signed prekey bundles.

use serde::{Deserialize, Serialize};

use rv_crypto::{AgreementPublicKey, SigningPublicKey};

/// A published ECDH prekey, signed by the owning device's signing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPrekey {
    pub public: AgreementPublicKey,
    /// Ed25519 signature over `public`'s raw bytes, made by the device key.
    /// Base64 — see `rv_crypto::encode_signature`.
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrekeyUploadRequest {
    pub prekeys: Vec<SignedPrekey>,
}

/// One device's worth of prekeys in a bundle response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerDevicePrekeys {
    pub device_key: SigningPublicKey,
    pub prekeys: Vec<SignedPrekey>,
}

/// Response to `user/prekeys`: one prekey per other device, `key_count` each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePrekeyBundle {
    pub key_count: u32,
    pub devices: Vec<PerDevicePrekeys>,
}
