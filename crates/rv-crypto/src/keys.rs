//! Typed key objects.
//!
//! Four asymmetric roles: signing pub/priv (Ed25519, identity & topic
//! signing keys) and agreement pub/priv (X25519, prekeys & topic
//! encryption keys). Public keys are `Eq + Hash` so they can index the
//! prekey store and topic-key pool.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use rv_error::Error;

fn to_b64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn from_b64(s: &str) -> Result<[u8; 32], Error> {
    let raw = URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| Error::InvalidRequest(format!("bad base64 key: {e}")))?;
    raw.try_into()
        .map_err(|_| Error::InvalidRequest("key must be 32 bytes".into()))
}

/// Encode a detached Ed25519 signature for the wire. Signatures are
/// carried as base64 rather than `[u8; 64]` array fields: serde's built-in
/// array impls only cover lengths `0..=32`, so a raw `[u8; 64]` field on a
/// `Serialize`/`Deserialize` struct doesn't compile.
pub fn encode_signature(sig: &[u8; 64]) -> String {
    URL_SAFE_NO_PAD.encode(sig)
}

pub fn decode_signature(s: &str) -> Result<[u8; 64], Error> {
    let raw = URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| Error::InvalidRequest(format!("bad base64 signature: {e}")))?;
    raw.try_into()
        .map_err(|_| Error::InvalidRequest("signature must be 64 bytes".into()))
}

macro_rules! public_key_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| Error::InvalidRequest(format!("{} must be 32 bytes", stringify!($name))))?;
                Ok(Self(arr))
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_b64(&self) -> String {
                to_b64(&self.0)
            }

            pub fn from_b64(s: &str) -> Result<Self, Error> {
                Ok(Self(from_b64(s)?))
            }

            /// BLAKE3 fingerprint for manual out-of-band verification,
            /// grouped in 4-hex-char blocks.
            pub fn fingerprint(&self) -> String {
                let hash = blake3::hash(&self.0);
                let hex = hex::encode(&hash.as_bytes()[..20]);
                hex.chars()
                    .collect::<Vec<_>>()
                    .chunks(4)
                    .map(|c| c.iter().collect::<String>())
                    .collect::<Vec<_>>()
                    .join(" ")
            }

            /// Signal-style 12-group numeric safety number.
            pub fn numeric_fingerprint(&self) -> String {
                let hash = blake3::hash(&self.0);
                let bytes = hash.as_bytes();
                let mut groups = Vec::with_capacity(12);
                for i in 0..12 {
                    let offset = i * 5 / 2;
                    let val = if i % 2 == 0 {
                        ((bytes[offset] as u32) << 12)
                            | ((bytes[offset + 1] as u32) << 4)
                            | ((bytes[offset + 2] as u32) >> 4)
                    } else {
                        (((bytes[offset] & 0x0F) as u32) << 16)
                            | ((bytes[offset + 1] as u32) << 8)
                            | (bytes[offset + 2] as u32)
                    };
                    groups.push(format!("{:05}", val % 100_000));
                }
                groups.join(" ")
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_b64())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                $name::from_b64(&s).map_err(DeError::custom)
            }
        }
    };
}

public_key_type!(SigningPublicKey, "Ed25519 public key (user identity, device identity, or topic signing key).");
public_key_type!(AgreementPublicKey, "X25519 public key (prekey, or topic encryption key).");

/// Ed25519 secret key. Zeroized on drop; never serialized by derive —
/// callers persist it only through `ClientData`'s explicit blob.
#[derive(ZeroizeOnDrop)]
pub struct SigningPrivateKey {
    #[zeroize(skip)]
    public: SigningPublicKey,
    secret: [u8; 32],
}

impl SigningPrivateKey {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = SigningPublicKey(signing_key.verifying_key().to_bytes());
        Self { public, secret: signing_key.to_bytes() }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let public = SigningPublicKey(signing_key.verifying_key().to_bytes());
        Self { public, secret: *bytes }
    }

    pub fn public(&self) -> SigningPublicKey {
        self.public
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret)
    }

    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        self.signing_key().sign(msg).to_bytes()
    }
}

/// Verify a detached Ed25519 signature made by `public` over `msg`.
pub fn verify(public: &SigningPublicKey, msg: &[u8], sig: &[u8]) -> Result<(), Error> {
    let vk = VerifyingKey::from_bytes(&public.0)
        .map_err(|e| Error::InvalidSignature(e.to_string()))?;
    let sig_bytes: [u8; 64] = sig
        .try_into()
        .map_err(|_| Error::InvalidSignature("signature must be 64 bytes".into()))?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    vk.verify(msg, &sig)
        .map_err(|_| Error::InvalidSignature("signature does not match".into()))
}

/// X25519 secret key (prekeys, topic encryption keys). Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct AgreementPrivateKey {
    #[zeroize(skip)]
    public: AgreementPublicKey,
    secret: [u8; 32],
}

impl AgreementPrivateKey {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = AgreementPublicKey(X25519Public::from(&secret).to_bytes());
        Self { public, secret: secret.to_bytes() }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = AgreementPublicKey(X25519Public::from(&secret).to_bytes());
        Self { public, secret: *bytes }
    }

    pub fn public(&self) -> AgreementPublicKey {
        self.public
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    pub(crate) fn static_secret(&self) -> StaticSecret {
        StaticSecret::from(self.secret)
    }

    pub fn diffie_hellman(&self, other: &AgreementPublicKey) -> [u8; 32] {
        self.static_secret()
            .diffie_hellman(&X25519Public::from(other.0))
            .to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_roundtrip() {
        let key = SigningPrivateKey::generate();
        let sig = key.sign(b"hello");
        assert!(verify(&key.public(), b"hello", &sig).is_ok());
        assert!(verify(&key.public(), b"tampered", &sig).is_err());
    }

    #[test]
    fn public_key_b64_roundtrip() {
        let key = SigningPrivateKey::generate();
        let encoded = key.public().to_b64();
        let decoded = SigningPublicKey::from_b64(&encoded).unwrap();
        assert_eq!(key.public(), decoded);
    }

    #[test]
    fn agreement_dh_is_symmetric() {
        let a = AgreementPrivateKey::generate();
        let b = AgreementPrivateKey::generate();
        assert_eq!(a.diffie_hellman(&b.public()), b.diffie_hellman(&a.public()));
    }

    #[test]
    fn fingerprints_are_deterministic_and_distinguish_keys() {
        let a = SigningPrivateKey::generate();
        let b = SigningPrivateKey::generate();
        assert_eq!(a.public().fingerprint(), a.public().fingerprint());
        assert_ne!(a.public().fingerprint(), b.public().fingerprint());
        assert_eq!(a.public().numeric_fingerprint().split(' ').count(), 12);
    }
}
