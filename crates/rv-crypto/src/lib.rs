//! rv-crypto — cryptographic primitives for the Rendezvous client.
//!
//! # Module layout
//! - [`keys`] — typed Ed25519 signing keys and X25519 agreement keys,
//!   fingerprints, base64 wire encoding.
//! - [`aead`] — AES-256-GCM seal/open, combined wire form, randomness.
//! - [`hash`] — SHA-256 and the hash-chain fold.
//! - [`kdf`] — HKDF-SHA256 session-key derivation, Argon2id vault keys.
//! - [`primitives`] — the `encrypt_to`/`decrypt_from`/`sign`/`verify`
//!   façade built on the above.

pub mod aead;
pub mod hash;
pub mod kdf;
pub mod keys;
pub mod primitives;

pub use aead::{open_combined, open_gcm, seal_combined, seal_gcm, Sealed};
pub use hash::{fold_chain, sha256};
pub use kdf::{derive_ecdh_session_key, generate_vault_salt, vault_key_from_password, VaultKey};
pub use keys::{
    decode_signature, encode_signature, verify, AgreementPrivateKey, AgreementPublicKey, SigningPrivateKey,
    SigningPublicKey,
};
pub use primitives::{decrypt_from, encrypt_to, sign};
