//! Crypto primitives façade.
//!
//! `encrypt_to`/`decrypt_from` implement the asymmetric encrypt-to-public
//! construction used by topic-key delivery: an ephemeral X25519 keypair,
//! ECDH against the recipient's agreement public key, HKDF-SHA256 with
//! salt `"RendezvousClient"` and `info = ephemeral_pub ‖ recipient_pub`,
//! then AES-GCM seal. The wire form is `ephemeral_pub ‖ combined`.

use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::{
    aead,
    kdf,
    keys::{AgreementPrivateKey, AgreementPublicKey, SigningPrivateKey},
};
use rv_error::Error;

/// Encrypt `plaintext` to `recipient_pub`. Output: `ephemeral_pub(32) ‖ nonce(12) ‖ ct ‖ tag(16)`.
pub fn encrypt_to(recipient_pub: &AgreementPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let ephemeral_secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_pub = X25519Public::from(&ephemeral_secret);

    let dh = ephemeral_secret
        .diffie_hellman(&X25519Public::from(recipient_pub.0))
        .to_bytes();
    let session_key = kdf::derive_ecdh_session_key(&dh, ephemeral_pub.as_bytes(), &recipient_pub.0)?;

    let combined = aead::seal_combined(&session_key, plaintext, None)?;

    let mut out = Vec::with_capacity(32 + combined.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&combined);
    Ok(out)
}

/// Decrypt a blob produced by `encrypt_to` addressed to `recipient_priv`.
pub fn decrypt_from(recipient_priv: &AgreementPrivateKey, blob: &[u8]) -> Result<Vec<u8>, Error> {
    if blob.len() < 32 {
        return Err(Error::InvalidRequest("encrypted blob shorter than ephemeral key".into()));
    }
    let (ephemeral_pub_bytes, combined) = blob.split_at(32);
    let mut ephemeral_pub = [0u8; 32];
    ephemeral_pub.copy_from_slice(ephemeral_pub_bytes);

    let dh = recipient_priv.diffie_hellman(&AgreementPublicKey(ephemeral_pub));
    let session_key = kdf::derive_ecdh_session_key(&dh, &ephemeral_pub, &recipient_priv.public().0)?;

    aead::open_combined(&session_key, combined)
}

/// Sign `bytes` with a topic/device/user signing key.
pub fn sign(priv_key: &SigningPrivateKey, bytes: &[u8]) -> [u8; 64] {
    priv_key.sign(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_to_roundtrip() {
        let recipient = AgreementPrivateKey::generate();
        let ct = encrypt_to(&recipient.public(), b"topic key material").unwrap();
        let pt = decrypt_from(&recipient, &ct).unwrap();
        assert_eq!(pt, b"topic key material");
    }

    #[test]
    fn decrypt_fails_for_wrong_key() {
        let recipient = AgreementPrivateKey::generate();
        let wrong = AgreementPrivateKey::generate();
        let ct = encrypt_to(&recipient.public(), b"secret").unwrap();
        assert!(decrypt_from(&wrong, &ct).is_err());
    }

    #[test]
    fn decrypt_rejects_short_blob() {
        let recipient = AgreementPrivateKey::generate();
        assert!(decrypt_from(&recipient, &[0u8; 10]).is_err());
    }
}
