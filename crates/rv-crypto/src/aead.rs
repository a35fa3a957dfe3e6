//! AES-256-GCM helpers: `seal_gcm`/`open_gcm` and their combined form.
//!
//! Nonce is always 12 bytes. `seal_gcm` returns the three parts
//! separately so callers that need an explicit nonce (file encryption,
//! which uses the file id as nonce) can do so; `seal_combined`/
//! `open_combined` wrap the `nonce ‖ ct ‖ tag` wire form used for
//! metadata and topic-key-message payloads.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use rv_error::Error;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

fn cipher(key: &[u8; 32]) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))
}

/// Seal `plaintext` under `key`. If `nonce` is `None`, one is generated
/// at random; callers encrypting a file must pass the file id as nonce.
pub fn seal_gcm(key: &[u8; 32], plaintext: &[u8], nonce: Option<[u8; NONCE_LEN]>) -> Result<Sealed, Error> {
    let nonce = nonce.unwrap_or_else(random_array::<NONCE_LEN>);
    let combined = cipher(key)
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad: &[] })
        .map_err(|_| Error::Unknown("AEAD encryption failed".into()))?;
    if combined.len() < TAG_LEN {
        return Err(Error::Unknown("AEAD output shorter than tag".into()));
    }
    let (ct, tag) = combined.split_at(combined.len() - TAG_LEN);
    let mut tag_arr = [0u8; TAG_LEN];
    tag_arr.copy_from_slice(tag);
    Ok(Sealed { nonce, ciphertext: ct.to_vec(), tag: tag_arr })
}

/// Open a `Sealed` value. Tag mismatch (tampering) surfaces as
/// `InvalidServerData` — the generic "decoded but semantically invalid"
/// bucket, since the facade itself has no transport/file context.
pub fn open_gcm(key: &[u8; 32], sealed: &Sealed) -> Result<Vec<u8>, Error> {
    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.tag);
    cipher(key)
        .decrypt(Nonce::from_slice(&sealed.nonce), Payload { msg: &combined, aad: &[] })
        .map_err(|_| Error::InvalidServerData("GCM authentication failed".into()))
}

/// `nonce ‖ ciphertext ‖ tag` combined wire form.
pub fn seal_combined(key: &[u8; 32], plaintext: &[u8], nonce: Option<[u8; NONCE_LEN]>) -> Result<Vec<u8>, Error> {
    let sealed = seal_gcm(key, plaintext, nonce)?;
    let mut out = Vec::with_capacity(NONCE_LEN + sealed.ciphertext.len() + TAG_LEN);
    out.extend_from_slice(&sealed.nonce);
    out.extend_from_slice(&sealed.ciphertext);
    out.extend_from_slice(&sealed.tag);
    Ok(out)
}

pub fn open_combined(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, Error> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::InvalidRequest("combined GCM blob too short".into()));
    }
    let (nonce_bytes, rest) = data.split_at(NONCE_LEN);
    let (ct, tag) = rest.split_at(rest.len() - TAG_LEN);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(nonce_bytes);
    let mut tag_arr = [0u8; TAG_LEN];
    tag_arr.copy_from_slice(tag);
    open_gcm(key, &Sealed { nonce, ciphertext: ct.to_vec(), tag: tag_arr })
}

/// Fresh random bytes, used for topic ids, message ids, nonces.
pub fn random(n: usize) -> Vec<u8> {
    let mut out = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

pub fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = random_array::<32>();
        let sealed = seal_gcm(&key, b"hello world", None).unwrap();
        let pt = open_gcm(&key, &sealed).unwrap();
        assert_eq!(pt, b"hello world");
    }

    #[test]
    fn combined_roundtrip_with_explicit_nonce() {
        let key = random_array::<32>();
        let nonce = random_array::<12>();
        let blob = seal_combined(&key, b"file bytes", Some(nonce)).unwrap();
        assert_eq!(&blob[..12], &nonce);
        let pt = open_combined(&key, &blob).unwrap();
        assert_eq!(pt, b"file bytes");
    }

    #[test]
    fn tampering_is_detected() {
        let key = random_array::<32>();
        let mut blob = seal_combined(&key, b"payload", None).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert!(open_combined(&key, &blob).is_err());
    }
}
