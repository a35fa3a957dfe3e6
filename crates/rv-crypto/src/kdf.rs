//! Key derivation: HKDF-SHA256 for ECDH session keys, plus the Argon2id
//! vault-key derivation used by `rv-core`'s optional encrypted
//! persistence.

use argon2::{Argon2, Params, Version};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use rv_error::Error;

/// HKDF-SHA256 salt used for all ECDH-derived session keys.
pub const RENDEZVOUS_SALT: &[u8] = b"RendezvousClient";

pub fn hkdf_expand(ikm: &[u8], salt: &[u8], info: &[u8], out_len: usize) -> Result<Vec<u8>, Error> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut out = vec![0u8; out_len];
    hk.expand(info, &mut out)
        .map_err(|_| Error::Unknown("HKDF expand failed: output too long".into()))?;
    Ok(out)
}

/// Derive the ECDH session key used by `encrypt_to`/`decrypt_from`:
/// `HKDF-SHA256(salt="RendezvousClient", ikm=dh, info=ephemeral_pub‖recipient_pub)`.
pub fn derive_ecdh_session_key(
    dh_output: &[u8; 32],
    ephemeral_pub: &[u8; 32],
    recipient_pub: &[u8; 32],
) -> Result<[u8; 32], Error> {
    let mut info = Vec::with_capacity(64);
    info.extend_from_slice(ephemeral_pub);
    info.extend_from_slice(recipient_pub);
    let out = hkdf_expand(dh_output, RENDEZVOUS_SALT, &info, 32)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&out);
    Ok(key)
}

// ── Vault key (ambient, optional encrypted persistence) ──────────────────────

#[derive(ZeroizeOnDrop)]
pub struct VaultKey(pub [u8; 32]);

fn argon2_params() -> Params {
    Params::new(64 * 1024, 3, 1, Some(32)).expect("static Argon2 params are always valid")
}

pub fn vault_key_from_password(password: &[u8], salt: &[u8; 16]) -> Result<VaultKey, Error> {
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params());
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| Error::Unknown(format!("Argon2id derivation failed: {e}")))?;
    Ok(VaultKey(output))
}

pub fn generate_vault_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hkdf_is_deterministic() {
        let a = hkdf_expand(b"ikm", b"salt", b"info", 32).unwrap();
        let b = hkdf_expand(b"ikm", b"salt", b"info", 32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn vault_key_changes_with_salt() {
        let s1 = [1u8; 16];
        let s2 = [2u8; 16];
        let k1 = vault_key_from_password(b"hunter2", &s1).unwrap();
        let k2 = vault_key_from_password(b"hunter2", &s2).unwrap();
        assert_ne!(k1.0, k2.0);
    }
}
