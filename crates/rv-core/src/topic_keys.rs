//! Local topic-key pairs.
//!
//! `rv_proto::topic_key::TopicKeyPublicBundle`/`TopicKeyMessage` carry the
//! wire shapes; this module carries the private halves and the three
//! operations a device performs on them before anything crosses the wire.

use rv_crypto::{AgreementPrivateKey, AgreementPublicKey, SigningPrivateKey, SigningPublicKey};
use rv_error::Error;
use rv_proto::{TopicKeyMessage, TopicKeyPublicBundle};

/// One generated (or accepted) topic key pair, plus the signed public
/// bundle that was built for it.
pub struct TopicKeys {
    pub signing_priv: SigningPrivateKey,
    pub enc_priv: AgreementPrivateKey,
    pub bundle: TopicKeyPublicBundle,
}

impl TopicKeys {
    /// Generate a fresh pair and sign its bundle under the user identity key.
    pub fn new(user_priv: &SigningPrivateKey) -> Self {
        let signing_priv = SigningPrivateKey::generate();
        let enc_priv = AgreementPrivateKey::generate();
        let bundle_unsigned = TopicKeyPublicBundle {
            user_key: user_priv.public(),
            signature_key: signing_priv.public(),
            encryption_key: enc_priv.public(),
            signature: String::new(),
        };
        let signature = rv_crypto::encode_signature(&rv_crypto::sign(user_priv, &bundle_unsigned.signed_bytes()));
        let bundle = TopicKeyPublicBundle { signature, ..bundle_unsigned };
        Self { signing_priv, enc_priv, bundle }
    }

    /// Recover a topic key pair delivered by another of the user's own
    /// devices. Verifies the bundle's signature under `sender_user_pub`,
    /// decrypts the private halves with this
    /// device's prekey secret, and checks each recovered private key
    /// actually produces the public half named in the bundle.
    pub fn accept(
        message: &TopicKeyMessage,
        my_prekey_priv: &AgreementPrivateKey,
        sender_user_pub: &SigningPublicKey,
    ) -> Result<Self, Error> {
        let bundle_signature = rv_crypto::decode_signature(&message.bundle.signature)?;
        rv_crypto::verify(sender_user_pub, &message.bundle.signed_bytes(), &bundle_signature)
            .map_err(|_| Error::InvalidSignature("topic key bundle signature".into()))?;

        let plaintext = rv_crypto::decrypt_from(my_prekey_priv, &message.encrypted_private_keys)?;
        if plaintext.len() != 64 {
            return Err(Error::InvalidServerData("topic key payload must be 64 bytes".into()));
        }

        let mut signing_bytes = [0u8; 32];
        signing_bytes.copy_from_slice(&plaintext[..32]);
        let mut enc_bytes = [0u8; 32];
        enc_bytes.copy_from_slice(&plaintext[32..]);

        let signing_priv = SigningPrivateKey::from_bytes(&signing_bytes);
        if signing_priv.public() != message.bundle.signature_key {
            return Err(Error::InvalidServerData("recovered signing key does not match bundle".into()));
        }
        let enc_priv = AgreementPrivateKey::from_bytes(&enc_bytes);
        if enc_priv.public() != message.bundle.encryption_key {
            return Err(Error::InvalidServerData("recovered encryption key does not match bundle".into()));
        }

        Ok(Self { signing_priv, enc_priv, bundle: message.bundle.clone() })
    }

    /// Wrap this pair's private halves for delivery to one of the owning
    /// user's other devices, consuming one of that device's prekeys.
    pub fn wrap_for(&self, peer_prekey_pub: &AgreementPublicKey) -> Result<TopicKeyMessage, Error> {
        let mut plaintext = Vec::with_capacity(64);
        plaintext.extend_from_slice(self.signing_priv.secret_bytes());
        plaintext.extend_from_slice(self.enc_priv.secret_bytes());
        let encrypted_private_keys = rv_crypto::encrypt_to(peer_prekey_pub, &plaintext)?;
        Ok(TopicKeyMessage {
            device_prekey: *peer_prekey_pub,
            bundle: self.bundle.clone(),
            encrypted_private_keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_then_accept_recovers_same_pair() {
        let user_priv = SigningPrivateKey::generate();
        let keys = TopicKeys::new(&user_priv);
        let peer_prekey = AgreementPrivateKey::generate();

        let message = keys.wrap_for(&peer_prekey.public()).unwrap();
        let recovered = TopicKeys::accept(&message, &peer_prekey, &user_priv.public()).unwrap();

        assert_eq!(recovered.signing_priv.public(), keys.signing_priv.public());
        assert_eq!(recovered.enc_priv.public(), keys.enc_priv.public());
    }

    #[test]
    fn accept_rejects_wrong_sender_key() {
        let user_priv = SigningPrivateKey::generate();
        let impostor = SigningPrivateKey::generate();
        let keys = TopicKeys::new(&user_priv);
        let peer_prekey = AgreementPrivateKey::generate();
        let message = keys.wrap_for(&peer_prekey.public()).unwrap();

        assert!(TopicKeys::accept(&message, &peer_prekey, &impostor.public()).is_err());
    }
}
