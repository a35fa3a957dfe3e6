//! Local topic state and the chain reconciliation state machine.

use rv_crypto::{AgreementPrivateKey, SigningPrivateKey};
use rv_proto::{TopicMember, Update};

/// A topic as held locally by a device: its membership snapshot, this
/// device's own topic-key halves (recovered either by creating the topic
/// or by accepting admission), and the chain-reconciliation queue.
pub struct Topic {
    pub topic_id: [u8; 12],
    pub creation_time: chrono::DateTime<chrono::Utc>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub members: Vec<TopicMember>,
    pub message_key: [u8; 32],
    /// This device's own topic signing key — used to sign outgoing updates.
    pub signing_priv: SigningPrivateKey,
    /// This device's own topic encryption key — used to decrypt this
    /// device's `encrypted_message_key` entry in `members`.
    pub enc_priv: AgreementPrivateKey,
    pub chain_index: u32,
    /// `topic_id` until the first update lands, a 32-byte SHA-256 digest
    /// thereafter.
    pub verified_output: Vec<u8>,
    pub unverified_updates: Vec<Update>,
}

impl Topic {
    /// This device's own index into `members`, resolved by matching its
    /// topic signing public key. `None` means the local state is corrupt
    /// (a topic this device holds keys for but isn't listed as a member
    /// of) and should never happen outside of a bug.
    pub fn own_member_index(&self) -> Option<usize> {
        let own_signature_key = self.signing_priv.public();
        self.members.iter().position(|m| m.signature_key == own_signature_key)
    }

    pub fn own_role(&self) -> Option<rv_proto::Role> {
        self.own_member_index().map(|i| self.members[i].role)
    }
}

/// Outcome for the update that was just fed to [`Topic::ingest_update`].
/// Reported exactly once, regardless of how the reconciliation loop
/// resolves.
#[derive(Debug)]
pub enum Delivered {
    Verified(Update),
    Pending(Update),
    Invalid(u32),
}

/// Outcome for an update other than the one just fed in, resolved as a
/// side effect of draining the queue.
#[derive(Debug)]
pub enum LateOutcome {
    Verified(Update),
    Invalid(u32),
}

impl Topic {
    /// Append `incoming` to the pending queue and drain every update that
    /// is now contiguous with `verified_output`. Chain breaks stop the
    /// drain immediately — later, correctly-signed updates stay queued
    /// rather than being discarded.
    pub fn ingest_update(&mut self, incoming: Update) -> (Delivered, Vec<LateOutcome>) {
        let incoming_chain_index = incoming.chain_index;
        let incoming_snapshot = incoming.clone();
        self.unverified_updates.push(incoming);
        // Descending by chain_index: the next-expected index sits at the tail.
        self.unverified_updates.sort_by(|a, b| b.chain_index.cmp(&a.chain_index));

        let mut late = Vec::new();
        let mut incoming_result = None;

        loop {
            let next_expected = self.chain_index + 1;
            match self.unverified_updates.last() {
                Some(tail) if tail.chain_index == next_expected => {}
                _ => break,
            }
            let update = self.unverified_updates.pop().expect("checked Some above");
            let is_incoming = update.chain_index == incoming_chain_index;
            let expected_output = rv_crypto::fold_chain(&self.verified_output, &update.signature);

            if expected_output[..] != update.output[..] {
                if is_incoming {
                    incoming_result = Some(Delivered::Invalid(update.chain_index));
                } else {
                    late.push(LateOutcome::Invalid(update.chain_index));
                }
                break;
            }

            self.chain_index = update.chain_index;
            self.verified_output = expected_output.to_vec();
            if is_incoming {
                incoming_result = Some(Delivered::Verified(update));
            } else {
                late.push(LateOutcome::Verified(update));
            }
        }

        (incoming_result.unwrap_or(Delivered::Pending(incoming_snapshot)), late)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_proto::FileDescriptor;

    fn update(chain_index: u32, prev_output: &[u8], signing: &SigningPrivateKey) -> Update {
        let sig = signing.sign(format!("update-{chain_index}").as_bytes());
        let output = rv_crypto::fold_chain(prev_output, &sig);
        Update { chain_index, output, metadata: vec![], files: Vec::<FileDescriptor>::new(), signature: sig, sender_user_key: signing.public() }
    }

    fn empty_topic() -> Topic {
        let signing_priv = SigningPrivateKey::generate();
        Topic {
            topic_id: [1u8; 12],
            creation_time: chrono::Utc::now(),
            timestamp: chrono::Utc::now(),
            members: vec![],
            message_key: [0u8; 32],
            signing_priv,
            enc_priv: AgreementPrivateKey::generate(),
            chain_index: 0,
            verified_output: vec![1u8; 12],
            unverified_updates: vec![],
        }
    }

    #[test]
    fn out_of_order_updates_both_verify() {
        let mut topic = empty_topic();
        let signer = SigningPrivateKey::generate();
        let u1 = update(1, &topic.verified_output, &signer);
        let expected_output_after_1 = u1.output;
        let u2 = update(2, &expected_output_after_1, &signer);

        let (first, late) = topic.ingest_update(u2);
        assert!(matches!(first, Delivered::Pending(_)));
        assert!(late.is_empty());
        assert_eq!(topic.chain_index, 0);

        let (second, late) = topic.ingest_update(u1);
        assert!(matches!(second, Delivered::Verified(_)));
        assert_eq!(late.len(), 1);
        assert!(matches!(late[0], LateOutcome::Verified(_)));
        assert_eq!(topic.chain_index, 2);
    }

    #[test]
    fn tampered_chain_is_rejected_without_advancing() {
        let mut topic = empty_topic();
        let signer = SigningPrivateKey::generate();
        let mut bad = update(1, &topic.verified_output, &signer);
        bad.output[0] ^= 0xFF;

        let (outcome, late) = topic.ingest_update(bad);
        assert!(matches!(outcome, Delivered::Invalid(1)));
        assert!(late.is_empty());
        assert_eq!(topic.chain_index, 0);
    }
}
