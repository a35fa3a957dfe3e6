//! Device event taxonomy.
//!
//! Topics holding a delegate reference back to their owning device so they
//! could raise events directly would need a cycle an owned graph doesn't
//! need. Here `Device` alone owns both the topic table and the handler,
//! and calls it after every state transition, so no `Rc`/`Weak`
//! back-reference exists anywhere in this crate.

use rv_crypto::SigningPublicKey;
use rv_proto::{DeviceRecord, Update};

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A device entry changed (active flag, app id) without being added or removed.
    UserDeviceChanged(DeviceRecord),
    UserDeviceAdded(DeviceRecord),
    UserDeviceRemoved(SigningPublicKey),
    TopicAdded { topic_id: [u8; 12] },
    TopicUpdated { topic_id: [u8; 12] },
    /// One content update resolved for this topic. `verified` is `false`
    /// while it sits in the out-of-order queue awaiting its predecessor.
    UpdateReceived { topic_id: [u8; 12], update: Update, verified: bool },
    ChainStateReceived { topic_id: [u8; 12], chain_index: u32, sender: SigningPublicKey },
    InvalidChain { topic_id: [u8; 12], chain_index: u32 },
    /// A previously-pending update verified later, once its predecessor
    /// arrived and drained the queue past it.
    UpdateVerifiedLate { topic_id: [u8; 12], update: Update },
}

/// A single delegate closure, in place of an open-ended delegate object.
pub type EventHandler = Box<dyn FnMut(DeviceEvent) + Send>;
