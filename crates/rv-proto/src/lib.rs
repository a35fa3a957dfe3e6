//! rv-proto — wire types for the Rendezvous client protocol.
//!
//! All on-wire types are plain serde records; wire framing itself is
//! left to the transport layer.
//!
//! # Modules
//! - [`identity`] — `UserInfo`, device roster, merge diff.
//! - [`prekey`] — signed ECDH prekeys and bundle responses.
//! - [`topic_key`] — per-user topic key public bundles and delivery packets.
//! - [`topic`] — topic membership, content updates, chain state.
//! - [`download`] — the `device/messages` batch envelope and receipts.
//! - [`admin`] — admin-token and registration types.

pub mod admin;
pub mod download;
pub mod identity;
pub mod prekey;
pub mod topic;
pub mod topic_key;

pub use admin::{AllowedUser, RegistrationBundle, RegistrationResult};
pub use download::{DeviceDownload, Receipt};
pub use identity::{DeviceDiff, DeviceRecord, UserInfo};
pub use prekey::{DevicePrekeyBundle, PerDevicePrekeys, PrekeyUploadRequest, SignedPrekey};
pub use topic::{
    ChainState, FileDescriptor, FilePayload, IncomingUpdate, Role, TopicMember, TopicMessageRequest,
    TopicRecord, Update, UpdateUpload,
};
pub use topic_key::{
    DeviceTopicKeyMessages, TopicKeyBundle, TopicKeyMessage, TopicKeyPublicBundle, TopicKeyRequest,
    TopicKeyResponse,
};
