//! rv-core — the device orchestrator: key hierarchy, topic membership,
//! chain reconciliation, and the receive pipeline for the Rendezvous
//! client.
//!
//! # Module layout
//! - [`device`] — the single concrete `Device` type; registration,
//!   prekey/topic-key distribution, topic creation, send, and the
//!   ordered receive pipeline.
//! - [`admin`] — the minimal admin-surface contract.
//! - [`topic_keys`] — per-user topic key pairs: generate, accept, wrap.
//! - [`topic_state`] — local topic state and the chain reconciliation
//!   state machine.
//! - [`events`] — the fixed `DeviceEvent` enumeration delivered through
//!   a single handler.
//! - [`persistence`] — `ClientData`, the one serialized blob a caller
//!   persists between runs, with optional password-based sealing.
//! - [`config`] — `ClientConfig`, with environment-variable overrides.

pub mod admin;
pub mod config;
pub mod device;
pub mod events;
pub mod persistence;
pub mod topic_keys;
pub mod topic_state;

pub use admin::AdminClient;
pub use config::ClientConfig;
pub use device::Device;
pub use events::{DeviceEvent, EventHandler};
pub use persistence::ClientData;
pub use topic_keys::TopicKeys;
pub use topic_state::Topic;
