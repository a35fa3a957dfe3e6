//! Admin and registration wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{identity::UserInfo, prekey::SignedPrekey, topic_key::TopicKeyPublicBundle};

/// `user/allow` response. `expiry` is advisory only — clients do not
/// enforce it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AllowedUser {
    pub pin: u32,
    pub expiry: DateTime<Utc>,
}

/// Posted to `user/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationBundle {
    pub user_info: UserInfo,
    pub pin: u32,
    pub prekeys: Vec<SignedPrekey>,
    pub topic_keys: Vec<TopicKeyPublicBundle>,
}

/// `user/register` response: a fresh 16-byte auth token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResult {
    pub auth_token: [u8; 16],
}
