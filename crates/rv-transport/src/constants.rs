//! Header names and wire-level constants.

pub const HEADER_AUTH: &str = "auth";
pub const HEADER_USERNAME: &str = "username";
pub const HEADER_PIN: &str = "pin";
pub const HEADER_COUNT: &str = "count";
pub const HEADER_USER: &str = "user";
pub const HEADER_DEVICE: &str = "device";
pub const HEADER_RECEIVER: &str = "receiver";
pub const HEADER_APP: &str = "app";

pub const AUTH_TOKEN_LEN: usize = 16;
pub const TOPIC_ID_LEN: usize = 12;
pub const MESSAGE_ID_LEN: usize = 12;
pub const ECC_KEY_LEN: usize = 32;
pub const MESSAGE_KEY_LEN: usize = 32;
pub const PIN_MAX: u32 = 100_000;
pub const PIN_RETRIES: u32 = 3;
pub const PIN_EXPIRY_SECS: i64 = 60 * 60 * 32 * 7;
pub const MAX_NAME_LEN: usize = 32;
pub const MAX_APP_ID_LEN: usize = 10;
pub const MAX_METADATA_LEN: usize = 100;
