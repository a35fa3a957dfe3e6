//! Client configuration, override-with-default over environment
//! variables.

use std::time::Duration;

const ENV_SERVER_URL: &str = "RENDEZVOUS_SERVER_URL";
const ENV_APP_ID: &str = "RENDEZVOUS_APP_ID";
const ENV_REQUEST_TIMEOUT_SECS: &str = "RENDEZVOUS_REQUEST_TIMEOUT_SECS";

const DEFAULT_SERVER_URL: &str = "https://rendezvous.example.invalid";
const DEFAULT_APP_ID: &str = "rendezvous";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration for a `Device`. `app_id` is capped at 10 chars —
/// longer values are truncated, never rejected, so a misconfigured env
/// var cannot brick startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub app_id: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        let mut app_id = app_id.into();
        app_id.truncate(10);
        Self { server_url: server_url.into(), app_id, request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS) }
    }

    /// Reads `RENDEZVOUS_SERVER_URL`, `RENDEZVOUS_APP_ID`, and
    /// `RENDEZVOUS_REQUEST_TIMEOUT_SECS`, falling back to sane defaults.
    pub fn from_env() -> Self {
        let server_url = std::env::var(ENV_SERVER_URL).unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        let app_id = std::env::var(ENV_APP_ID).unwrap_or_else(|_| DEFAULT_APP_ID.to_string());
        let timeout_secs = std::env::var(ENV_REQUEST_TIMEOUT_SECS)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        let mut config = Self::new(server_url, app_id);
        config.request_timeout = Duration::from_secs(timeout_secs);
        config
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL, DEFAULT_APP_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_id_is_truncated_to_ten_chars() {
        let config = ClientConfig::new("https://x.invalid", "way-too-long-app-id");
        assert_eq!(config.app_id.len(), 10);
    }

    #[test]
    fn default_has_sane_timeout() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
