//! Admin adapter — the minimal contract for the administrative surface.
//! Three operations only: token rotation, a full server reset for
//! development, and pin-based user allow-listing.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use rv_error::Error;
use rv_proto::AllowedUser;
use rv_transport::constants::{HEADER_AUTH, HEADER_USERNAME};
use rv_transport::{call_empty, call_json, Method, Request, ServerTransport};

/// Holds the bearer token every admin request is signed with. Starts at
/// the 16 zero bytes, and is replaced in place by
/// [`AdminClient::update_admin_token`].
pub struct AdminClient {
    transport: Arc<dyn ServerTransport>,
    token: [u8; 16],
}

impl AdminClient {
    pub fn new(transport: Arc<dyn ServerTransport>) -> Self {
        Self { transport, token: [0u8; 16] }
    }

    pub fn with_token(transport: Arc<dyn ServerTransport>, token: [u8; 16]) -> Self {
        Self { transport, token }
    }

    pub fn token(&self) -> [u8; 16] {
        self.token
    }

    fn request(&self) -> Request {
        Request::new().header(HEADER_AUTH, URL_SAFE_NO_PAD.encode(self.token))
    }

    /// Rotate the admin token. The response carries the new token, which
    /// replaces the stored one — callers must persist it themselves,
    /// this client only holds it for the lifetime of the process.
    pub async fn update_admin_token(&mut self) -> Result<[u8; 16], Error> {
        let bytes = self
            .transport
            .call(Method::Get, "admin/renew", self.request())
            .await?
            .ok_or(Error::NoDataInResponse)?;
        let token: [u8; 16] = bytes
            .try_into()
            .map_err(|_| Error::InvalidServerData("admin token must be 16 bytes".into()))?;
        self.token = token;
        Ok(token)
    }

    /// Wipe the server and reset the local token to the 16 zero bytes.
    /// Development-only; never exposed on a production admin surface.
    pub async fn reset_development_server(&mut self) -> Result<(), Error> {
        call_empty(self.transport.as_ref(), Method::Get, "admin/reset", self.request()).await?;
        self.token = [0u8; 16];
        Ok(())
    }

    /// Allow a username to register, returning the pin the user exchanges
    /// for an auth token at `user/register`. `expiry` is advisory only —
    /// clients never enforce it.
    pub async fn allow(&self, username: &str) -> Result<AllowedUser, Error> {
        let request = self.request().header(HEADER_USERNAME, username);
        call_json(self.transport.as_ref(), Method::Post, "user/allow", request).await
    }
}

/// Soft convention, not enforced — at least 6 days (`6 * 32` hours) in
/// the future. Exposed so embedding applications can sanity-check a
/// server's `AllowedUser` without hand-rolling the arithmetic.
pub fn expiry_is_plausible(expiry: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expiry > now + chrono::Duration::hours(6 * 32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_transport::MockServer;

    #[tokio::test]
    async fn token_rotation_succeeds_twice_from_zero() {
        let transport: Arc<dyn ServerTransport> = Arc::new(MockServer::new());
        let mut admin = AdminClient::new(transport);
        assert!(admin.update_admin_token().await.is_ok());
        assert!(admin.update_admin_token().await.is_ok());
    }

    #[tokio::test]
    async fn allow_returns_pin_in_range_and_plausible_expiry() {
        let transport: Arc<dyn ServerTransport> = Arc::new(MockServer::new());
        let mut admin = AdminClient::new(transport);
        admin.update_admin_token().await.unwrap();
        let allowed = admin.allow("alice").await.unwrap();
        assert!(allowed.pin < 100_000);
        assert!(expiry_is_plausible(allowed.expiry, Utc::now()));
    }
}
