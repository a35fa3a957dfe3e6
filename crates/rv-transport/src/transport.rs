//! The stateless server request primitive.
//!
//! `ServerTransport` is the single seam `Device` (in `rv-core`) talks
//! through. Production code drives it with [`crate::reqwest_transport::HttpServerTransport`];
//! tests drive it with [`crate::mock::MockServer`] — same trait, no
//! network I/O, exact status-code semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use rv_error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, Default)]
pub struct Request {
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json_body<T: serde::Serialize>(self, value: &T) -> Result<Self, Error> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.body(bytes))
    }
}

/// `(method, path, headers, body) → body | error`.
///
/// Deliberately a single non-generic method so the trait stays object-safe
/// (`rv-core` holds it behind `Arc<dyn ServerTransport>`); the typed
/// convenience wrappers below are free functions instead of default
/// methods for the same reason.
#[async_trait]
pub trait ServerTransport: Send + Sync {
    async fn call(&self, method: Method, path: &str, request: Request) -> Result<Option<Vec<u8>>, Error>;
}

/// Convenience for endpoints with no request body and no response body.
pub async fn call_empty(
    transport: &dyn ServerTransport,
    method: Method,
    path: &str,
    request: Request,
) -> Result<(), Error> {
    transport.call(method, path, request).await.map(|_| ())
}

/// Convenience for endpoints that must return a JSON body.
pub async fn call_json<T: serde::de::DeserializeOwned>(
    transport: &dyn ServerTransport,
    method: Method,
    path: &str,
    request: Request,
) -> Result<T, Error> {
    let body = transport
        .call(method, path, request)
        .await?
        .ok_or(Error::NoDataInResponse)?;
    serde_json::from_slice(&body).map_err(Into::into)
}

/// Map an HTTP status code to the taxonomy (also used by the mock).
pub fn map_status(status: u16, body_hint: impl Into<String>) -> Error {
    rv_error::from_http_status(status, body_hint)
}
