//! `reqwest`-backed `ServerTransport` — a thin byte-in/byte-out layer,
//! no request shaping beyond headers and a JSON body.

use std::time::Duration;

use async_trait::async_trait;
use rv_error::Error;

use crate::transport::{map_status, Method, Request, ServerTransport};

pub struct HttpServerTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpServerTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rendezvous-client/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Unknown(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url: base_url.into() })
    }
}

#[async_trait]
impl ServerTransport for HttpServerTransport {
    async fn call(&self, method: Method, path: &str, request: Request) -> Result<Option<Vec<u8>>, Error> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'));
        tracing::info!(%url, ?method, "dispatching server request");

        let mut builder = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, %url, "server request failed");
            Error::NoResponse(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, %url, "server responded with error status");
            return Err(map_status(status.as_u16(), text));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::NoResponse(e.to_string()))?;
        if bytes.is_empty() {
            Ok(None)
        } else {
            Ok(Some(bytes.to_vec()))
        }
    }
}
