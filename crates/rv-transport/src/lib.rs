//! rv-transport — server and admin transport adapters.
//!
//! # Modules
//! - [`transport`] — the `ServerTransport` trait and request/response shapes.
//! - [`reqwest_transport`] — production HTTP implementation.
//! - [`mock`] — in-memory fake server for tests.
//! - [`constants`] — header names and wire constants.

pub mod constants;
pub mod mock;
pub mod reqwest_transport;
pub mod transport;

pub use mock::MockServer;
pub use reqwest_transport::HttpServerTransport;
pub use transport::{call_empty, call_json, map_status, Method, Request, ServerTransport};
