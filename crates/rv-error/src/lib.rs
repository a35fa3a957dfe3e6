//! rv-error — the single error type every Rendezvous client crate returns.
//!
//! Error kinds carry numeric codes stable enough to round-trip with the
//! server's HTTP status. Rather than give each crate its own error enum
//! and convert at the boundary, this crate holds the one taxonomy and
//! every other crate returns it directly.

use thiserror::Error;

/// A single error from the crypto, transport, or protocol layers.
///
/// `code()` returns a numeric value stable across releases so a caller
/// can serialize it back to the server unchanged.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no response from server: {0}")]
    NoResponse(String),

    #[error("unknown error: {0}")]
    Unknown(String),

    #[error("expected a response body but none was present")]
    NoDataInResponse,

    #[error("server data failed semantic validation: {0}")]
    InvalidServerData(String),

    #[error("local serialization failed: {0}")]
    SerializationFailed(String),

    #[error("file integrity or authentication check failed: {0}")]
    InvalidFile(String),

    #[error("device does not have permission to write to this topic")]
    NoPermissionToWrite,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("signature verification failed: {0}")]
    InvalidSignature(String),

    #[error("resource already exists")]
    ResourceAlreadyExists,

    #[error("request outdated: {0}")]
    RequestOutdated(String),

    #[error("invalid topic key upload: {0}")]
    InvalidTopicKeyUpload(String),

    #[error("internal server error")]
    InternalServerError,
}

impl Error {
    /// The stable numeric code for this error kind.
    pub fn code(&self) -> u32 {
        match self {
            Error::NoResponse(_) => 0,
            Error::Unknown(_) => 1,
            Error::NoDataInResponse => 2,
            Error::InvalidServerData(_) => 3,
            Error::SerializationFailed(_) => 4,
            Error::InvalidFile(_) => 5,
            Error::NoPermissionToWrite => 6,
            Error::InvalidRequest(_) => 400,
            Error::AuthenticationFailed => 401,
            Error::InvalidSignature(_) => 406,
            Error::ResourceAlreadyExists => 409,
            Error::RequestOutdated(_) => 410,
            Error::InvalidTopicKeyUpload(_) => 412,
            Error::InternalServerError => 500,
        }
    }

    /// Short machine-stable kind name, useful in log fields.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::NoResponse(_) => "no_response",
            Error::Unknown(_) => "unknown",
            Error::NoDataInResponse => "no_data_in_response",
            Error::InvalidServerData(_) => "invalid_server_data",
            Error::SerializationFailed(_) => "serialization_failed",
            Error::InvalidFile(_) => "invalid_file",
            Error::NoPermissionToWrite => "no_permission_to_write",
            Error::InvalidRequest(_) => "invalid_request",
            Error::AuthenticationFailed => "authentication_failed",
            Error::InvalidSignature(_) => "invalid_signature",
            Error::ResourceAlreadyExists => "resource_already_exists",
            Error::RequestOutdated(_) => "request_outdated",
            Error::InvalidTopicKeyUpload(_) => "invalid_topic_key_upload",
            Error::InternalServerError => "internal_server_error",
        }
    }

    /// Whether this error should poison an entire receive batch: fatal
    /// decode errors do, per-message verification failures don't.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Error::InvalidServerData(_) | Error::Unknown(_))
    }
}

/// Map an HTTP status code to the taxonomy.
pub fn from_http_status(status: u16, body_hint: impl Into<String>) -> Error {
    let hint = body_hint.into();
    match status {
        400 => Error::InvalidRequest(hint),
        401 => Error::AuthenticationFailed,
        406 => Error::InvalidSignature(hint),
        409 => Error::ResourceAlreadyExists,
        410 => Error::RequestOutdated(hint),
        412 => Error::InvalidTopicKeyUpload(hint),
        500 => Error::InternalServerError,
        _ => Error::Unknown(format!("unexpected status {status}: {hint}")),
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationFailed(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::SerializationFailed(format!("base64 decode: {e}"))
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::SerializationFailed(format!("hex decode: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_stable_table() {
        assert_eq!(Error::NoResponse(String::new()).code(), 0);
        assert_eq!(Error::Unknown(String::new()).code(), 1);
        assert_eq!(Error::NoDataInResponse.code(), 2);
        assert_eq!(Error::InvalidServerData(String::new()).code(), 3);
        assert_eq!(Error::SerializationFailed(String::new()).code(), 4);
        assert_eq!(Error::InvalidFile(String::new()).code(), 5);
        assert_eq!(Error::NoPermissionToWrite.code(), 6);
        assert_eq!(Error::InvalidRequest(String::new()).code(), 400);
        assert_eq!(Error::AuthenticationFailed.code(), 401);
        assert_eq!(Error::InvalidSignature(String::new()).code(), 406);
        assert_eq!(Error::ResourceAlreadyExists.code(), 409);
        assert_eq!(Error::RequestOutdated(String::new()).code(), 410);
        assert_eq!(Error::InvalidTopicKeyUpload(String::new()).code(), 412);
        assert_eq!(Error::InternalServerError.code(), 500);
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(from_http_status(400, "x").code(), 400);
        assert_eq!(from_http_status(401, "x").code(), 401);
        assert_eq!(from_http_status(406, "x").code(), 406);
        assert_eq!(from_http_status(409, "x").code(), 409);
        assert_eq!(from_http_status(410, "x").code(), 410);
        assert_eq!(from_http_status(412, "x").code(), 412);
        assert_eq!(from_http_status(500, "x").code(), 500);
        assert_eq!(from_http_status(418, "x").code(), 1);
    }

    #[test]
    fn batch_fatal_policy() {
        assert!(Error::InvalidServerData(String::new()).is_batch_fatal());
        assert!(Error::Unknown(String::new()).is_batch_fatal());
        assert!(!Error::InvalidFile(String::new()).is_batch_fatal());
        assert!(!Error::InvalidSignature(String::new()).is_batch_fatal());
    }
}
