//! Error types for the todo API client.
//!
//! # Design
//! Every verb call can fail in one of a few ways and the caller decides what
//! to do about it; the client never retries. `HttpStatus` keeps the raw status
//! code and body of a non-2xx resource response. A 401 from a resource
//! endpoint lands there too and does not drop the cached token.
//!
//! Messages never include the client secret or an access token.

use thiserror::Error;

/// Errors returned by `AuthenticatedClient` and `TodoClient`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client could not be configured (bad base URL, missing setting).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The token endpoint was unreachable or returned an unusable response.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A resource endpoint returned a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ClientError {
    /// Status code of a resource response, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}
