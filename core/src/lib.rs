//! Blocking client for the todo service with self-refreshing OAuth2 tokens.
//!
//! # Overview
//! `AuthenticatedClient` exchanges client credentials for an access token at
//! `{base_url}/oauth2/token` and attaches it to every `get`, `put`, `post` and
//! `delete`. The token is fetched lazily and refetched only once it has
//! expired. `TodoClient` wraps an `AuthenticatedClient` with item operations.
//!
//! # Design
//! - Token acquisition is an explicit `ensure_token` call at the top of every
//!   verb; a failed fetch surfaces as `ClientError::Authentication`.
//! - Non-2xx resource responses surface as `ClientError::HttpStatus` without
//!   retries.
//! - I/O goes through the `Transport` trait; `UreqTransport` is the default.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod todo;
pub mod token;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{AuthenticatedClient, RAW_BODY_KEY};
pub use config::ClientConfig;
pub use error::ClientError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use todo::TodoClient;
pub use token::{Clock, Credentials, SystemClock, Token};
pub use types::{CreateItem, Item, UpdateItem};
