//! Client configuration.
//!
//! Settings come from a deserialized document or from `TODO_*` environment
//! variables. `scope` defaults to `*`.

use std::fmt;

use serde::Deserialize;

use crate::error::ClientError;

pub const ENV_BASE_URL: &str = "TODO_BASE_URL";
pub const ENV_CLIENT_ID: &str = "TODO_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "TODO_CLIENT_SECRET";
pub const ENV_SCOPE: &str = "TODO_SCOPE";

const DEFAULT_SCOPE: &str = "*";

#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, using the `TODO_*` variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ClientError::Configuration(format!("{key} is not set")))
        };

        Ok(Self {
            base_url: required(ENV_BASE_URL)?,
            client_id: required(ENV_CLIENT_ID)?,
            client_secret: required(ENV_CLIENT_SECRET)?,
            scope: lookup(ENV_SCOPE).unwrap_or_else(default_scope),
        })
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}
