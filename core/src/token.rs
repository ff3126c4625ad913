//! OAuth2 client-credentials grant: credentials, tokens and the clock that
//! decides when a token has expired.
//!
//! # Design
//! A `Token` is only ever replaced wholesale. Expiry is judged against a
//! `Clock` so the inclusive boundary (`expires_at <= now` means expired) can
//! be tested without sleeping. Expiry values come from the server and may be
//! fractional or out of range; they are floored and saturated into `i64`.

use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::Number;
use url::form_urlencoded;

use crate::error::ClientError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

const GRANT_TYPE: &str = "client_credentials";
const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Source of the current time as epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Client-credentials used for every token grant.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

/// An access token as cached by `AuthenticatedClient`.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    /// Expiry as epoch seconds. `0` when the token endpoint gave no expiry.
    pub expires_at: i64,
    pub token_type: String,
}

impl Token {
    /// A token with zero seconds left is already expired.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Body of a successful token endpoint response. Unknown fields are ignored.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_at: Option<Number>,
    #[serde(default)]
    expires_in: Option<Number>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Build the form-encoded client-credentials request for `token_url`.
///
/// Credentials travel both as a Basic `Authorization` header and as form
/// fields so servers accepting either convention work.
pub(crate) fn build_token_request(token_url: &str, credentials: &Credentials) -> HttpRequest {
    let mut form = form_urlencoded::Serializer::new(String::new());
    form.append_pair("grant_type", GRANT_TYPE)
        .append_pair("client_id", &credentials.client_id)
        .append_pair("client_secret", &credentials.client_secret);
    if !credentials.scope.is_empty() {
        form.append_pair("scope", &credentials.scope);
    }

    let basic = general_purpose::STANDARD.encode(format!(
        "{}:{}",
        credentials.client_id, credentials.client_secret
    ));

    HttpRequest::new(HttpMethod::Post, token_url)
        .with_header("Accept", "application/json")
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_header("Authorization", format!("Basic {basic}"))
        .with_body(form.finish().into_bytes())
}

/// Turn a token endpoint response into a `Token`.
///
/// `expires_at` wins when present; otherwise it is derived from `expires_in`;
/// with neither the token expires at epoch `0`.
pub(crate) fn parse_token_response(
    response: &HttpResponse,
    now: i64,
) -> Result<Token, ClientError> {
    if !response.is_success() {
        return Err(ClientError::Authentication(format!(
            "token endpoint returned HTTP {}",
            response.status
        )));
    }

    let body: TokenResponse = serde_json::from_slice(&response.body)
        .map_err(|e| ClientError::Authentication(format!("invalid token response: {e}")))?;

    let expires_at = match (&body.expires_at, &body.expires_in) {
        (Some(at), _) => whole_seconds(at),
        (None, Some(secs)) => now.saturating_add(whole_seconds(secs)),
        (None, None) => 0,
    };

    Ok(Token {
        access_token: body.access_token,
        expires_at,
        token_type: body
            .token_type
            .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
    })
}

/// Floor a JSON number to whole seconds, saturating at the `i64` bounds.
fn whole_seconds(n: &Number) -> i64 {
    match n.as_i64() {
        Some(secs) => secs,
        // `as` saturates; u64 values above i64::MAX land here too.
        None => n.as_f64().map_or(0, |secs| secs.floor() as i64),
    }
}
