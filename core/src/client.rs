//! Authenticated JSON verb client for the todo API.
//!
//! # Design
//! `AuthenticatedClient` owns the client credentials, the cached access token
//! and a `Transport`. Each verb (`get`, `put`, `post`, `delete`) first calls
//! `ensure_token`, which fetches a token through the client-credentials grant
//! when none is cached or the cached one has expired, then sends the request
//! with the bearer token attached. Every response goes through one result
//! finisher: 2xx bodies are decoded tolerantly, anything else becomes
//! `ClientError::HttpStatus`.
//!
//! Nothing is retried. A 401 from a resource endpoint does not evict the
//! cached token; only wall-clock expiry does.
//!
//! The token lives behind a mutex that is held across a refresh, so callers
//! sharing one client never refresh the same expired token twice.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::token::{self, Clock, Credentials, SystemClock, Token};

const JSON: &str = "application/json";
const TOKEN_PATH: &str = "oauth2/token";
const READY_PATH: &str = "_meta_/ready";

/// Key under which a non-JSON success body is returned.
pub const RAW_BODY_KEY: &str = "raw";

/// Blocking HTTP client that attaches a self-refreshing OAuth2 bearer token.
pub struct AuthenticatedClient {
    url: Url,
    base_url: String,
    origin: String,
    token_url: String,
    credentials: Credentials,
    token: Mutex<Option<Token>>,
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
}

impl AuthenticatedClient {
    /// Build a client rooted at `base_url`. No network I/O happens here; the
    /// first token is fetched by the first verb call.
    pub fn new(
        base_url: &str,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<Self, ClientError> {
        let url = normalize_base_url(base_url)?;
        let base_url = url.as_str().trim_end_matches('/').to_string();
        let token_url = format!("{base_url}/{TOKEN_PATH}");
        debug!(%base_url, client_id, "building authenticated client");

        Ok(Self {
            origin: url.origin().ascii_serialization(),
            url,
            base_url,
            token_url,
            credentials: Credentials::new(client_id, client_secret, scope),
            token: Mutex::new(None),
            transport: Box::new(UreqTransport::new()),
            clock: Box::new(SystemClock),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::new(
            &config.base_url,
            &config.client_id,
            &config.client_secret,
            &config.scope,
        )
    }

    /// Replace the transport used for both token and resource requests.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Box::new(transport);
        self
    }

    /// Replace the time source used for expiry checks.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Normalized base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Normalized base URL in parsed form.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    /// Snapshot of the cached token, if any. Does not refresh.
    pub fn cached_token(&self) -> Option<Token> {
        self.token.lock().clone()
    }

    /// Return a usable token, fetching a new one if none is cached or the
    /// cached one has expired. A failed fetch leaves the cache as it was.
    pub fn ensure_token(&self) -> Result<Token, ClientError> {
        let mut cached = self.token.lock();
        let now = self.clock.now();
        match cached.as_ref() {
            Some(token) if !token.is_expired(now) => {
                debug!(expires_at = token.expires_at, "reusing cached token");
                return Ok(token.clone());
            }
            Some(token) => debug!(expires_at = token.expires_at, now, "cached token expired"),
            None => debug!("no cached token"),
        }

        let fresh = self.fetch_token()?;
        debug!(expires_at = fresh.expires_at, "token refreshed");
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    fn fetch_token(&self) -> Result<Token, ClientError> {
        let request = token::build_token_request(&self.token_url, &self.credentials);
        let response = self.transport.execute(request).map_err(|e| {
            warn!(error = %e, token_url = %self.token_url, "token endpoint unreachable");
            ClientError::Authentication(format!("token endpoint unreachable: {e}"))
        })?;
        token::parse_token_response(&response, self.clock.now()).inspect_err(|e| {
            warn!(error = %e, token_url = %self.token_url, "token fetch failed");
        })
    }

    pub fn get(&self, url: &str) -> Result<Value, ClientError> {
        self.dispatch(HttpMethod::Get, url, None)
    }

    pub fn put<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: Option<&B>,
    ) -> Result<Value, ClientError> {
        let payload = encode_body(body)?;
        self.dispatch(HttpMethod::Put, url, payload)
    }

    pub fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: Option<&B>,
    ) -> Result<Value, ClientError> {
        let payload = encode_body(body)?;
        self.dispatch(HttpMethod::Post, url, payload)
    }

    pub fn delete(&self, url: &str) -> Result<Value, ClientError> {
        self.dispatch(HttpMethod::Delete, url, None)
    }

    /// Unauthenticated readiness probe against `{origin}/_meta_/ready`.
    /// Never touches the token cache.
    pub fn is_up(&self) -> bool {
        let request = HttpRequest::new(HttpMethod::Get, format!("{}/{READY_PATH}", self.origin));
        match self.transport.execute(request) {
            Ok(response) => response.status == 200,
            Err(e) => {
                warn!(error = %e, "health check failed");
                false
            }
        }
    }

    fn dispatch(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Value, ClientError> {
        let token = self.ensure_token()?;

        let mut request = HttpRequest::new(method, url)
            .with_header("Accept", JSON)
            .with_header("Content-Type", JSON)
            .with_header("Authorization", token.authorization());
        if let Some(body) = body {
            request = request.with_body(body);
        }

        let response = self.transport.execute(request)?;
        debug!(method = method.as_str(), url, status = response.status, "request executed");
        finish(method, url, response)
    }
}

impl fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("base_url", &self.base_url)
            .field("token_url", &self.token_url)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

/// Parse `raw` as an absolute URL with a host, dropping fragment and query.
fn normalize_base_url(raw: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(raw)
        .map_err(|e| ClientError::Configuration(format!("invalid base URL {raw:?}: {e}")))?;
    if url.cannot_be_a_base() || !url.has_host() {
        return Err(ClientError::Configuration(format!(
            "base URL {raw:?} is not an absolute URL with a host"
        )));
    }
    url.set_fragment(None);
    url.set_query(None);
    Ok(url)
}

fn encode_body<B: Serialize + ?Sized>(body: Option<&B>) -> Result<Option<Vec<u8>>, ClientError> {
    body.map(serde_json::to_vec)
        .transpose()
        .map_err(|e| ClientError::Serialization(e.to_string()))
}

/// Map a raw response to the decoded body or a status error.
fn finish(method: HttpMethod, url: &str, response: HttpResponse) -> Result<Value, ClientError> {
    if !response.is_success() {
        warn!(method = method.as_str(), url, status = response.status, "request failed");
        return Err(ClientError::HttpStatus {
            status: response.status,
            body: response.body_text(),
        });
    }
    Ok(decode_body(&response.body))
}

/// Empty bodies decode to `{}`; bodies that are not JSON are wrapped as
/// `{"raw": "<text>"}`.
pub(crate) fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Object(Map::new());
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| {
        let mut wrapped = Map::new();
        wrapped.insert(
            RAW_BODY_KEY.to_string(),
            Value::String(String::from_utf8_lossy(bytes).into_owned()),
        );
        Value::Object(wrapped)
    })
}
