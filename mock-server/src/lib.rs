use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: u64,
    pub name: String,
    pub details: String,
}

#[derive(Deserialize)]
pub struct CreateItem {
    pub name: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Deserialize)]
pub struct UpdateItem {
    pub name: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemList {
    pub items: Vec<Item>,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub expires_at: i64,
    pub scope: String,
}

/// In-memory state shared by every handler.
pub struct AppState {
    items: RwLock<BTreeMap<u64, Item>>,
    next_id: AtomicU64,
    clients: HashMap<String, String>,
    tokens: RwLock<HashMap<String, i64>>,
    tokens_issued: AtomicUsize,
    token_ttl: i64,
}

pub type Db = Arc<AppState>;

impl AppState {
    pub fn new(token_ttl: i64) -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            clients: HashMap::new(),
            tokens: RwLock::new(HashMap::new()),
            tokens_issued: AtomicUsize::new(0),
            token_ttl,
        }
    }

    /// Register an OAuth2 client allowed to use the client-credentials grant.
    pub fn with_client(mut self, client_id: &str, client_secret: &str) -> Self {
        self.clients
            .insert(client_id.to_string(), client_secret.to_string());
        self
    }

    /// Number of access tokens handed out so far.
    pub fn tokens_issued(&self) -> usize {
        self.tokens_issued.load(Ordering::SeqCst)
    }

    /// Record a freshly issued token, dropping any that have already expired.
    async fn store_token(&self, token: String, expires_at: i64) {
        let now = now();
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, exp| *exp > now);
        tokens.insert(token, expires_at);
    }

    async fn token_is_live(&self, token: &str) -> bool {
        let tokens = self.tokens.read().await;
        tokens.get(token).is_some_and(|&expires_at| expires_at > now())
    }
}

pub fn app(state: Db) -> Router {
    let api = Router::new()
        .route("/api/v1/items", get(list_items).post(create_item))
        .route(
            "/api/v1/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/oauth2/token", post(issue_token))
        .route("/_meta_/ready", get(ready))
        .merge(api)
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn oauth_error(status: StatusCode, code: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": code })))
}

/// Credentials from a Basic `Authorization` header, if one is present and
/// well formed.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

async fn issue_token(
    State(db): State<Db>,
    headers: HeaderMap,
    Form(input): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<Value>)> {
    if input.grant_type != "client_credentials" {
        return Err(oauth_error(StatusCode::BAD_REQUEST, "unsupported_grant_type"));
    }

    let (client_id, client_secret) = basic_credentials(&headers)
        .or_else(|| input.client_id.clone().zip(input.client_secret.clone()))
        .ok_or_else(|| oauth_error(StatusCode::UNAUTHORIZED, "invalid_client"))?;

    if db.clients.get(&client_id) != Some(&client_secret) {
        warn!(%client_id, "rejected client credentials");
        return Err(oauth_error(StatusCode::UNAUTHORIZED, "invalid_client"));
    }

    let access_token = Uuid::new_v4().simple().to_string();
    let expires_at = now() + db.token_ttl;
    db.store_token(access_token.clone(), expires_at).await;
    db.tokens_issued.fetch_add(1, Ordering::SeqCst);
    info!(%client_id, expires_at, "issued access token");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: db.token_ttl,
        expires_at,
        scope: input.scope.unwrap_or_else(|| "*".to_string()),
    }))
}

async fn require_bearer(
    State(db): State<Db>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !db.token_is_live(&token).await {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}

async fn ready() -> StatusCode {
    StatusCode::OK
}

async fn list_items(State(db): State<Db>) -> Json<ItemList> {
    let items = db.items.read().await;
    Json(ItemList {
        items: items.values().cloned().collect(),
    })
}

async fn create_item(
    State(db): State<Db>,
    Json(input): Json<CreateItem>,
) -> (StatusCode, Json<Item>) {
    let item = Item {
        id: db.next_id.fetch_add(1, Ordering::SeqCst),
        name: input.name,
        details: input.details,
    };
    db.items.write().await.insert(item.id, item.clone());
    (StatusCode::CREATED, Json(item))
}

async fn get_item(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<Json<Item>, StatusCode> {
    let items = db.items.read().await;
    items.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_item(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<UpdateItem>,
) -> Result<Json<Item>, StatusCode> {
    let mut items = db.items.write().await;
    let item = items.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(name) = input.name {
        item.name = name;
    }
    if let Some(details) = input.details {
        item.details = details;
    }
    Ok(Json(item.clone()))
}

async fn delete_item(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<StatusCode, StatusCode> {
    let mut items = db.items.write().await;
    items.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}
