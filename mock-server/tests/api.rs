use std::sync::Arc;

use axum::http::{self, Request, StatusCode};
use base64::{engine::general_purpose, Engine as _};
use http_body_util::BodyExt;
use mock_server::{app, AppState, Db, Item, ItemList, TokenResponse};
use tower::ServiceExt;

const CLIENT_ID: &str = "test-client";
const CLIENT_SECRET: &str = "test-secret";

fn state() -> Db {
    Arc::new(AppState::new(3600).with_client(CLIENT_ID, CLIENT_SECRET))
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn form_request(body: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri("/oauth2/token")
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body.to_string())
        .unwrap()
}

fn authed_request(method: &str, uri: &str, token: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .body(body.to_string())
        .unwrap()
}

async fn fetch_token(db: &Db) -> String {
    let resp = app(db.clone())
        .oneshot(form_request(&format!(
            "grant_type=client_credentials&client_id={CLIENT_ID}&client_secret={CLIENT_SECRET}"
        )))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let token: TokenResponse = body_json(resp).await;
    token.access_token
}

// --- token endpoint ---

#[tokio::test]
async fn token_issued_for_form_credentials() {
    let db = state();
    let resp = app(db.clone())
        .oneshot(form_request(&format!(
            "grant_type=client_credentials&client_id={CLIENT_ID}&client_secret={CLIENT_SECRET}&scope=items"
        )))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let token: TokenResponse = body_json(resp).await;
    assert!(!token.access_token.is_empty());
    assert_eq!(token.token_type, "Bearer");
    assert_eq!(token.expires_in, 3600);
    assert!(token.expires_at > chrono::Utc::now().timestamp());
    assert_eq!(token.scope, "items");
    assert_eq!(db.tokens_issued(), 1);
}

#[tokio::test]
async fn token_issued_for_basic_credentials() {
    let db = state();
    let basic = general_purpose::STANDARD.encode(format!("{CLIENT_ID}:{CLIENT_SECRET}"));
    let resp = app(db.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth2/token")
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(http::header::AUTHORIZATION, format!("Basic {basic}"))
                .body("grant_type=client_credentials".to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(db.tokens_issued(), 1);
}

#[tokio::test]
async fn token_rejected_for_wrong_secret() {
    let db = state();
    let resp = app(db.clone())
        .oneshot(form_request(&format!(
            "grant_type=client_credentials&client_id={CLIENT_ID}&client_secret=nope"
        )))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["error"], "invalid_client");
    assert_eq!(db.tokens_issued(), 0);
}

#[tokio::test]
async fn token_rejected_for_other_grant_types() {
    let resp = app(state())
        .oneshot(form_request(&format!(
            "grant_type=password&client_id={CLIENT_ID}&client_secret={CLIENT_SECRET}"
        )))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- bearer protection ---

#[tokio::test]
async fn items_require_bearer_token() {
    let resp = app(state())
        .oneshot(Request::builder().uri("/api/v1/items").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_bearer_token_is_rejected() {
    let resp = app(state())
        .oneshot(authed_request("GET", "/api/v1/items", "made-up", ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_bearer_token_is_rejected() {
    let db = Arc::new(AppState::new(0).with_client(CLIENT_ID, CLIENT_SECRET));
    let token = fetch_token(&db).await;
    let resp = app(db)
        .oneshot(authed_request("GET", "/api/v1/items", &token, ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ready_needs_no_token() {
    let resp = app(state())
        .oneshot(Request::builder().uri("/_meta_/ready").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}

// --- items ---

#[tokio::test]
async fn list_items_empty() {
    let db = state();
    let token = fetch_token(&db).await;
    let resp = app(db)
        .oneshot(authed_request("GET", "/api/v1/items", &token, ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let list: ItemList = body_json(resp).await;
    assert!(list.items.is_empty());
}

#[tokio::test]
async fn create_item_malformed_json_returns_422() {
    let db = state();
    let token = fetch_token(&db).await;
    let resp = app(db)
        .oneshot(authed_request("POST", "/api/v1/items", &token, r#"{"not_name":1}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn get_item_bad_id_returns_400() {
    let db = state();
    let token = fetch_token(&db).await;
    let resp = app(db)
        .oneshot(authed_request("GET", "/api/v1/items/not-a-number", &token, ""))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_and_delete_unknown_item_return_404() {
    let db = state();
    let token = fetch_token(&db).await;

    let resp = app(db.clone())
        .oneshot(authed_request("PUT", "/api/v1/items/999", &token, r#"{"name":"Nope"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app(db)
        .oneshot(authed_request("DELETE", "/api/v1/items/999", &token, ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- full CRUD lifecycle ---

#[tokio::test]
async fn crud_lifecycle() {
    let db = state();
    let token = fetch_token(&db).await;

    // create
    let resp = app(db.clone())
        .oneshot(authed_request(
            "POST",
            "/api/v1/items",
            &token,
            r#"{"name":"Walk dog","details":"twice"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Item = body_json(resp).await;
    assert_eq!(created.name, "Walk dog");
    let id = created.id;

    // get
    let resp = app(db.clone())
        .oneshot(authed_request("GET", &format!("/api/v1/items/{id}"), &token, ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched: Item = body_json(resp).await;
    assert_eq!(fetched, created);

    // update — partial: only name
    let resp = app(db.clone())
        .oneshot(authed_request(
            "PUT",
            &format!("/api/v1/items/{id}"),
            &token,
            r#"{"name":"Walk cat"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Item = body_json(resp).await;
    assert_eq!(updated.name, "Walk cat");
    assert_eq!(updated.details, "twice"); // unchanged

    // list
    let resp = app(db.clone())
        .oneshot(authed_request("GET", "/api/v1/items", &token, ""))
        .await
        .unwrap();
    let list: ItemList = body_json(resp).await;
    assert_eq!(list.items, vec![updated]);

    // delete
    let resp = app(db.clone())
        .oneshot(authed_request("DELETE", &format!("/api/v1/items/{id}"), &token, ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    // get after delete — 404
    let resp = app(db)
        .oneshot(authed_request("GET", &format!("/api/v1/items/{id}"), &token, ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
