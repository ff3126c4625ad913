//! Item operations on top of `AuthenticatedClient`.
//!
//! `TodoClient` owns an `AuthenticatedClient` and only formats `api/v1` URLs
//! and converts JSON bodies to DTOs; tokens, headers and status handling all
//! stay in the verb client.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::client::{AuthenticatedClient, RAW_BODY_KEY};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::types::{CreateItem, Item, UpdateItem};

const API_PREFIX: [&str; 2] = ["api", "v1"];
const ITEMS: &str = "items";

#[derive(Debug)]
pub struct TodoClient {
    http: AuthenticatedClient,
}

impl TodoClient {
    pub fn new(http: AuthenticatedClient) -> Self {
        Self { http }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        AuthenticatedClient::from_config(config).map(Self::new)
    }

    /// The verb client used for every request.
    pub fn http(&self) -> &AuthenticatedClient {
        &self.http
    }

    /// `{base_url}/api/v1/{parts...}` with each part percent-encoded as a
    /// path segment, plus optional query pairs.
    pub fn build_api_url(&self, parts: &[&str], query: &[(&str, &str)]) -> String {
        let mut url = self.http.url().clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(API_PREFIX).extend(parts);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url.into()
    }

    pub fn is_up(&self) -> bool {
        self.http.is_up()
    }

    pub fn get_item(&self, id: u64) -> Result<Item, ClientError> {
        let url = self.build_api_url(&[ITEMS, &id.to_string()], &[]);
        decode(self.http.get(&url)?)
    }

    /// All items. A response without an `items` array yields an empty list.
    pub fn get_items(&self) -> Result<Vec<Item>, ClientError> {
        let url = self.build_api_url(&[ITEMS], &[]);
        match self.http.get(&url)? {
            Value::Object(body) if is_raw_fallback(&body) => Err(
                ClientError::Deserialization("item list response is not JSON".to_string()),
            ),
            Value::Object(mut body) => match body.remove(ITEMS) {
                Some(items) => decode(items),
                None => Ok(Vec::new()),
            },
            other => decode(other),
        }
    }

    pub fn create_item(&self, input: &CreateItem) -> Result<Item, ClientError> {
        let url = self.build_api_url(&[ITEMS], &[]);
        decode(self.http.post(&url, Some(input))?)
    }

    pub fn update_item(&self, id: u64, input: &UpdateItem) -> Result<Item, ClientError> {
        let url = self.build_api_url(&[ITEMS, &id.to_string()], &[]);
        decode(self.http.put(&url, Some(input))?)
    }

    pub fn delete_item(&self, id: u64) -> Result<(), ClientError> {
        let url = self.build_api_url(&[ITEMS, &id.to_string()], &[]);
        self.http.delete(&url).map(|_| ())
    }
}

/// `decode_body` wraps non-JSON text as `{"raw": ...}`.
fn is_raw_fallback(body: &Map<String, Value>) -> bool {
    body.len() == 1 && body.contains_key(RAW_BODY_KEY)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Deserialization(e.to_string()))
}
