//! In-memory transport and clock for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ClientError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::token::Clock;

pub(crate) const BASE_URL: &str = "http://localhost:3000";
pub(crate) const TOKEN_URL: &str = "http://localhost:3000/oauth2/token";

#[derive(Default)]
struct Script {
    token_responses: VecDeque<Result<HttpResponse, ClientError>>,
    resource_responses: VecDeque<HttpResponse>,
    requests: Vec<HttpRequest>,
}

/// Replays queued responses and records every request it sees.
///
/// Requests to `TOKEN_URL` draw from the token queue, everything else from the
/// resource queue. An empty queue answers 500.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_token(&self, body: &str) -> &Self {
        self.script
            .lock()
            .token_responses
            .push_back(Ok(response(200, body)));
        self
    }

    pub(crate) fn push_token_response(&self, result: Result<HttpResponse, ClientError>) -> &Self {
        self.script.lock().token_responses.push_back(result);
        self
    }

    pub(crate) fn push_resource(&self, status: u16, body: &str) -> &Self {
        self.script
            .lock()
            .resource_responses
            .push_back(response(status, body));
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().requests.clone()
    }

    pub(crate) fn token_calls(&self) -> usize {
        self.requests().iter().filter(|r| r.url == TOKEN_URL).count()
    }

    pub(crate) fn resource_requests(&self) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url != TOKEN_URL)
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let mut script = self.script.lock();
        let is_token = request.url == TOKEN_URL;
        script.requests.push(request);
        if is_token {
            script
                .token_responses
                .pop_front()
                .unwrap_or_else(|| Ok(response(500, "no token response queued")))
        } else {
            Ok(script
                .resource_responses
                .pop_front()
                .unwrap_or_else(|| response(500, "no resource response queued")))
        }
    }
}

pub(crate) fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: Vec::new(),
        body: body.as_bytes().to_vec(),
    }
}

/// Clock that only moves when told to.
#[derive(Clone, Default)]
pub(crate) struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub(crate) fn at(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    pub(crate) fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub(crate) fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
