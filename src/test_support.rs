//! Shared test doubles: scripted transport and manual clock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::api::transport::{
    HttpRequest, HttpResponse, HttpTransport, ResponseHeaders, TransportError,
};
use crate::clock::Clock;

/// Scripted transport: responses are queued per path suffix and consumed in
/// order; every request is recorded for assertions.
pub(crate) struct MockTransport {
    responses: Mutex<HashMap<String, Vec<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue `response` for requests whose URL ends with `path`.
    pub(crate) fn respond(&self, path: &str, response: HttpResponse) {
        self.responses
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push(response);
    }

    /// All recorded requests whose URL ends with `path`.
    pub(crate) fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url.ends_with(path))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut responses = self.responses.lock().unwrap();
        let key = responses
            .keys()
            .find(|path| request.url.ends_with(path.as_str()))
            .cloned()
            .ok_or_else(|| TransportError::Network(format!("no scripted response for {}", request.url)))?;
        let queue = responses.get_mut(&key).unwrap();
        if queue.is_empty() {
            return Err(TransportError::Network(format!(
                "scripted responses for {key} exhausted"
            )));
        }
        Ok(queue.remove(0))
    }
}

/// Transport whose requests never complete; used to test mint cancellation.
pub(crate) struct HangingTransport;

#[async_trait]
impl HttpTransport for HangingTransport {
    async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        std::future::pending::<Result<HttpResponse, TransportError>>().await
    }
}

/// Build a JSON response with the given status.
pub(crate) fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: ResponseHeaders::new(vec![(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )]),
        body: body.to_string().into_bytes(),
    }
}

/// Build a JSON response carrying extra headers.
pub(crate) fn json_response_with_headers(
    status: u16,
    headers: Vec<(String, String)>,
    body: serde_json::Value,
) -> HttpResponse {
    HttpResponse {
        status,
        headers: ResponseHeaders::new(headers),
        body: body.to_string().into_bytes(),
    }
}

/// Manually advanced clock for freshness-window tests.
pub(crate) struct ManualClock(Mutex<SystemTime>);

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self(Mutex::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000)))
    }

    pub(crate) fn advance(&self, delta: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.0.lock().unwrap()
    }
}
