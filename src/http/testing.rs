//! Scripted transports for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use async_trait::async_trait;
use crate::errors::PayraceError;
use super::client::{HttpReply, HttpTransport};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        self.body.as_deref().and_then(|b| serde_json::from_str(b).ok())
    }
}

type Script = dyn Fn(&RecordedRequest, usize) -> Result<HttpReply, PayraceError> + Send + Sync;

/// Answers each request with a closure of (request, index among non-GET requests).
/// GET requests are warm-up traffic and always get an empty 200.
pub struct ScriptedTransport {
    script: Box<Script>,
    calls: AtomicUsize,
    recorded: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&RecordedRequest, usize) -> Result<HttpReply, PayraceError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn always(status: u16, body: &'static str) -> Self {
        Self::new(move |_, _| Ok(HttpReply::new(status, body)))
    }

    /// The first `n` operations succeed with a distinct body, the rest are rejected.
    pub fn first_n_succeed(n: usize) -> Self {
        Self::new(move |_, i| {
            if i < n {
                Ok(HttpReply::new(201, &format!("{{\"id\":\"op_{}\"}}", i)))
            } else {
                Ok(HttpReply::new(409, "{\"error\":\"already processed\"}"))
            }
        })
    }

    pub fn operations(&self) -> Vec<RecordedRequest> {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method != "GET")
            .cloned()
            .collect()
    }

    pub fn warmups(&self) -> usize {
        self.recorded.lock().unwrap().iter().filter(|r| r.method == "GET").count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: reqwest::Request) -> Result<HttpReply, PayraceError> {
        let recorded = RecordedRequest {
            method: request.method().as_str().to_string(),
            url: request.url().to_string(),
            headers: request
                .headers()
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect(),
            body: request
                .body()
                .and_then(|b| b.as_bytes())
                .map(|b| String::from_utf8_lossy(b).into_owned()),
        };
        self.recorded.lock().unwrap().push(recorded.clone());

        if recorded.method == "GET" {
            return Ok(HttpReply::new(200, ""));
        }
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(&recorded, index)
    }
}
