//! In-memory channel for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::channel::MessageChannel;
use super::message::WsMessage;

type Responder = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Records sent frames and immediately records the responder's reply, if any.
pub struct FakeChannel {
    url: String,
    log: Mutex<Vec<WsMessage>>,
    responder: Box<Responder>,
}

impl FakeChannel {
    pub fn new<F>(url: &str, responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            url: url.to_string(),
            log: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Seed the log with previously captured traffic.
    pub fn with_history(self, history: Vec<WsMessage>) -> Self {
        self.log.lock().unwrap().extend(history);
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.is_sent())
            .map(|m| m.data.clone())
            .collect()
    }
}

#[async_trait]
impl MessageChannel for FakeChannel {
    fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, text: &str) -> bool {
        let reply = (self.responder)(text);
        let mut log = self.log.lock().unwrap();
        log.push(WsMessage::sent(text));
        if let Some(reply) = reply {
            log.push(WsMessage::received(&reply));
        }
        true
    }

    fn messages(&self) -> Vec<WsMessage> {
        self.log.lock().unwrap().clone()
    }
}
