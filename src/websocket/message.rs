use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw-text markers of a payment message, used when the frame is not JSON.
pub const PAYMENT_TEXT_KEYWORDS: &[&str] = &["payment", "pay", "transaction", "amount", "status", "confirm", "balance"];
/// Key fragments of a payment message, used when the frame is a JSON object.
pub const PAYMENT_KEY_KEYWORDS: &[&str] = &["payment", "transaction", "amount", "status", "balance"];
/// Candidate amount fields, first match wins.
pub const AMOUNT_FIELDS: &[&str] = &["amount", "price", "total", "value"];
pub const TOKEN_FIELDS: &[&str] = &["token", "session_token", "sessionToken", "auth_token", "authToken", "access_token"];

const SUCCESS_STATUSES: &[&str] = &["success", "ok", "completed", "paid", "confirmed"];
const SUCCESS_TEXT: &[&str] = &["success", "completed", "confirmed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// One frame observed on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub data: String,
    /// Present when `data` is a JSON object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Map<String, Value>>,
}

impl WsMessage {
    pub fn new(direction: Direction, data: &str) -> Self {
        let parsed = match serde_json::from_str::<Value>(data) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        };
        Self {
            direction,
            timestamp: Utc::now(),
            data: data.to_string(),
            parsed,
        }
    }

    pub fn sent(data: &str) -> Self {
        Self::new(Direction::Sent, data)
    }

    pub fn received(data: &str) -> Self {
        Self::new(Direction::Received, data)
    }

    pub fn is_sent(&self) -> bool {
        self.direction == Direction::Sent
    }

    pub fn is_received(&self) -> bool {
        self.direction == Direction::Received
    }
}

pub fn is_payment_message(message: &WsMessage) -> bool {
    match &message.parsed {
        Some(map) => map.keys().any(|key| {
            let key = key.to_lowercase();
            PAYMENT_KEY_KEYWORDS.iter().any(|k| key.contains(k))
        }),
        None => {
            let data = message.data.to_lowercase();
            PAYMENT_TEXT_KEYWORDS.iter().any(|k| data.contains(k))
        }
    }
}

pub fn payment_messages(messages: &[WsMessage]) -> Vec<WsMessage> {
    messages.iter().filter(|m| is_payment_message(m)).cloned().collect()
}

/// Decides which captured frames are payment operations worth replaying.
pub trait MessagePredicate: Send + Sync {
    fn matches(&self, message: &WsMessage) -> bool;
}

impl<F> MessagePredicate for F
where
    F: Fn(&WsMessage) -> bool + Send + Sync,
{
    fn matches(&self, message: &WsMessage) -> bool {
        self(message)
    }
}

/// Keyword heuristic of [`is_payment_message`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentKeywords;

impl MessagePredicate for PaymentKeywords {
    fn matches(&self, message: &WsMessage) -> bool {
        is_payment_message(message)
    }
}

/// Whether an inbound frame reads as the server accepting an operation.
///
/// A JSON object carrying `status` or `success` is judged on those fields
/// alone. Anything else falls back to whole-word, case-sensitive markers in
/// the raw text.
pub fn is_success_response(message: &WsMessage) -> bool {
    if let Some(map) = &message.parsed {
        let status = map.get("status");
        let success = map.get("success");
        if status.is_some() || success.is_some() {
            let status_ok = status
                .and_then(Value::as_str)
                .is_some_and(|s| SUCCESS_STATUSES.contains(&s.to_lowercase().as_str()));
            return status_ok || success.and_then(Value::as_bool) == Some(true);
        }
    }
    message
        .data
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| SUCCESS_TEXT.contains(&word))
}

pub fn find_amount_field(payload: &Map<String, Value>) -> Option<(&'static str, &Value)> {
    AMOUNT_FIELDS
        .iter()
        .find_map(|field| payload.get(*field).map(|value| (*field, value)))
}

/// First non-empty token field found in any JSON frame.
pub fn extract_session_token(messages: &[WsMessage]) -> Option<String> {
    messages.iter().filter_map(|m| m.parsed.as_ref()).find_map(|map| {
        TOKEN_FIELDS.iter().find_map(|field| {
            map.get(*field)
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
    })
}

/// Whether a frame carries some form of authentication token.
pub fn contains_auth_token(message: &WsMessage) -> bool {
    const FIELDS: &[&str] = &[
        "token", "authToken", "auth_token", "sessionToken", "session_token", "accessToken",
        "access_token", "jwt", "bearer",
    ];
    if let Some(map) = &message.parsed {
        if FIELDS.iter().any(|f| map.contains_key(*f)) {
            return true;
        }
    }
    let data = message.data.to_lowercase();
    ["token", "authtoken", "sessiontoken", "bearer"]
        .iter()
        .any(|k| data.contains(k))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficSummary {
    pub total: usize,
    pub sent: usize,
    pub received: usize,
    pub payment: usize,
}

pub fn traffic_summary(messages: &[WsMessage]) -> TrafficSummary {
    TrafficSummary {
        total: messages.len(),
        sent: messages.iter().filter(|m| m.is_sent()).count(),
        received: messages.iter().filter(|m| m.is_received()).count(),
        payment: messages.iter().filter(|m| is_payment_message(m)).count(),
    }
}
