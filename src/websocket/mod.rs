//! Race, replay and amount tests over an already-open WebSocket channel.
//!
//! The channel itself is a capability supplied by the caller; this module only
//! drives it and grades what comes back.

pub mod channel;
pub mod harness;
pub mod message;
pub mod security;

#[cfg(test)]
pub mod testing;

pub use channel::{collect_replies, wait_for, MessageChannel};
pub use harness::{test_amount_manipulation, test_race_condition, test_replay, AckCounter, Delivered, SuccessReplies};
pub use message::{
    extract_session_token, find_amount_field, is_payment_message, is_success_response, payment_messages,
    traffic_summary, Direction, MessagePredicate, PaymentKeywords, TrafficSummary, WsMessage,
};
pub use security::check_channel_security;
