use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::message::WsMessage;

/// A persistent, already-open message channel to the target.
///
/// Implementations record every frame they send or receive, in order.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    fn url(&self) -> &str;

    /// Send one text frame. Returns false when the channel refused it.
    async fn send(&self, text: &str) -> bool;

    /// Snapshot of every frame observed so far.
    fn messages(&self) -> Vec<WsMessage>;

    fn last_message(&self) -> Option<WsMessage> {
        self.messages().pop()
    }
}

/// Poll the channel until a frame recorded after index `since` satisfies
/// `predicate`, or `timeout` elapses.
pub async fn wait_for<F>(
    channel: &dyn MessageChannel,
    since: usize,
    timeout: Duration,
    interval: Duration,
    predicate: F,
) -> Option<WsMessage>
where
    F: Fn(&WsMessage) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(found) = channel.messages().into_iter().skip(since).find(|m| predicate(m)) {
            return Some(found);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Poll until at least `expected` inbound frames arrived after index `since`,
/// or `timeout` elapses. Returns whatever inbound frames were seen.
pub async fn collect_replies(
    channel: &dyn MessageChannel,
    since: usize,
    expected: usize,
    timeout: Duration,
    interval: Duration,
) -> Vec<WsMessage> {
    let deadline = Instant::now() + timeout;
    loop {
        let replies: Vec<WsMessage> = channel
            .messages()
            .into_iter()
            .skip(since)
            .filter(|m| m.is_received())
            .collect();
        let now = Instant::now();
        if replies.len() >= expected || now >= deadline {
            return replies;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::testing::FakeChannel;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_for_sees_reply() {
        let channel = FakeChannel::new("wss://pay.test/ws", |_| Some(r#"{"status":"ok"}"#.to_string()));
        assert!(channel.send(r#"{"amount":1}"#).await);
        let reply = wait_for(&channel, 0, Duration::from_millis(50), Duration::from_millis(5), |m| {
            m.is_received()
        })
        .await;
        assert_eq!(reply.unwrap().data, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let channel = FakeChannel::new("wss://pay.test/ws", |_| None);
        channel.send("x").await;
        let reply = wait_for(&channel, 0, Duration::from_millis(30), Duration::from_millis(10), |m| {
            m.is_received()
        })
        .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_ignores_earlier_frames() {
        let channel = Arc::new(FakeChannel::new("wss://pay.test/ws", |_| Some("done".to_string())));
        channel.send("first").await;
        let since = channel.messages().len();
        let reply = wait_for(channel.as_ref(), since, Duration::ZERO, Duration::from_millis(1), |m| {
            m.is_received()
        })
        .await;
        assert!(reply.is_none());
        assert_eq!(channel.last_message().unwrap().data, "done");
    }
}
