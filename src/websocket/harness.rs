use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::WebSocketConfig;
use crate::models::{Confidence, FindingKind, Severity, Vulnerability};
use crate::race::ReleaseGate;
use crate::utils::preview;

use super::channel::{collect_replies, wait_for, MessageChannel};
use super::message::{find_amount_field, is_success_response, MessagePredicate, WsMessage};

const WS_METHOD: &str = "WS";

/// Decides how many frames of a channel round the server accepted.
pub trait AckCounter: Send + Sync {
    fn accepted(&self, delivered: usize, replies: &[WsMessage]) -> usize;
}

impl<F> AckCounter for F
where
    F: Fn(usize, &[WsMessage]) -> usize + Send + Sync,
{
    fn accepted(&self, delivered: usize, replies: &[WsMessage]) -> usize {
        self(delivered, replies)
    }
}

/// Counts inbound frames that read as an accepted operation, never more than
/// the number of frames delivered.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuccessReplies;

impl AckCounter for SuccessReplies {
    fn accepted(&self, delivered: usize, replies: &[WsMessage]) -> usize {
        replies
            .iter()
            .filter(|m| is_success_response(m))
            .count()
            .min(delivered)
    }
}

/// Counts every frame the channel took, regardless of any reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct Delivered;

impl AckCounter for Delivered {
    fn accepted(&self, delivered: usize, _replies: &[WsMessage]) -> usize {
        delivered
    }
}

fn sent_payment_messages(channel: &dyn MessageChannel, payment: &dyn MessagePredicate) -> Vec<WsMessage> {
    let mut seen = BTreeSet::new();
    channel
        .messages()
        .into_iter()
        .filter(|m| m.is_sent() && payment.matches(m) && seen.insert(m.data.clone()))
        .collect()
}

/// Fire copies of the most recent outbound payment frame through one release gate.
pub async fn test_race_condition(
    channel: Arc<dyn MessageChannel>,
    config: &WebSocketConfig,
    payment: &dyn MessagePredicate,
    acks: &dyn AckCounter,
) -> Vec<Vulnerability> {
    let Some(template) = channel
        .messages()
        .into_iter()
        .rev()
        .find(|m| m.is_sent() && payment.matches(m))
    else {
        debug!(url = %channel.url(), "No outbound payment frame to use as race template");
        return Vec::new();
    };

    let since = channel.messages().len();
    let gate = ReleaseGate::new();
    let handles: Vec<_> = (0..config.concurrency)
        .map(|_| {
            let ticket = gate.ticket();
            let channel = channel.clone();
            let data = template.data.clone();
            tokio::spawn(async move {
                if !ticket.wait().await {
                    return false;
                }
                channel.send(&data).await
            })
        })
        .collect();
    gate.release_when_ready().await;

    let delivered = join_all(handles)
        .await
        .into_iter()
        .filter(|sent| matches!(sent, Ok(true)))
        .count();
    let replies = collect_replies(
        channel.as_ref(),
        since,
        delivered,
        config.response_timeout(),
        config.poll_interval(),
    )
    .await;
    let accepted = acks.accepted(delivered, &replies);
    info!(
        url = %channel.url(),
        fired = config.concurrency,
        delivered,
        replies = replies.len(),
        accepted,
        "WebSocket race round finished"
    );

    if accepted <= 1 {
        return Vec::new();
    }

    vec![Vulnerability::new(
        FindingKind::WebSocketRaceCondition,
        Severity::Critical,
        channel.url(),
        WS_METHOD,
    )
    .title("WebSocket Race Condition")
    .description(format!(
        "WebSocket accepted {} of {} concurrent identical messages",
        accepted, config.concurrency
    ))
    .proof(format!(
        "{} concurrent frames fired, {} delivered, {} accepted. Template: {}",
        config.concurrency,
        delivered,
        accepted,
        preview(&template.data, 200)
    ))
    .cwe("CWE-362")
    .cvss(9.1, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:H/A:H")
    .confidence(Confidence::Medium)
    .remediation(
        "Process payment messages through the same transactional, idempotent path as \
         HTTP requests: attach a unique operation id to each message and reject ids that \
         were already consumed.",
    )
    .references(&["https://cwe.mitre.org/data/definitions/362.html"])]
}

/// Resend each captured outbound payment frame after a delay.
pub async fn test_replay(
    channel: &dyn MessageChannel,
    config: &WebSocketConfig,
    payment: &dyn MessagePredicate,
) -> Vec<Vulnerability> {
    let mut findings = Vec::new();
    for original in sent_payment_messages(channel, payment) {
        if !config.replay_delay().is_zero() {
            tokio::time::sleep(config.replay_delay()).await;
        }
        let since = channel.messages().len();
        if !channel.send(&original.data).await {
            continue;
        }
        let reply = wait_for(
            channel,
            since,
            config.response_timeout(),
            config.poll_interval(),
            WsMessage::is_received,
        )
        .await;
        let Some(reply) = reply.filter(is_success_response) else {
            continue;
        };

        info!(url = %channel.url(), "Replayed WebSocket frame accepted");
        findings.push(
            Vulnerability::new(FindingKind::WebSocketReplay, Severity::High, channel.url(), WS_METHOD)
                .title("WebSocket Message Replay Vulnerability")
                .description("Server accepted replayed WebSocket message")
                .proof(format!(
                    "Original: {}. Reply to replay: {}",
                    preview(&original.data, 200),
                    preview(&reply.data, 200)
                ))
                .cwe("CWE-294")
                .cvss(7.5, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:H/A:N")
                .confidence(Confidence::Medium)
                .remediation(
                    "Include a nonce and timestamp in every payment message and reject \
                     messages whose nonce was already seen or whose timestamp is stale.",
                )
                .references(&["https://cwe.mitre.org/data/definitions/294.html"]),
        );
    }
    findings
}

fn manipulated_amounts() -> [Value; 4] {
    [json!(-100.0), json!(0.0), json!(0.01), json!("0")]
}

/// Resend captured payment frames with the amount field rewritten.
pub async fn test_amount_manipulation(
    channel: &dyn MessageChannel,
    config: &WebSocketConfig,
    payment: &dyn MessagePredicate,
) -> Vec<Vulnerability> {
    let mut findings = Vec::new();
    for original in sent_payment_messages(channel, payment) {
        let Some(parsed) = &original.parsed else {
            continue;
        };
        let Some((field, original_amount)) = find_amount_field(parsed) else {
            continue;
        };

        for amount in manipulated_amounts() {
            let mut manipulated = parsed.clone();
            manipulated.insert(field.to_string(), amount.clone());
            let Ok(frame) = serde_json::to_string(&manipulated) else {
                continue;
            };

            let since = channel.messages().len();
            if !channel.send(&frame).await {
                continue;
            }
            let reply = wait_for(
                channel,
                since,
                config.response_timeout(),
                config.poll_interval(),
                WsMessage::is_received,
            )
            .await;
            if !reply.as_ref().is_some_and(is_success_response) {
                continue;
            }

            info!(url = %channel.url(), field, %amount, "Manipulated WebSocket amount accepted");
            findings.push(
                Vulnerability::new(
                    FindingKind::WebSocketAmountManipulation,
                    Severity::Critical,
                    channel.url(),
                    WS_METHOD,
                )
                .title(format!("Amount Manipulation Accepted ({} → {})", original_amount, amount))
                .description("Server accepted manipulated amount via WebSocket")
                .proof(format!("Manipulated message: {}", preview(&frame, 300)))
                .cwe("CWE-20")
                .cvss(9.1, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:H/A:H")
                .confidence(Confidence::High)
                .remediation(
                    "Validate amounts on the server: reject negative, zero and non-numeric \
                     values, and derive the charged amount from server-side order data.",
                )
                .references(&["https://cwe.mitre.org/data/definitions/20.html"]),
            );
            break;
        }
    }
    findings
}
