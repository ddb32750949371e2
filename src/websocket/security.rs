use crate::models::{Confidence, FindingKind, Severity, Vulnerability};

use super::channel::MessageChannel;
use super::message::contains_auth_token;

const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Passive checks on a channel and the traffic captured on it.
pub fn check_channel_security(channel: &dyn MessageChannel) -> Vec<Vulnerability> {
    let url = channel.url();
    let messages = channel.messages();
    let mut findings = Vec::new();

    if url.starts_with("ws://") {
        findings.push(
            Vulnerability::new(FindingKind::WebSocketSecurity, Severity::High, url, "WS")
                .title("Unencrypted WebSocket Connection (ws://)")
                .description(
                    "WebSocket connection uses unencrypted ws:// protocol instead of secure wss://. \
                     This exposes payment data in transit.",
                )
                .proof(format!("WebSocket URL: {}", url))
                .cwe("CWE-319")
                .cvss(7.5, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N")
                .confidence(Confidence::High)
                .remediation("Use wss:// for every WebSocket connection and refuse plain ws:// upgrades.")
                .references(&[
                    "https://cwe.mitre.org/data/definitions/319.html",
                    "https://owasp.org/www-community/vulnerabilities/Insecure_Transport",
                ]),
        );
    }

    if !messages.is_empty() && !messages.iter().any(contains_auth_token) {
        findings.push(
            Vulnerability::new(FindingKind::WebSocketAuthentication, Severity::High, url, "WS")
                .title("WebSocket Messages Missing Authentication Token")
                .description(
                    "WebSocket messages do not contain authentication tokens. This could allow \
                     unauthorized access to payment operations.",
                )
                .proof(format!("Analyzed {} messages, none contain auth tokens", messages.len()))
                .cwe("CWE-306")
                .cvss(8.1, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:N")
                .confidence(Confidence::Medium)
                .remediation("Authenticate every payment message, for example with a session token field checked server-side.")
                .references(&["https://cwe.mitre.org/data/definitions/306.html"]),
        );
    }

    if let Some(oversized) = messages.iter().find(|m| m.data.len() > MAX_FRAME_BYTES) {
        findings.push(
            Vulnerability::new(FindingKind::WebSocketMessageSize, Severity::Medium, url, "WS")
                .title("Excessive WebSocket Message Size")
                .description(format!(
                    "WebSocket message exceeds safe size limit ({} bytes > 10MB). This could \
                     indicate lack of server-side validation.",
                    oversized.data.len()
                ))
                .proof(format!(
                    "Message size: {} bytes at {}",
                    oversized.data.len(),
                    oversized.timestamp.to_rfc3339()
                ))
                .cwe("CWE-770")
                .cvss(5.3, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:N/A:L")
                .confidence(Confidence::Low)
                .remediation("Implement message size validation on server (max 10MB recommended)"),
        );
    }

    findings
}
