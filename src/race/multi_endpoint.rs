use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::http::{HttpTransport, PreparedRequest};
use crate::models::{Confidence, Endpoint, FindingKind, RaceResult, Session, Severity, Vulnerability};

use super::classifier::analyze_round;
use super::dispatch::dispatch_prepared;

/// Validate-step path fragments and the confirm step they usually pair with.
/// Ordered; every matching pattern yields one candidate.
pub const CONFIRMATION_PATTERNS: &[(&str, &str)] = &[
    ("/validate", "/confirm"),
    ("/check", "/execute"),
    ("/reserve", "/commit"),
    ("/prepare", "/complete"),
    ("/verify", "/process"),
];

/// Each validate fragment, matched only as a whole path segment.
static CONFIRMATION_SEGMENTS: LazyLock<Vec<(Regex, String)>> = LazyLock::new(|| {
    CONFIRMATION_PATTERNS
        .iter()
        .map(|(from, to)| {
            let pattern = format!(r"{}(?P<end>[/?#]|$)", regex::escape(from));
            let regex = Regex::new(&pattern).expect("valid confirmation pattern");
            (regex, format!("{}${{end}}", to))
        })
        .collect()
});

pub fn infer_confirmation_endpoints(validate_url: &str) -> Vec<String> {
    CONFIRMATION_SEGMENTS
        .iter()
        .filter(|(regex, _)| regex.is_match(validate_url))
        .map(|(regex, replacement)| regex.replace_all(validate_url, replacement.as_str()).into_owned())
        .collect()
}

/// Decides whether a validate/confirm round shows the two steps racing.
/// Returns the evidence line for the finding when it does.
pub trait PairJudge: Send + Sync {
    fn judge(&self, validate: &[RaceResult], confirm: &[RaceResult]) -> Option<String>;
}

impl<F> PairJudge for F
where
    F: Fn(&[RaceResult], &[RaceResult]) -> Option<String> + Send + Sync,
{
    fn judge(&self, validate: &[RaceResult], confirm: &[RaceResult]) -> Option<String> {
        self(validate, confirm)
    }
}

/// Races a validate step against its inferred confirm step.
///
/// Without a [`PairJudge`] the round is not dispatched: there is no general
/// rule for what a successful interleaving looks like.
pub struct ValidateConfirmRace {
    transport: Arc<dyn HttpTransport>,
    pairs: usize,
    preview_bytes: usize,
    judge: Option<Arc<dyn PairJudge>>,
}

impl ValidateConfirmRace {
    pub fn new(transport: Arc<dyn HttpTransport>, pairs: usize, preview_bytes: usize) -> Self {
        Self {
            transport,
            pairs,
            preview_bytes,
            judge: None,
        }
    }

    pub fn with_judge(mut self, judge: Arc<dyn PairJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub async fn run(&self, endpoint: &Endpoint, session: &Session, payload: &Value) -> Vec<Vulnerability> {
        let candidates = infer_confirmation_endpoints(&endpoint.url);
        if candidates.is_empty() {
            return Vec::new();
        }
        let Some(judge) = &self.judge else {
            debug!(
                endpoint = %endpoint.url,
                candidates = candidates.len(),
                "No pair judge configured, skipping validate/confirm race"
            );
            return Vec::new();
        };

        let mut findings = Vec::new();
        for confirm_url in candidates {
            let validate = PreparedRequest::new(&endpoint.method, &endpoint.url)
                .json(payload)
                .with_session(session);
            let confirm = PreparedRequest::new(&endpoint.method, &confirm_url)
                .json(payload)
                .with_session(session);

            // Even workers validate, odd workers confirm.
            let requests = (0..self.pairs * 2)
                .map(|i| Ok(if i % 2 == 0 { validate.clone() } else { confirm.clone() }))
                .collect();
            let outcome = dispatch_prepared(self.transport.clone(), requests, self.preview_bytes).await;

            let validate_results = outcome.results_for(|id| id % 2 == 0);
            let confirm_results = outcome.results_for(|id| id % 2 == 1);
            let Some(evidence) = judge.judge(&validate_results, &confirm_results) else {
                continue;
            };

            info!(validate = %endpoint.url, confirm = %confirm_url, "Validate/confirm race detected");
            let timing = analyze_round(&outcome.results, 1)
                .map(|a| format!(" {}", a.timing_summary()))
                .unwrap_or_default();
            findings.push(
                Vulnerability::new(
                    FindingKind::MultiEndpointRace,
                    Severity::High,
                    &endpoint.url,
                    &endpoint.method,
                )
                .title("Validate/Confirm Race Condition Detected")
                .description(format!(
                    "Concurrent requests to {} and {} interleaved in a way the server should have prevented.",
                    endpoint.url, confirm_url
                ))
                .proof(format!(
                    "{} validate and {} confirm requests raced. {}.{}",
                    validate_results.len(),
                    confirm_results.len(),
                    evidence,
                    timing
                ))
                .cwe("CWE-362")
                .cvss(8.1, "CVSS:3.1/AV:N/AC:H/PR:N/UI:N/S:U/C:N/I:H/A:H")
                .confidence(Confidence::Medium)
                .remediation(
                    "Bind the confirm step to the state captured at validation: carry a \
                     server-issued token from validate to confirm, re-check every \
                     precondition inside the confirm transaction and consume the token atomically.",
                )
                .references(&["https://cwe.mitre.org/data/definitions/362.html"]),
            );
        }
        findings
    }
}
