use std::collections::BTreeSet;

use chrono::Duration;

use crate::heuristics::Classification;
use crate::models::{Confidence, Endpoint, FindingKind, RaceResult, Severity, Vulnerability};
use crate::utils::format_delta;

/// Rounds with fewer results than this are treated as under-sampled.
pub const MIN_ROUND_RESULTS: usize = 2;

const NEGATIVE_TIME_MARKER: &str = " [DATA QUALITY] negative request duration observed; \
     clock anomaly during measurement, timing figures are unreliable";

const RACE_REMEDIATION: &str = "Implement proper concurrency control:\n\
- Wrap the check and the state change in one database transaction and lock \
the affected row (SELECT ... FOR UPDATE) before updating it.\n\
- Or take a distributed lock keyed by the resource (for example SET NX with \
a short TTL) and reject requests while it is held.\n\
- Make single-use operations conditional (UPDATE ... WHERE used = false) and \
treat zero affected rows as a duplicate.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingStats {
    pub min: Duration,
    pub max: Duration,
    pub spread: Duration,
    /// At least one result finished before it started.
    pub negative: bool,
}

/// Aggregate view of one round, shared by every race-style test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundAnalysis {
    pub total: usize,
    pub successes: usize,
    /// Number of different bodies among the 2xx responses.
    pub distinct_success_bodies: usize,
    pub timing: TimingStats,
}

impl RoundAnalysis {
    /// More than one request was processed.
    pub fn is_race(&self) -> bool {
        self.successes > 1
    }

    pub fn timing_summary(&self) -> String {
        let mut summary = format!(
            "Timing spread: {}. Negative time: {}",
            format_delta(self.timing.spread),
            self.timing.negative
        );
        if self.timing.negative {
            summary.push_str(NEGATIVE_TIME_MARKER);
        }
        summary
    }
}

pub fn timing_stats(results: &[RaceResult]) -> Option<TimingStats> {
    let min = results.iter().map(|r| r.elapsed).min()?;
    let max = results.iter().map(|r| r.elapsed).max()?;
    Some(TimingStats {
        min,
        max,
        spread: max - min,
        negative: results.iter().any(|r| r.elapsed < Duration::zero()),
    })
}

/// Summarize a round, or `None` when it has fewer than `min_results` results.
pub fn analyze_round(results: &[RaceResult], min_results: usize) -> Option<RoundAnalysis> {
    if results.len() < min_results.max(1) {
        return None;
    }
    let timing = timing_stats(results)?;
    let successful: Vec<&RaceResult> = results.iter().filter(|r| r.is_success()).collect();
    let distinct: BTreeSet<&str> = successful.iter().map(|r| r.body.as_str()).collect();

    Some(RoundAnalysis {
        total: results.len(),
        successes: successful.len(),
        distinct_success_bodies: distinct.len(),
        timing,
    })
}

/// Grade a generic race round. Returns at most one finding, only when more
/// than one identical request was processed.
pub fn classify_round(
    endpoint: &Endpoint,
    results: &[RaceResult],
    classification: &Classification,
) -> Option<Vulnerability> {
    let analysis = analyze_round(results, MIN_ROUND_RESULTS)?;
    if !analysis.is_race() {
        return None;
    }

    let payment = classification.payment.matches(endpoint);
    let single_use = classification.single_use.matches(endpoint);
    let severity = if payment { Severity::Critical } else { Severity::High };
    let confidence = if payment || single_use {
        Confidence::High
    } else {
        Confidence::Medium
    };

    Some(
        Vulnerability::new(FindingKind::RaceCondition, severity, &endpoint.url, &endpoint.method)
            .title("Concurrent Request Race Condition Detected")
            .description(format!(
                "Server processed {} out of {} concurrent identical requests successfully. \
                 This indicates lack of proper concurrency control.",
                analysis.successes, analysis.total
            ))
            .proof(format!(
                "{} concurrent requests sent, {} succeeded. {}",
                analysis.total,
                analysis.successes,
                analysis.timing_summary()
            ))
            .cwe("CWE-362")
            .cvss(9.1, "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:N/I:H/A:H")
            .confidence(confidence)
            .remediation(RACE_REMEDIATION)
            .references(&[
                "https://cwe.mitre.org/data/definitions/362.html",
                "https://owasp.org/www-community/vulnerabilities/Race_Conditions",
            ]),
    )
}
