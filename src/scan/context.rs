use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::errors::DispatchFailure;
use crate::models::{Severity, Vulnerability};
use crate::race::RoundObserver;

/// Dispatch counters for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EndpointDiagnostics {
    pub requests_sent: usize,
    pub results_received: usize,
    /// Dispatch failures by kind.
    pub failures: BTreeMap<String, usize>,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl EndpointDiagnostics {
    pub fn failure_total(&self) -> usize {
        self.failures.values().sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// Per-scan state shared by every concurrently running test.
pub struct ScanContext {
    scan_id: String,
    started_at: DateTime<Utc>,
    findings: RwLock<Vec<Vulnerability>>,
    diagnostics: DashMap<String, EndpointDiagnostics>,
}

impl ScanContext {
    pub fn new() -> Self {
        Self {
            scan_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            findings: RwLock::new(Vec::new()),
            diagnostics: DashMap::new(),
        }
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Stamp and append a batch of findings in one write.
    pub async fn add_findings(&self, findings: Vec<Vulnerability>) {
        if findings.is_empty() {
            return;
        }
        let now = Utc::now();
        let stamped: Vec<Vulnerability> = findings
            .into_iter()
            .map(|mut f| {
                f.id.get_or_insert_with(|| uuid::Uuid::new_v4().to_string());
                f.discovered_at.get_or_insert(now);
                f
            })
            .collect();
        for f in &stamped {
            info!(
                scan_id = %self.scan_id,
                kind = %f.kind,
                severity = %f.severity,
                endpoint = %f.endpoint,
                "Finding recorded"
            );
        }
        self.findings.write().await.extend(stamped);
    }

    /// Recorded findings, first occurrence of each (kind, endpoint, title),
    /// most severe first.
    pub async fn findings(&self) -> Vec<Vulnerability> {
        let all = self.findings.read().await;
        let mut seen = HashSet::new();
        let mut unique: Vec<Vulnerability> = all
            .iter()
            .filter(|f| seen.insert((f.kind, f.endpoint.clone(), f.title.clone())))
            .cloned()
            .collect();
        unique.sort_by_key(|f| f.severity.rank());
        unique
    }

    pub async fn severity_counts(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for f in self.findings().await {
            match f.severity {
                Severity::Critical => counts.critical += 1,
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
            }
        }
        counts
    }

    pub fn mark_timed_out(&self, endpoint: &str) {
        self.diagnostics.entry(endpoint.to_string()).or_default().timed_out = true;
    }

    pub fn mark_cancelled(&self, endpoint: &str) {
        self.diagnostics.entry(endpoint.to_string()).or_default().cancelled = true;
    }

    pub fn endpoint_diagnostics(&self, endpoint: &str) -> Option<EndpointDiagnostics> {
        self.diagnostics.get(endpoint).map(|d| d.clone())
    }

    pub fn diagnostics(&self) -> BTreeMap<String, EndpointDiagnostics> {
        self.diagnostics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl Default for ScanContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundObserver for ScanContext {
    fn record(&self, endpoint: &str, sent: usize, completed: usize, failures: &[DispatchFailure]) {
        let mut entry = self.diagnostics.entry(endpoint.to_string()).or_default();
        entry.requests_sent += sent;
        entry.results_received += completed;
        for failure in failures {
            *entry.failures.entry(failure.as_str().to_string()).or_insert(0) += 1;
        }
    }

    fn round_timed_out(&self, endpoint: &str, requested: usize) {
        self.record(endpoint, requested, 0, &[]);
        self.mark_timed_out(endpoint);
    }
}
