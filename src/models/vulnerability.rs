use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity level for a finding, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Returns a numeric rank where lower values indicate higher severity.
    /// Critical = 0, High = 1, Medium = 2, Low = 3.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How certain the classifier is that the finding is real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Type tag of a finding. Serialized as the human-readable label reporters group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FindingKind {
    #[serde(rename = "Race Condition")]
    RaceCondition,
    #[serde(rename = "Multi-Endpoint Race Condition")]
    MultiEndpointRace,
    #[serde(rename = "Idempotency Key Collision")]
    IdempotencyKeyCollision,
    #[serde(rename = "Idempotency Key Expiry")]
    IdempotencyKeyExpiry,
    #[serde(rename = "Idempotency Key Missing")]
    IdempotencyKeyMissing,
    #[serde(rename = "Idempotency Key Case Sensitivity")]
    IdempotencyCaseSensitivity,
    #[serde(rename = "Idempotency Race Condition")]
    IdempotencyRaceCondition,
    #[serde(rename = "WebSocket Race Condition")]
    WebSocketRaceCondition,
    #[serde(rename = "WebSocket Replay Attack")]
    WebSocketReplay,
    #[serde(rename = "WebSocket Amount Manipulation")]
    WebSocketAmountManipulation,
    #[serde(rename = "WebSocket Security")]
    WebSocketSecurity,
    #[serde(rename = "WebSocket Authentication")]
    WebSocketAuthentication,
    #[serde(rename = "WebSocket Message Size")]
    WebSocketMessageSize,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RaceCondition => "Race Condition",
            Self::MultiEndpointRace => "Multi-Endpoint Race Condition",
            Self::IdempotencyKeyCollision => "Idempotency Key Collision",
            Self::IdempotencyKeyExpiry => "Idempotency Key Expiry",
            Self::IdempotencyKeyMissing => "Idempotency Key Missing",
            Self::IdempotencyCaseSensitivity => "Idempotency Key Case Sensitivity",
            Self::IdempotencyRaceCondition => "Idempotency Race Condition",
            Self::WebSocketRaceCondition => "WebSocket Race Condition",
            Self::WebSocketReplay => "WebSocket Replay Attack",
            Self::WebSocketAmountManipulation => "WebSocket Amount Manipulation",
            Self::WebSocketSecurity => "WebSocket Security",
            Self::WebSocketAuthentication => "WebSocket Authentication",
            Self::WebSocketMessageSize => "WebSocket Message Size",
        }
    }
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding produced by one of the race, idempotency or WebSocket tests.
///
/// Test functions leave `id` and `discovered_at` empty so that their output is a
/// pure function of the observed responses; the scan context stamps both when
/// the finding is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub endpoint: String,
    pub method: String,
    /// Reproducibility evidence: request counts, keys, timing and data-quality notes.
    pub proof: String,
    pub cwe: String,
    pub cvss_score: f64,
    pub cvss_vector: String,
    pub confidence: Confidence,
    pub remediation: String,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<DateTime<Utc>>,
}

impl Vulnerability {
    /// Start a finding with the fields every test must fill in.
    pub fn new(kind: FindingKind, severity: Severity, endpoint: &str, method: &str) -> Self {
        Self {
            id: None,
            kind,
            severity,
            title: String::new(),
            description: String::new(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            proof: String::new(),
            cwe: String::new(),
            cvss_score: 0.0,
            cvss_vector: String::new(),
            confidence: Confidence::Medium,
            remediation: String::new(),
            references: Vec::new(),
            discovered_at: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn proof(mut self, proof: impl Into<String>) -> Self {
        self.proof = proof.into();
        self
    }

    pub fn cwe(mut self, cwe: &str) -> Self {
        self.cwe = cwe.to_string();
        self
    }

    pub fn cvss(mut self, score: f64, vector: &str) -> Self {
        self.cvss_score = score;
        self.cvss_vector = vector.to_string();
        self
    }

    pub fn confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = remediation.into();
        self
    }

    pub fn references(mut self, references: &[&str]) -> Self {
        self.references = references.iter().map(|r| r.to_string()).collect();
        self
    }
}
