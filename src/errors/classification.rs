use serde::{Deserialize, Serialize};
use super::types::PayraceError;

/// Why a dispatch attempt produced no result. Counted per endpoint so that
/// "nothing found" can be told apart from "the network prevented testing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchFailure {
    Build,
    Connect,
    Timeout,
    Body,
    Other,
}

impl DispatchFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Body => "body",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub dispatch: DispatchFailure,
}

impl PayraceError {
    /// Classify this error for scan diagnostics.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            PayraceError::RequestBuild(_) | PayraceError::InvalidTarget(_) => ErrorClassification {
                error_type: "RequestBuildError",
                dispatch: DispatchFailure::Build,
            },
            PayraceError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                dispatch: DispatchFailure::Connect,
            },
            PayraceError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                dispatch: DispatchFailure::Timeout,
            },
            PayraceError::Body(_) => ErrorClassification {
                error_type: "BodyError",
                dispatch: DispatchFailure::Body,
            },

            PayraceError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                dispatch: DispatchFailure::Other,
            },
            PayraceError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                dispatch: DispatchFailure::Other,
            },

            PayraceError::Io(_) => ErrorClassification {
                error_type: "IoError",
                dispatch: DispatchFailure::Other,
            },
            PayraceError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                dispatch: DispatchFailure::Build,
            },
        }
    }
}
