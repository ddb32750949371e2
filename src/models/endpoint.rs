use serde::{Deserialize, Serialize};

/// Endpoint types assigned by discovery to pages that handle money movement.
const PAYMENT_TYPES: &[&str] = &["payment_page", "payment_related", "payment", "checkout"];

/// A target descriptor handed to the tests by the discovery subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Semantic tag such as "payment_page" or "common_path".
    #[serde(rename = "type", default)]
    pub endpoint_type: String,
    /// Where the endpoint came from (e.g. "crawl", "wayback", "wordlist", "config").
    #[serde(default)]
    pub source: String,
}

fn default_method() -> String {
    "POST".to_string()
}

impl Endpoint {
    pub fn new(url: &str, method: &str) -> Self {
        Self {
            url: url.to_string(),
            method: method.to_uppercase(),
            endpoint_type: String::new(),
            source: String::new(),
        }
    }

    pub fn with_type(mut self, endpoint_type: &str) -> Self {
        self.endpoint_type = endpoint_type.to_string();
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    /// True when discovery already tagged this endpoint as a payment page.
    pub fn is_payment_tagged(&self) -> bool {
        PAYMENT_TYPES.contains(&self.endpoint_type.as_str())
    }
}
