use crate::models::Endpoint;
use super::EndpointPredicate;

/// URL fragments of endpoints that consume a single-use resource.
pub const SINGLE_USE_KEYWORDS: &[&str] = &["claim", "redeem", "transfer", "pay", "checkout", "apply"];

/// URL fragments of endpoints that handle money movement.
pub const PAYMENT_KEYWORDS: &[&str] = &[
    "payment",
    "checkout",
    "pay",
    "order",
    "cart",
    "transaction",
    "purchase",
    "invoice",
    "billing",
    "subscription",
    "wallet",
    "balance",
];

/// Case-insensitive substring match on the endpoint URL, optionally also
/// accepting endpoints that discovery already tagged as payment pages.
#[derive(Debug, Clone)]
pub struct KeywordPredicate {
    keywords: Vec<String>,
    accept_payment_tags: bool,
}

impl KeywordPredicate {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            accept_payment_tags: false,
        }
    }

    pub fn single_use() -> Self {
        Self::new(SINGLE_USE_KEYWORDS)
    }

    pub fn payment() -> Self {
        Self {
            accept_payment_tags: true,
            ..Self::new(PAYMENT_KEYWORDS)
        }
    }

    pub fn matches_url(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

impl EndpointPredicate for KeywordPredicate {
    fn matches(&self, endpoint: &Endpoint) -> bool {
        (self.accept_payment_tags && endpoint.is_payment_tagged()) || self.matches_url(&endpoint.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_use_keywords() {
        let p = KeywordPredicate::single_use();
        for url in ["https://x/api/claim", "https://x/voucher/REDEEM", "https://x/wallet/transfer", "https://x/promo/apply"] {
            assert!(p.matches(&Endpoint::new(url, "POST")), "{url}");
        }
        assert!(!p.matches(&Endpoint::new("https://x/api/users", "POST")));
    }

    #[test]
    fn test_payment_matches_tag_without_keyword() {
        let p = KeywordPredicate::payment();
        let ep = Endpoint::new("https://x/api/v2/x1", "POST").with_type("payment_page");
        assert!(p.matches(&ep));
    }

    #[test]
    fn test_single_use_ignores_tag() {
        let p = KeywordPredicate::single_use();
        let ep = Endpoint::new("https://x/api/v2/x1", "POST").with_type("payment_page");
        assert!(!p.matches(&ep));
    }

    #[test]
    fn test_payment_keyword_case_insensitive() {
        assert!(KeywordPredicate::payment().matches_url("https://x/Billing/Invoice"));
    }
}
