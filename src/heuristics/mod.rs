pub mod keywords;

use std::sync::Arc;
use crate::models::Endpoint;

pub use keywords::{KeywordPredicate, PAYMENT_KEYWORDS, SINGLE_USE_KEYWORDS};

/// Decides whether an endpoint belongs to a class (payment-adjacent,
/// single-use resource, ...). Injected into the classifier so its decision
/// logic can be tested independently of how accurate the heuristic is.
pub trait EndpointPredicate: Send + Sync {
    fn matches(&self, endpoint: &Endpoint) -> bool;
}

impl<F> EndpointPredicate for F
where
    F: Fn(&Endpoint) -> bool + Send + Sync,
{
    fn matches(&self, endpoint: &Endpoint) -> bool {
        self(endpoint)
    }
}

/// Predicates used to grade a race finding.
#[derive(Clone)]
pub struct Classification {
    /// Endpoints whose races move money; graded CRITICAL.
    pub payment: Arc<dyn EndpointPredicate>,
    /// Endpoints that consume a single-use resource (coupon, voucher, transfer).
    pub single_use: Arc<dyn EndpointPredicate>,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            payment: Arc::new(KeywordPredicate::payment()),
            single_use: Arc::new(KeywordPredicate::single_use()),
        }
    }
}

impl std::fmt::Debug for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classification").finish_non_exhaustive()
    }
}
