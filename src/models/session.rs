use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// Authentication context captured by the login subsystem.
///
/// Maps are ordered so that the `Cookie` header and header attachment order
/// are stable across workers of the same round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Bearer/session token, sent as `Authorization` and `X-Session-Token`.
    #[serde(default)]
    pub session_token: Option<String>,
    /// Token lifted from the application URL, sent as `X-URL-Token`.
    #[serde(default)]
    pub url_token: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        !self.cookies.is_empty() || self.session_token.is_some() || self.headers.contains_key("Authorization")
    }

    /// Render the cookie jar as a single `Cookie` header value.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_is_sorted() {
        let mut session = Session::default();
        session.cookies.insert("sid".into(), "abc".into());
        session.cookies.insert("csrf".into(), "x1".into());
        assert_eq!(session.cookie_header().as_deref(), Some("csrf=x1; sid=abc"));
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_empty_session() {
        let session = Session::default();
        assert!(session.cookie_header().is_none());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_token_only_session_is_authenticated() {
        let session = Session { session_token: Some("tok".into()), ..Default::default() };
        assert!(session.is_authenticated());
    }
}
