use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, USER_AGENT};
use serde_json::Value;
use crate::errors::PayraceError;
use crate::models::Session;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A fully specified request: method, URL, headers (credentials included) and body.
///
/// This is the unit a caller hands to the dispatcher, so a dry-run or
/// confirmation gate can inspect exactly what will be sent. Each dispatch
/// worker turns its own copy into a wire request with [`PreparedRequest::to_request`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    /// Applied in order; a later entry replaces an earlier one with the same name.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl PreparedRequest {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            url: url.to_string(),
            headers: vec![(USER_AGENT.as_str().to_string(), DEFAULT_USER_AGENT.to_string())],
            body: None,
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Serialize `payload` as the body and mark it as JSON.
    pub fn json(mut self, payload: &Value) -> Self {
        self.body = Some(payload.to_string());
        self.header(CONTENT_TYPE.as_str(), "application/json")
    }

    /// Attach the session's credentials: its headers, a single `Cookie`
    /// header, the session token as bearer and `X-Session-Token`, and the URL
    /// token as `X-URL-Token`.
    pub fn with_session(mut self, session: &Session) -> Self {
        if let Some(ua) = &session.user_agent {
            self = self.header(USER_AGENT.as_str(), ua);
        }
        for (name, value) in &session.headers {
            self = self.header(name, value);
        }
        if let Some(cookies) = session.cookie_header() {
            self = self.header(COOKIE.as_str(), &cookies);
        }
        if let Some(token) = session.session_token.as_deref().filter(|t| !t.is_empty()) {
            self = self
                .header("X-Session-Token", token)
                .header("Authorization", &format!("Bearer {}", token));
        }
        if let Some(token) = session.url_token.as_deref().filter(|t| !t.is_empty()) {
            self = self.header("X-URL-Token", token);
        }
        self
    }

    /// Last value set for `name`, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Build the wire request. Fails on a malformed method, URL or header.
    pub fn to_request(&self) -> Result<reqwest::Request, PayraceError> {
        let method = reqwest::Method::from_bytes(self.method.as_bytes())
            .map_err(|e| PayraceError::RequestBuild(format!("invalid method '{}': {}", self.method, e)))?;
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| PayraceError::InvalidTarget(format!("{}: {}", self.url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(PayraceError::InvalidTarget(format!("unsupported scheme in {}", self.url)));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| PayraceError::RequestBuild(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| PayraceError::RequestBuild(format!("invalid value for header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        let mut request = reqwest::Request::new(method, url);
        *request.headers_mut() = headers;
        if let Some(body) = &self.body {
            *request.body_mut() = Some(reqwest::Body::from(body.clone()));
        }
        Ok(request)
    }
}
