use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use crate::errors::PayraceError;
use crate::utils::truncate_body;
use super::request::PreparedRequest;

/// Status and (possibly truncated) body of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: &str) -> Self {
        Self { status, body: body.to_string() }
    }

    pub fn is_success(&self) -> bool {
        crate::models::is_success_status(self.status)
    }
}

/// Executes wire requests. The race engine only needs this one capability,
/// which keeps the barrier and the probes testable against scripted servers.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: reqwest::Request) -> Result<HttpReply, PayraceError>;

    /// Build and execute a prepared request.
    async fn send(&self, request: &PreparedRequest) -> Result<HttpReply, PayraceError> {
        let wire = request.to_request()?;
        self.execute(wire).await
    }
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    /// Idle connections kept per host; at least the round's concurrency so
    /// warm-up connections survive until the release.
    pub pool_size: usize,
    pub body_limit: usize,
    pub accept_invalid_certs: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_size: 100,
            body_limit: 4096,
            accept_invalid_certs: true,
        }
    }
}

/// reqwest-backed transport: per-request timeout, redirects never followed,
/// pooled keep-alive connections.
pub struct ReqwestTransport {
    client: Client,
    body_limit: usize,
}

impl ReqwestTransport {
    pub fn new(options: &TransportOptions) -> Result<Self, PayraceError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(options.pool_size)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|e| PayraceError::Config(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            body_limit: options.body_limit,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: reqwest::Request) -> Result<HttpReply, PayraceError> {
        let mut response = self.client.execute(request).await?;
        let status = response.status().as_u16();

        // Read only as much of the body as the preview needs.
        let mut buf: Vec<u8> = Vec::new();
        while buf.len() < self.body_limit {
            match response.chunk().await {
                Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, status, "Response body read interrupted");
                    break;
                }
            }
        }
        buf.truncate(self.body_limit);
        let body = truncate_body(&String::from_utf8_lossy(&buf), self.body_limit);

        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_options_default() {
        let opts = TransportOptions::default();
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert_eq!(opts.body_limit, 4096);
        assert!(opts.pool_size >= 10);
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new(&TransportOptions::default()).is_ok());
    }

    #[test]
    fn test_reply_success() {
        assert!(HttpReply::new(201, "").is_success());
        assert!(!HttpReply::new(302, "").is_success());
    }
}
