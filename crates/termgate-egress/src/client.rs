//! Shared HTTP client utilities

use crate::{EgressError, Result, session::{Session, SessionCache}};
use hyper::ext::ReasonPhrase;
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds, applied to the login call and to every
    /// resource call (each attempt separately)
    pub timeout_secs: u64,

    /// Timeout in seconds for a file download, body streaming included;
    /// replaces `timeout_secs` for those calls
    pub download_timeout_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum number of idle connections per host
    pub pool_max_idle_per_host: usize,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            download_timeout_secs: 600,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 16,
            user_agent: format!("termgate/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Create a configured HTTP client with connection pooling
pub fn create_client(config: &HttpClientConfig) -> Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        // Expire idle connections before the terminology server closes them
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(&config.user_agent)
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|e| EgressError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Predicate deciding whether a response means the session is no longer accepted
pub fn is_session_rejected(status: StatusCode) -> bool {
    status == StatusCode::FORBIDDEN
}

/// Bounded retry policy for session rejections
///
/// Only a rejected session is retried, after forcing a fresh login. Any
/// other status goes back to the caller untouched.
#[derive(Debug, Clone, Copy)]
pub struct AuthRetryPolicy {
    /// Total attempts including the first; 2 allows a single retry
    pub max_attempts: u32,

    /// Whether a response status indicates an expired or rejected session
    pub session_rejected: fn(StatusCode) -> bool,
}

impl AuthRetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            session_rejected: is_session_rejected,
        }
    }

    fn should_refresh(&self, attempt: u32, status: StatusCode) -> bool {
        attempt < self.max_attempts && (self.session_rejected)(status)
    }
}

impl Default for AuthRetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Reason phrase of a response
///
/// HTTP/1 servers that send a non-standard phrase have it kept on the
/// response; otherwise this is the canonical phrase for the status.
pub fn reason_phrase(response: &Response) -> String {
    response
        .extensions()
        .get::<ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| response.status().canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Consume and drop a response so its connection is released to the pool
pub async fn release(response: Response) {
    if let Err(e) = response.bytes().await {
        debug!("Discarding unread response body failed: {}", e);
    }
}

/// Run `operation` with a session, refreshing it once if the server rejects it
///
/// The operation receives the session to attach and returns the raw
/// response. A rejected first response is released before the retry, and
/// the retry's response is returned whatever its status.
pub async fn with_auth_retry<F, Fut>(
    policy: &AuthRetryPolicy,
    sessions: &SessionCache,
    mut operation: F,
) -> Result<Response>
where
    F: FnMut(Session) -> Fut,
    Fut: Future<Output = Result<Response>>,
{
    let mut session = sessions.acquire(false).await?;
    let mut attempt = 1;

    loop {
        let response = operation(session.clone()).await?;
        let status = response.status();

        if !policy.should_refresh(attempt, status) {
            if attempt > 1 && (policy.session_rejected)(status) {
                warn!(
                    "Session still rejected after refresh ({}), returning response to caller",
                    status
                );
            }
            return Ok(response);
        }

        warn!(
            "Session rejected with {} (attempt {}/{}), refreshing",
            status, attempt, policy.max_attempts
        );
        release(response).await;
        session = sessions.refresh(&session).await?;
        attempt += 1;
    }
}
