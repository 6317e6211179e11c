//! Retrying HTTP gateway to the terminology server
//!
//! Every call carries the cached session cookie and an `Accept-Language`
//! preference. A 403 on the first attempt forces a fresh login and the call
//! is repeated once; whatever the second attempt returns goes back to the
//! caller. Any other status is returned as-is for the caller to interpret.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, HeaderMap};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use termgate_observability::GatewayMetrics;
use termgate_observability::metrics::TRANSPORT_FAILURE;
use tracing::{debug, error, info, instrument};

use crate::auth::{AuthMode, Authenticator, Credentials, HttpAuthenticator};
use crate::client::{
    AuthRetryPolicy, HttpClientConfig, create_client, reason_phrase, with_auth_retry,
};
use crate::language::{DEFAULT_ACCEPT_LANGUAGE, accept_language};
use crate::session::{Clock, DEFAULT_SESSION_TTL_SECS, SessionCache, SystemClock};
use crate::{EgressError, Result};

/// Content negotiated for structured calls
pub const JSON_CONTENT: &str = "application/json";

/// Content negotiated for file downloads
pub const DOWNLOAD_CONTENT: &str = "application/zip, application/octet-stream";

/// Terminology gateway configuration
#[derive(Debug, Clone)]
pub struct TerminologyConfig {
    /// Base URL that relative call paths are joined to
    pub base_url: String,

    /// Auth endpoint base; `none` disables authentication
    pub auth_endpoint: String,

    /// Service-account credentials
    pub credentials: Credentials,

    /// Lifetime granted to each session, in seconds
    pub session_ttl_secs: u64,

    /// `Accept-Language` used when a caller supplies none
    pub accept_language: String,

    /// HTTP client configuration
    pub client_config: HttpClientConfig,

    /// Session-rejection retry policy
    pub retry: AuthRetryPolicy,
}

impl TerminologyConfig {
    pub fn new(base_url: impl Into<String>, auth_endpoint: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_endpoint: auth_endpoint.into(),
            credentials: Credentials::default(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            client_config: HttpClientConfig::default(),
            retry: AuthRetryPolicy::default(),
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }

    pub fn with_accept_language(mut self, accept_language: impl Into<String>) -> Self {
        self.accept_language = accept_language.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.client_config.timeout_secs = timeout_secs;
        self
    }

    pub fn with_download_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.client_config.download_timeout_secs = timeout_secs;
        self
    }

    /// Check that everything an enabled gateway needs is present
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(EgressError::Config("base_url is required".to_string()));
        }
        match Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(EgressError::Config(format!(
                    "base_url must be http or https, got '{}'",
                    url.scheme()
                )));
            }
            Err(e) => {
                return Err(EgressError::Config(format!(
                    "base_url '{}' is not a valid URL: {}",
                    self.base_url, e
                )));
            }
        }

        if self.auth_endpoint.trim().is_empty() {
            return Err(EgressError::Config(
                "auth endpoint is required (use 'none' to disable authentication)".to_string(),
            ));
        }
        if let AuthMode::Endpoint(endpoint) = AuthMode::from_endpoint(&self.auth_endpoint) {
            if Url::parse(&endpoint).is_err() {
                return Err(EgressError::Config(format!(
                    "auth endpoint '{}' is not a valid URL",
                    endpoint
                )));
            }
            if self.credentials.username.trim().is_empty() {
                return Err(EgressError::Config(
                    "auth username is required when authentication is enabled".to_string(),
                ));
            }
        }

        if self.session_ttl_secs == 0 {
            return Err(EgressError::Config(
                "session_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.client_config.download_timeout_secs == 0 {
            return Err(EgressError::Config(
                "download_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(1..=2).contains(&self.retry.max_attempts) {
            return Err(EgressError::Config(format!(
                "retry max_attempts must be 1 or 2, got {}",
                self.retry.max_attempts
            )));
        }

        Ok(())
    }
}

/// Buffered response of a structured call
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    /// Reason phrase as sent by the server
    pub reason: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Final URL of the call
    pub url: String,
}

impl GatewayResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the JSON body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            EgressError::Parse(format!("Invalid JSON from {}: {}", self.url, e))
        })
    }

    /// Turn a non-2xx response into `EgressError::Status`
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(status_error(&self.url, self.status, self.reason))
        }
    }
}

/// Streamed download payload
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Response of a file-download call; the body is streamed
pub struct DownloadResponse {
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderMap,
    pub url: String,
    stream: ByteStream,
}

impl DownloadResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Turn a non-2xx download into `EgressError::Status`, dropping the body
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(status_error(&self.url, self.status, self.reason))
        }
    }

    pub fn into_stream(self) -> ByteStream {
        self.stream
    }
}

impl fmt::Debug for DownloadResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

fn status_error(url: &str, status: StatusCode, reason: String) -> EgressError {
    EgressError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        reason,
    }
}

/// Gateway to the remote terminology server
pub struct TerminologyGateway {
    state: GatewayState,
}

enum GatewayState {
    Ready(Box<ReadyGateway>),
    /// Configuration failed at startup; every call fails fast
    Disabled(String),
}

struct ReadyGateway {
    base_url: String,
    accept_language: String,
    timeout_secs: u64,
    download_timeout_secs: u64,
    client: Client,
    sessions: Arc<SessionCache>,
    retry: AuthRetryPolicy,
    metrics: Option<Arc<GatewayMetrics>>,
}

/// Builder for [`TerminologyGateway`] with replaceable collaborators
pub struct GatewayBuilder {
    config: TerminologyConfig,
    authenticator: Option<Arc<dyn Authenticator>>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<Arc<GatewayMetrics>>,
}

impl GatewayBuilder {
    /// Use a custom authenticator instead of the HTTP login handshake
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and build the gateway
    pub fn build(self) -> Result<TerminologyGateway> {
        let config = self.config;
        config.validate()?;

        let client = create_client(&config.client_config)?;
        let authenticator = self
            .authenticator
            .unwrap_or_else(|| Arc::new(HttpAuthenticator::new(client.clone())));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let mode = AuthMode::from_endpoint(&config.auth_endpoint);

        let ttl_secs = i64::try_from(config.session_ttl_secs).map_err(|_| {
            EgressError::Config(format!(
                "session_ttl_secs {} is out of range",
                config.session_ttl_secs
            ))
        })?;
        let mut sessions = SessionCache::new(
            mode.clone(),
            config.credentials,
            authenticator,
            clock,
            chrono::Duration::seconds(ttl_secs),
        );
        if let Some(metrics) = &self.metrics {
            sessions = sessions.with_metrics(metrics.clone());
        }

        info!(
            base_url = %config.base_url,
            auth_disabled = mode.is_disabled(),
            "Terminology gateway ready"
        );

        Ok(TerminologyGateway {
            state: GatewayState::Ready(Box::new(ReadyGateway {
                base_url: config.base_url,
                accept_language: config.accept_language,
                timeout_secs: config.client_config.timeout_secs,
                download_timeout_secs: config.client_config.download_timeout_secs,
                client,
                sessions: Arc::new(sessions),
                retry: config.retry,
                metrics: self.metrics,
            })),
        })
    }

    /// Build the gateway, or a disabled gateway if the configuration is unusable
    pub fn build_or_disabled(self) -> TerminologyGateway {
        match self.build() {
            Ok(gateway) => gateway,
            Err(e) => {
                error!("Terminology gateway disabled: {}", e);
                TerminologyGateway::disabled(e.to_string())
            }
        }
    }
}

impl TerminologyGateway {
    /// Create a gateway using the HTTP login handshake and the system clock
    pub fn new(config: TerminologyConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: TerminologyConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            authenticator: None,
            clock: None,
            metrics: None,
        }
    }

    /// Create a gateway; on configuration failure the error is logged and a
    /// disabled gateway is returned instead of failing the process
    pub fn from_config(config: TerminologyConfig) -> Self {
        Self::builder(config).build_or_disabled()
    }

    /// A gateway that fails every call with `EgressError::Disabled`
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            state: GatewayState::Disabled(reason.into()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, GatewayState::Ready(_))
    }

    /// The session cache behind this gateway
    pub fn sessions(&self) -> Option<&Arc<SessionCache>> {
        match &self.state {
            GatewayState::Ready(gateway) => Some(&gateway.sessions),
            GatewayState::Disabled(_) => None,
        }
    }

    /// Absolute URL a call to `path` would be sent to
    pub fn url_for(&self, path: &str) -> Result<Url> {
        let resolved = self.ready()?.resolve_url(path);
        Url::parse(&resolved)
            .map_err(|e| EgressError::Config(format!("Invalid URL '{}': {}", resolved, e)))
    }

    fn ready(&self) -> Result<&ReadyGateway> {
        match &self.state {
            GatewayState::Ready(gateway) => Ok(gateway),
            GatewayState::Disabled(reason) => Err(EgressError::Disabled(reason.clone())),
        }
    }

    /// Issue a structured call
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - Path relative to the base URL, or an absolute URL
    /// * `body` - Optional JSON body
    /// * `language` - `Accept-Language` override
    ///
    /// # Returns
    /// The response of the last attempt, whatever its status
    ///
    /// # Errors
    /// - `EgressError::Disabled` if the gateway failed configuration
    /// - `EgressError::Auth` if no session could be acquired
    /// - `EgressError::Transport` / `EgressError::Timeout` on network failure
    #[instrument(skip(self, method, body, language), fields(method = %method))]
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        language: Option<&str>,
    ) -> Result<GatewayResponse> {
        let gateway = self.ready()?;
        let url = gateway.resolve_url(path);
        let started = Instant::now();

        let response = match gateway
            .send(&method, &url, body, language, JSON_CONTENT, gateway.timeout_secs)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                gateway.record(&method, None, started);
                return Err(e);
            }
        };

        let status = response.status();
        let reason = reason_phrase(&response);
        let headers = response.headers().clone();
        let final_url = response.url().to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| EgressError::from_reqwest(&url, gateway.timeout_secs, e))?;

        gateway.record(&method, Some(status), started);
        debug!("{} {} -> {} ({} bytes)", method, final_url, status, body.len());

        Ok(GatewayResponse {
            status,
            reason,
            headers,
            body,
            url: final_url,
        })
    }

    pub async fn get(&self, path: &str, language: Option<&str>) -> Result<GatewayResponse> {
        self.call(Method::GET, path, None, language).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        language: Option<&str>,
    ) -> Result<GatewayResponse> {
        self.call(Method::POST, path, Some(body), language).await
    }

    pub async fn put(
        &self,
        path: &str,
        body: &serde_json::Value,
        language: Option<&str>,
    ) -> Result<GatewayResponse> {
        self.call(Method::PUT, path, Some(body), language).await
    }

    pub async fn delete(&self, path: &str, language: Option<&str>) -> Result<GatewayResponse> {
        self.call(Method::DELETE, path, None, language).await
    }

    /// GET a JSON resource, failing on non-2xx
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        language: Option<&str>,
    ) -> Result<T> {
        self.get(path, language).await?.error_for_status()?.json()
    }

    /// POST a JSON body and decode the JSON answer, failing on non-2xx
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        language: Option<&str>,
    ) -> Result<T> {
        let body = serde_json::to_value(body)
            .map_err(|e| EgressError::Parse(format!("Failed to encode request body: {}", e)))?;
        self.post(path, &body, language)
            .await?
            .error_for_status()?
            .json()
    }

    /// Download a file as a byte stream
    ///
    /// Negotiates a zip/binary payload and follows the same single retry on
    /// a rejected session as structured calls.
    #[instrument(skip(self, language))]
    pub async fn download(&self, path: &str, language: Option<&str>) -> Result<DownloadResponse> {
        let gateway = self.ready()?;
        let url = gateway.resolve_url(path);
        let started = Instant::now();

        let response: Response = match gateway
            .send(
                &Method::GET,
                &url,
                None,
                language,
                DOWNLOAD_CONTENT,
                gateway.download_timeout_secs,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                gateway.record(&Method::GET, None, started);
                return Err(e);
            }
        };

        let status = response.status();
        gateway.record(&Method::GET, Some(status), started);

        let reason = reason_phrase(&response);
        let headers = response.headers().clone();
        let final_url = response.url().to_string();
        let timeout_secs = gateway.download_timeout_secs;
        let stream_url = final_url.clone();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| EgressError::from_reqwest(&stream_url, timeout_secs, e))
        });

        Ok(DownloadResponse {
            status,
            reason,
            headers,
            url: final_url,
            stream: Box::pin(stream),
        })
    }
}

impl ReadyGateway {
    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        }
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        body: Option<&serde_json::Value>,
        language: Option<&str>,
        accept: &'static str,
        timeout_secs: u64,
    ) -> Result<Response> {
        let language = accept_language(language, &self.accept_language);

        with_auth_retry(&self.retry, &self.sessions, move |session| {
            let mut request = self
                .client
                .request(method.clone(), url)
                .timeout(Duration::from_secs(timeout_secs))
                .header(ACCEPT, accept)
                .header(ACCEPT_LANGUAGE, language);
            if !session.is_empty() {
                request = request.header(COOKIE, session.token());
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            async move {
                request
                    .send()
                    .await
                    .map_err(|e| EgressError::from_reqwest(url, timeout_secs, e))
            }
        })
        .await
    }

    fn record(&self, method: &Method, status: Option<StatusCode>, started: Instant) {
        if let Some(metrics) = &self.metrics {
            let status = status.map(|s| s.as_u16().to_string());
            metrics.record_request(
                method.as_str(),
                status.as_deref().unwrap_or(TRANSPORT_FAILURE),
                started.elapsed().as_secs_f64(),
            );
        }
    }
}

impl fmt::Debug for TerminologyGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            GatewayState::Ready(gateway) => f
                .debug_struct("TerminologyGateway")
                .field("base_url", &gateway.base_url)
                .field("auth", gateway.sessions.mode())
                .finish(),
            GatewayState::Disabled(reason) => f
                .debug_struct("TerminologyGateway")
                .field("disabled", reason)
                .finish(),
        }
    }
}
