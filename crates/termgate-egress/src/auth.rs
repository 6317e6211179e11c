//! Login handshake against the terminology server's auth endpoint
//!
//! The auth endpoint answers a credentials POST with one or more
//! `Set-Cookie` headers. Their `name=value` pairs, concatenated in the order
//! the server sent them, form the session token that later calls send back
//! verbatim in a `Cookie` header.

use crate::client::reason_phrase;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, SET_COOKIE};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Sentinel auth endpoint that turns authentication off
pub const AUTH_DISABLED: &str = "none";

/// Path appended to the auth endpoint for the login handshake
pub const AUTHENTICATE_PATH: &str = "authenticate";

/// Authentication errors
///
/// Cloneable so that the outcome of a single login can be handed to every
/// caller that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Login rejected by {endpoint}: {status} {reason}")]
    Rejected {
        endpoint: String,
        status: u16,
        reason: String,
    },

    #[error("Auth endpoint {endpoint} unreachable: {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("Invalid credentials configuration: {0}")]
    InvalidCredentials(String),
}

/// Whether calls authenticate, and against which endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    Disabled,
    /// Auth endpoint, always ending in `/`
    Endpoint(String),
}

impl AuthMode {
    /// Interpret a configured auth endpoint; `none` disables authentication
    pub fn from_endpoint(endpoint: &str) -> Self {
        let endpoint = endpoint.trim();
        if endpoint.eq_ignore_ascii_case(AUTH_DISABLED) {
            AuthMode::Disabled
        } else if endpoint.ends_with('/') {
            AuthMode::Endpoint(endpoint.to_string())
        } else {
            AuthMode::Endpoint(format!("{}/", endpoint))
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, AuthMode::Disabled)
    }
}

/// Service-account credentials used for every downstream call
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    login: &'a str,
    password: &'a str,
}

/// Performs the login handshake and returns the session token
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Log in with the given credentials
    ///
    /// # Arguments
    /// * `credentials` - Service-account username and password
    /// * `auth_endpoint` - Auth endpoint base, ending in `/`
    ///
    /// # Returns
    /// The session token to send back in a `Cookie` header
    ///
    /// # Errors
    /// - `AuthError::Rejected` for any non-2xx answer
    /// - `AuthError::Unreachable` if no answer was received
    /// - `AuthError::InvalidCredentials` if the credentials cannot be sent
    async fn login(&self, credentials: &Credentials, auth_endpoint: &str)
    -> Result<String, AuthError>;
}

/// Authenticator that POSTs JSON credentials to `{auth_endpoint}authenticate`
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    client: Client,
}

impl HttpAuthenticator {
    /// Create an authenticator sharing the gateway's HTTP client (and its timeouts)
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn login(
        &self,
        credentials: &Credentials,
        auth_endpoint: &str,
    ) -> Result<String, AuthError> {
        if credentials.username.trim().is_empty() {
            return Err(AuthError::InvalidCredentials(
                "username is empty".to_string(),
            ));
        }

        let url = format!("{}{}", auth_endpoint, AUTHENTICATE_PATH);
        debug!("Logging in to {} as {}", url, credentials.username);

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&LoginBody {
                login: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Auth endpoint {} unreachable: {}", url, e);
                AuthError::Unreachable {
                    endpoint: url.clone(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        let reason = reason_phrase(&response);
        let token = session_token_from_headers(response.headers());

        // Drain the body so the connection goes back to the pool
        let _ = response.bytes().await;

        if !status.is_success() {
            error!("Login to {} rejected: {} {}", url, status.as_u16(), reason);
            return Err(AuthError::Rejected {
                endpoint: url,
                status: status.as_u16(),
                reason,
            });
        }

        if token.is_empty() {
            warn!("Login to {} succeeded but returned no session cookies", url);
        } else {
            debug!("Login to {} succeeded (token length: {} chars)", url, token.len());
        }

        Ok(token)
    }
}

/// Concatenate the `name=value` part of every `Set-Cookie` header as `name=value;`
///
/// Header order is preserved, so the same response always yields the same
/// bytes. Headers without a `name=value` pair are skipped.
pub fn session_token_from_headers(headers: &HeaderMap) -> String {
    let mut token = String::new();

    for value in headers.get_all(SET_COOKIE) {
        let Ok(value) = value.to_str() else {
            warn!("Skipping non-UTF-8 Set-Cookie header");
            continue;
        };

        let pair = value.split(';').next().unwrap_or_default();
        let Some((name, cookie_value)) = pair.split_once('=') else {
            continue;
        };

        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        token.push_str(name);
        token.push('=');
        token.push_str(cookie_value.trim());
        token.push(';');
    }

    token
}
