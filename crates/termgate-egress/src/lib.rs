//! Termgate Egress
//!
//! This crate provides the gateway to the remote terminology server:
//! - Login handshake and session-cookie extraction
//! - Process-wide session cache with single-flight refresh
//! - Retrying HTTP gateway (one forced refresh on an auth rejection)

pub mod auth;
pub mod client;
pub mod gateway;
pub mod global;
pub mod language;
pub mod session;

pub use auth::{AuthError, AuthMode, Authenticator, Credentials, HttpAuthenticator};
pub use client::{AuthRetryPolicy, HttpClientConfig};
pub use gateway::{
    ByteStream, DownloadResponse, GatewayBuilder, GatewayResponse, TerminologyConfig,
    TerminologyGateway,
};
pub use reqwest::{Method, StatusCode, Url};
pub use session::{Clock, ManualClock, Session, SessionCache, SystemClock};

use thiserror::Error;

/// Egress errors
#[derive(Debug, Error)]
pub enum EgressError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("Terminology server returned {status} for {url}: {reason}")]
    Status {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("Terminology gateway is disabled: {0}")]
    Disabled(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EgressError {
    /// Classify a reqwest failure for the given URL
    pub(crate) fn from_reqwest(url: &str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EgressError::Timeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            EgressError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EgressError>;

impl From<EgressError> for termgate_core::Error {
    fn from(err: EgressError) -> Self {
        match err {
            EgressError::Disabled(reason) | EgressError::Config(reason) => {
                termgate_core::Error::Configuration(reason)
            }
            other => termgate_core::Error::Gateway(other.to_string()),
        }
    }
}
