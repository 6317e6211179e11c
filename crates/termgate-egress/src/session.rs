//! Process-wide session cache
//!
//! One session (a service-account identity) serves every downstream call.
//! Reads of a live session take a short read lock and never wait on the
//! network. Logins are serialised behind an async gate: every completed
//! login attempt bumps an attempt counter and records its outcome, and a
//! caller that queued on the gate while another login finished adopts that
//! outcome instead of logging in again.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use termgate_observability::GatewayMetrics;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthError, AuthMode, Authenticator, Credentials};

/// Default session lifetime: 24 hours from acquisition
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for expiry tests
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Authenticated session against the terminology server
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    expires_at: DateTime<Utc>,
    generation: u64,
}

impl Session {
    /// The no-op session used when authentication is disabled
    pub fn empty() -> Self {
        Self {
            token: String::new(),
            expires_at: DateTime::<Utc>::MAX_UTC,
            generation: 0,
        }
    }

    /// Cookie value to send with each call
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Monotonic counter of the login that produced this session
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }

    /// Live strictly before `expires_at`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &format_args!("<{} chars>", self.token.len()))
            .field("expires_at", &self.expires_at)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    session: Option<Session>,
    /// Generation of the most recently issued session
    generation: u64,
    /// Completed login attempts, successful or not
    attempts: u64,
    /// Failure of the latest attempt, cleared by the next success
    last_failure: Option<AuthError>,
}

/// Holds the current session and refreshes it on demand
pub struct SessionCache {
    mode: AuthMode,
    credentials: Credentials,
    authenticator: Arc<dyn Authenticator>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: RwLock<CacheState>,
    login_gate: AsyncMutex<()>,
    metrics: Option<Arc<GatewayMetrics>>,
}

impl SessionCache {
    /// Create a session cache
    ///
    /// # Arguments
    /// * `mode` - Auth endpoint, or disabled
    /// * `credentials` - Service-account credentials
    /// * `authenticator` - Performs the login handshake
    /// * `clock` - Time source for expiry checks
    /// * `ttl` - Lifetime granted to each new session
    pub fn new(
        mode: AuthMode,
        credentials: Credentials,
        authenticator: Arc<dyn Authenticator>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            mode,
            credentials,
            authenticator,
            clock,
            ttl,
            state: RwLock::new(CacheState::default()),
            login_gate: AsyncMutex::new(()),
            metrics: None,
        }
    }

    /// Record login outcomes and forced refreshes
    pub fn with_metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn mode(&self) -> &AuthMode {
        &self.mode
    }

    /// Get a live session, logging in if needed
    ///
    /// With `force_refresh` false a non-expired cached session is returned
    /// without any network call. Otherwise the current session is dropped
    /// and replaced through a single login shared by all concurrent callers.
    ///
    /// # Errors
    /// The `AuthError` of the login that was supposed to produce the session.
    pub async fn acquire(&self, force_refresh: bool) -> Result<Session, AuthError> {
        self.obtain(force_refresh, None).await
    }

    /// Replace a session the server rejected
    ///
    /// Adopts the cached session when it is newer than `rejected`, so a
    /// rejection that races another caller's refresh does not log in again.
    pub async fn refresh(&self, rejected: &Session) -> Result<Session, AuthError> {
        self.obtain(true, Some(rejected.generation())).await
    }

    async fn obtain(
        &self,
        force_refresh: bool,
        rejected_generation: Option<u64>,
    ) -> Result<Session, AuthError> {
        let endpoint = match &self.mode {
            AuthMode::Disabled => return Ok(Session::empty()),
            AuthMode::Endpoint(endpoint) => endpoint,
        };

        let observed_attempts = {
            let state = self.read_state();
            if let Some(session) = self.live_session(&state) {
                let usable = match rejected_generation {
                    Some(rejected) => session.generation() > rejected,
                    None => !force_refresh,
                };
                if usable {
                    return Ok(session);
                }
            }
            state.attempts
        };

        if force_refresh {
            warn!("Forcing session refresh");
            if let Some(metrics) = &self.metrics {
                metrics.record_forced_refresh();
            }
        }

        let _gate = self.login_gate.lock().await;

        {
            let state = self.read_state();
            if let Some(rejected) = rejected_generation {
                if let Some(session) = self
                    .live_session(&state)
                    .filter(|session| session.generation() > rejected)
                {
                    debug!(
                        generation = session.generation(),
                        "Adopting session newer than the rejected one"
                    );
                    return Ok(session);
                }
            }
            if state.attempts != observed_attempts {
                // A login finished while this caller was queued; adopt its outcome
                if let Some(err) = &state.last_failure {
                    debug!("Adopting failure of concurrent login");
                    return Err(err.clone());
                }
                if let Some(session) = self.live_session(&state) {
                    debug!(
                        generation = session.generation(),
                        "Adopting session from concurrent login"
                    );
                    return Ok(session);
                }
            }
        }

        self.login(endpoint).await
    }

    /// Cached session, if any, without network calls
    pub fn current(&self) -> Option<Session> {
        self.read_state().session.clone()
    }

    /// Generation of the most recently issued session (0 before the first login)
    pub fn generation(&self) -> u64 {
        self.read_state().generation
    }

    /// Drop the cached session; the next `acquire` logs in again
    pub fn invalidate(&self) {
        self.write_state().session = None;
        debug!("Session invalidated");
    }

    fn live_session(&self, state: &CacheState) -> Option<Session> {
        let now = self.clock.now();
        state
            .session
            .as_ref()
            .filter(|session| session.is_valid_at(now))
            .cloned()
    }

    /// Caller must hold the login gate
    async fn login(&self, endpoint: &str) -> Result<Session, AuthError> {
        self.invalidate();

        let outcome = self.authenticator.login(&self.credentials, endpoint).await;
        let acquired_at = self.clock.now();

        if let Some(metrics) = &self.metrics {
            metrics.record_login(outcome.is_ok());
        }

        let mut state = self.write_state();
        state.attempts += 1;

        match outcome {
            Ok(token) => {
                state.generation += 1;
                let session = Session {
                    token,
                    expires_at: acquired_at + self.ttl,
                    generation: state.generation,
                };
                state.session = Some(session.clone());
                state.last_failure = None;
                info!(
                    generation = session.generation(),
                    expires_at = %session.expires_at(),
                    "Terminology server session acquired"
                );
                Ok(session)
            }
            Err(err) => {
                error!("Terminology server login failed: {}", err);
                state.last_failure = Some(err.clone());
                Err(err)
            }
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("mode", &self.mode)
            .field("credentials", &self.credentials)
            .field("ttl", &self.ttl)
            .field("state", &*self.read_state())
            .finish()
    }
}
