//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for the terminology gateway:
//! - Login attempts by outcome
//! - Forced session refreshes triggered by rejected calls
//! - Resource calls by method and status
//! - Resource call latency

use prometheus::{Counter, CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

/// Status label recorded when a call failed before any response arrived
pub const TRANSPORT_FAILURE: &str = "transport_error";

/// Metrics collector for the terminology gateway
#[derive(Clone)]
pub struct GatewayMetrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Login handshakes by outcome (success / failure)
    pub logins_total: CounterVec,
    /// Session refreshes forced by an auth rejection
    pub forced_refreshes_total: Counter,
    /// Resource calls by method and final status
    pub requests_total: CounterVec,
    /// Resource call duration, retries included
    pub request_duration_seconds: HistogramVec,
}

impl GatewayMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let logins_total = CounterVec::new(
            Opts::new(
                "termgate_logins_total",
                "Login handshakes against the terminology server",
            ),
            &["outcome"],
        )?;

        let forced_refreshes_total = Counter::with_opts(Opts::new(
            "termgate_forced_refreshes_total",
            "Session refreshes forced by a rejected call",
        ))?;

        let requests_total = CounterVec::new(
            Opts::new(
                "termgate_requests_total",
                "Calls issued through the terminology gateway",
            ),
            &["method", "status"],
        )?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "termgate_request_duration_seconds",
                "Terminology gateway call duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["method"],
        )?;

        registry.register(Box::new(logins_total.clone()))?;
        registry.register(Box::new(forced_refreshes_total.clone()))?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            logins_total,
            forced_refreshes_total,
            requests_total,
            request_duration_seconds,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the outcome of a login handshake
    pub fn record_login(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.logins_total.with_label_values(&[outcome]).inc();
    }

    /// Record a forced session refresh
    pub fn record_forced_refresh(&self) {
        self.forced_refreshes_total.inc();
    }

    /// Record a completed gateway call
    ///
    /// `status` is the HTTP status code, or [`TRANSPORT_FAILURE`] when no
    /// response was received.
    pub fn record_request(&self, method: &str, status: &str, duration_secs: f64) {
        self.requests_total
            .with_label_values(&[method, status])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method])
            .observe(duration_secs);
    }
}
