//! Termgate Observability
//!
//! This crate provides observability features:
//! - Structured logging initialisation
//! - Metrics collection (Prometheus) for the terminology gateway

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, parse_level};
pub use metrics::GatewayMetrics;
