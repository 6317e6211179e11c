//! End-to-end integration tests for Termgate
//!
//! These tests wire configuration, the gateway and the search services
//! together against a mocked terminology server.
