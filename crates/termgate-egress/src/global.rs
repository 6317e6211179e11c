//! Process-wide gateway instance
//!
//! The session cache is meant to be shared by every caller in the process,
//! so the gateway that owns it is installed once at startup and looked up
//! from anywhere.

use once_cell::sync::Lazy;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

use crate::gateway::{TerminologyConfig, TerminologyGateway};

static GATEWAY: Lazy<RwLock<Option<Arc<TerminologyGateway>>>> = Lazy::new(|| RwLock::new(None));

/// Build the gateway from configuration and install it
///
/// A configuration error leaves a disabled gateway installed. Calling this
/// again replaces the previous instance and its session cache.
pub fn init(config: TerminologyConfig) -> Arc<TerminologyGateway> {
    install(TerminologyGateway::from_config(config))
}

/// Install an already-built gateway
pub fn install(gateway: TerminologyGateway) -> Arc<TerminologyGateway> {
    let gateway = Arc::new(gateway);
    let mut slot = GATEWAY.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        warn!("Replacing the installed terminology gateway");
    }
    *slot = Some(gateway.clone());
    gateway
}

/// The installed gateway, or a disabled one if none was installed
pub fn get() -> Arc<TerminologyGateway> {
    GATEWAY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .unwrap_or_else(|| Arc::new(TerminologyGateway::disabled("gateway not initialised")))
}

/// Remove the installed gateway
pub fn reset() {
    GATEWAY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
}
