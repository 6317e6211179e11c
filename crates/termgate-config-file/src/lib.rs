//! File-based configuration for the terminology gateway
//!
//! Settings are read from a YAML or TOML file and then overridden by
//! `TERMGATE_*` environment variables. They are read once at startup and
//! handed to the gateway as an owned copy.
//!
//! # Example
//! ```no_run
//! # use termgate_config_file::GatewayConfig;
//! # fn example() -> termgate_core::Result<()> {
//! let config = GatewayConfig::load(Some(std::path::Path::new("~/.termgate/config.yaml")))?;
//! config.validate()?;
//! let gateway = termgate_egress::TerminologyGateway::from_config(config.to_terminology_config());
//! # Ok(())
//! # }
//! ```

mod config;

pub use config::{
    AuthSettings, GatewayConfig, HttpSettings, LanguageSettings, LoggingSettings, RetrySettings,
};
