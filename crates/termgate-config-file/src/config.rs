//! Gateway configuration loaded from YAML or TOML

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use termgate_core::{Error, Result};
use termgate_egress::auth::AUTH_DISABLED;
use termgate_egress::language::DEFAULT_ACCEPT_LANGUAGE;
use termgate_egress::session::DEFAULT_SESSION_TTL_SECS;
use termgate_egress::{AuthRetryPolicy, HttpClientConfig, TerminologyConfig};
use tracing::{debug, error};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub language: LanguageSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Auth endpoint base, or `none` to disable authentication
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub username: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("session_ttl_secs", &self.session_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageSettings {
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Limit for a whole file download, body included
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per call; 2 allows the single forced-refresh retry
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth: AuthSettings::default(),
            language: LanguageSettings::default(),
            http: HttpSettings::default(),
            retry: RetrySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            username: String::new(),
            password: String::new(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self {
            accept_language: default_accept_language(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl GatewayConfig {
    /// Read a configuration file; `.toml` files are TOML, anything else YAML
    ///
    /// # Errors
    /// - `Error::Io` if the file can't be read
    /// - `Error::Configuration` if the file can't be parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_home(path.as_ref())?;
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            error!("Failed to read config file {:?}: {}", path, e);
            Error::Io(e)
        })?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents).map_err(|e| {
                error!("Failed to parse TOML config: {}", e);
                Error::Configuration(format!("Invalid TOML in {}: {}", path.display(), e))
            })?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents).map_err(|e| {
                error!("Failed to parse YAML config: {}", e);
                Error::Configuration(format!("Invalid YAML in {}: {}", path.display(), e))
            })?
        };

        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.merge_env();
        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("TERMGATE_BASE_URL") {
            self.base_url = val;
        }

        // Auth settings
        if let Ok(val) = std::env::var("TERMGATE_AUTH_URL") {
            self.auth.endpoint = val;
        }

        if let Ok(val) = std::env::var("TERMGATE_AUTH_USER") {
            self.auth.username = val;
        }

        if let Ok(val) = std::env::var("TERMGATE_AUTH_PASSWORD") {
            self.auth.password = val;
        }

        if let Ok(val) = std::env::var("TERMGATE_ACCEPT_LANGUAGE") {
            self.language.accept_language = val;
        }

        if let Ok(val) = std::env::var("TERMGATE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => self.http.timeout_secs = secs,
                // Logging is not initialised yet at this point
                Err(_) => eprintln!("Warning: Invalid TERMGATE_TIMEOUT_SECS '{}', ignoring", val),
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("TERMGATE_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("TERMGATE_LOG_JSON") {
            match val.parse::<bool>() {
                Ok(json) => self.logging.json = json,
                Err(_) => eprintln!("Warning: Invalid TERMGATE_LOG_JSON '{}', ignoring", val),
            }
        }
    }

    pub fn auth_disabled(&self) -> bool {
        self.auth.endpoint.trim().eq_ignore_ascii_case(AUTH_DISABLED)
    }

    /// Check the settings an enabled gateway needs
    ///
    /// # Errors
    /// `Error::Configuration` naming the first missing or invalid key
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Configuration("base_url is required".to_string()));
        }
        if self.auth.endpoint.trim().is_empty() {
            return Err(Error::Configuration(
                "auth.endpoint is required (use 'none' to disable authentication)".to_string(),
            ));
        }
        if !self.auth_disabled() && self.auth.username.trim().is_empty() {
            return Err(Error::Configuration(
                "auth.username is required when authentication is enabled".to_string(),
            ));
        }
        if self.auth.session_ttl_secs == 0 {
            return Err(Error::Configuration(
                "auth.session_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(Error::Configuration(
                "http.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.http.download_timeout_secs == 0 {
            return Err(Error::Configuration(
                "http.download_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(1..=2).contains(&self.retry.max_attempts) {
            return Err(Error::Configuration(format!(
                "retry.max_attempts must be 1 or 2, got {}",
                self.retry.max_attempts
            )));
        }

        // Whatever the gateway itself rejects (malformed URLs and the like)
        self.to_terminology_config()
            .validate()
            .map_err(Error::from)
    }

    /// Gateway configuration derived from these settings
    pub fn to_terminology_config(&self) -> TerminologyConfig {
        let mut config = TerminologyConfig::new(self.base_url.trim(), self.auth.endpoint.trim())
            .with_credentials(self.auth.username.clone(), self.auth.password.clone())
            .with_accept_language(self.language.accept_language.clone());
        config.session_ttl_secs = self.auth.session_ttl_secs;
        config.client_config = HttpClientConfig {
            timeout_secs: self.http.timeout_secs,
            download_timeout_secs: self.http.download_timeout_secs,
            connect_timeout_secs: self.http.connect_timeout_secs,
            pool_max_idle_per_host: self.http.pool_max_idle_per_host,
            user_agent: self.http.user_agent.clone(),
        };
        config.retry = AuthRetryPolicy::new(self.retry.max_attempts);
        config
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(dirs::home_dir()
            .ok_or_else(|| Error::Configuration("Could not determine home directory".to_string()))?
            .join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}

fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}

fn default_accept_language() -> String {
    DEFAULT_ACCEPT_LANGUAGE.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_download_timeout_secs() -> u64 {
    600
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_pool_max_idle_per_host() -> usize {
    16
}

fn default_user_agent() -> String {
    format!("termgate/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_attempts() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_false() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_KEYS: &[&str] = &[
        "TERMGATE_BASE_URL",
        "TERMGATE_AUTH_URL",
        "TERMGATE_AUTH_USER",
        "TERMGATE_AUTH_PASSWORD",
        "TERMGATE_ACCEPT_LANGUAGE",
        "TERMGATE_TIMEOUT_SECS",
        "TERMGATE_LOG_LEVEL",
        "TERMGATE_LOG_JSON",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            // SAFETY: env tests run serially
            unsafe { std::env::remove_var(key) };
        }
    }

    fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn valid() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.base_url = "https://ts.example.org/api".to_string();
        config.auth.endpoint = "https://ims.example.org/api".to_string();
        config.auth.username = "svc".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.auth.session_ttl_secs, 86_400);
        assert_eq!(config.language.accept_language, DEFAULT_ACCEPT_LANGUAGE);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.http.download_timeout_secs, 600);
        assert_eq!(config.http.connect_timeout_secs, 10);
        assert_eq!(config.http.pool_max_idle_per_host, 16);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_from_yaml_file() {
        let file = write_config(
            ".yaml",
            r#"
base_url: https://ts.example.org/api
auth:
  endpoint: https://ims.example.org/api/
  username: svc-refset
  password: s3cret
http:
  timeout_secs: 5
"#,
        );

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base_url, "https://ts.example.org/api");
        assert_eq!(config.auth.username, "svc-refset");
        assert_eq!(config.auth.password, "s3cret");
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.http.connect_timeout_secs, 10);
        assert_eq!(config.auth.session_ttl_secs, 86_400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file() {
        let file = write_config(
            ".toml",
            r#"
base_url = "https://ts.example.org/api"

[auth]
endpoint = "none"

[logging]
level = "debug"
json = true
"#,
        );

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert!(config.auth_disabled());
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_file_is_configuration_error() {
        let file = write_config(".yaml", "base_url: [unclosed");
        let err = GatewayConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("Invalid YAML")));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = GatewayConfig::from_file("/nonexistent/termgate.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_validate_names_missing_key() {
        let err = GatewayConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("base_url"));

        let mut config = valid();
        config.auth.endpoint = String::new();
        assert!(config.validate().unwrap_err().to_string().contains("auth.endpoint"));

        let mut config = valid();
        config.auth.username = String::new();
        assert!(config.validate().unwrap_err().to_string().contains("auth.username"));

        let mut config = valid();
        config.retry.max_attempts = 5;
        assert!(config.validate().unwrap_err().to_string().contains("retry.max_attempts"));

        let mut config = valid();
        config.http.download_timeout_secs = 0;
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("http.download_timeout_secs")
        );
    }

    #[test]
    fn test_validate_rejects_malformed_base_url() {
        let mut config = valid();
        config.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_to_terminology_config() {
        let mut config = valid();
        config.auth.password = "pw".to_string();
        config.http.timeout_secs = 12;
        config.http.download_timeout_secs = 900;
        config.retry.max_attempts = 1;

        let terminology = config.to_terminology_config();
        assert_eq!(terminology.base_url, "https://ts.example.org/api");
        assert_eq!(terminology.credentials.username, "svc");
        assert_eq!(terminology.credentials.password, "pw");
        assert_eq!(terminology.client_config.timeout_secs, 12);
        assert_eq!(terminology.client_config.download_timeout_secs, 900);
        assert_eq!(terminology.retry.max_attempts, 1);
        assert_eq!(terminology.session_ttl_secs, 86_400);
    }

    #[test]
    fn test_password_not_in_debug_output() {
        let mut config = valid();
        config.auth.password = "s3cret".to_string();
        assert!(!format!("{:?}", config).contains("s3cret"));
    }

    #[test]
    #[serial]
    fn test_merge_env_overrides_file_values() {
        clear_env();
        let mut config = valid();

        // SAFETY: env tests run serially
        unsafe {
            std::env::set_var("TERMGATE_BASE_URL", "https://override.example.org");
            std::env::set_var("TERMGATE_AUTH_URL", "none");
            std::env::set_var("TERMGATE_AUTH_PASSWORD", "from-env");
            std::env::set_var("TERMGATE_ACCEPT_LANGUAGE", "fr");
            std::env::set_var("TERMGATE_TIMEOUT_SECS", "7");
            std::env::set_var("TERMGATE_LOG_JSON", "true");
        }
        config.merge_env();
        clear_env();

        assert_eq!(config.base_url, "https://override.example.org");
        assert!(config.auth_disabled());
        assert_eq!(config.auth.username, "svc");
        assert_eq!(config.auth.password, "from-env");
        assert_eq!(config.language.accept_language, "fr");
        assert_eq!(config.http.timeout_secs, 7);
        assert!(config.logging.json);
    }

    #[test]
    #[serial]
    fn test_merge_env_ignores_invalid_numbers() {
        clear_env();
        let mut config = valid();

        // SAFETY: env tests run serially
        unsafe { std::env::set_var("TERMGATE_TIMEOUT_SECS", "soon") };
        config.merge_env();
        clear_env();

        assert_eq!(config.http.timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn test_load_without_file_uses_env() {
        clear_env();
        // SAFETY: env tests run serially
        unsafe {
            std::env::set_var("TERMGATE_BASE_URL", "http://localhost:8080/api");
            std::env::set_var("TERMGATE_AUTH_URL", "none");
        }
        let config = GatewayConfig::load(None).unwrap();
        clear_env();

        assert_eq!(config.base_url, "http://localhost:8080/api");
        assert!(config.validate().is_ok());
    }
}
