//! Layered settings for the command line client
//!
//! Sources, lowest precedence first: built-in defaults, the YAML config file,
//! `BITBUCKET_LOCK_*` environment variables, then command line flags.

use std::{path::Path, time::Duration};

use bitbucket_lock::{DrainPolicy, LockClientConfig};
use config::{Config, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;

/// Config file looked up when `--config` is not given (extension optional)
pub const DEFAULT_CONFIG_FILE: &str = "conf/bitbucket-lock";

const ENV_PREFIX: &str = "BITBUCKET_LOCK";

#[derive(Clone, Debug, Deserialize)]
pub struct ServerSettings {
    pub address: String,
    pub username: String,
    pub password: String,
    pub verify_tls: bool,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DrainSettings {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
    /// 0 disables the limit
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub file_logging: bool,
    pub dir: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub drain: DrainSettings,
    pub logging: LoggingSettings,
}

/// Values given on the command line, applied last
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub verify_tls: Option<bool>,
    pub drain_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

type Builder = config::ConfigBuilder<DefaultState>;

impl Settings {
    /// Load settings from `path` (or the default file, if present) plus environment
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = Self::defaults()?.add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::finish(builder, overrides)
    }

    fn defaults() -> Result<Builder, ConfigError> {
        let defaults = LockClientConfig::default();
        let drain = DrainPolicy::default();

        Config::builder()
            .set_default("server.address", defaults.server_addr)?
            .set_default("server.username", defaults.username)?
            .set_default("server.password", defaults.password)?
            .set_default("server.verify_tls", defaults.verify_tls)?
            .set_default("server.connect_timeout_ms", defaults.connect_timeout_ms)?
            .set_default("server.read_timeout_ms", defaults.read_timeout_ms)?
            .set_default(
                "drain.initial_interval_ms",
                duration_millis(drain.initial_interval),
            )?
            .set_default("drain.max_interval_ms", duration_millis(drain.max_interval))?
            .set_default("drain.multiplier", drain.multiplier)?
            .set_default(
                "drain.timeout_secs",
                drain.timeout.map(|t| t.as_secs()).unwrap_or(0),
            )?
            .set_default("logging.level", "info")?
            .set_default("logging.file_logging", false)
    }

    fn finish(builder: Builder, overrides: &Overrides) -> Result<Self, ConfigError> {
        builder
            .set_override_option("server.address", overrides.server.clone())?
            .set_override_option("server.username", overrides.username.clone())?
            .set_override_option("server.password", overrides.password.clone())?
            .set_override_option("server.verify_tls", overrides.verify_tls)?
            .set_override_option("drain.timeout_secs", overrides.drain_timeout_secs)?
            .set_override_option("logging.level", overrides.log_level.clone())?
            .build()?
            .try_deserialize()
    }

    /// Client configuration for the lock session
    pub fn client_config(&self) -> LockClientConfig {
        let drain = DrainPolicy {
            initial_interval: Duration::from_millis(self.drain.initial_interval_ms),
            max_interval: Duration::from_millis(self.drain.max_interval_ms),
            multiplier: self.drain.multiplier,
            timeout: (self.drain.timeout_secs > 0)
                .then(|| Duration::from_secs(self.drain.timeout_secs)),
        };

        LockClientConfig::new(&self.server.address)
            .with_auth(&self.server.username, &self.server.password)
            .with_timeouts(self.server.connect_timeout_ms, self.server.read_timeout_ms)
            .with_tls_verification(self.server.verify_tls)
            .with_drain_policy(drain)
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn load_yaml(yaml: &str, overrides: &Overrides) -> Settings {
        let builder = Settings::defaults()
            .unwrap()
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        Settings::finish(builder, overrides).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = load_yaml("{}", &Overrides::default());

        assert_eq!(settings.server.address, "https://127.0.0.1:7990");
        assert!(!settings.server.verify_tls);
        assert_eq!(settings.drain.initial_interval_ms, 500);
        assert_eq!(settings.drain.max_interval_ms, 5000);
        assert_eq!(settings.drain.timeout_secs, 1800);
        assert_eq!(settings.logging.level, "info");
        assert!(settings.logging.dir.is_none());

        let config = settings.client_config();
        assert_eq!(config.drain, DrainPolicy::default());
    }

    #[test]
    fn test_file_values() {
        let yaml = r#"
server:
  address: https://bitbucket.internal
  username: backup
  password: hunter2
  verify_tls: true
drain:
  initial_interval_ms: 250
  timeout_secs: 0
logging:
  level: debug
  file_logging: true
  dir: /var/log/bitbucket-lock
"#;
        let settings = load_yaml(yaml, &Overrides::default());
        let config = settings.client_config();

        assert_eq!(config.server_addr, "https://bitbucket.internal");
        assert_eq!(config.username, "backup");
        assert_eq!(config.password, "hunter2");
        assert!(config.verify_tls);
        assert_eq!(config.drain.initial_interval, Duration::from_millis(250));
        assert_eq!(config.drain.timeout, None);
        assert_eq!(config.connect_timeout_ms, 5000);
        assert!(settings.logging.file_logging);
        assert_eq!(settings.logging.dir.as_deref(), Some("/var/log/bitbucket-lock"));
    }

    #[test]
    fn test_overrides_win() {
        let yaml = r#"
server:
  address: https://from-file
  username: file-user
"#;
        let overrides = Overrides {
            server: Some("https://from-cli".to_string()),
            password: Some("cli-secret".to_string()),
            verify_tls: Some(true),
            drain_timeout_secs: Some(60),
            log_level: Some("trace".to_string()),
            ..Default::default()
        };
        let settings = load_yaml(yaml, &overrides);

        assert_eq!(settings.server.address, "https://from-cli");
        assert_eq!(settings.server.username, "file-user");
        assert_eq!(settings.server.password, "cli-secret");
        assert!(settings.server.verify_tls);
        assert_eq!(
            settings.client_config().drain.timeout,
            Some(Duration::from_secs(60))
        );
        assert_eq!(settings.logging.level, "trace");
    }

    #[test]
    fn test_insecure_override_beats_file() {
        let yaml = r#"
server:
  verify_tls: true
"#;
        let overrides = Overrides {
            verify_tls: Some(false),
            ..Default::default()
        };
        let settings = load_yaml(yaml, &overrides);
        assert!(!settings.client_config().verify_tls);
    }
}
