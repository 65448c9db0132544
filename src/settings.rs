use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// All static configuration for the widget. Values are never derived at
/// runtime; they come from `Settings.toml` and environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoginfeedSettings {
    pub application: ApplicationSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Base URL of the REST API; every request path is resolved against it.
    pub base_url: String,
    /// Path the provider redirects back to after an external login.
    pub oauth_callback_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Application key handed to the broker client.
    pub key: String,
    /// Websocket host of the broker.
    pub host: String,
    /// Websocket port; `None` lets the broker client pick the scheme default.
    pub port: Option<u16>,
    pub force_tls: bool,
    pub enabled_transports: Vec<String>,
    /// Path (relative to `base_url`) of the subscription authorization endpoint.
    pub auth_path: String,
    /// Name of the broadcast channel everyone may listen on.
    pub public_channel: String,
    /// Prefix of per-user channels; the user id is appended.
    pub private_channel_prefix: String,
    /// Referer header attached to authorization requests. Only needed for
    /// development setups where the API checks the request origin; leave unset
    /// otherwise.
    pub auth_referer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001/".to_string(),
            oauth_callback_path: "/oauth/google/callback".to_string(),
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            key: String::new(),
            host: "127.0.0.1".to_string(),
            port: None,
            force_tls: true,
            enabled_transports: vec!["ws".to_string(), "wss".to_string()],
            auth_path: "api/broadcasting/auth".to_string(),
            public_channel: "global.notifications".to_string(),
            private_channel_prefix: "user.".to_string(),
            auth_referer: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoginfeedSettings {
    /// Load settings from `Settings.toml` (when present) and environment
    /// variables, then initialize logging.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_base_settings(Path::new("Settings.toml"))?;
        Self::apply_env_overrides(&mut settings);
        settings.init_logging();
        Ok(settings)
    }

    /// Load base settings from a TOML file, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_base_settings(path: &Path) -> Result<Self> {
        if path.exists() {
            let toml_content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings from {}", path.display()))?;
            let settings = basic_toml::from_str(&toml_content)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            log::debug!("Loaded base settings from {}", path.display());
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides to settings.
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_broker_env_overrides(&mut settings.broker);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(base_url) = std::env::var("BASE_URL") {
            app_settings.base_url = base_url;
        }
        if let Ok(callback_path) = std::env::var("OAUTH_CALLBACK_PATH") {
            app_settings.oauth_callback_path = callback_path;
        }
    }

    fn apply_broker_env_overrides(broker_settings: &mut BrokerSettings) {
        if let Ok(key) = std::env::var("BROKER_KEY") {
            broker_settings.key = key;
        }
        if let Ok(host) = std::env::var("BROKER_HOST") {
            broker_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("BROKER_PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                broker_settings.port = Some(port);
            }
        }
        if let Ok(force_tls_str) = std::env::var("BROKER_FORCE_TLS") {
            if let Ok(force_tls) = force_tls_str.parse::<bool>() {
                broker_settings.force_tls = force_tls;
            }
        }
        if let Ok(auth_path) = std::env::var("BROKER_AUTH_PATH") {
            broker_settings.auth_path = auth_path;
        }
        if let Ok(referer) = std::env::var("BROKER_AUTH_REFERER") {
            if !referer.is_empty() {
                broker_settings.auth_referer = Some(referer);
            }
        }
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            logging_settings.level = level;
        }
    }

    /// Initialize `env_logger` with the configured level as the default
    /// filter. `RUST_LOG` still takes precedence. Safe to call more than once;
    /// later calls are no-ops.
    pub fn init_logging(&self) {
        let env = env_logger::Env::default().default_filter_or(&self.logging.level);
        let _ = env_logger::Builder::from_env(env).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write as _;

    #[test]
    fn defaults_match_documented_values() {
        let settings = LoginfeedSettings::default();
        assert_eq!(settings.application.oauth_callback_path, "/oauth/google/callback");
        assert_eq!(settings.broker.auth_path, "api/broadcasting/auth");
        assert_eq!(settings.broker.public_channel, "global.notifications");
        assert_eq!(settings.broker.private_channel_prefix, "user.");
        assert!(settings.broker.auth_referer.is_none());
        assert_eq!(settings.broker.enabled_transports, vec!["ws", "wss"]);
    }

    #[test]
    fn missing_settings_file_falls_back_to_defaults() {
        let settings =
            LoginfeedSettings::load_base_settings(Path::new("does/not/exist/Settings.toml"))
                .unwrap();
        assert_eq!(settings.application.base_url, "http://127.0.0.1:8001/");
    }

    #[test]
    fn settings_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
base_url = "https://api.example.test/"
oauth_callback_path = "/oauth/callback"

[broker]
key = "app-key"
host = "ws.example.test"
force_tls = true
enabled_transports = ["wss"]
auth_path = "api/broadcasting/auth"
public_channel = "global.notifications"
private_channel_prefix = "user."

[logging]
level = "debug"
"#
        )
        .unwrap();

        let settings = LoginfeedSettings::load_base_settings(file.path()).unwrap();
        assert_eq!(settings.application.base_url, "https://api.example.test/");
        assert_eq!(settings.broker.key, "app-key");
        assert_eq!(settings.broker.host, "ws.example.test");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    #[serial]
    fn env_overrides_take_priority() {
        std::env::set_var("BASE_URL", "https://override.example.test/");
        std::env::set_var("BROKER_PORT", "8080");
        std::env::set_var("BROKER_FORCE_TLS", "false");

        let mut settings = LoginfeedSettings::default();
        LoginfeedSettings::apply_env_overrides(&mut settings);

        assert_eq!(settings.application.base_url, "https://override.example.test/");
        assert_eq!(settings.broker.port, Some(8080));
        assert!(!settings.broker.force_tls);

        std::env::remove_var("BASE_URL");
        std::env::remove_var("BROKER_PORT");
        std::env::remove_var("BROKER_FORCE_TLS");
    }

    #[test]
    #[serial]
    fn invalid_numeric_env_values_are_ignored() {
        std::env::set_var("BROKER_PORT", "not-a-port");

        let mut settings = LoginfeedSettings::default();
        LoginfeedSettings::apply_env_overrides(&mut settings);
        assert_eq!(settings.broker.port, None);

        std::env::remove_var("BROKER_PORT");
    }
}
