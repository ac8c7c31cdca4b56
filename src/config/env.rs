//! Environment variable configuration
//!
//! Provides environment variable overrides for runner configuration.

use std::env;

use super::ClientConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "REMOTE_TEST";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// Server host from REMOTE_TEST_HOST
    pub host: Option<String>,
    /// Server port from REMOTE_TEST_PORT
    pub port: Option<u16>,
    /// Debug from REMOTE_TEST_DEBUG
    pub debug: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            host: get_env("HOST"),
            port: get_env_parse("PORT"),
            debug: get_env_bool("DEBUG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.host.is_some() || self.port.is_some() || self.debug.is_some()
    }

    /// Override the fields that are set
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all REMOTE_TEST environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_HOST     Server host for runners");
    println!("  {ENV_PREFIX}_PORT     Server port for runners");
    println!("  {ENV_PREFIX}_DEBUG    Log every event sent by the runner (true/false)");
    println!();
    println!("Command-line arguments override these values.");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sets variables for the duration of a test and restores them on drop
    struct EnvGuard {
        previous: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&str, &str)]) -> Self {
            let previous = vars
                .iter()
                .map(|(key, value)| {
                    let key = format!("{ENV_PREFIX}_{key}");
                    let old = env::var(&key).ok();
                    env::set_var(&key, value);
                    (key, old)
                })
                .collect();
            Self { previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.previous {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(!config.has_any());

        let mut client = ClientConfig::default();
        config.apply(&mut client);
        assert_eq!(client, ClientConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = EnvGuard::set(&[("HOST", "10.0.0.5"), ("PORT", "7010"), ("DEBUG", "yes")]);

        let config = EnvConfig::load();
        assert!(config.has_any());
        assert_eq!(config.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(config.port, Some(7010));
        assert_eq!(config.debug, Some(true));

        let mut client = ClientConfig::default();
        config.apply(&mut client);
        assert_eq!(client.host, "10.0.0.5");
        assert_eq!(client.port, Some(7010));
        assert!(client.debug);
    }
}
