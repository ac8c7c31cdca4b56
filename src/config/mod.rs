//! Configuration module
//!
//! Runner settings and the sources they are loaded from: settings files,
//! environment variables and the command line.

pub mod env;
mod file;
mod properties;

pub use env::EnvConfig;
pub use file::FileSettings;
pub use properties::parse_properties;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Default server host for runners
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Test runner configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: Option<u16>,

    /// Log every emitted event and every swallowed error
    pub debug: bool,

    /// Test classes to run, in order
    pub class_names: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: None,
            debug: false,
            class_names: Vec::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
            ..Default::default()
        }
    }

    pub fn with_class_name(mut self, name: impl Into<String>) -> Self {
        self.class_names.push(name.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Apply settings loaded from a file. Host and port are replaced when
    /// present, class names are appended, debug can only be switched on.
    pub fn apply_file(&mut self, settings: FileSettings) {
        if let Some(host) = settings.host {
            self.host = host;
        }
        if let Some(port) = settings.port {
            self.port = Some(port);
        }
        if settings.debug == Some(true) {
            self.debug = true;
        }
        self.class_names.extend(settings.classnames);
    }
}
