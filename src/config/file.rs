//! Runner settings files
//!
//! Loads `host`, `port`, `debug` and `classnames` from a properties, YAML or
//! JSON file, chosen by extension.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use super::properties::parse_properties;
use super::ConfigError;

/// Settings read from one file. Absent keys stay `None`/empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub debug: Option<bool>,

    /// Either a list or one whitespace-separated string
    #[serde(default, deserialize_with = "class_names")]
    pub classnames: Vec<String>,
}

impl FileSettings {
    /// Load settings from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let settings = match extension(path).as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?
            }
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?
            }
            _ => Self::from_properties(&parse_properties(&content))?,
        };

        debug!("Loaded runner settings from {}", path.display());
        Ok(settings)
    }

    /// Interpret parsed properties. The presence of `debug` switches it on,
    /// whatever its value.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let port = match properties.get("port") {
            Some(value) => Some(value.trim().parse::<u16>().map_err(|_| {
                ConfigError::InvalidValue {
                    key: "port".to_string(),
                    value: value.clone(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            host: properties.get("host").cloned(),
            port,
            debug: properties.get("debug").map(|_| true),
            classnames: properties
                .get("classnames")
                .map(|names| split_names(names))
                .unwrap_or_default(),
        })
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn split_names(names: &str) -> Vec<String> {
    names.split_whitespace().map(str::to_string).collect()
}

fn class_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Names {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Names::deserialize(deserializer)? {
        Names::List(names) => names,
        Names::Joined(names) => split_names(&names),
    })
}
