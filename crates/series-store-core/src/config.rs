//! Store configuration strings.
//!
//! A configuration string is a storage locator optionally followed by
//! URL-style options:
//!
//! ```text
//! /var/lib/ticks?library=research&write_style=append
//! s3://market-data/prod?prune_previous_versions=true&allow_on_disk_filter=false
//! memory://scratch?query_builder=bid%20%3E%200
//! ```
//!
//! Options are `application/x-www-form-urlencoded`. They are collected into a
//! JSON object of strings and decoded through serde into [`StoreOptions`],
//! which rejects unknown names and repeated options.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, de};
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::{
    error::{InvalidConfigSnafu, StoreError, StoreResult},
    metadata::write_mode::WriteMode,
    query::QueryBuilder,
    storage::StorageLocation,
};

/// Library used when none is configured.
pub const DEFAULT_LIBRARY: &str = "default";

/// Options recognized in a configuration string.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreOptions {
    /// Default for [`crate::store::WriteOptions::prune_previous`].
    #[serde(deserialize_with = "deserialize_flag")]
    pub prune_previous_versions: bool,

    /// Default write mode.
    #[serde(deserialize_with = "deserialize_write_mode")]
    pub write_style: WriteMode,

    /// Destroy and recreate the library when the store is opened.
    #[serde(deserialize_with = "deserialize_flag")]
    pub force_create_library: bool,

    /// Permit pushing range and column filters down to segment decoding.
    #[serde(deserialize_with = "deserialize_flag")]
    pub allow_on_disk_filter: bool,

    /// Filter applied to reads that do not supply their own.
    pub query_builder: Option<QueryBuilder>,

    /// Namespace holding the keys.
    pub library: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            prune_previous_versions: false,
            write_style: WriteMode::Write,
            force_create_library: false,
            allow_on_disk_filter: true,
            query_builder: None,
            library: DEFAULT_LIBRARY.to_string(),
        }
    }
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(de::Error::custom(format!(
                "expected true, false, 1 or 0, found {other:?}"
            ))),
        },
    }
}

fn deserialize_write_mode<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<WriteMode, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(de::Error::custom)
}

fn validate_library(name: &str) -> Result<(), String> {
    let first_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if first_ok && rest_ok {
        Ok(())
    } else {
        Err(format!(
            "library name {name:?} must start with a letter or digit and contain only \
             letters, digits, '.', '-' or '_'"
        ))
    }
}

impl StoreOptions {
    /// Decode options from already unescaped `name=value` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self, String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Map::new();
        for (name, value) in pairs {
            let name = name.into();
            if map.insert(name.clone(), Value::String(value.into())).is_some() {
                return Err(format!("option {name:?} given more than once"));
            }
        }
        let options: StoreOptions =
            serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())?;
        validate_library(&options.library)?;
        Ok(options)
    }
}

/// Where a store lives and how it behaves.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Storage root.
    pub location: StorageLocation,
    /// Behavior options.
    pub options: StoreOptions,
}

impl StoreConfig {
    /// Configuration with default options.
    pub fn new(location: StorageLocation) -> Self {
        StoreConfig {
            location,
            options: StoreOptions::default(),
        }
    }

    /// Replace the options.
    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Parse `<locator>[?name=value&...]`.
    pub fn parse(spec: &str) -> StoreResult<Self> {
        let (locator, query) = spec.split_once('?').unwrap_or((spec, ""));

        let location = StorageLocation::parse(locator).map_err(|e| {
            InvalidConfigSnafu {
                spec,
                reason: e.to_string(),
            }
            .build()
        })?;

        let pairs = form_urlencoded::parse(query.as_bytes());
        let options = StoreOptions::from_pairs(pairs)
            .map_err(|reason| InvalidConfigSnafu { spec, reason }.build())?;

        Ok(StoreConfig { location, options })
    }
}

impl FromStr for StoreConfig {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreConfig::parse(s)
    }
}

impl fmt::Display for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (library {})", self.location, self.options.library)
    }
}
