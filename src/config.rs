//! Worker configuration
//!
//! A worker is described by its cache name, the scope its asset paths are
//! relative to, the assets it pre-caches on install and the rules that mark
//! requests as volatile. Configurations come from a built-in [`Preset`] or a
//! TOML file.

use reqwest::Url;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::routing::VolatileRule;

/// Scope used when neither the config file nor the command line sets one
pub const DEFAULT_SCOPE: &str = "http://localhost:8000/";

/// Errors that can occur while loading or validating a worker configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Scope or asset path is not a valid URL
    #[error("Invalid URL '{value}': {reason}")]
    InvalidUrl { value: String, reason: String },

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Worker configuration as written in a TOML file
///
/// ```toml
/// cache_name = "actus-v3"
/// scope = "https://example.org/actus/"
/// assets = ["./", "./index.html", "./manifest.json"]
/// daily_invalidation = true
///
/// [[volatile]]
/// kind = "dated-feed"
/// marker = "actu_"
/// extension = ".json"
///
/// [[volatile]]
/// kind = "root-document"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkerConfigFile {
    /// Versioned cache name; caches with any other name are removed on activate
    pub cache_name: String,
    /// Base URL for asset paths (optional, may be given on the command line)
    pub scope: Option<String>,
    /// Asset paths pre-cached on install
    #[serde(default)]
    pub assets: Vec<String>,
    /// Rules marking requests as volatile
    #[serde(default)]
    pub volatile: Vec<VolatileRule>,
    /// Drop volatile entries when the UTC date changes
    #[serde(default)]
    pub daily_invalidation: bool,
}

/// Validated worker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub cache_name: String,
    pub scope: Url,
    pub assets: Vec<String>,
    pub volatile: Vec<VolatileRule>,
    pub daily_invalidation: bool,
}

impl WorkerConfig {
    /// Loads a configuration file, with `scope_override` taking precedence
    /// over the file's scope
    pub fn load(path: &Path, scope_override: Option<&str>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: WorkerConfigFile = toml::from_str(&content)?;
        Self::from_file(file, scope_override)
    }

    /// Validates a parsed configuration file
    pub fn from_file(
        file: WorkerConfigFile,
        scope_override: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let scope = scope_override
            .or(file.scope.as_deref())
            .unwrap_or(DEFAULT_SCOPE);

        let config = Self {
            cache_name: file.cache_name,
            scope: parse_scope(scope)?,
            assets: file.assets,
            volatile: file.volatile,
            daily_invalidation: file.daily_invalidation,
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds the configuration of a built-in preset
    pub fn preset(preset: Preset, scope: Option<&str>) -> Result<Self, ConfigError> {
        Self::from_file(preset.config_file(), scope)
    }

    /// Checks invariants not expressed by the types
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "cache_name must not be empty".to_string(),
            ));
        }
        for rule in &self.volatile {
            let empty = match rule {
                VolatileRule::Extension { extension } => extension.is_empty(),
                VolatileRule::DatedFeed { marker, extension } => {
                    marker.is_empty() || extension.is_empty()
                }
                VolatileRule::RootDocument => false,
            };
            if empty {
                return Err(ConfigError::Validation(format!(
                    "volatile rule {:?} has an empty pattern",
                    rule
                )));
            }
        }
        self.asset_urls().map(|_| ())
    }

    /// Resolves a path or absolute URL against the scope
    pub fn resolve(&self, target: &str) -> Result<Url, ConfigError> {
        self.scope
            .join(target)
            .map_err(|e| ConfigError::InvalidUrl {
                value: target.to_string(),
                reason: e.to_string(),
            })
    }

    /// Absolute URLs of the install-time assets, in listed order
    pub fn asset_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.assets.iter().map(|asset| self.resolve(asset)).collect()
    }
}

/// Parses a scope URL, making sure it is usable as a directory base
fn parse_scope(value: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Validation(format!(
            "scope '{}' cannot be used as a base URL",
            value
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Built-in worker configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Sports-data tracker: CSV feeds network-first
    TennisLab,
    /// News reader: dated JSON bulletins network-first
    Actus,
    /// News reader with day-boundary invalidation and a network-first root page
    ActusDaily,
}

impl Preset {
    /// All presets, in display order
    pub const ALL: [Preset; 3] = [Preset::TennisLab, Preset::Actus, Preset::ActusDaily];

    /// Parses a preset name
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tennis-lab" | "tennis" => Some(Preset::TennisLab),
            "actus" => Some(Preset::Actus),
            "actus-daily" | "daily" => Some(Preset::ActusDaily),
            _ => None,
        }
    }

    /// Canonical name used on the command line
    pub fn name(self) -> &'static str {
        match self {
            Preset::TennisLab => "tennis-lab",
            Preset::Actus => "actus",
            Preset::ActusDaily => "actus-daily",
        }
    }

    /// The preset as an unvalidated configuration file
    pub fn config_file(self) -> WorkerConfigFile {
        let strings = |items: &[&str]| -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        };
        match self {
            Preset::TennisLab => WorkerConfigFile {
                cache_name: "tennis-lab-v50".to_string(),
                scope: None,
                assets: strings(&[
                    "./",
                    "./tennis_betting_lab_v15_ytd_monitor.html",
                    "./tennis_tracker.html",
                    "./manifest.json",
                    "./manifest_tracker.json",
                ]),
                volatile: vec![VolatileRule::extension(".csv")],
                daily_invalidation: false,
            },
            Preset::Actus => WorkerConfigFile {
                cache_name: "actus-v2.2".to_string(),
                scope: None,
                assets: strings(&["./", "./index.html", "./manifest.json"]),
                volatile: vec![VolatileRule::dated_feed("actu_", ".json")],
                daily_invalidation: false,
            },
            Preset::ActusDaily => WorkerConfigFile {
                cache_name: "actus-v3".to_string(),
                scope: None,
                assets: strings(&["./", "./index.html", "./manifest.json"]),
                volatile: vec![
                    VolatileRule::dated_feed("actu_", ".json"),
                    VolatileRule::RootDocument,
                ],
                daily_invalidation: true,
            },
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
