//! Request classification and strategy selection
//!
//! Maps a request URL to a [`ResourceKind`] using an explicit list of
//! [`VolatileRule`]s. Volatile resources are served network-first, everything
//! else cache-first.

use reqwest::Url;
use serde::Deserialize;

/// A rule identifying frequently-changing resources
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum VolatileRule {
    /// Path ends with the given extension (e.g. `.csv`)
    Extension { extension: String },
    /// Path contains `marker` and ends with `extension` (e.g. `actu_` + `.json`)
    DatedFeed { marker: String, extension: String },
    /// The scope's root document (`<scope>` or `<scope>index.html`)
    RootDocument,
}

impl VolatileRule {
    /// Shorthand for [`VolatileRule::Extension`]
    pub fn extension(extension: impl Into<String>) -> Self {
        Self::Extension {
            extension: extension.into(),
        }
    }

    /// Shorthand for [`VolatileRule::DatedFeed`]
    pub fn dated_feed(marker: impl Into<String>, extension: impl Into<String>) -> Self {
        Self::DatedFeed {
            marker: marker.into(),
            extension: extension.into(),
        }
    }

    /// Whether this rule matches the given URL within `scope`
    pub fn matches(&self, url: &Url, scope: &Url) -> bool {
        let path = url.path();
        match self {
            Self::Extension { extension } => path.ends_with(extension.as_str()),
            Self::DatedFeed { marker, extension } => {
                path.contains(marker.as_str()) && path.ends_with(extension.as_str())
            }
            Self::RootDocument => {
                if url.origin() != scope.origin() {
                    return false;
                }
                let root = scope.path();
                path == root
                    || path
                        .strip_prefix(root)
                        .is_some_and(|rest| rest == "index.html")
            }
        }
    }
}

/// Classification of an intercepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Frequently-updated data, preferring fresh network copies
    Volatile,
    /// Static asset, preferring the cached copy
    Static,
}

/// Fetch strategy applied to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
}

impl ResourceKind {
    /// The strategy used to serve this kind of resource
    pub fn strategy(self) -> Strategy {
        match self {
            ResourceKind::Volatile => Strategy::NetworkFirst,
            ResourceKind::Static => Strategy::CacheFirst,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::NetworkFirst => write!(f, "network-first"),
            Strategy::CacheFirst => write!(f, "cache-first"),
        }
    }
}

/// Classifies a URL; the first matching rule makes it volatile
pub fn classify(url: &Url, scope: &Url, rules: &[VolatileRule]) -> ResourceKind {
    if rules.iter().any(|rule| rule.matches(url, scope)) {
        ResourceKind::Volatile
    } else {
        ResourceKind::Static
    }
}
