use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// User-configured set of restricted application identifiers.
///
/// Identifiers are opaque package names matched exactly, with no case folding
/// or profile-suffix normalization. The set is persisted as a JSON array and
/// replaced wholesale on every save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestrictionSet(BTreeSet<String>);

impl RestrictionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a package identifier is restricted (exact match).
    #[must_use]
    pub fn contains(&self, package: &str) -> bool {
        self.0.contains(package)
    }

    /// Add a package identifier. Returns `false` if it was already present.
    pub fn insert(&mut self, package: impl Into<String>) -> bool {
        self.0.insert(package.into())
    }

    /// Remove a package identifier. Returns `false` if it was not present.
    pub fn remove(&mut self, package: &str) -> bool {
        self.0.remove(package)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for RestrictionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for RestrictionSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

/// Monitor loop settings, persisted alongside the restriction set.
///
/// The stats fallback lookback is deliberately configurable: the 1-second
/// default mirrors the behavior this tool replaces, but it queries a daily
/// aggregation bucket and may come back empty on some devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Whether enforcement is paused (checked every tick).
    pub paused: bool,
    /// Interval between monitor ticks, in milliseconds.
    pub tick_interval_ms: u64,
    /// Minimum elapsed time before the same package can be blocked again.
    pub cooldown_window_ms: u64,
    /// How far back the foreground-event query looks, in seconds.
    pub event_window_secs: u64,
    /// How far back the aggregate-statistics fallback looks, in milliseconds.
    pub stats_lookback_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            paused: false,
            tick_interval_ms: 1000,
            cooldown_window_ms: 3000,
            event_window_secs: 60,
            stats_lookback_ms: 1000,
        }
    }
}
