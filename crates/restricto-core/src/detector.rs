use chrono::{DateTime, Duration, Utc};

use crate::usage::{ForegroundEvent, UsageSource};

/// Best-effort snapshot of the current foreground application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundObservation {
    pub package: String,
    pub observed_at: DateTime<Utc>,
}

/// Determines the current foreground application from platform usage queries.
///
/// Two strategies, in order of preference:
/// 1. Scan foreground transition events in a recent window and take the one
///    with the strictly greatest timestamp. Transition events are precise and
///    avoid attributing aggregate usage to the wrong app.
/// 2. If the event query fails or yields nothing, fall back to per-app
///    last-used aggregates over a much tighter window and take the maximum.
pub struct ForegroundDetector {
    source: Box<dyn UsageSource>,
    event_window: Duration,
    stats_lookback: Duration,
}

impl ForegroundDetector {
    #[must_use]
    pub fn new(
        source: Box<dyn UsageSource>,
        event_window: Duration,
        stats_lookback: Duration,
    ) -> Self {
        Self {
            source,
            event_window,
            stats_lookback,
        }
    }

    /// Detect the current foreground application.
    ///
    /// Never errors: query failures are swallowed into the fallback chain and
    /// an exhausted chain yields `None` for this tick. The monitor loop must
    /// tolerate a stretch of ticks with no detection.
    pub async fn detect(&self, now: DateTime<Utc>) -> Option<ForegroundObservation> {
        if let Some(observation) = self.detect_from_events(now).await {
            return Some(observation);
        }
        self.detect_from_stats(now).await
    }

    async fn detect_from_events(&self, now: DateTime<Utc>) -> Option<ForegroundObservation> {
        let start = now - self.event_window;
        let events = match self.source.foreground_events(start, now).await {
            Ok(events) => events,
            Err(e) => {
                log::debug!("Foreground event query failed, falling back to stats: {e}");
                return None;
            }
        };

        // Track the transition with the strictly greatest timestamp
        let latest = events
            .into_iter()
            .fold(None, |latest: Option<ForegroundEvent>, event| match latest {
                Some(current) if event.timestamp <= current.timestamp => Some(current),
                _ => Some(event),
            })?;

        Some(ForegroundObservation {
            package: latest.package,
            observed_at: now,
        })
    }

    async fn detect_from_stats(&self, now: DateTime<Utc>) -> Option<ForegroundObservation> {
        let start = now - self.stats_lookback;
        let stats = match self.source.usage_stats(start, now).await {
            Ok(stats) => stats,
            Err(e) => {
                log::debug!("Usage stats query failed, no detection this tick: {e}");
                return None;
            }
        };

        let most_recent = stats.into_iter().max_by_key(|stat| stat.last_used)?;

        Some(ForegroundObservation {
            package: most_recent.package,
            observed_at: now,
        })
    }
}
