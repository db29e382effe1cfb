use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[cfg(target_os = "linux")]
pub mod linux;

/// A "moved to foreground" transition reported by the OS.
#[derive(Debug, Clone)]
pub struct ForegroundEvent {
    pub package: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-application "last time used" aggregate statistic.
#[derive(Debug, Clone)]
pub struct UsageStat {
    pub package: String,
    pub last_used: DateTime<Utc>,
}

/// Transient failure of a platform usage query.
///
/// Both variants are recoverable: the detector falls back or yields no
/// detection for the tick, it never propagates these upward.
#[derive(Debug, Error)]
pub enum UsageQueryError {
    #[error("usage access permission not granted")]
    PermissionDenied,
    #[error("usage query unavailable: {0}")]
    Unavailable(String),
}

/// Platform usage-query seam consumed by the foreground detector.
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Query foreground transition events in `[start, end]`.
    async fn foreground_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ForegroundEvent>, UsageQueryError>;

    /// Query per-application last-used aggregates in `[start, end]`.
    async fn usage_stats(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageStat>, UsageQueryError>;
}

/// Create platform-specific usage source
///
/// # Errors
///
/// Returns an error if the current platform is not supported or if source
/// initialization fails
pub fn create_usage_source() -> anyhow::Result<Box<dyn UsageSource>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxUsageSource::new()?))
    }

    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!("Unsupported platform")
    }
}
