use chrono::{DateTime, Duration, Utc};
use restricto_storage::RestrictionSet;

use crate::detector::ForegroundObservation;

/// Decision produced by a single policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Block(String),
}

/// Tracks the most recent block so repeated redirects for the same app are
/// suppressed while the user is still being bounced out of it.
///
/// Owned by the monitor loop, never persisted; a fresh session starts with an
/// empty state.
#[derive(Debug, Clone, Default)]
pub struct CooldownState {
    last_block: Option<LastBlock>,
}

#[derive(Debug, Clone)]
struct LastBlock {
    package: String,
    at: DateTime<Utc>,
}

impl CooldownState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful block. `at` is kept monotonically non-decreasing
    /// within one session.
    pub fn record_block(&mut self, package: &str, now: DateTime<Utc>) {
        let at = match &self.last_block {
            Some(previous) if previous.at > now => previous.at,
            _ => now,
        };
        self.last_block = Some(LastBlock {
            package: package.to_string(),
            at,
        });
    }

    fn is_cooling_down(&self, package: &str, now: DateTime<Utc>, window: Duration) -> bool {
        match &self.last_block {
            Some(last) => last.package == package && now - last.at < window,
            None => false,
        }
    }
}

/// Decides whether a detected foreground application should be blocked.
///
/// The cooldown is keyed per identifier, not global: switching to a different
/// restricted app triggers a fresh block immediately, only repeated targeting
/// of the same app within the window is suppressed. The redirect sequence
/// itself takes visible time and would otherwise re-trigger on the next tick
/// before the user has left.
pub struct EnforcementPolicy {
    cooldown_window: Duration,
}

impl EnforcementPolicy {
    #[must_use]
    pub fn new(cooldown_window: Duration) -> Self {
        Self { cooldown_window }
    }

    /// Evaluate one observation against the restriction set.
    ///
    /// On `Action::Block` the caller must record the block into the cooldown
    /// state within the same tick, before the next evaluation.
    #[must_use]
    pub fn evaluate(
        &self,
        observation: Option<&ForegroundObservation>,
        restrictions: &RestrictionSet,
        cooldown: &CooldownState,
        now: DateTime<Utc>,
    ) -> Action {
        let Some(observation) = observation else {
            return Action::None;
        };

        if !restrictions.contains(&observation.package) {
            return Action::None;
        }

        if cooldown.is_cooling_down(&observation.package, now, self.cooldown_window) {
            return Action::None;
        }

        Action::Block(observation.package.clone())
    }
}
