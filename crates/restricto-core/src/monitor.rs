use crate::{
    config::get_data_dir,
    detector::ForegroundDetector,
    ipc::{listen, MonitorIpcHandler},
    policy::{Action, CooldownState, EnforcementPolicy},
    redirector::{create_navigator, Navigator, Redirector},
    usage::{create_usage_source, UsageSource},
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use restricto_storage::{Database, RestrictionSet};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

/// The enforcement loop: a fixed-interval scheduler driving
/// detect -> evaluate -> redirect for the lifetime of one session.
///
/// Ticks are strictly sequential. A tick that overruns the interval delays the
/// next one instead of overlapping it, so the cooldown state needs no
/// synchronization. No error in a tick terminates the loop; the shutdown
/// signal (IPC or Ctrl-C) is the only intended exit path.
pub struct Monitor {
    database: Arc<Database>,
    detector: ForegroundDetector,
    policy: EnforcementPolicy,
    redirector: Redirector,
    cooldown: CooldownState,
    ipc_handler: Arc<MonitorIpcHandler>,
    shutdown_signal: Arc<AtomicBool>,
    session_id: Uuid,
    tick_interval_ms: u64,
}

impl Monitor {
    /// Create a monitor with the platform usage source and navigator.
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be read or a platform backend
    /// cannot be created
    pub fn new(database: Database) -> Result<Self> {
        let source = create_usage_source()?;
        let navigator = create_navigator()?;
        Self::with_backends(database, source, navigator)
    }

    /// Create a monitor with explicit backends (used by tests).
    ///
    /// # Errors
    ///
    /// Returns an error if settings cannot be read
    pub fn with_backends(
        database: Database,
        source: Box<dyn UsageSource>,
        navigator: Box<dyn Navigator>,
    ) -> Result<Self> {
        let database = Arc::new(database);
        let settings = database.get_settings()?;
        let shutdown_signal = Arc::new(AtomicBool::new(false));
        let session_id = Uuid::new_v4();

        let detector = ForegroundDetector::new(
            source,
            chrono::Duration::seconds(i64::try_from(settings.event_window_secs)?),
            chrono::Duration::milliseconds(i64::try_from(settings.stats_lookback_ms)?),
        );
        let policy = EnforcementPolicy::new(chrono::Duration::milliseconds(i64::try_from(
            settings.cooldown_window_ms,
        )?));

        let ipc_handler = Arc::new(MonitorIpcHandler::new(
            session_id,
            database.clone(),
            shutdown_signal.clone(),
        ));

        Ok(Self {
            database,
            detector,
            policy,
            redirector: Redirector::new(navigator),
            // A new session always starts with an empty cooldown
            cooldown: CooldownState::new(),
            ipc_handler,
            shutdown_signal,
            session_id,
            tick_interval_ms: settings.tick_interval_ms,
        })
    }

    /// Run the enforcement session until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be resolved
    pub async fn run_with_signals(&mut self) -> Result<()> {
        let sock_path = get_data_dir()?.join("restricto.sock");
        let ipc_handler = self.ipc_handler.clone();

        tokio::spawn(async move {
            if let Err(e) = listen(ipc_handler, &sock_path).await {
                log::error!("IPC listener failed: {e}");
            }
        });

        let mut interval = interval(Duration::from_millis(self.tick_interval_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!(
            "Monitor session {} started (tick interval: {}ms)",
            self.session_id,
            self.tick_interval_ms
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        log::error!("Monitor tick failed: {e}");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received Ctrl-C, shutting down...");
                    self.shutdown_signal.store(true, Ordering::SeqCst);
                }
            }

            if self.shutdown_signal.load(Ordering::SeqCst) {
                break;
            }
        }

        log::info!("Monitor session {} stopped.", self.session_id);
        Ok(())
    }

    async fn tick(&mut self) -> Result<()> {
        self.tick_at(Utc::now()).await
    }

    async fn tick_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.is_paused() {
            self.ipc_handler.set_current_foreground(None).await;
            return Ok(());
        }

        let restrictions = self.load_restrictions_snapshot();
        let observation = self.detector.detect(now).await;

        self.ipc_handler
            .set_current_foreground(observation.as_ref().map(|o| o.package.clone()))
            .await;

        if let Some(ref obs) = observation {
            log::debug!("Foreground app: {}", obs.package);
        }

        match self
            .policy
            .evaluate(observation.as_ref(), &restrictions, &self.cooldown, now)
        {
            Action::Block(package) => {
                // Arm the cooldown before the redirect sequence runs; the
                // next tick must not re-trigger mid-sequence
                self.cooldown.record_block(&package, now);
                self.ipc_handler.record_block(&package).await;

                let outcome = self.redirector.block(&package).await;
                if !outcome.left_restricted_app() {
                    log::warn!("Redirect for {package} did not reach the home surface");
                }
            }
            Action::None => {}
        }

        Ok(())
    }

    fn is_paused(&self) -> bool {
        match self.database.get_settings() {
            Ok(settings) => settings.paused,
            Err(e) => {
                log::warn!("Failed to read settings, treating as not paused: {e}");
                false
            }
        }
    }

    /// Read a consistent snapshot of the restriction set. An unreadable set is
    /// an empty set for this tick: fail-open is the only safe default here.
    fn load_restrictions_snapshot(&self) -> RestrictionSet {
        match self.database.load_restrictions() {
            Ok(restrictions) => restrictions,
            Err(e) => {
                log::warn!("Failed to load restriction set, skipping enforcement: {e}");
                RestrictionSet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::{ForegroundEvent, UsageQueryError, UsageStat};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Source that always reports the same package, freshly foregrounded.
    struct ConstantSource {
        package: String,
        queries: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl UsageSource for ConstantSource {
        async fn foreground_events(
            &self,
            _start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<ForegroundEvent>, UsageQueryError> {
            *self.queries.lock().unwrap() += 1;
            Ok(vec![ForegroundEvent {
                package: self.package.clone(),
                timestamp: end,
            }])
        }

        async fn usage_stats(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<UsageStat>, UsageQueryError> {
            Ok(Vec::new())
        }
    }

    /// Navigator that records which packages were redirected away from.
    #[derive(Default)]
    struct RecordingNavigator {
        blocked: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Navigator for RecordingNavigator {
        async fn go_home(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn open_host_app(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn open_restriction_notice(&self, package: &str) -> anyhow::Result<()> {
            self.blocked.lock().unwrap().push(package.to_string());
            Ok(())
        }

        async fn show_notice(&self, _message: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn ts(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    struct Harness {
        monitor: Monitor,
        blocked: Arc<Mutex<Vec<String>>>,
        queries: Arc<Mutex<u32>>,
        _dir: tempfile::TempDir,
    }

    fn harness(foreground: &str, restricted: &[&str]) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::new(Some(dir.path().join("test.db"))).unwrap();
        database
            .save_restrictions(&restricted.iter().copied().collect())
            .unwrap();

        let queries = Arc::new(Mutex::new(0));
        let source = ConstantSource {
            package: foreground.to_string(),
            queries: queries.clone(),
        };
        let navigator = RecordingNavigator::default();
        let blocked = navigator.blocked.clone();

        let monitor =
            Monitor::with_backends(database, Box::new(source), Box::new(navigator)).unwrap();
        Harness {
            monitor,
            blocked,
            queries,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_block_suppress_block_across_ticks() {
        let mut h = harness("com.example.social", &["com.example.social"]);

        // Tick 1: restricted app in foreground, block fires
        h.monitor.tick_at(ts(0)).await.unwrap();
        // Tick 2: 500ms later, same app, cooldown suppresses
        h.monitor.tick_at(ts(500)).await.unwrap();
        // Tick 3: 3500ms after the first block, cooldown expired
        h.monitor.tick_at(ts(3500)).await.unwrap();

        let blocked = h.blocked.lock().unwrap().clone();
        assert_eq!(blocked, vec!["com.example.social", "com.example.social"]);
    }

    #[tokio::test]
    async fn test_unrestricted_foreground_never_blocks() {
        let mut h = harness("com.example.mail", &["com.example.social"]);

        for millis in [0, 1000, 2000] {
            h.monitor.tick_at(ts(millis)).await.unwrap();
        }

        assert!(h.blocked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_restriction_set_never_blocks() {
        let mut h = harness("com.example.social", &[]);

        h.monitor.tick_at(ts(0)).await.unwrap();

        assert!(h.blocked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restriction_update_visible_next_tick() {
        let mut h = harness("com.example.social", &[]);

        h.monitor.tick_at(ts(0)).await.unwrap();
        assert!(h.blocked.lock().unwrap().is_empty());

        // External configuration update between ticks
        h.monitor
            .database
            .save_restrictions(&["com.example.social"].into_iter().collect())
            .unwrap();

        h.monitor.tick_at(ts(1000)).await.unwrap();
        assert_eq!(
            h.blocked.lock().unwrap().clone(),
            vec!["com.example.social"]
        );
    }

    #[tokio::test]
    async fn test_corrupt_restriction_store_fails_open() {
        let mut h = harness("com.example.social", &["com.example.social"]);

        // Clobber the stored restriction set with something unparseable
        let conn = rusqlite::Connection::open(h._dir.path().join("test.db")).unwrap();
        conn.execute(
            "UPDATE kv_store SET value = '{not json'
             WHERE namespace = 'restricto' AND key = 'restricted_apps'",
            [],
        )
        .unwrap();

        // The tick must complete, treat the set as empty, and block nothing
        h.monitor.tick_at(ts(0)).await.unwrap();
        assert!(h.blocked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paused_skips_detection_and_enforcement() {
        let mut h = harness("com.example.social", &["com.example.social"]);

        let mut settings = h.monitor.database.get_settings().unwrap();
        settings.paused = true;
        h.monitor.database.update_settings(&settings).unwrap();

        h.monitor.tick_at(ts(0)).await.unwrap();

        assert!(h.blocked.lock().unwrap().is_empty());
        assert_eq!(*h.queries.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_switching_restricted_apps_blocks_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::new(Some(dir.path().join("test.db"))).unwrap();
        database
            .save_restrictions(&["com.example.a", "com.example.b"].into_iter().collect())
            .unwrap();

        // Source that switches foreground app after the first query
        struct SwitchingSource {
            calls: Mutex<u32>,
        }

        #[async_trait]
        impl UsageSource for SwitchingSource {
            async fn foreground_events(
                &self,
                _start: DateTime<Utc>,
                end: DateTime<Utc>,
            ) -> Result<Vec<ForegroundEvent>, UsageQueryError> {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                let package = if *calls == 1 {
                    "com.example.a"
                } else {
                    "com.example.b"
                };
                Ok(vec![ForegroundEvent {
                    package: package.to_string(),
                    timestamp: end,
                }])
            }

            async fn usage_stats(
                &self,
                _start: DateTime<Utc>,
                _end: DateTime<Utc>,
            ) -> Result<Vec<UsageStat>, UsageQueryError> {
                Ok(Vec::new())
            }
        }

        let navigator = RecordingNavigator::default();
        let blocked = navigator.blocked.clone();
        let mut monitor = Monitor::with_backends(
            database,
            Box::new(SwitchingSource {
                calls: Mutex::new(0),
            }),
            Box::new(navigator),
        )
        .unwrap();

        monitor.tick_at(ts(0)).await.unwrap();
        // 1ms later, a different restricted app: no suppression
        monitor.tick_at(ts(1)).await.unwrap();

        assert_eq!(
            blocked.lock().unwrap().clone(),
            vec!["com.example.a", "com.example.b"]
        );
    }
}
