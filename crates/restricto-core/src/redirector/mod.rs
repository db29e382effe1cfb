use async_trait::async_trait;

#[cfg(target_os = "linux")]
pub mod linux;

/// OS navigation seam: fire-and-forget foreground-surface transitions.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Bring the OS home/launcher surface to the foreground.
    async fn go_home(&self) -> anyhow::Result<()>;

    /// Bring the host application's main surface to the foreground.
    async fn open_host_app(&self) -> anyhow::Result<()>;

    /// Open the host application's restriction notice surface for a package.
    async fn open_restriction_notice(&self, package: &str) -> anyhow::Result<()>;

    /// Show a transient, non-blocking user-visible notice.
    async fn show_notice(&self, message: &str) -> anyhow::Result<()>;
}

/// Which steps of a redirect sequence landed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedirectOutcome {
    pub went_home: bool,
    pub opened_host_app: bool,
    pub opened_notice_screen: bool,
    pub showed_notice: bool,
}

impl RedirectOutcome {
    /// The desired end state (user no longer in the restricted app) is
    /// substantially achieved by the home transition alone.
    #[must_use]
    pub const fn left_restricted_app(&self) -> bool {
        self.went_home
    }
}

/// Executes the redirect sequence that removes a restricted application from
/// the foreground and surfaces the host application instead.
///
/// The sequence is best-effort, not transactional: each step's failure is
/// independently logged and the remaining steps are still attempted.
pub struct Redirector {
    navigator: Box<dyn Navigator>,
}

impl Redirector {
    #[must_use]
    pub fn new(navigator: Box<dyn Navigator>) -> Self {
        Self { navigator }
    }

    /// Redirect away from a restricted package.
    pub async fn block(&self, package: &str) -> RedirectOutcome {
        log::info!("Blocking restricted app: {package}");
        let mut outcome = RedirectOutcome::default();

        match self.navigator.go_home().await {
            Ok(()) => outcome.went_home = true,
            Err(e) => log::warn!("Home transition failed: {e}"),
        }

        match self.navigator.open_host_app().await {
            Ok(()) => outcome.opened_host_app = true,
            // Host app not resolvable is non-fatal, keep going
            Err(e) => log::warn!("Host app transition failed: {e}"),
        }

        match self.navigator.open_restriction_notice(package).await {
            Ok(()) => outcome.opened_notice_screen = true,
            Err(e) => log::warn!("Restriction notice transition failed: {e}"),
        }

        match self
            .navigator
            .show_notice("This app is restricted")
            .await
        {
            Ok(()) => outcome.showed_notice = true,
            Err(e) => log::debug!("Transient notice failed: {e}"),
        }

        outcome
    }
}

/// Create platform-specific navigator
///
/// # Errors
///
/// Returns an error if the current platform is not supported
pub fn create_navigator() -> anyhow::Result<Box<dyn Navigator>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxNavigator::new()?))
    }

    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!("Unsupported platform")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Navigator that records call order and fails on configured steps.
    #[derive(Default)]
    struct ScriptedNavigator {
        calls: Arc<Mutex<Vec<String>>>,
        fail_home: bool,
        fail_host_app: bool,
        fail_notice_screen: bool,
        fail_notice: bool,
    }

    impl ScriptedNavigator {
        fn record(&self, step: &str, fail: bool) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(step.to_string());
            if fail {
                anyhow::bail!("{step} failed")
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Navigator for ScriptedNavigator {
        async fn go_home(&self) -> anyhow::Result<()> {
            self.record("home", self.fail_home)
        }

        async fn open_host_app(&self) -> anyhow::Result<()> {
            self.record("host_app", self.fail_host_app)
        }

        async fn open_restriction_notice(&self, package: &str) -> anyhow::Result<()> {
            self.record(&format!("notice_screen:{package}"), self.fail_notice_screen)
        }

        async fn show_notice(&self, _message: &str) -> anyhow::Result<()> {
            self.record("notice", self.fail_notice)
        }
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let navigator = ScriptedNavigator::default();
        let calls = navigator.calls.clone();
        let redirector = Redirector::new(Box::new(navigator));

        let outcome = redirector.block("com.example.social").await;

        assert_eq!(
            outcome,
            RedirectOutcome {
                went_home: true,
                opened_host_app: true,
                opened_notice_screen: true,
                showed_notice: true,
            }
        );
        let recorded = calls.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec![
                "home",
                "host_app",
                "notice_screen:com.example.social",
                "notice"
            ]
        );
    }

    #[tokio::test]
    async fn test_sequence_continues_past_failures() {
        let redirector = Redirector::new(Box::new(ScriptedNavigator {
            fail_home: true,
            fail_host_app: true,
            ..ScriptedNavigator::default()
        }));

        let outcome = redirector.block("com.example.video").await;

        assert!(!outcome.went_home);
        assert!(!outcome.opened_host_app);
        assert!(outcome.opened_notice_screen);
        assert!(outcome.showed_notice);
        assert!(!outcome.left_restricted_app());
    }

    #[tokio::test]
    async fn test_home_alone_counts_as_leaving() {
        let redirector = Redirector::new(Box::new(ScriptedNavigator {
            fail_host_app: true,
            fail_notice_screen: true,
            fail_notice: true,
            ..ScriptedNavigator::default()
        }));

        let outcome = redirector.block("com.example.games").await;
        assert!(outcome.left_restricted_app());
    }
}
