use async_trait::async_trait;

use super::Navigator;

/// Linux navigator.
///
/// There is no launcher surface or host activity stack to transition to on a
/// desktop session, so every step just logs the transition it would request.
/// Keeps the daemon observable end to end on this platform.
pub struct LinuxNavigator;

impl LinuxNavigator {
    /// Create a new Linux navigator
    ///
    /// # Errors
    ///
    /// Currently always succeeds, but returns `Result` for consistency with
    /// other platforms
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self)
    }
}

#[async_trait]
impl Navigator for LinuxNavigator {
    async fn go_home(&self) -> anyhow::Result<()> {
        log::info!("Navigator: would transition to home surface");
        Ok(())
    }

    async fn open_host_app(&self) -> anyhow::Result<()> {
        log::info!("Navigator: would surface host application");
        Ok(())
    }

    async fn open_restriction_notice(&self, package: &str) -> anyhow::Result<()> {
        log::info!("Navigator: would open restriction notice for {package}");
        Ok(())
    }

    async fn show_notice(&self, message: &str) -> anyhow::Result<()> {
        log::info!("Navigator: {message}");
        Ok(())
    }
}
