pub mod config;
pub mod detector;
pub mod ipc;
pub mod monitor;
pub mod policy;
pub mod redirector;
pub mod usage;

pub use detector::{ForegroundDetector, ForegroundObservation};
pub use monitor::Monitor;
pub use policy::{Action, CooldownState, EnforcementPolicy};
pub use redirector::{RedirectOutcome, Redirector};
