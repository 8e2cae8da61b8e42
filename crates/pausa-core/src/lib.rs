pub mod config;
pub mod daemon;
pub mod engine;
pub mod ipc;
pub mod notifier;
pub mod probe;
pub mod settings;

pub use daemon::Daemon;
pub use engine::{BreakTimerEngine, EngineEvent, TimerSnapshot, POLL_INTERVAL_SECONDS};
pub use notifier::BreakNotifier;
pub use settings::{Settings, SettingsStore};
