use async_trait::async_trait;
use std::sync::Arc;

pub mod xprintidle;

/// Result of one idle query: seconds since the last user input.
pub type IdleSeconds = u64;

/// Capability trait for measuring how long the user has been idle.
///
/// Implementations never fail: any error in the underlying facility is
/// absorbed and reported as zero idle seconds, so the caller treats the
/// user as active (reminders keep firing on wall-clock time).
#[async_trait]
pub trait IdleProbe: Send + Sync {
    /// Seconds the user has been continuously idle.
    async fn sample(&self) -> IdleSeconds;
}

/// Probe for hosts without an idle-measurement facility. Always reports
/// the user as active.
pub struct NullProbe;

#[async_trait]
impl IdleProbe for NullProbe {
    async fn sample(&self) -> IdleSeconds {
        0
    }
}

/// Create the platform idle probe.
#[must_use]
pub fn create_probe() -> Arc<dyn IdleProbe> {
    #[cfg(unix)]
    {
        Arc::new(xprintidle::XprintidleProbe::new())
    }

    #[cfg(not(unix))]
    {
        Arc::new(NullProbe)
    }
}
