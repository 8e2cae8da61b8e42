use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::{process::Command, time::timeout};

use super::{IdleProbe, IdleSeconds};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle probe that shells out to `xprintidle`, which prints milliseconds
/// since the last X11 input event.
pub struct XprintidleProbe {
    command: String,
    timeout: Duration,
}

impl XprintidleProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::with_command("xprintidle")
    }

    /// Probe invoking an alternative command, used by tests.
    #[must_use]
    pub fn with_command(command: &str) -> Self {
        Self {
            command: command.to_string(),
            timeout: PROBE_TIMEOUT,
        }
    }

    async fn query(&self) -> Result<IdleSeconds> {
        let output = timeout(self.timeout, Command::new(&self.command).output()).await??;
        if !output.status.success() {
            bail!("{} exited with {}", self.command, output.status);
        }
        let millis: u64 = String::from_utf8_lossy(&output.stdout).trim().parse()?;
        Ok(millis / 1000)
    }
}

impl Default for XprintidleProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdleProbe for XprintidleProbe {
    async fn sample(&self) -> IdleSeconds {
        match self.query().await {
            Ok(seconds) => seconds,
            Err(e) => {
                // Fail open: a broken probe must not stop the reminder.
                log::debug!("Idle probe failed, assuming user is active: {e}");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_fails_open() {
        let probe = XprintidleProbe::with_command("definitely-not-a-real-binary");
        assert_eq!(probe.sample().await, 0);
    }

    #[tokio::test]
    async fn test_non_numeric_output_fails_open() {
        // `uname` runs successfully but does not print milliseconds.
        let probe = XprintidleProbe::with_command("uname");
        assert_eq!(probe.sample().await, 0);
    }
}
