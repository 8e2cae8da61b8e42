use anyhow::Result;
use std::{
    fs,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, time::interval};

use crate::{
    config::socket_path,
    engine::{BreakTimerEngine, EngineEvent},
    ipc::{listen, DaemonIpcHandler},
    notifier::BreakNotifier,
    probe::create_probe,
    settings::{Settings, SettingsStore},
};

/// How often the daemon re-reads the settings file to observe writes made
/// by the CLI from another process.
const SETTINGS_POLL_SECONDS: u64 = 2;

/// Foreground reminder daemon: engine, notifier, IPC listener, and the
/// settings watcher wired together.
pub struct Daemon {
    engine: BreakTimerEngine,
    store: SettingsStore,
    notifier: Arc<BreakNotifier>,
    ipc_handler: Arc<DaemonIpcHandler>,
    shutdown_signal: Arc<AtomicBool>,
}

impl Daemon {
    #[must_use]
    pub fn new(store: SettingsStore) -> Self {
        let engine = BreakTimerEngine::new(store.clone(), create_probe());
        let shutdown_signal = Arc::new(AtomicBool::new(false));

        Self {
            ipc_handler: Arc::new(DaemonIpcHandler::new(
                engine.clone(),
                shutdown_signal.clone(),
            )),
            engine,
            store,
            notifier: Arc::new(BreakNotifier::new()),
            shutdown_signal,
        }
    }

    /// Run until Ctrl-C or an IPC shutdown request.
    ///
    /// # Errors
    ///
    /// Returns an error if the control socket directory cannot be prepared.
    pub async fn run_with_signals(&self) -> Result<()> {
        let sock_path = socket_path()?;
        if let Some(parent) = sock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let ipc_handler = self.ipc_handler.clone();
        let ipc_sock = sock_path.clone();
        tokio::spawn(async move {
            if let Err(e) = listen(ipc_handler, &ipc_sock).await {
                log::error!("IPC listener failed: {e}");
            }
        });

        self.spawn_event_consumer();
        self.engine.start_timer().await;

        let mut settings_interval = interval(Duration::from_secs(SETTINGS_POLL_SECONDS));
        let mut last_settings = self.store.snapshot();
        log::info!("Daemon started with signal handling and IPC");

        loop {
            tokio::select! {
                _ = settings_interval.tick() => {
                    if let Err(e) = self.refresh_settings(&mut last_settings).await {
                        log::warn!("Failed to refresh settings: {e}");
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

        self.engine.stop().await;
        self.notifier.close();
        let _ = fs::remove_file(&sock_path);
        log::info!("Daemon shut down gracefully.");
        Ok(())
    }

    /// Forward engine events to their collaborators: `ThresholdReached`
    /// becomes a desktop notification, `ElapsedChanged` feeds the gauge
    /// seam (logged here; rendering lives in the host shell).
    fn spawn_event_consumer(&self) {
        let mut rx = self.engine.subscribe();
        let store = self.store.clone();
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(EngineEvent::ThresholdReached) => {
                        let message = store.message();
                        if message.is_empty() {
                            // Empty message suppresses the notification;
                            // the cycle has still been reset.
                            log::debug!("Threshold reached with no message configured");
                        } else if let Err(e) = notifier.show(&message) {
                            log::warn!("Failed to show break notification: {e}");
                        }
                    }
                    Ok(EngineEvent::ElapsedChanged {
                        elapsed_seconds,
                        threshold_minutes,
                        enabled,
                    }) => {
                        log::debug!(
                            "Elapsed {elapsed_seconds:.0}s of {threshold_minutes}min (enabled: {enabled})"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("Event consumer lagged by {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn refresh_settings(&self, last: &mut Settings) -> Result<()> {
        self.store.reload()?;
        let current = self.store.snapshot();
        if current == *last {
            return Ok(());
        }

        if should_restart(last, &current) {
            log::info!("Settings changed, restarting timer");
            self.engine.start_timer().await;
        } else if last.enabled && !current.enabled {
            // The pending tick sees the disabled flag and stops itself.
            log::info!("Reminders disabled");
        }
        *last = current;
        Ok(())
    }
}

/// Whether a settings change requires a fresh timer cycle: the reminder
/// was just enabled, or the threshold changed while enabled. Lowering the
/// threshold is also caught by the engine's own shrink check, but an
/// explicit change notification restarts without waiting for the next
/// tick.
fn should_restart(before: &Settings, after: &Settings) -> bool {
    let turned_on = after.enabled && !before.enabled;
    let threshold_changed = after.enabled && after.threshold_minutes != before.threshold_minutes;
    turned_on || threshold_changed
}
