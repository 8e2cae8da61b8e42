use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, Mutex};

use crate::{probe::IdleProbe, settings::SettingsStore};

/// Fixed delay between timer re-evaluations.
pub const POLL_INTERVAL_SECONDS: u64 = 30;

/// Fraction of the poll interval that must be idle before the tick rolls
/// elapsed time back instead of accumulating.
const IDLE_RATIO_CUTOFF: f64 = 0.8;

/// Outbound engine events, consumed by the gauge and notification seams.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The elapsed counter changed; carries everything a gauge needs for a
    /// proportional fill.
    ElapsedChanged {
        elapsed_seconds: f64,
        threshold_minutes: u32,
        enabled: bool,
    },
    /// The active-time threshold was reached. Emitted once per firing; the
    /// engine has already reset into a fresh cycle when this is observed.
    ThresholdReached,
}

/// Current engine state for status reporting and gauge rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerSnapshot {
    pub elapsed_seconds: f64,
    pub threshold_minutes: u32,
    pub enabled: bool,
}

struct EngineState {
    /// Identity token of the live cycle. A scheduled tick carrying any
    /// other value is stale and must not touch engine state.
    cycle_id: u64,
    elapsed_seconds: f64,
    torn_down: bool,
}

/// Idle-aware break timer.
///
/// Owns the elapsed-active-time counter and the periodic re-evaluation
/// loop. Each tick polls the idle probe, adjusts the counter, and either
/// fires `ThresholdReached` and restarts, or reschedules itself. Exactly
/// one cycle is live at a time; superseded cycles are cancelled
/// cooperatively by the cycle-id check at tick entry.
///
/// All state sits behind a single async mutex, so tick execution is
/// serialized even on a multi-threaded runtime.
#[derive(Clone)]
pub struct BreakTimerEngine {
    state: Arc<Mutex<EngineState>>,
    settings: SettingsStore,
    probe: Arc<dyn IdleProbe>,
    events: broadcast::Sender<EngineEvent>,
    poll_interval: Duration,
}

impl BreakTimerEngine {
    #[must_use]
    pub fn new(settings: SettingsStore, probe: Arc<dyn IdleProbe>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            state: Arc::new(Mutex::new(EngineState {
                cycle_id: 0,
                elapsed_seconds: 0.0,
                torn_down: false,
            })),
            settings,
            probe,
            events,
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECONDS),
        }
    }

    /// Override the poll interval, mainly for tests and embedding hosts.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Subscribe to engine events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Start a fresh timer cycle, superseding any in-flight cycle.
    ///
    /// Minting a new cycle id makes the previous cycle's pending tick a
    /// no-op; there is no other cancellation primitive. Safe to call
    /// repeatedly (user restart, settings change, enable toggle).
    pub async fn start_timer(&self) {
        let mut state = self.state.lock().await;
        self.start_locked(&mut state);
    }

    /// Tear the engine down. Every subsequent tick, for any cycle, no-ops.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.torn_down = true;
    }

    /// Current `(elapsed, threshold, enabled)` triple.
    pub async fn snapshot(&self) -> TimerSnapshot {
        let state = self.state.lock().await;
        TimerSnapshot {
            elapsed_seconds: state.elapsed_seconds,
            threshold_minutes: self.settings.threshold_minutes(),
            enabled: self.settings.enabled(),
        }
    }

    fn start_locked(&self, state: &mut EngineState) {
        state.cycle_id += 1;
        state.elapsed_seconds = 0.0;

        let threshold_minutes = self.settings.threshold_minutes();
        let enabled = self.settings.enabled();
        if enabled && !state.torn_down {
            self.schedule_tick(state.cycle_id, threshold_minutes);
        }

        let _ = self.events.send(EngineEvent::ElapsedChanged {
            elapsed_seconds: 0.0,
            threshold_minutes,
            enabled,
        });
    }

    fn schedule_tick(&self, cycle_id: u64, captured_threshold_minutes: u32) {
        let engine = self.clone();
        let delay = self.poll_interval;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.tick(cycle_id, captured_threshold_minutes).await;
        });
    }

    /// One periodic re-evaluation for the cycle identified by `cycle_id`,
    /// with the threshold captured when that cycle started.
    async fn tick(&self, cycle_id: u64, captured_threshold_minutes: u32) {
        let mut state = self.state.lock().await;

        // Stale cycle, disabled, or torn down: no-op, no reschedule.
        if state.torn_down || state.cycle_id != cycle_id || !self.settings.enabled() {
            return;
        }

        // Threshold was lowered mid-cycle. Start over so the fresh cycle
        // picks up the new value; this tick does no further work.
        if self.settings.threshold_minutes() < captured_threshold_minutes {
            log::info!("Threshold lowered mid-cycle, restarting timer");
            self.start_locked(&mut state);
            return;
        }

        let idle_seconds = self.probe.sample().await;
        let poll_seconds = self.poll_interval.as_secs_f64();

        // A short idle blip still counts the interval as active time. Idle
        // that dominates the poll window rolls elapsed back by at least the
        // full idle gap, clamped at zero.
        #[allow(clippy::cast_precision_loss)]
        let idle = idle_seconds as f64;
        let adjustment = if idle / poll_seconds > IDLE_RATIO_CUTOFF {
            -idle.max(poll_seconds)
        } else {
            poll_seconds
        };
        state.elapsed_seconds = (state.elapsed_seconds + adjustment).max(0.0);

        // Real-valued comparison: fractional minutes accumulate smoothly.
        if state.elapsed_seconds / 60.0 >= f64::from(captured_threshold_minutes) {
            log::info!(
                "Active-time threshold of {captured_threshold_minutes} minutes reached"
            );
            let _ = self.events.send(EngineEvent::ThresholdReached);
            self.start_locked(&mut state);
            return;
        }

        let _ = self.events.send(EngineEvent::ElapsedChanged {
            elapsed_seconds: state.elapsed_seconds,
            threshold_minutes: captured_threshold_minutes,
            enabled: true,
        });
        self.schedule_tick(cycle_id, captured_threshold_minutes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use async_trait::async_trait;
    use std::{collections::VecDeque, sync::Mutex as StdMutex};

    /// Probe replaying a scripted sequence of idle samples, then zeroes.
    struct ScriptedProbe {
        samples: StdMutex<VecDeque<u64>>,
    }

    impl ScriptedProbe {
        fn new(samples: &[u64]) -> Arc<Self> {
            Arc::new(Self {
                samples: StdMutex::new(samples.iter().copied().collect()),
            })
        }
    }

    #[async_trait]
    impl crate::probe::IdleProbe for ScriptedProbe {
        async fn sample(&self) -> u64 {
            self.samples.lock().unwrap().pop_front().unwrap_or(0)
        }
    }

    fn engine_with(settings: Settings, samples: &[u64]) -> BreakTimerEngine {
        BreakTimerEngine::new(
            SettingsStore::in_memory(settings),
            ScriptedProbe::new(samples),
        )
    }

    async fn live_cycle(engine: &BreakTimerEngine) -> u64 {
        engine.state.lock().await.cycle_id
    }

    async fn elapsed(engine: &BreakTimerEngine) -> f64 {
        engine.state.lock().await.elapsed_seconds
    }

    fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_elapsed_accumulates_poll_interval_per_active_tick() {
        let engine = engine_with(Settings::default(), &[0, 0, 0]);
        engine.start_timer().await;
        let cycle = live_cycle(&engine).await;

        for _ in 0..3 {
            engine.tick(cycle, 20).await;
        }
        assert!((elapsed(&engine).await - 90.0).abs() < f64::EPSILON);
        assert_eq!(live_cycle(&engine).await, cycle);
    }

    #[tokio::test]
    async fn test_fires_at_threshold_and_starts_fresh_cycle() {
        let settings = Settings {
            threshold_minutes: 1,
            ..Settings::default()
        };
        let engine = engine_with(settings, &[0, 0]);
        engine.start_timer().await;
        let cycle = live_cycle(&engine).await;
        let mut rx = engine.subscribe();

        // P=30, threshold 60s: tick1 -> 30, no fire.
        engine.tick(cycle, 1).await;
        assert!((elapsed(&engine).await - 30.0).abs() < f64::EPSILON);
        assert!(!drain(&mut rx).contains(&EngineEvent::ThresholdReached));

        // tick2 -> 60 -> fire, reset, new cycle.
        engine.tick(cycle, 1).await;
        assert!(drain(&mut rx).contains(&EngineEvent::ThresholdReached));
        assert!(elapsed(&engine).await.abs() < f64::EPSILON);
        assert_eq!(live_cycle(&engine).await, cycle + 1);
    }

    #[tokio::test]
    async fn test_stale_cycle_tick_is_a_noop() {
        let engine = engine_with(Settings::default(), &[0, 0]);
        engine.start_timer().await;
        let cycle_a = live_cycle(&engine).await;
        engine.tick(cycle_a, 20).await;

        // Restart supersedes cycle A; its pending tick must not mutate.
        engine.start_timer().await;
        let cycle_b = live_cycle(&engine).await;
        assert_ne!(cycle_a, cycle_b);

        engine.tick(cycle_a, 20).await;
        assert!(elapsed(&engine).await.abs() < f64::EPSILON);

        // Cycle B's own first tick proceeds normally.
        engine.tick(cycle_b, 20).await;
        assert!((elapsed(&engine).await - 30.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_threshold_shrink_restarts_cycle() {
        let store = SettingsStore::in_memory(Settings {
            threshold_minutes: 30,
            ..Settings::default()
        });
        let engine = BreakTimerEngine::new(store.clone(), ScriptedProbe::new(&[0, 0]));
        engine.start_timer().await;
        let cycle = live_cycle(&engine).await;
        engine.tick(cycle, 30).await;
        assert!((elapsed(&engine).await - 30.0).abs() < f64::EPSILON);

        // User drags the threshold below the captured value.
        store.set_threshold_minutes(10).unwrap();
        engine.tick(cycle, 30).await;
        assert!(elapsed(&engine).await.abs() < f64::EPSILON);
        assert_eq!(live_cycle(&engine).await, cycle + 1);
    }

    #[tokio::test]
    async fn test_mostly_idle_tick_rolls_elapsed_back() {
        // 100s idle against P=30: ratio 3.33 > 0.8, so subtract
        // max(100, 30) from the accumulated 90s.
        let engine = engine_with(Settings::default(), &[0, 0, 0, 100]);
        engine.start_timer().await;
        let cycle = live_cycle(&engine).await;
        for _ in 0..3 {
            engine.tick(cycle, 20).await;
        }
        engine.tick(cycle, 20).await;
        assert!(elapsed(&engine).await.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_idle_blip_still_counts_as_active() {
        // 10s idle against P=30: ratio 0.33, interval accumulates as usual.
        let engine = engine_with(Settings::default(), &[10]);
        engine.start_timer().await;
        let cycle = live_cycle(&engine).await;
        engine.tick(cycle, 20).await;
        assert!((elapsed(&engine).await - 30.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_rollback_clamps_at_zero() {
        // Idle spike larger than everything accumulated so far.
        let engine = engine_with(Settings::default(), &[0, 600]);
        engine.start_timer().await;
        let cycle = live_cycle(&engine).await;
        engine.tick(cycle, 20).await;
        engine.tick(cycle, 20).await;
        assert!(elapsed(&engine).await.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_disabled_engine_ignores_ticks() {
        let settings = Settings {
            enabled: false,
            ..Settings::default()
        };
        let engine = engine_with(settings, &[0]);
        engine.start_timer().await;
        let cycle = live_cycle(&engine).await;
        engine.tick(cycle, 20).await;
        assert!(elapsed(&engine).await.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_torn_down_engine_ignores_ticks() {
        let engine = engine_with(Settings::default(), &[0]);
        engine.start_timer().await;
        let cycle = live_cycle(&engine).await;
        engine.stop().await;
        engine.tick(cycle, 20).await;
        assert!(elapsed(&engine).await.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_elapsed_changed_carries_gauge_triple() {
        let engine = engine_with(Settings::default(), &[0]);
        engine.start_timer().await;
        let cycle = live_cycle(&engine).await;
        let mut rx = engine.subscribe();

        engine.tick(cycle, 20).await;
        let events = drain(&mut rx);
        assert!(events.contains(&EngineEvent::ElapsedChanged {
            elapsed_seconds: 30.0,
            threshold_minutes: 20,
            enabled: true,
        }));
    }

    #[tokio::test]
    async fn test_fractional_minutes_cross_threshold_smoothly() {
        // P=45, threshold 1 minute: tick1 lands at 0.75 minutes without
        // fire, tick2 at 1.5 minutes fires. No truncation to whole minutes.
        let store = SettingsStore::in_memory(Settings {
            threshold_minutes: 1,
            ..Settings::default()
        });
        let engine = BreakTimerEngine::new(store, ScriptedProbe::new(&[0, 0]))
            .with_poll_interval(Duration::from_secs(45));
        engine.start_timer().await;
        let cycle = live_cycle(&engine).await;
        let mut rx = engine.subscribe();

        engine.tick(cycle, 1).await;
        assert!((elapsed(&engine).await - 45.0).abs() < f64::EPSILON);
        assert!(!drain(&mut rx).contains(&EngineEvent::ThresholdReached));

        engine.tick(cycle, 1).await;
        assert!(drain(&mut rx).contains(&EngineEvent::ThresholdReached));
        assert!(elapsed(&engine).await.abs() < f64::EPSILON);
    }
}
