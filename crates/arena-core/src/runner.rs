//! Host loop driving the proximity monitor.
//!
//! [`run_host_loop`] measures real elapsed time between iterations and
//! feeds it to [`ProximityMonitor::tick`], so scans happen on the
//! monitor's own interval regardless of the host tick rate. The loop
//! stops when [`HostControl::request_stop`] is called or after
//! `max_ticks` iterations. [`shutdown`] tears down every zone and clears
//! the monitor and auto-enter state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arena_zone::{ClearSummary, ZoneRegistry};
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

use crate::auto_enter::AutoEnterService;
use crate::proximity::{ProximityMonitor, ScanSummary};

/// Why the host loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEndReason {
    /// The configured tick limit was reached.
    MaxTicksReached,
    /// A stop was requested.
    StopRequested,
}

/// Result of a host loop run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostResult {
    /// Why the loop ended.
    pub end_reason: HostEndReason,
    /// Host ticks executed.
    pub total_ticks: u64,
    /// Proximity scans that ran.
    pub total_scans: u64,
    /// The most recent scan, if any ran.
    pub last_scan: Option<ScanSummary>,
}

/// Called after every proximity scan.
pub trait ScanCallback: Send {
    /// Observe a completed scan.
    fn on_scan(&mut self, summary: &ScanSummary, monitor: &ProximityMonitor);
}

/// A scan callback that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl ScanCallback for NoOpCallback {
    fn on_scan(&mut self, _summary: &ScanSummary, _monitor: &ProximityMonitor) {}
}

/// Shared control state for the host loop.
#[derive(Debug)]
pub struct HostControl {
    stop_requested: AtomicBool,
    stop_notify: Notify,
    tick_interval_ms: AtomicU64,
    max_ticks: u64,
}

impl HostControl {
    /// Create control state. `max_ticks` of `0` means unlimited.
    pub fn new(tick_interval_ms: u64, max_ticks: u64) -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            tick_interval_ms: AtomicU64::new(tick_interval_ms),
            max_ticks,
        }
    }

    /// Ask the loop to stop, waking it if it is sleeping.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_one();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Current sleep between host ticks.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Change the sleep between host ticks, returning the previous value.
    pub fn set_tick_interval_ms(&self, ms: u64) -> u64 {
        self.tick_interval_ms.swap(ms, Ordering::AcqRel)
    }

    /// Tick limit, `0` for unlimited.
    pub const fn max_ticks(&self) -> u64 {
        self.max_ticks
    }

    /// Whether `ticks` has reached the limit.
    pub const fn tick_limit_reached(&self, ticks: u64) -> bool {
        self.max_ticks > 0 && ticks >= self.max_ticks
    }
}

/// Drive `monitor` until stopped or the tick limit is reached.
pub async fn run_host_loop(
    monitor: &mut ProximityMonitor,
    control: &HostControl,
    callback: &mut dyn ScanCallback,
) -> HostResult {
    let mut total_ticks: u64 = 0;
    let mut total_scans: u64 = 0;
    let mut last_scan = None;
    let mut last_tick = Instant::now();

    info!(
        tick_interval_ms = control.tick_interval_ms(),
        max_ticks = control.max_ticks(),
        scan_interval_seconds = monitor.settings().interval_seconds,
        "Host loop starting"
    );

    let end_reason = loop {
        if control.is_stop_requested() {
            break HostEndReason::StopRequested;
        }

        let interval_ms = control.tick_interval_ms();
        if interval_ms > 0 {
            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
                () = control.stop_notify.notified() => {}
            }
            if control.is_stop_requested() {
                break HostEndReason::StopRequested;
            }
        }

        let now = Instant::now();
        let delta = now.duration_since(last_tick).as_secs_f32();
        last_tick = now;

        if let Some(summary) = monitor.tick(delta) {
            total_scans = total_scans.saturating_add(1);
            callback.on_scan(&summary, monitor);
            last_scan = Some(summary);
        }

        total_ticks = total_ticks.saturating_add(1);
        if control.tick_limit_reached(total_ticks) {
            break HostEndReason::MaxTicksReached;
        }
    };

    let result = HostResult {
        end_reason,
        total_ticks,
        total_scans,
        last_scan,
    };
    log_host_end(&result);
    result
}

/// Log how the host loop ended.
pub fn log_host_end(result: &HostResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        total_scans = result.total_scans,
        "Host loop ended"
    );
    if result.last_scan.is_none() {
        warn!("Host loop ended with no proximity scans");
    }
}

/// Deactivate and forget every zone, clear proximity records, and reset
/// auto-enter.
pub fn shutdown(
    registry: &ZoneRegistry,
    monitor: &mut ProximityMonitor,
    auto_enter: &AutoEnterService,
) -> ClearSummary {
    let summary = registry.clear_all();
    monitor.clear_all();
    auto_enter.reset_all(Utc::now());
    info!(
        deactivated = summary.deactivated,
        removed = summary.removed,
        "Arena system shut down"
    );
    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use arena_types::{ArenaId, PlayerId, Position, Zone};
    use arena_zone::{RegistrySettings, StubLifecycle, StubSpawner, ZoneCollaborators};

    use super::*;
    use crate::auto_enter::AutoEnterSettings;
    use crate::proximity::{ConnectedPlayer, NoOpMarkers, PlayerSource, ProximityDeps, ProximitySettings};

    struct StaticPlayers(Mutex<Vec<ConnectedPlayer>>);

    impl PlayerSource for StaticPlayers {
        fn connected_players(&self) -> Vec<ConnectedPlayer> {
            self.0.lock().unwrap().clone()
        }
    }

    fn make_monitor(players: Vec<ConnectedPlayer>) -> (ProximityMonitor, Arc<ZoneRegistry>, Arc<StubLifecycle>) {
        let lifecycle = Arc::new(StubLifecycle::new());
        let registry = Arc::new(ZoneRegistry::new(
            RegistrySettings::default(),
            ZoneCollaborators {
                structures: Arc::new(StubSpawner::default()),
                decorations: Arc::new(StubSpawner::default()),
                lifecycle: lifecycle.clone(),
            },
        ));
        registry
            .activate(ArenaId::new(0), Zone::circle("Pit", Position::default(), 50.0))
            .unwrap();
        let monitor = ProximityMonitor::new(
            ProximitySettings::default(),
            ProximityDeps {
                registry: Arc::clone(&registry),
                players: Arc::new(StaticPlayers(Mutex::new(players))),
                markers: Arc::new(NoOpMarkers),
            },
        );
        (monitor, registry, lifecycle)
    }

    struct CountingCallback {
        scans: u64,
    }

    impl ScanCallback for CountingCallback {
        fn on_scan(&mut self, _summary: &ScanSummary, _monitor: &ProximityMonitor) {
            self.scans = self.scans.saturating_add(1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_by_max_ticks_scans_on_interval() {
        let (mut monitor, _registry, _lifecycle) = make_monitor(Vec::new());
        let control = HostControl::new(1000, 7);
        let mut callback = CountingCallback { scans: 0 };

        let result = run_host_loop(&mut monitor, &control, &mut callback).await;

        assert_eq!(result.end_reason, HostEndReason::MaxTicksReached);
        assert_eq!(result.total_ticks, 7);
        assert_eq!(result.total_scans, 2);
        assert_eq!(callback.scans, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_start_runs_nothing() {
        let (mut monitor, _registry, _lifecycle) = make_monitor(Vec::new());
        let control = HostControl::new(1000, 0);
        control.request_stop();

        let result = run_host_loop(&mut monitor, &control, &mut NoOpCallback).await;

        assert_eq!(result.end_reason, HostEndReason::StopRequested);
        assert_eq!(result.total_ticks, 0);
        assert!(result.last_scan.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_from_another_task_wakes_the_loop() {
        let (mut monitor, _registry, _lifecycle) = make_monitor(Vec::new());
        let control = Arc::new(HostControl::new(60_000, 0));
        let stopper = Arc::clone(&control);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            stopper.request_stop();
        });

        let result = run_host_loop(&mut monitor, &control, &mut NoOpCallback).await;
        handle.await.unwrap();

        assert_eq!(result.end_reason, HostEndReason::StopRequested);
        assert_eq!(result.total_ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_enters_nearby_player() {
        let player = PlayerId::new(11);
        let (mut monitor, registry, _lifecycle) = make_monitor(vec![ConnectedPlayer {
            player_id: player,
            position: Some(Position::new(10.0, 0.0, 0.0)),
        }]);
        let control = HostControl::new(500, 6);

        let result = run_host_loop(&mut monitor, &control, &mut NoOpCallback).await;

        assert_eq!(result.total_scans, 1);
        assert_eq!(result.last_scan.map(|s| s.entered), Some(1));
        assert!(registry.is_player_in_any_arena(player));
    }

    #[test]
    fn tick_interval_is_adjustable() {
        let control = HostControl::new(250, 0);
        assert_eq!(control.set_tick_interval_ms(100), 250);
        assert_eq!(control.tick_interval_ms(), 100);
        assert!(!control.tick_limit_reached(1_000));
    }

    #[test]
    fn shutdown_clears_everything() {
        let player = PlayerId::new(3);
        let (mut monitor, registry, lifecycle) = make_monitor(vec![ConnectedPlayer {
            player_id: player,
            position: Some(Position::new(1.0, 0.0, 1.0)),
        }]);
        let auto_enter = AutoEnterService::new(AutoEnterSettings::default(), Arc::clone(&registry));
        let _ = auto_enter.enable(player, Utc::now());
        let _ = monitor.scan();
        assert_eq!(monitor.tracked_players(), 1);

        let summary = shutdown(&registry, &mut monitor, &auto_enter);

        assert_eq!(summary.deactivated, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(registry.zone_count(), 0);
        assert_eq!(monitor.tracked_players(), 0);
        assert_eq!(auto_enter.enabled_count(), 0);
        assert_eq!(lifecycle.exit_count(player), 1);
    }
}
