//! Fixed-interval proximity monitor.
//!
//! The host calls [`ProximityMonitor::tick`] with wall-clock deltas. Once
//! the configured interval has elapsed the monitor runs one
//! [`scan`](ProximityMonitor::scan):
//!
//! 1. Enumerate connected players that have a resolvable position.
//! 2. Classify each against the nearest active zone with a two-radius
//!    hysteresis band: an outside player enters at `enter_radius`, an
//!    inside player stays inside until beyond `exit_radius`.
//! 3. Run the shared enter/exit sequence for every player whose
//!    classification changed.
//! 4. Refresh map markers once if any player was processed.
//!
//! A failure for one player, including a panic in a collaborator, is
//! logged and counted; the rest of the scan continues. The only cross-scan state is each player's last
//! [`ProximityState`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arena_types::{ArenaId, PlayerId, Position, ProximityState};
use arena_zone::{ZoneRegistry, catch_collaborator};
use tracing::{debug, info, warn};

use crate::transition::{self, EnterOutcome, ExitOutcome, TransitionError};

/// A connected player as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectedPlayer {
    /// The player's platform id.
    pub player_id: PlayerId,
    /// Current position, if the host could resolve one.
    pub position: Option<Position>,
}

/// Enumerates connected players.
pub trait PlayerSource: Send + Sync {
    /// All currently connected players.
    fn connected_players(&self) -> Vec<ConnectedPlayer>;
}

/// Refreshes every player's map markers in one batch.
pub trait MarkerRefresher: Send + Sync {
    /// Rebuild all map markers.
    fn refresh_all(&self);
}

/// A marker refresher that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMarkers;

impl MarkerRefresher for NoOpMarkers {
    fn refresh_all(&self) {}
}

/// Proximity monitor parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximitySettings {
    /// Seconds between scans.
    pub interval_seconds: f32,
    /// Distance at or below which an outside player enters.
    pub enter_radius: f32,
    /// Distance at or below which an inside player stays inside.
    pub exit_radius: f32,
    /// Arena players are admitted to.
    pub arena_id: ArenaId,
    /// Label passed to the lifecycle service on entry.
    pub arena_label: String,
}

impl Default for ProximitySettings {
    fn default() -> Self {
        Self {
            interval_seconds: 3.0,
            enter_radius: 50.0,
            exit_radius: 75.0,
            arena_id: ArenaId::new(0),
            arena_label: String::from("default_arena"),
        }
    }
}

/// Services the monitor reads from and drives.
#[derive(Clone)]
pub struct ProximityDeps {
    /// Zone registry, also the source of the lifecycle service.
    pub registry: Arc<ZoneRegistry>,
    /// Connected players.
    pub players: Arc<dyn PlayerSource>,
    /// Batched map marker refresh.
    pub markers: Arc<dyn MarkerRefresher>,
}

/// Counters for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Players with a position that were classified.
    pub processed: usize,
    /// Players that entered the arena.
    pub entered: usize,
    /// Players that exited the arena.
    pub exited: usize,
    /// Transitions skipped because the lifecycle was already there.
    pub skipped: usize,
    /// Players whose transition failed.
    pub failures: usize,
    /// Records dropped because the player disconnected.
    pub discarded: usize,
    /// Whether the marker refresh ran.
    pub markers_refreshed: bool,
}

/// What happened to one player during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Unchanged,
    Entered,
    Exited,
    Skipped,
}

/// Drives automatic entry and exit from player positions.
pub struct ProximityMonitor {
    settings: ProximitySettings,
    deps: ProximityDeps,
    records: BTreeMap<PlayerId, ProximityState>,
    elapsed: f32,
}

impl ProximityMonitor {
    /// Create a monitor with no tracked players.
    pub const fn new(settings: ProximitySettings, deps: ProximityDeps) -> Self {
        Self {
            settings,
            deps,
            records: BTreeMap::new(),
            elapsed: 0.0,
        }
    }

    /// The monitor's settings.
    pub const fn settings(&self) -> &ProximitySettings {
        &self.settings
    }

    /// The registry the monitor drives.
    pub fn registry(&self) -> &Arc<ZoneRegistry> {
        &self.deps.registry
    }

    /// Advance the interval timer and scan once it elapses.
    ///
    /// Negative or non-finite deltas are ignored.
    pub fn tick(&mut self, delta_seconds: f32) -> Option<ScanSummary> {
        if !delta_seconds.is_finite() || delta_seconds < 0.0 {
            debug!(delta_seconds, "Ignoring invalid tick delta");
            return None;
        }
        self.elapsed += delta_seconds;
        if self.elapsed < self.settings.interval_seconds {
            return None;
        }
        self.elapsed = 0.0;
        Some(self.scan())
    }

    /// Run one full scan now.
    pub fn scan(&mut self) -> ScanSummary {
        let players = self.deps.players.connected_players();
        let connected: BTreeSet<PlayerId> = players.iter().map(|p| p.player_id).collect();
        let mut summary = ScanSummary::default();

        for player in players {
            let Some(position) = player.position.filter(Position::is_finite) else {
                continue;
            };
            summary.processed = summary.processed.saturating_add(1);
            match catch_collaborator(|| self.process_player(player.player_id, &position)) {
                Ok(Ok(Step::Unchanged)) => {}
                Ok(Ok(Step::Entered)) => summary.entered = summary.entered.saturating_add(1),
                Ok(Ok(Step::Exited)) => summary.exited = summary.exited.saturating_add(1),
                Ok(Ok(Step::Skipped)) => summary.skipped = summary.skipped.saturating_add(1),
                Ok(Err(e)) => {
                    warn!(player_id = %player.player_id, position = %position, error = %e, "Proximity transition failed");
                    summary.failures = summary.failures.saturating_add(1);
                }
                Err(panic) => {
                    warn!(player_id = %player.player_id, position = %position, panic = %panic, "Proximity scan panicked for player");
                    summary.failures = summary.failures.saturating_add(1);
                }
            }
        }

        let before = self.records.len();
        self.records.retain(|player, _| connected.contains(player));
        summary.discarded = before.saturating_sub(self.records.len());

        if summary.processed > 0 {
            self.deps.markers.refresh_all();
            summary.markers_refreshed = true;
        }

        if summary.entered > 0 || summary.exited > 0 || summary.failures > 0 {
            info!(
                processed = summary.processed,
                entered = summary.entered,
                exited = summary.exited,
                skipped = summary.skipped,
                failures = summary.failures,
                "Proximity scan complete"
            );
        } else {
            debug!(processed = summary.processed, discarded = summary.discarded, "Proximity scan complete");
        }
        summary
    }

    /// Forget every tracked player and reset the interval timer.
    pub fn clear_all(&mut self) {
        let cleared = self.records.len();
        self.records.clear();
        self.elapsed = 0.0;
        info!(cleared, "Proximity records cleared");
    }

    /// The last classification of `player`, if tracked.
    pub fn proximity_state(&self, player: PlayerId) -> Option<ProximityState> {
        self.records.get(&player).copied()
    }

    /// Number of tracked players.
    pub fn tracked_players(&self) -> usize {
        self.records.len()
    }

    /// Classify a player given their previous state and the distance to
    /// the nearest active zone center.
    pub const fn classify(&self, previous: ProximityState, distance: Option<f32>) -> ProximityState {
        let Some(distance) = distance else {
            return ProximityState::Outside;
        };
        let radius = match previous {
            ProximityState::Outside => self.settings.enter_radius,
            ProximityState::Inside => self.settings.exit_radius,
        };
        if distance <= radius {
            ProximityState::Inside
        } else {
            ProximityState::Outside
        }
    }

    fn process_player(&mut self, player: PlayerId, position: &Position) -> Result<Step, TransitionError> {
        let previous = self.records.get(&player).copied().unwrap_or_default();
        let distance = self
            .deps
            .registry
            .nearest_active_zone(position)
            .map(|(_, distance)| distance);
        let next = self.classify(previous, distance);

        let registry = self.deps.registry.as_ref();
        let arena_id = self.settings.arena_id;
        let step = match (previous, next) {
            (ProximityState::Outside, ProximityState::Inside) => {
                // On failure the record stays Outside and the entry is retried next scan.
                match transition::enter_arena(registry, arena_id, player, &self.settings.arena_label)? {
                    EnterOutcome::Entered => Step::Entered,
                    EnterOutcome::AlreadyInArena => Step::Skipped,
                }
            }
            (ProximityState::Inside, ProximityState::Outside) => {
                let member_of = registry.player_arena_id(player).unwrap_or(arena_id);
                match transition::exit_arena(registry, member_of, player)? {
                    ExitOutcome::Exited => Step::Exited,
                    ExitOutcome::NotInArena => Step::Skipped,
                }
            }
            _ => Step::Unchanged,
        };
        self.records.insert(player, next);
        Ok(step)
    }
}
