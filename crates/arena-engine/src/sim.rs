//! Simulated host collaborators.
//!
//! The engine has no game server behind it, so it drives the arena
//! system with an in-process world: players random-walk around the
//! default arena, a lifecycle service walks through the snapshot and
//! restore states, and the spawners mint handles and log what they would
//! place.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use arena_core::{ConnectedPlayer, MarkerRefresher, PlayerSource};
use arena_types::{ArenaId, PlayerId, Position, PvpState, SpawnHandle, Zone};
use arena_zone::{Lifecycle, LifecycleError, SpawnError, Spawner, SpawnerKind, geometry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, info};

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// Simulation parameters, read from the `simulation` section of
/// `arena-config.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimConfig {
    /// Number of simulated players.
    #[serde(default = "default_player_count")]
    pub player_count: u32,

    /// RNG seed for player movement.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Maximum distance a player moves per step along each axis.
    #[serde(default = "default_step_size")]
    pub step_size: f32,

    /// Players never wander further than this from the roam center.
    #[serde(default = "default_roam_radius")]
    pub roam_radius: f32,

    /// Every n-th player opts into auto-enter (0 = nobody).
    #[serde(default = "default_auto_enter_every")]
    pub auto_enter_every: u32,

    /// Structures minted per structure spawn.
    #[serde(default = "default_structures_per_zone")]
    pub structures_per_zone: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            player_count: default_player_count(),
            seed: default_seed(),
            step_size: default_step_size(),
            roam_radius: default_roam_radius(),
            auto_enter_every: default_auto_enter_every(),
            structures_per_zone: default_structures_per_zone(),
        }
    }
}

const fn default_player_count() -> u32 {
    8
}

const fn default_seed() -> u64 {
    42
}

const fn default_step_size() -> f32 {
    12.0
}

const fn default_roam_radius() -> f32 {
    120.0
}

const fn default_auto_enter_every() -> u32 {
    3
}

const fn default_structures_per_zone() -> u32 {
    4
}

// -----------------------------------------------------------------------
// Players
// -----------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct SimPlayer {
    player_id: PlayerId,
    position: Position,
}

struct WorldInner {
    rng: StdRng,
    players: Vec<SimPlayer>,
}

/// Random-walking players around a roam center.
pub struct SimWorld {
    center: Position,
    step_size: f32,
    roam_radius: f32,
    inner: Mutex<WorldInner>,
}

impl SimWorld {
    /// Scatter `config.player_count` players around `center`.
    ///
    /// Player ids start at 1.
    pub fn new(config: &SimConfig, center: Position) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let spread = config.roam_radius.max(0.0);
        let players = (1..=u64::from(config.player_count))
            .map(|raw| {
                let angle = rng.random_range(0.0..std::f32::consts::TAU);
                let distance = rng.random_range(0.0..=spread);
                SimPlayer {
                    player_id: PlayerId::new(raw),
                    position: Position::new(
                        distance.mul_add(angle.cos(), center.x),
                        center.y,
                        distance.mul_add(angle.sin(), center.z),
                    ),
                }
            })
            .collect();
        Self {
            center,
            step_size: config.step_size.max(0.0),
            roam_radius: spread,
            inner: Mutex::new(WorldInner { rng, players }),
        }
    }

    /// Move every player one random step. Steps that would leave the roam
    /// radius are dropped.
    pub fn step(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let WorldInner { rng, players } = &mut *inner;
        for player in players.iter_mut() {
            let dx = rng.random_range(-self.step_size..=self.step_size);
            let dz = rng.random_range(-self.step_size..=self.step_size);
            let next = Position::new(player.position.x + dx, player.position.y, player.position.z + dz);
            if next.planar_distance(&self.center) <= self.roam_radius {
                player.position = next;
            }
        }
    }

    /// Ids of every simulated player.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.inner
            .lock()
            .map(|inner| inner.players.iter().map(|p| p.player_id).collect())
            .unwrap_or_default()
    }
}

impl PlayerSource for SimWorld {
    fn connected_players(&self) -> Vec<ConnectedPlayer> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .players
                    .iter()
                    .map(|p| ConnectedPlayer {
                        player_id: p.player_id,
                        position: Some(p.position),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// -----------------------------------------------------------------------
// Lifecycle
// -----------------------------------------------------------------------

/// A lifecycle service that snapshots on entry and restores on exit.
///
/// The intermediate `Snapshot` and `Restoring` states are passed through
/// under the state lock, so callers only ever observe `Outside` or
/// `Active`.
#[derive(Debug, Default)]
pub struct SimLifecycle {
    states: Mutex<BTreeMap<PlayerId, PvpState>>,
}

impl SimLifecycle {
    /// Create a lifecycle with every player outside.
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(&self, player: PlayerId, from: PvpState, via: PvpState, to: PvpState) -> Result<bool, LifecycleError> {
        let Ok(mut states) = self.states.lock() else {
            return Err(LifecycleError::Unavailable {
                message: String::from("lifecycle state lock poisoned"),
            });
        };
        let current = states.get(&player).copied().unwrap_or(PvpState::Outside);
        if current != from {
            debug!(player_id = %player, state = ?current, "Lifecycle transition not applicable");
            return Ok(false);
        }
        debug!(player_id = %player, from = ?from, via = ?via, to = ?to, "Lifecycle transition");
        states.insert(player, to);
        Ok(true)
    }
}

impl Lifecycle for SimLifecycle {
    fn enter(&self, player: PlayerId, arena_label: &str) -> Result<bool, LifecycleError> {
        let entered = self.transition(player, PvpState::Outside, PvpState::Snapshot, PvpState::Active)?;
        if entered {
            info!(player_id = %player, arena_label, "Snapshot taken, player active");
        }
        Ok(entered)
    }

    fn exit(&self, player: PlayerId) -> Result<bool, LifecycleError> {
        let exited = self.transition(player, PvpState::Active, PvpState::Restoring, PvpState::Outside)?;
        if exited {
            info!(player_id = %player, "Snapshot restored, player outside");
        }
        Ok(exited)
    }

    fn is_player_in_arena(&self, player: PlayerId) -> bool {
        self.pvp_state(player) != PvpState::Outside
    }

    fn pvp_state(&self, player: PlayerId) -> PvpState {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(&player).copied())
            .unwrap_or(PvpState::Outside)
    }
}

// -----------------------------------------------------------------------
// Spawners
// -----------------------------------------------------------------------

/// A spawner that mints handles and remembers them per arena.
///
/// Structure spawners mint a fixed number of handles; decoration
/// spawners mint one per border glow along the zone outline.
#[derive(Debug)]
pub struct SimSpawner {
    kind: SpawnerKind,
    structures_per_zone: u32,
    spawned: Mutex<BTreeMap<ArenaId, Vec<SpawnHandle>>>,
}

impl SimSpawner {
    /// Create a spawner of the given kind.
    pub fn new(kind: SpawnerKind, structures_per_zone: u32) -> Self {
        Self {
            kind,
            structures_per_zone,
            spawned: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of live handles for `arena_id`.
    pub fn live_count(&self, arena_id: ArenaId) -> usize {
        self.spawned
            .lock()
            .map(|spawned| spawned.get(&arena_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn handle_count(&self, zone: &Zone) -> usize {
        match self.kind {
            SpawnerKind::Structures => usize::try_from(self.structures_per_zone).unwrap_or(0),
            SpawnerKind::Decorations => geometry::border_points(zone, zone.flags.glow_spacing).len(),
        }
    }
}

impl Spawner for SimSpawner {
    fn spawn(&self, arena_id: ArenaId, zone: &Zone) -> Result<Vec<SpawnHandle>, SpawnError> {
        let Ok(mut spawned) = self.spawned.lock() else {
            return Err(SpawnError::Failed {
                arena_id,
                message: format!("{} spawner lock poisoned", self.kind),
            });
        };
        let handles: Vec<SpawnHandle> = (0..self.handle_count(zone)).map(|_| SpawnHandle::new()).collect();
        spawned.entry(arena_id).or_default().extend(handles.iter().copied());
        info!(arena_id = %arena_id, kind = %self.kind, count = handles.len(), zone = %zone.name, "Spawned");
        Ok(handles)
    }

    fn despawn(&self, arena_id: ArenaId) -> Result<(), SpawnError> {
        let Ok(mut spawned) = self.spawned.lock() else {
            return Err(SpawnError::Failed {
                arena_id,
                message: format!("{} spawner lock poisoned", self.kind),
            });
        };
        let removed = spawned.remove(&arena_id).as_ref().map_or(0, Vec::len);
        info!(arena_id = %arena_id, kind = %self.kind, count = removed, "Despawned");
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Markers
// -----------------------------------------------------------------------

/// Counts marker refreshes and logs them.
#[derive(Debug, Default)]
pub struct LogMarkers {
    refreshes: AtomicU64,
}

impl LogMarkers {
    /// Number of refreshes so far.
    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}

impl MarkerRefresher for LogMarkers {
    fn refresh_all(&self) {
        let count = self.refreshes.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        debug!(refresh = count, "Map markers refreshed");
    }
}
