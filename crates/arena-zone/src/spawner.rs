//! Structure and decoration spawner contract.
//!
//! The registry calls a [`Spawner`] synchronously while it holds its lock,
//! so implementations must not call back into the registry. Spawning is
//! best-effort: a failure is logged by the registry and the zone is
//! activated with no handles for that spawner.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use arena_types::{ArenaId, SpawnHandle, Zone};

/// Errors a spawner may report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    /// The spawner could not create or remove entities for the arena.
    #[error("spawner failed for arena {arena_id}: {message}")]
    Failed {
        /// The arena being spawned or despawned.
        arena_id: ArenaId,
        /// Human-readable failure detail.
        message: String,
    },
}

/// Which of the two spawners an operation targeted, for log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnerKind {
    /// Walls, floors and other arena structures.
    Structures,
    /// Border glows and other cosmetic props.
    Decorations,
}

impl core::fmt::Display for SpawnerKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Structures => write!(f, "structures"),
            Self::Decorations => write!(f, "decorations"),
        }
    }
}

/// Creates and removes the entities that make up an arena.
pub trait Spawner: Send + Sync {
    /// Create the entities for `zone` and return their handles.
    fn spawn(&self, arena_id: ArenaId, zone: &Zone) -> Result<Vec<SpawnHandle>, SpawnError>;

    /// Remove every entity previously spawned for `arena_id`.
    fn despawn(&self, arena_id: ArenaId) -> Result<(), SpawnError>;
}

/// A call recorded by [`StubSpawner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnCall {
    /// `spawn` was invoked for this arena.
    Spawn(ArenaId),
    /// `despawn` was invoked for this arena.
    Despawn(ArenaId),
}

/// An in-memory spawner that records calls and mints fresh handles.
///
/// Failures can be injected for every arena or for selected arenas, which
/// makes it usable both by tests and by hosts with no real entity backend.
#[derive(Debug)]
pub struct StubSpawner {
    handles_per_spawn: usize,
    fail_all: AtomicBool,
    failing_arenas: Mutex<BTreeSet<ArenaId>>,
    calls: Mutex<Vec<SpawnCall>>,
}

impl StubSpawner {
    /// Create a stub that returns `handles_per_spawn` handles per spawn.
    pub const fn new(handles_per_spawn: usize) -> Self {
        Self {
            handles_per_spawn,
            fail_all: AtomicBool::new(false),
            failing_arenas: Mutex::new(BTreeSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::Release);
    }

    /// Make calls for `arena_id` fail.
    pub fn fail_arena(&self, arena_id: ArenaId) {
        if let Ok(mut failing) = self.failing_arenas.lock() {
            failing.insert(arena_id);
        }
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<SpawnCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of `spawn` calls received for `arena_id`.
    pub fn spawn_count(&self, arena_id: ArenaId) -> usize {
        self.count(SpawnCall::Spawn(arena_id))
    }

    /// Number of `despawn` calls received for `arena_id`.
    pub fn despawn_count(&self, arena_id: ArenaId) -> usize {
        self.count(SpawnCall::Despawn(arena_id))
    }

    fn count(&self, call: SpawnCall) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|&&c| c == call).count())
            .unwrap_or(0)
    }

    fn record(&self, call: SpawnCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn should_fail(&self, arena_id: ArenaId) -> bool {
        self.fail_all.load(Ordering::Acquire)
            || self
                .failing_arenas
                .lock()
                .is_ok_and(|failing| failing.contains(&arena_id))
    }
}

impl Default for StubSpawner {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Spawner for StubSpawner {
    fn spawn(&self, arena_id: ArenaId, _zone: &Zone) -> Result<Vec<SpawnHandle>, SpawnError> {
        self.record(SpawnCall::Spawn(arena_id));
        if self.should_fail(arena_id) {
            return Err(SpawnError::Failed {
                arena_id,
                message: String::from("injected spawn failure"),
            });
        }
        Ok((0..self.handles_per_spawn).map(|_| SpawnHandle::new()).collect())
    }

    fn despawn(&self, arena_id: ArenaId) -> Result<(), SpawnError> {
        self.record(SpawnCall::Despawn(arena_id));
        if self.should_fail(arena_id) {
            return Err(SpawnError::Failed {
                arena_id,
                message: String::from("injected despawn failure"),
            });
        }
        Ok(())
    }
}
