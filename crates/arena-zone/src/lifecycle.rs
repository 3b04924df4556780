//! Player `PvP` lifecycle contract.
//!
//! The lifecycle service owns each player's [`PvpState`]: it snapshots
//! stats and gear on entry and restores them on exit. The zone system only
//! asks it to enter, to exit, and whether a player is already inside.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use arena_types::{PlayerId, PvpState};

/// Errors reported by the lifecycle service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// The service refused the transition for this player.
    #[error("lifecycle rejected player {player_id}: {reason}")]
    Rejected {
        /// The player whose transition was refused.
        player_id: PlayerId,
        /// Why the transition was refused.
        reason: String,
    },

    /// The service could not be reached or is not ready.
    #[error("lifecycle unavailable: {message}")]
    Unavailable {
        /// Human-readable failure detail.
        message: String,
    },
}

/// Authoritative per-player `PvP` state machine.
///
/// Implementations must not call into the zone registry: `exit` is invoked
/// while the registry lock is held during deactivation.
pub trait Lifecycle: Send + Sync {
    /// Move the player into the arena identified by `arena_label`.
    ///
    /// Returns `Ok(false)` when the service declined without error.
    fn enter(&self, player: PlayerId, arena_label: &str) -> Result<bool, LifecycleError>;

    /// Move the player out of whatever arena they are in.
    ///
    /// Returns `Ok(false)` when the player was not in an arena.
    fn exit(&self, player: PlayerId) -> Result<bool, LifecycleError>;

    /// Whether the service considers the player inside an arena.
    fn is_player_in_arena(&self, player: PlayerId) -> bool;

    /// The player's current state.
    fn pvp_state(&self, player: PlayerId) -> PvpState {
        if self.is_player_in_arena(player) {
            PvpState::Active
        } else {
            PvpState::Outside
        }
    }
}

#[derive(Debug, Default)]
struct StubLifecycleInner {
    states: BTreeMap<PlayerId, PvpState>,
    refused: BTreeSet<PlayerId>,
    unavailable: bool,
    enter_calls: Vec<(PlayerId, String)>,
    exit_calls: Vec<PlayerId>,
}

/// An in-memory lifecycle that flips players between `Outside` and
/// `Active` and records every call.
#[derive(Debug, Default)]
pub struct StubLifecycle {
    inner: Mutex<StubLifecycleInner>,
}

impl StubLifecycle {
    /// Create an empty stub lifecycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `enter` decline this player.
    pub fn refuse(&self, player: PlayerId) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.refused.insert(player);
        }
    }

    /// Make every call fail with [`LifecycleError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.unavailable = unavailable;
        }
    }

    /// Force a player's state, e.g. to simulate an out-of-band entry or a
    /// transition in progress.
    pub fn set_state(&self, player: PlayerId, state: PvpState) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.states.insert(player, state);
        }
    }

    /// Every `enter` call received, with the arena label.
    pub fn enter_calls(&self) -> Vec<(PlayerId, String)> {
        self.inner
            .lock()
            .map(|inner| inner.enter_calls.clone())
            .unwrap_or_default()
    }

    /// Every `exit` call received.
    pub fn exit_calls(&self) -> Vec<PlayerId> {
        self.inner
            .lock()
            .map(|inner| inner.exit_calls.clone())
            .unwrap_or_default()
    }

    /// Number of `exit` calls received for `player`.
    pub fn exit_count(&self, player: PlayerId) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.exit_calls.iter().filter(|&&p| p == player).count())
            .unwrap_or(0)
    }
}

impl Lifecycle for StubLifecycle {
    fn enter(&self, player: PlayerId, arena_label: &str) -> Result<bool, LifecycleError> {
        let Ok(mut inner) = self.inner.lock() else {
            return Err(LifecycleError::Unavailable {
                message: String::from("stub lifecycle lock poisoned"),
            });
        };
        inner.enter_calls.push((player, arena_label.to_owned()));
        if inner.unavailable {
            return Err(LifecycleError::Unavailable {
                message: String::from("stub lifecycle offline"),
            });
        }
        if inner.refused.contains(&player) {
            return Ok(false);
        }
        inner.states.insert(player, PvpState::Active);
        Ok(true)
    }

    fn exit(&self, player: PlayerId) -> Result<bool, LifecycleError> {
        let Ok(mut inner) = self.inner.lock() else {
            return Err(LifecycleError::Unavailable {
                message: String::from("stub lifecycle lock poisoned"),
            });
        };
        inner.exit_calls.push(player);
        if inner.unavailable {
            return Err(LifecycleError::Unavailable {
                message: String::from("stub lifecycle offline"),
            });
        }
        let previous = inner.states.insert(player, PvpState::Outside);
        Ok(previous.is_some_and(|s| s != PvpState::Outside))
    }

    fn is_player_in_arena(&self, player: PlayerId) -> bool {
        self.inner.lock().is_ok_and(|inner| {
            inner
                .states
                .get(&player)
                .is_some_and(|s| *s != PvpState::Outside)
        })
    }

    fn pvp_state(&self, player: PlayerId) -> PvpState {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.states.get(&player).copied())
            .unwrap_or_default()
    }
}
