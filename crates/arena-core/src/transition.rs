//! Enter and exit sequences shared by every trigger source.
//!
//! The proximity monitor, auto-enter, and player commands all move players
//! through the same two sequences so the registry and the lifecycle
//! service never disagree about who is inside:
//!
//! - **Enter**: skip if the lifecycle already has the player inside;
//!   otherwise add the registry membership, then ask the lifecycle to
//!   enter. A refused, failed, or panicking enter rolls the membership
//!   back.
//! - **Exit**: if the lifecycle has the player inside, ask it to exit
//!   first; then drop the registry membership.

use arena_types::{ArenaId, PlayerId};
use arena_zone::{LifecycleError, MembershipChange, ZoneError, ZoneRegistry, catch_collaborator};
use tracing::{debug, info, warn};

/// Errors from an enter or exit sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The registry rejected the membership change.
    #[error("zone registry: {source}")]
    Zone {
        /// The underlying registry error.
        #[from]
        source: ZoneError,
    },

    /// The lifecycle service failed.
    #[error("lifecycle: {source}")]
    Lifecycle {
        /// The underlying lifecycle error.
        #[from]
        source: LifecycleError,
    },

    /// The lifecycle service declined to enter the player.
    #[error("lifecycle refused entry for player {0}")]
    Refused(PlayerId),

    /// The lifecycle service panicked.
    #[error("lifecycle panicked for player {player_id}: {message}")]
    Panicked {
        /// The player being moved.
        player_id: PlayerId,
        /// The panic message.
        message: String,
    },
}

/// Result of a successful [`enter_arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOutcome {
    /// The player was admitted and the lifecycle entered.
    Entered,
    /// The lifecycle already had the player inside; nothing was called.
    AlreadyInArena,
}

/// Result of a successful [`exit_arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The lifecycle exited the player and the membership was dropped.
    Exited,
    /// The lifecycle had the player outside; only a stale membership, if
    /// any, was dropped.
    NotInArena,
}

/// Admit `player` to `arena_id` and enter them into the lifecycle.
pub fn enter_arena(
    registry: &ZoneRegistry,
    arena_id: ArenaId,
    player: PlayerId,
    arena_label: &str,
) -> Result<EnterOutcome, TransitionError> {
    let lifecycle = registry.lifecycle();
    if lifecycle.is_player_in_arena(player) {
        debug!(player_id = %player, "Player already in arena, skipping enter");
        return Ok(EnterOutcome::AlreadyInArena);
    }

    let joined = registry.add_player(arena_id, player)? == MembershipChange::Joined;
    let result = match catch_collaborator(|| lifecycle.enter(player, arena_label)) {
        Ok(Ok(true)) => {
            info!(arena_id = %arena_id, player_id = %player, arena_label, "Player entered arena");
            return Ok(EnterOutcome::Entered);
        }
        Ok(Ok(false)) => TransitionError::Refused(player),
        Ok(Err(e)) => TransitionError::from(e),
        Err(message) => TransitionError::Panicked {
            player_id: player,
            message,
        },
    };

    if joined {
        roll_back_membership(registry, arena_id, player);
    }
    warn!(arena_id = %arena_id, player_id = %player, error = %result, "Enter failed");
    Err(result)
}

/// Exit `player` from the lifecycle and drop their membership in
/// `arena_id`.
///
/// A membership that is already gone (unknown or cleared arena) is not an
/// error.
pub fn exit_arena(
    registry: &ZoneRegistry,
    arena_id: ArenaId,
    player: PlayerId,
) -> Result<ExitOutcome, TransitionError> {
    let lifecycle = registry.lifecycle();
    let outcome = if lifecycle.is_player_in_arena(player) {
        let _ = catch_collaborator(|| lifecycle.exit(player)).map_err(|message| TransitionError::Panicked {
            player_id: player,
            message,
        })??;
        ExitOutcome::Exited
    } else {
        debug!(player_id = %player, "Player not in arena, skipping lifecycle exit");
        ExitOutcome::NotInArena
    };

    match registry.remove_player(arena_id, player) {
        Ok(_) | Err(ZoneError::UnknownArena(_)) => {}
        Err(e) => return Err(e.into()),
    }
    if outcome == ExitOutcome::Exited {
        info!(arena_id = %arena_id, player_id = %player, "Player exited arena");
    }
    Ok(outcome)
}

fn roll_back_membership(registry: &ZoneRegistry, arena_id: ArenaId, player: PlayerId) {
    if let Err(e) = registry.remove_player(arena_id, player) {
        warn!(arena_id = %arena_id, player_id = %player, error = %e, "Membership rollback failed");
    }
}
