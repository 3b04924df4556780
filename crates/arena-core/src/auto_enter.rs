//! Opt-in automatic arena entry.
//!
//! Players who enable auto-enter are pulled into the arena when they come
//! within `enter_radius` of an active zone, at most once per cooldown. The
//! cooldown is measured on wall-clock timestamps supplied by the caller,
//! so it does not depend on how often the host ticks.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use arena_types::{ArenaId, PlayerId, Position};
use arena_zone::ZoneRegistry;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::proximity::ConnectedPlayer;
use crate::transition::{self, EnterOutcome, TransitionError};

/// Errors from an auto-enter attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AutoEnterError {
    /// The enter sequence failed.
    #[error("auto-enter transition failed: {source}")]
    Transition {
        /// The underlying transition error.
        #[from]
        source: TransitionError,
    },

    /// A thread panicked while holding the auto-enter state lock.
    #[error("auto-enter state lock poisoned")]
    LockPoisoned,
}

/// Auto-enter parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoEnterSettings {
    /// Minimum time between two attempts for one player.
    pub cooldown: TimeDelta,
    /// Distance to the nearest active zone center that triggers entry.
    pub enter_radius: f32,
    /// Arena players are admitted to.
    pub arena_id: ArenaId,
    /// Label passed to the lifecycle service on entry.
    pub arena_label: String,
}

impl Default for AutoEnterSettings {
    fn default() -> Self {
        Self {
            cooldown: TimeDelta::seconds(5),
            enter_radius: 50.0,
            arena_id: ArenaId::new(0),
            arena_label: String::from("default_arena"),
        }
    }
}

/// Per-player auto-enter record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoEnterStats {
    /// Whether auto-enter is currently enabled.
    pub enabled: bool,
    /// When the player last enabled auto-enter.
    pub enabled_at: Option<DateTime<Utc>>,
    /// When the player last disabled auto-enter.
    pub disabled_at: Option<DateTime<Utc>>,
    /// Attempts that reached the enter sequence.
    pub attempts: u32,
    /// Attempts that entered the player.
    pub entries: u32,
    /// Start of the current cooldown.
    pub last_attempt: Option<DateTime<Utc>>,
}

/// Aggregate counters across all players.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoEnterStatistics {
    /// Players with auto-enter enabled.
    pub players_enabled: usize,
    /// Successful auto-entries across all players.
    pub total_entries: u64,
}

/// Result of [`AutoEnterService::try_auto_enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoEnterOutcome {
    /// The player was entered into the arena.
    Entered,
    /// The player has not enabled auto-enter.
    NotEnabled,
    /// The last attempt was too recent.
    CoolingDown {
        /// Time left until the next attempt is allowed.
        remaining: TimeDelta,
    },
    /// The lifecycle already has the player inside.
    AlreadyInArena,
    /// No active zone center is within `enter_radius`.
    OutOfRange,
}

/// Tracks which players opted in and enforces the cooldown.
pub struct AutoEnterService {
    settings: AutoEnterSettings,
    registry: Arc<ZoneRegistry>,
    players: Mutex<BTreeMap<PlayerId, AutoEnterStats>>,
}

impl AutoEnterService {
    /// Create a service with nobody opted in.
    pub const fn new(settings: AutoEnterSettings, registry: Arc<ZoneRegistry>) -> Self {
        Self {
            settings,
            registry,
            players: Mutex::new(BTreeMap::new()),
        }
    }

    /// Opt `player` in. Returns `false` if they already were.
    pub fn enable(&self, player: PlayerId, now: DateTime<Utc>) -> bool {
        let Ok(mut players) = self.players.lock() else {
            return false;
        };
        let stats = players.entry(player).or_default();
        if stats.enabled {
            debug!(player_id = %player, "Auto-enter already enabled");
            return false;
        }
        stats.enabled = true;
        stats.enabled_at = Some(now);
        info!(player_id = %player, "Auto-enter enabled");
        true
    }

    /// Opt `player` out. Returns `false` if they were not opted in.
    pub fn disable(&self, player: PlayerId, now: DateTime<Utc>) -> bool {
        let Ok(mut players) = self.players.lock() else {
            return false;
        };
        match players.get_mut(&player) {
            Some(stats) if stats.enabled => {
                stats.enabled = false;
                stats.disabled_at = Some(now);
                info!(player_id = %player, "Auto-enter disabled");
                true
            }
            _ => false,
        }
    }

    /// Whether `player` has opted in.
    pub fn is_enabled(&self, player: PlayerId) -> bool {
        self.players
            .lock()
            .is_ok_and(|players| players.get(&player).is_some_and(|s| s.enabled))
    }

    /// Number of opted-in players.
    pub fn enabled_count(&self) -> usize {
        self.players
            .lock()
            .map(|players| players.values().filter(|s| s.enabled).count())
            .unwrap_or(0)
    }

    /// The record for `player`, if they ever opted in.
    pub fn stats(&self, player: PlayerId) -> Option<AutoEnterStats> {
        self.players
            .lock()
            .ok()
            .and_then(|players| players.get(&player).copied())
    }

    /// Aggregate counters.
    pub fn statistics(&self) -> AutoEnterStatistics {
        let Ok(players) = self.players.lock() else {
            return AutoEnterStatistics::default();
        };
        AutoEnterStatistics {
            players_enabled: players.values().filter(|s| s.enabled).count(),
            total_entries: players
                .values()
                .fold(0_u64, |acc, s| acc.saturating_add(u64::from(s.entries))),
        }
    }

    /// Opt everybody out, keeping their counters.
    pub fn reset_all(&self, now: DateTime<Utc>) {
        let Ok(mut players) = self.players.lock() else {
            return;
        };
        for stats in players.values_mut().filter(|s| s.enabled) {
            stats.enabled = false;
            stats.disabled_at = Some(now);
        }
        info!(players = players.len(), "Auto-enter reset for all players");
    }

    /// Whether `position` is close enough to an active zone to trigger
    /// entry for an opted-in player.
    pub fn should_trigger(&self, player: PlayerId, position: &Position) -> bool {
        self.is_enabled(player) && self.in_range(position)
    }

    /// Enter `player` if they opted in, are not cooling down, are not
    /// already inside, and are within range.
    ///
    /// Only attempts that reach the enter sequence start a cooldown.
    pub fn try_auto_enter(
        &self,
        player: PlayerId,
        position: &Position,
        now: DateTime<Utc>,
    ) -> Result<AutoEnterOutcome, AutoEnterError> {
        {
            let Ok(mut players) = self.players.lock() else {
                return Err(AutoEnterError::LockPoisoned);
            };
            let Some(stats) = players.get_mut(&player).filter(|s| s.enabled) else {
                return Ok(AutoEnterOutcome::NotEnabled);
            };
            if let Some(remaining) = self.cooldown_remaining(stats, now) {
                debug!(player_id = %player, remaining_ms = remaining.num_milliseconds(), "Auto-enter cooling down");
                return Ok(AutoEnterOutcome::CoolingDown { remaining });
            }
            if self.registry.lifecycle().is_player_in_arena(player) {
                return Ok(AutoEnterOutcome::AlreadyInArena);
            }
            if !self.in_range(position) {
                return Ok(AutoEnterOutcome::OutOfRange);
            }
            stats.attempts = stats.attempts.saturating_add(1);
            stats.last_attempt = Some(now);
        }

        let outcome = transition::enter_arena(
            &self.registry,
            self.settings.arena_id,
            player,
            &self.settings.arena_label,
        )?;
        match outcome {
            EnterOutcome::Entered => {
                if let Ok(mut players) = self.players.lock() {
                    if let Some(stats) = players.get_mut(&player) {
                        stats.entries = stats.entries.saturating_add(1);
                    }
                }
                info!(player_id = %player, position = %position, "Auto-enter succeeded");
                Ok(AutoEnterOutcome::Entered)
            }
            EnterOutcome::AlreadyInArena => Ok(AutoEnterOutcome::AlreadyInArena),
        }
    }

    /// Attempt auto-enter for every opted-in connected player.
    ///
    /// Returns the number of players entered. Per-player failures are
    /// logged and skipped.
    pub fn process_all(&self, players: &[ConnectedPlayer], now: DateTime<Utc>) -> usize {
        let mut entered: usize = 0;
        for player in players {
            let Some(position) = player.position else {
                continue;
            };
            if !self.is_enabled(player.player_id) {
                continue;
            }
            match self.try_auto_enter(player.player_id, &position, now) {
                Ok(AutoEnterOutcome::Entered) => entered = entered.saturating_add(1),
                Ok(_) => {}
                Err(e) => warn!(player_id = %player.player_id, error = %e, "Auto-enter failed"),
            }
        }
        entered
    }

    fn cooldown_remaining(&self, stats: &AutoEnterStats, now: DateTime<Utc>) -> Option<TimeDelta> {
        let last = stats.last_attempt?;
        let elapsed = now.signed_duration_since(last);
        if elapsed >= self.settings.cooldown {
            return None;
        }
        self.settings.cooldown.checked_sub(&elapsed)
    }

    fn in_range(&self, position: &Position) -> bool {
        self.registry
            .nearest_active_zone(position)
            .is_some_and(|(_, distance)| distance <= self.settings.enter_radius)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use arena_types::{PvpState, Zone};
    use arena_zone::{Lifecycle, RegistrySettings, StubLifecycle, StubSpawner, ZoneCollaborators};

    use super::*;

    fn make_service() -> (AutoEnterService, Arc<StubLifecycle>) {
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
        (AutoEnterService::new(AutoEnterSettings::default(), registry), lifecycle)
    }

    fn near() -> Position {
        Position::new(10.0, 0.0, 0.0)
    }

    fn far() -> Position {
        Position::new(500.0, 0.0, 0.0)
    }

    #[test]
    fn enable_and_disable_are_idempotent() {
        let (service, _) = make_service();
        let now = Utc::now();
        let player = PlayerId::new(1);
        assert!(service.enable(player, now));
        assert!(!service.enable(player, now));
        assert_eq!(service.enabled_count(), 1);
        assert!(service.disable(player, now));
        assert!(!service.disable(player, now));
        assert!(!service.is_enabled(player));
        assert!(service.stats(player).unwrap().disabled_at.is_some());
    }

    #[test]
    fn not_enabled_player_is_ignored() {
        let (service, lifecycle) = make_service();
        let outcome = service.try_auto_enter(PlayerId::new(1), &near(), Utc::now()).unwrap();
        assert_eq!(outcome, AutoEnterOutcome::NotEnabled);
        assert!(lifecycle.enter_calls().is_empty());
    }

    #[test]
    fn enabled_player_in_range_enters() {
        let (service, lifecycle) = make_service();
        let now = Utc::now();
        let player = PlayerId::new(1);
        service.enable(player, now);
        assert_eq!(service.try_auto_enter(player, &far(), now).unwrap(), AutoEnterOutcome::OutOfRange);
        assert_eq!(service.try_auto_enter(player, &near(), now).unwrap(), AutoEnterOutcome::Entered);
        assert_eq!(lifecycle.pvp_state(player), PvpState::Active);
        let stats = service.stats(player).unwrap();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(service.statistics().total_entries, 1);
    }

    #[test]
    fn cooldown_follows_wall_clock() {
        let (service, lifecycle) = make_service();
        let start = Utc::now();
        let player = PlayerId::new(1);
        service.enable(player, start);
        lifecycle.refuse(player);

        // Refused attempt still starts the cooldown.
        assert!(service.try_auto_enter(player, &near(), start).is_err());

        let soon = start + TimeDelta::seconds(2);
        assert_eq!(
            service.try_auto_enter(player, &near(), soon).unwrap(),
            AutoEnterOutcome::CoolingDown {
                remaining: TimeDelta::seconds(3)
            }
        );

        let later = start + TimeDelta::seconds(5);
        assert!(service.try_auto_enter(player, &near(), later).is_err());
        assert_eq!(service.stats(player).unwrap().attempts, 2);
    }

    #[test]
    fn already_in_arena_is_reported() {
        let (service, lifecycle) = make_service();
        let player = PlayerId::new(1);
        service.enable(player, Utc::now());
        lifecycle.set_state(player, PvpState::Active);
        assert_eq!(
            service.try_auto_enter(player, &near(), Utc::now()).unwrap(),
            AutoEnterOutcome::AlreadyInArena
        );
    }

    #[test]
    fn process_all_enters_opted_in_players_only() {
        let (service, _) = make_service();
        let now = Utc::now();
        service.enable(PlayerId::new(1), now);
        service.enable(PlayerId::new(3), now);
        let players = [
            ConnectedPlayer {
                player_id: PlayerId::new(1),
                position: Some(near()),
            },
            ConnectedPlayer {
                player_id: PlayerId::new(2),
                position: Some(near()),
            },
            ConnectedPlayer {
                player_id: PlayerId::new(3),
                position: None,
            },
        ];
        assert_eq!(service.process_all(&players, now), 1);
        assert!(service.should_trigger(PlayerId::new(3), &near()));
        assert!(!service.should_trigger(PlayerId::new(2), &near()));
    }

    #[test]
    fn reset_all_disables_everyone() {
        let (service, _) = make_service();
        let now = Utc::now();
        service.enable(PlayerId::new(1), now);
        service.enable(PlayerId::new(2), now);
        service.reset_all(now);
        assert_eq!(service.enabled_count(), 0);
        assert_eq!(service.statistics().players_enabled, 0);
    }
}
