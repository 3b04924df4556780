//! Runtime state for one arena slot.
//!
//! A [`ZoneState`] pairs the immutable [`Zone`] definition with the
//! volatile data the registry maintains: the active flag, the member set,
//! the handles returned by the spawners, and activity timestamps.
//!
//! Invariant: an inactive state has no members and no handles. The
//! registry is the only writer and goes through [`ZoneState::activate`]
//! and [`ZoneState::deactivate`] to keep it.

use std::collections::BTreeSet;

use arena_types::{ArenaId, PlayerId, SpawnHandle, Zone};
use chrono::{DateTime, Utc};

/// Mutable runtime state for a single arena.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneState {
    /// The arena slot this state belongs to.
    pub arena_id: ArenaId,
    /// The zone definition used at the last activation.
    pub zone: Zone,
    /// Whether props are spawned and players may be admitted.
    pub is_active: bool,
    /// Players currently admitted.
    pub members: BTreeSet<PlayerId>,
    /// Handles returned by the structure spawner.
    pub structure_handles: Vec<SpawnHandle>,
    /// Handles returned by the decoration spawner.
    pub decoration_handles: Vec<SpawnHandle>,
    /// When this arena slot was first registered.
    pub created_at: DateTime<Utc>,
    /// When the zone was last activated.
    pub activated_at: Option<DateTime<Utc>>,
    /// When the zone was last deactivated.
    pub deactivated_at: Option<DateTime<Utc>>,
    /// Last membership change or activation.
    pub last_activity: DateTime<Utc>,
}

impl ZoneState {
    /// Create an inactive state for `zone`.
    pub const fn new(arena_id: ArenaId, zone: Zone, created_at: DateTime<Utc>) -> Self {
        Self {
            arena_id,
            zone,
            is_active: false,
            members: BTreeSet::new(),
            structure_handles: Vec::new(),
            decoration_handles: Vec::new(),
            created_at,
            activated_at: None,
            deactivated_at: None,
            last_activity: created_at,
        }
    }

    /// Mark the zone active with the props that were spawned for it.
    pub fn activate(
        &mut self,
        now: DateTime<Utc>,
        structure_handles: Vec<SpawnHandle>,
        decoration_handles: Vec<SpawnHandle>,
    ) {
        self.is_active = true;
        self.structure_handles = structure_handles;
        self.decoration_handles = decoration_handles;
        self.activated_at = Some(now);
        self.last_activity = now;
    }

    /// Mark the zone inactive, dropping members and handles.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.members.clear();
        self.structure_handles.clear();
        self.decoration_handles.clear();
        self.deactivated_at = Some(now);
        self.last_activity = now;
    }

    /// Add a member. Returns `false` if the player was already a member.
    pub fn insert_member(&mut self, player: PlayerId, now: DateTime<Utc>) -> bool {
        let inserted = self.members.insert(player);
        if inserted {
            self.last_activity = now;
        }
        inserted
    }

    /// Remove a member. Returns `false` if the player was not a member.
    pub fn remove_member(&mut self, player: PlayerId, now: DateTime<Utc>) -> bool {
        let removed = self.members.remove(&player);
        if removed {
            self.last_activity = now;
        }
        removed
    }

    /// Whether the player is a member.
    pub fn contains_player(&self, player: PlayerId) -> bool {
        self.members.contains(&player)
    }

    /// Number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Total number of spawned handles.
    pub const fn handle_count(&self) -> usize {
        self.structure_handles
            .len()
            .saturating_add(self.decoration_handles.len())
    }

    /// Whether the inactive-means-empty invariant holds.
    pub fn is_consistent(&self) -> bool {
        self.is_active || (self.members.is_empty() && self.handle_count() == 0)
    }
}

#[cfg(test)]
mod tests {
    use arena_types::Position;

    use super::*;

    fn make_state() -> ZoneState {
        let zone = Zone::circle("Test", Position::default(), 10.0);
        ZoneState::new(ArenaId::new(1), zone, Utc::now())
    }

    #[test]
    fn new_state_is_inactive_and_empty() {
        let state = make_state();
        assert!(!state.is_active);
        assert_eq!(state.member_count(), 0);
        assert!(state.activated_at.is_none());
        assert!(state.is_consistent());
    }

    #[test]
    fn insert_and_remove_members() {
        let mut state = make_state();
        let now = Utc::now();
        state.activate(now, Vec::new(), Vec::new());
        assert!(state.insert_member(PlayerId::new(1), now));
        assert!(!state.insert_member(PlayerId::new(1), now));
        assert!(state.contains_player(PlayerId::new(1)));
        assert!(state.remove_member(PlayerId::new(1), now));
        assert!(!state.remove_member(PlayerId::new(1), now));
        assert_eq!(state.member_count(), 0);
    }

    #[test]
    fn deactivate_clears_members_and_handles() {
        let mut state = make_state();
        let now = Utc::now();
        state.activate(now, vec![SpawnHandle::new()], vec![SpawnHandle::new(), SpawnHandle::new()]);
        let _ = state.insert_member(PlayerId::new(9), now);
        assert_eq!(state.handle_count(), 3);

        state.deactivate(now);
        assert!(!state.is_active);
        assert_eq!(state.member_count(), 0);
        assert_eq!(state.handle_count(), 0);
        assert_eq!(state.deactivated_at, Some(now));
        assert!(state.is_consistent());
    }

    #[test]
    fn inconsistent_state_is_detected() {
        let mut state = make_state();
        state.members.insert(PlayerId::new(3));
        assert!(!state.is_consistent());
    }
}
