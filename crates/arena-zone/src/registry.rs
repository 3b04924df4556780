//! The zone registry: the single authority over arena activation and
//! membership.
//!
//! All public operations take one registry-wide lock. Operations that
//! compose other operations (deactivation evicting members, `add_player`
//! activating a zone, `clear_all` deactivating everything) go through the
//! `*_locked` helpers on the already-held map, never through a second
//! lock acquisition.
//!
//! Collaborators are called synchronously under the lock. Their failures,
//! panics included, are logged and swallowed: spawning is best-effort, and
//! a failed forced exit never keeps a player in a torn-down zone. A lock
//! poisoned anyway is recovered, since every mutation leaves the map
//! consistent before it calls out.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard};

use arena_types::{ArenaId, PlayerId, Position, SpawnHandle, Zone};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::ZoneError;
use crate::geometry::{self, DEFAULT_BORDER_THRESHOLD};
use crate::isolation::catch_collaborator;
use crate::lifecycle::Lifecycle;
use crate::spawner::{Spawner, SpawnerKind};
use crate::state::ZoneState;

/// Center of the built-in practice arena used when no default zone is
/// configured.
pub const FALLBACK_CENTER: Position = Position::new(-1000.0, 5.0, -500.0);

/// Radius of the built-in practice arena.
pub const FALLBACK_RADIUS: f32 = 50.0;

/// Display name of the built-in practice arena.
pub const FALLBACK_NAME: &str = "Default Practice Arena";

/// Zone synthesized when a player is added to an arena nobody activated.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultZoneSettings {
    /// Use the configured center and radius instead of the fallback.
    pub enabled: bool,
    /// Configured center.
    pub center: Position,
    /// Configured radius.
    pub radius: f32,
    /// Configured display name.
    pub name: String,
}

impl DefaultZoneSettings {
    /// Build the circular default zone.
    pub fn synthesize(&self) -> Zone {
        if self.enabled {
            Zone::circle(self.name.clone(), self.center, self.radius)
        } else {
            Zone::circle(FALLBACK_NAME, FALLBACK_CENTER, FALLBACK_RADIUS)
        }
    }
}

impl Default for DefaultZoneSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            center: FALLBACK_CENTER,
            radius: FALLBACK_RADIUS,
            name: String::from(FALLBACK_NAME),
        }
    }
}

/// Registry policy knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySettings {
    /// How to synthesize a zone for an unseen arena id.
    pub default_zone: DefaultZoneSettings,
    /// Deactivate a zone when its last member is removed.
    pub auto_deactivate_when_empty: bool,
    /// Border distance below which a position is "in transition".
    pub border_threshold: f32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_zone: DefaultZoneSettings::default(),
            auto_deactivate_when_empty: false,
            border_threshold: DEFAULT_BORDER_THRESHOLD,
        }
    }
}

/// External services the registry drives.
#[derive(Clone)]
pub struct ZoneCollaborators {
    /// Spawns arena structures on activation.
    pub structures: Arc<dyn Spawner>,
    /// Spawns decorations (border glows) on activation.
    pub decorations: Arc<dyn Spawner>,
    /// Receives forced exits when a zone is deactivated.
    pub lifecycle: Arc<dyn Lifecycle>,
}

/// Result of a successful [`ZoneRegistry::activate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The zone was activated now.
    Activated {
        /// Number of structure handles stored.
        structures: usize,
        /// Number of decoration handles stored.
        decorations: usize,
    },
    /// The zone was already active; nothing changed.
    AlreadyActive,
}

/// Result of a successful [`ZoneRegistry::deactivate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deactivation {
    /// The zone was deactivated now and these members were evicted.
    Deactivated {
        /// Former members, each sent through a forced exit.
        evicted: Vec<PlayerId>,
    },
    /// The zone was already inactive; nothing changed.
    AlreadyInactive,
}

/// Result of a successful membership mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    /// The player was added.
    Joined,
    /// The player was removed.
    Left,
    /// The player already had the requested membership.
    Unchanged,
}

/// What [`ZoneRegistry::clear_all`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearSummary {
    /// Zones that were active and got deactivated.
    pub deactivated: usize,
    /// Zone records dropped from the registry.
    pub removed: usize,
}

/// Owns every [`ZoneState`] keyed by [`ArenaId`].
pub struct ZoneRegistry {
    settings: RegistrySettings,
    collaborators: ZoneCollaborators,
    zones: Mutex<BTreeMap<ArenaId, ZoneState>>,
}

impl ZoneRegistry {
    /// Create an empty registry.
    pub const fn new(settings: RegistrySettings, collaborators: ZoneCollaborators) -> Self {
        Self {
            settings,
            collaborators,
            zones: Mutex::new(BTreeMap::new()),
        }
    }

    /// The registry's policy settings.
    pub const fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// The lifecycle service the registry was built with.
    pub fn lifecycle(&self) -> &dyn Lifecycle {
        self.collaborators.lifecycle.as_ref()
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Activate `zone` under `arena_id`, spawning its structures and
    /// decorations.
    ///
    /// Rejects malformed geometry before touching any state. Activating an
    /// already-active arena is a no-op that keeps the existing zone.
    pub fn activate(&self, arena_id: ArenaId, zone: Zone) -> Result<Activation, ZoneError> {
        if let Some(reason) = geometry::geometry_defect(&zone) {
            warn!(arena_id = %arena_id, zone = %zone.name, reason, "Refusing to activate zone");
            return Err(ZoneError::InvalidGeometry { arena_id, reason });
        }
        let mut zones = self.lock();
        Ok(self.activate_locked(&mut zones, arena_id, zone, Utc::now()))
    }

    /// Deactivate `arena_id`: force every member out, then despawn
    /// decorations and structures.
    ///
    /// The zone record stays queryable until [`Self::clear_all`].
    pub fn deactivate(&self, arena_id: ArenaId) -> Result<Deactivation, ZoneError> {
        let mut zones = self.lock();
        self.deactivate_locked(&mut zones, arena_id, Utc::now())
    }

    /// Admit `player` to `arena_id`.
    ///
    /// An unseen arena id gets the default zone; a retained inactive zone
    /// is re-activated with its stored definition. Membership in other
    /// arenas is not checked.
    pub fn add_player(
        &self,
        arena_id: ArenaId,
        player: PlayerId,
    ) -> Result<MembershipChange, ZoneError> {
        let now = Utc::now();
        let mut zones = self.lock();

        if !zones.get(&arena_id).is_some_and(|s| s.is_active) {
            let zone = zones.get(&arena_id).map_or_else(
                || self.settings.default_zone.synthesize(),
                |state| state.zone.clone(),
            );
            if let Some(reason) = geometry::geometry_defect(&zone) {
                warn!(arena_id = %arena_id, player_id = %player, reason, "Cannot activate zone for new member");
                return Err(ZoneError::InvalidGeometry { arena_id, reason });
            }
            let _ = self.activate_locked(&mut zones, arena_id, zone, now);
        }

        let Some(state) = zones.get_mut(&arena_id) else {
            return Err(ZoneError::UnknownArena(arena_id));
        };
        if state.insert_member(player, now) {
            info!(
                arena_id = %arena_id,
                player_id = %player,
                members = state.member_count(),
                "Player joined arena"
            );
            Ok(MembershipChange::Joined)
        } else {
            debug!(arena_id = %arena_id, player_id = %player, "Player already a member");
            Ok(MembershipChange::Unchanged)
        }
    }

    /// Remove `player` from `arena_id`.
    ///
    /// With `auto_deactivate_when_empty` set, removing the last member also
    /// deactivates the zone.
    pub fn remove_player(
        &self,
        arena_id: ArenaId,
        player: PlayerId,
    ) -> Result<MembershipChange, ZoneError> {
        let now = Utc::now();
        let mut zones = self.lock();
        let Some(state) = zones.get_mut(&arena_id) else {
            return Err(ZoneError::UnknownArena(arena_id));
        };
        if !state.remove_member(player, now) {
            debug!(arena_id = %arena_id, player_id = %player, "Player not a member");
            return Ok(MembershipChange::Unchanged);
        }
        info!(
            arena_id = %arena_id,
            player_id = %player,
            members = state.member_count(),
            "Player left arena"
        );

        let now_empty = state.is_active && state.members.is_empty();
        if self.settings.auto_deactivate_when_empty && now_empty {
            info!(arena_id = %arena_id, "Last member left, deactivating zone");
            let _ = self.deactivate_locked(&mut zones, arena_id, now)?;
        }
        Ok(MembershipChange::Left)
    }

    /// Deactivate every zone and empty the registry.
    ///
    /// Collaborator failures during teardown are logged per zone and never
    /// stop the rest from being cleared.
    pub fn clear_all(&self) -> ClearSummary {
        let now = Utc::now();
        let mut zones = self.lock();

        let ids: Vec<ArenaId> = zones.keys().copied().collect();
        let mut summary = ClearSummary::default();
        for arena_id in ids {
            if matches!(
                self.deactivate_locked(&mut zones, arena_id, now),
                Ok(Deactivation::Deactivated { .. })
            ) {
                summary.deactivated = summary.deactivated.saturating_add(1);
            }
        }
        summary.removed = zones.len();
        zones.clear();

        info!(
            deactivated = summary.deactivated,
            removed = summary.removed,
            "Cleared all zones"
        );
        summary
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Snapshot of one arena's state, active or retained.
    pub fn zone_state(&self, arena_id: ArenaId) -> Option<ZoneState> {
        self.read(|zones| zones.get(&arena_id).cloned())
    }

    /// Number of zone records, active or not.
    pub fn zone_count(&self) -> usize {
        self.read(BTreeMap::len)
    }

    /// Whether `arena_id` is currently active.
    pub fn is_active(&self, arena_id: ArenaId) -> bool {
        self.read(|zones| zones.get(&arena_id).is_some_and(|s| s.is_active))
    }

    /// Ids of every active arena, ascending.
    pub fn active_arena_ids(&self) -> Vec<ArenaId> {
        self.read(|zones| {
            active(zones).map(|s| s.arena_id).collect()
        })
    }

    /// Every active zone with its arena id.
    pub fn active_zones(&self) -> Vec<(ArenaId, Zone)> {
        self.read(|zones| {
            active(zones).map(|s| (s.arena_id, s.zone.clone())).collect()
        })
    }

    /// Every active zone with its member count, taken under one lock so
    /// no zone is listed with the members of a later state.
    pub fn active_zones_with_counts(&self) -> Vec<(ArenaId, Zone, usize)> {
        self.read(|zones| {
            active(zones)
                .map(|s| (s.arena_id, s.zone.clone(), s.member_count()))
                .collect()
        })
    }

    /// Whether `player` is a member of any active arena.
    pub fn is_player_in_any_arena(&self, player: PlayerId) -> bool {
        self.read(|zones| active(zones).any(|s| s.contains_player(player)))
    }

    /// The active arena `player` is a member of, lowest id first.
    pub fn player_arena_id(&self, player: PlayerId) -> Option<ArenaId> {
        self.read(|zones| {
            active(zones)
                .find(|s| s.contains_player(player))
                .map(|s| s.arena_id)
        })
    }

    /// Members of an active arena; zero for unknown or inactive arenas.
    pub fn active_player_count(&self, arena_id: ArenaId) -> usize {
        self.read(|zones| {
            zones
                .get(&arena_id)
                .filter(|s| s.is_active)
                .map_or(0, ZoneState::member_count)
        })
    }

    /// Member ids of an active arena, ascending.
    pub fn active_players(&self, arena_id: ArenaId) -> Vec<PlayerId> {
        self.read(|zones| {
            zones
                .get(&arena_id)
                .filter(|s| s.is_active)
                .map(|s| s.members.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Whether `position` lies inside any active zone.
    pub fn is_position_in_any_arena(&self, position: &Position) -> bool {
        self.read(|zones| {
            active(zones).any(|s| geometry::contains(&s.zone, position))
        })
    }

    /// Whether `position` lies inside the given active arena.
    pub fn is_position_in_arena(&self, arena_id: ArenaId, position: &Position) -> bool {
        self.read(|zones| {
            zones
                .get(&arena_id)
                .is_some_and(|s| s.is_active && geometry::contains(&s.zone, position))
        })
    }

    /// The active zone containing `position`, lowest arena id first.
    pub fn zone_containing_position(&self, position: &Position) -> Option<(ArenaId, Zone)> {
        self.read(|zones| {
            active(zones)
                .find(|s| geometry::contains(&s.zone, position))
                .map(|s| (s.arena_id, s.zone.clone()))
        })
    }

    /// Whether `position` is close to the border of any active zone.
    pub fn is_in_transition_zone(&self, position: &Position) -> bool {
        let threshold = self.settings.border_threshold;
        self.read(|zones| {
            active(zones).any(|s| geometry::near_border(&s.zone, position, threshold))
        })
    }

    /// Whether `player` is a member of an active zone flagged immortal.
    pub fn is_player_immortal(&self, player: PlayerId) -> bool {
        self.read(|zones| {
            active(zones).any(|s| s.zone.flags.is_immortal && s.contains_player(player))
        })
    }

    /// The active zone whose center is closest to `position`, with the
    /// planar distance to that center.
    pub fn nearest_active_zone(&self, position: &Position) -> Option<(ArenaId, f32)> {
        self.read(|zones| {
            active(zones)
                .filter_map(|s| {
                    geometry::distance_to_center(&s.zone, position).map(|d| (s.arena_id, d))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
        })
    }

    // ---------------------------------------------------------------------
    // Locked helpers
    // ---------------------------------------------------------------------

    /// Take the registry lock, recovering it if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<ArenaId, ZoneState>> {
        self.zones.lock().unwrap_or_else(|poisoned| {
            warn!("Zone registry lock poisoned, recovering");
            self.zones.clear_poison();
            poisoned.into_inner()
        })
    }

    fn read<T>(&self, query: impl FnOnce(&BTreeMap<ArenaId, ZoneState>) -> T) -> T {
        query(&self.lock())
    }

    fn activate_locked(
        &self,
        zones: &mut BTreeMap<ArenaId, ZoneState>,
        arena_id: ArenaId,
        zone: Zone,
        now: DateTime<Utc>,
    ) -> Activation {
        if zones.get(&arena_id).is_some_and(|s| s.is_active) {
            debug!(arena_id = %arena_id, "Zone already active");
            return Activation::AlreadyActive;
        }

        let structures = self.spawn_best_effort(SpawnerKind::Structures, arena_id, &zone);
        let decorations = self.spawn_best_effort(SpawnerKind::Decorations, arena_id, &zone);
        let outcome = Activation::Activated {
            structures: structures.len(),
            decorations: decorations.len(),
        };

        let state = match zones.entry(arena_id) {
            Entry::Occupied(entry) => {
                let state = entry.into_mut();
                state.zone = zone;
                state
            }
            Entry::Vacant(entry) => entry.insert(ZoneState::new(arena_id, zone, now)),
        };
        state.activate(now, structures, decorations);

        info!(
            arena_id = %arena_id,
            zone = %state.zone.name,
            center = %state.zone.center,
            structures = state.structure_handles.len(),
            decorations = state.decoration_handles.len(),
            "Zone activated"
        );
        outcome
    }

    fn deactivate_locked(
        &self,
        zones: &mut BTreeMap<ArenaId, ZoneState>,
        arena_id: ArenaId,
        now: DateTime<Utc>,
    ) -> Result<Deactivation, ZoneError> {
        let Some(state) = zones.get_mut(&arena_id) else {
            debug!(arena_id = %arena_id, "Deactivate on unknown arena");
            return Err(ZoneError::UnknownArena(arena_id));
        };
        if !state.is_active {
            debug!(arena_id = %arena_id, "Zone already inactive");
            return Ok(Deactivation::AlreadyInactive);
        }

        // Members go first so nobody is left in a zone whose props are gone.
        let evicted: Vec<PlayerId> = state.members.iter().copied().collect();
        for &player in &evicted {
            self.force_exit(arena_id, player);
            let _ = state.remove_member(player, now);
        }

        self.despawn_best_effort(SpawnerKind::Decorations, arena_id);
        self.despawn_best_effort(SpawnerKind::Structures, arena_id);
        state.deactivate(now);

        info!(
            arena_id = %arena_id,
            zone = %state.zone.name,
            evicted = evicted.len(),
            "Zone deactivated"
        );
        Ok(Deactivation::Deactivated { evicted })
    }

    fn force_exit(&self, arena_id: ArenaId, player: PlayerId) {
        match catch_collaborator(|| self.collaborators.lifecycle.exit(player)) {
            Ok(Ok(true)) => debug!(arena_id = %arena_id, player_id = %player, "Forced exit"),
            Ok(Ok(false)) => {
                debug!(arena_id = %arena_id, player_id = %player, "Forced exit found player outside");
            }
            Ok(Err(e)) => warn!(
                arena_id = %arena_id,
                player_id = %player,
                error = %e,
                "Forced exit failed, removing member anyway"
            ),
            Err(panic) => warn!(
                arena_id = %arena_id,
                player_id = %player,
                panic = %panic,
                "Lifecycle panicked during forced exit, removing member anyway"
            ),
        }
    }

    fn spawner(&self, kind: SpawnerKind) -> &dyn Spawner {
        match kind {
            SpawnerKind::Structures => self.collaborators.structures.as_ref(),
            SpawnerKind::Decorations => self.collaborators.decorations.as_ref(),
        }
    }

    fn spawn_best_effort(&self, kind: SpawnerKind, arena_id: ArenaId, zone: &Zone) -> Vec<SpawnHandle> {
        match catch_collaborator(|| self.spawner(kind).spawn(arena_id, zone)) {
            Ok(Ok(handles)) => handles,
            Ok(Err(e)) => {
                warn!(
                    arena_id = %arena_id,
                    spawner = %kind,
                    error = %e,
                    "Spawn failed, activating without these props"
                );
                Vec::new()
            }
            Err(panic) => {
                warn!(
                    arena_id = %arena_id,
                    spawner = %kind,
                    panic = %panic,
                    "Spawner panicked, activating without these props"
                );
                Vec::new()
            }
        }
    }

    fn despawn_best_effort(&self, kind: SpawnerKind, arena_id: ArenaId) {
        match catch_collaborator(|| self.spawner(kind).despawn(arena_id)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(arena_id = %arena_id, spawner = %kind, error = %e, "Despawn failed"),
            Err(panic) => warn!(arena_id = %arena_id, spawner = %kind, panic = %panic, "Spawner panicked during despawn"),
        }
    }
}

/// Iterate the active states of a map.
fn active(zones: &BTreeMap<ArenaId, ZoneState>) -> impl Iterator<Item = &ZoneState> {
    zones.values().filter(|s| s.is_active)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::thread;

    use arena_types::{PvpState, ZoneFlags};

    use super::*;
    use crate::lifecycle::StubLifecycle;
    use crate::spawner::{SpawnCall, StubSpawner};

    struct Harness {
        registry: ZoneRegistry,
        structures: Arc<StubSpawner>,
        decorations: Arc<StubSpawner>,
        lifecycle: Arc<StubLifecycle>,
    }

    fn make_harness(settings: RegistrySettings) -> Harness {
        let structures = Arc::new(StubSpawner::new(2));
        let decorations = Arc::new(StubSpawner::new(5));
        let lifecycle = Arc::new(StubLifecycle::new());
        let registry = ZoneRegistry::new(
            settings,
            ZoneCollaborators {
                structures: structures.clone(),
                decorations: decorations.clone(),
                lifecycle: lifecycle.clone(),
            },
        );
        Harness {
            registry,
            structures,
            decorations,
            lifecycle,
        }
    }

    fn make_zone(radius: f32) -> Zone {
        Zone::circle("Pit", Position::new(0.0, 0.0, 0.0), radius)
    }

    fn id(raw: u32) -> ArenaId {
        ArenaId::new(raw)
    }

    fn p(raw: u64) -> PlayerId {
        PlayerId::new(raw)
    }

    #[test]
    fn activate_stores_handles_and_is_idempotent() {
        let h = make_harness(RegistrySettings::default());
        let first = h.registry.activate(id(1), make_zone(50.0)).unwrap();
        assert_eq!(
            first,
            Activation::Activated {
                structures: 2,
                decorations: 5
            }
        );
        let before = h.registry.zone_state(id(1)).unwrap();

        let second = h.registry.activate(id(1), make_zone(80.0)).unwrap();
        assert_eq!(second, Activation::AlreadyActive);
        assert_eq!(h.registry.zone_state(id(1)).unwrap(), before);
        assert_eq!(h.structures.spawn_count(id(1)), 1);
        assert_eq!(h.decorations.spawn_count(id(1)), 1);
    }

    #[test]
    fn invalid_geometry_is_rejected_without_mutation() {
        let h = make_harness(RegistrySettings::default());
        let result = h.registry.activate(id(3), make_zone(0.0));
        assert!(matches!(result, Err(ZoneError::InvalidGeometry { .. })));
        assert_eq!(h.registry.zone_count(), 0);
        assert!(h.structures.calls().is_empty());
    }

    #[test]
    fn spawn_failure_still_activates() {
        let h = make_harness(RegistrySettings::default());
        h.structures.fail_arena(id(1));
        let outcome = h.registry.activate(id(1), make_zone(50.0)).unwrap();
        assert_eq!(
            outcome,
            Activation::Activated {
                structures: 0,
                decorations: 5
            }
        );
        assert!(h.registry.is_active(id(1)));

        // Another arena is unaffected.
        h.registry.activate(id(2), make_zone(20.0)).unwrap();
        assert_eq!(h.registry.zone_state(id(2)).unwrap().structure_handles.len(), 2);
    }

    #[test]
    fn concrete_scenario() {
        let h = make_harness(RegistrySettings::default());
        h.registry.activate(id(1), make_zone(50.0)).unwrap();
        assert_eq!(h.registry.add_player(id(1), p(1)).unwrap(), MembershipChange::Joined);
        assert_eq!(h.registry.active_player_count(id(1)), 1);
        assert_eq!(h.registry.remove_player(id(1), p(1)).unwrap(), MembershipChange::Left);
        assert_eq!(h.registry.active_player_count(id(1)), 0);
        h.registry.deactivate(id(1)).unwrap();
        assert!(!h.registry.zone_state(id(1)).unwrap().is_active);
    }

    #[test]
    fn add_and_remove_are_symmetric() {
        let h = make_harness(RegistrySettings::default());
        h.registry.activate(id(1), make_zone(50.0)).unwrap();
        for raw in 1..=5 {
            h.registry.add_player(id(1), p(raw)).unwrap();
        }
        assert_eq!(h.registry.add_player(id(1), p(3)).unwrap(), MembershipChange::Unchanged);
        assert_eq!(h.registry.active_player_count(id(1)), 5);
        for raw in 1..=5 {
            h.registry.remove_player(id(1), p(raw)).unwrap();
        }
        assert!(h.registry.active_players(id(1)).is_empty());
        assert_eq!(h.registry.remove_player(id(1), p(1)).unwrap(), MembershipChange::Unchanged);
        // No auto-deactivation by default.
        assert!(h.registry.is_active(id(1)));
    }

    #[test]
    fn deactivate_forces_exit_once_per_member() {
        let h = make_harness(RegistrySettings::default());
        h.registry.activate(id(1), make_zone(50.0)).unwrap();
        h.registry.add_player(id(1), p(1)).unwrap();
        h.registry.add_player(id(1), p(2)).unwrap();

        let outcome = h.registry.deactivate(id(1)).unwrap();
        assert_eq!(
            outcome,
            Deactivation::Deactivated {
                evicted: vec![p(1), p(2)]
            }
        );
        assert!(h.registry.active_players(id(1)).is_empty());
        assert_eq!(h.lifecycle.exit_count(p(1)), 1);
        assert_eq!(h.lifecycle.exit_count(p(2)), 1);

        let state = h.registry.zone_state(id(1)).unwrap();
        assert!(state.is_consistent());
        assert!(state.deactivated_at.is_some());
    }

    #[test]
    fn deactivate_is_once_per_transition() {
        let h = make_harness(RegistrySettings::default());
        h.registry.activate(id(1), make_zone(50.0)).unwrap();
        h.registry.deactivate(id(1)).unwrap();
        assert_eq!(h.registry.deactivate(id(1)).unwrap(), Deactivation::AlreadyInactive);
        assert_eq!(h.structures.despawn_count(id(1)), 1);
        assert_eq!(h.decorations.despawn_count(id(1)), 1);
    }

    #[test]
    fn deactivate_unknown_arena_fails() {
        let h = make_harness(RegistrySettings::default());
        assert_eq!(h.registry.deactivate(id(9)), Err(ZoneError::UnknownArena(id(9))));
        assert_eq!(
            h.registry.remove_player(id(9), p(1)),
            Err(ZoneError::UnknownArena(id(9)))
        );
    }

    #[test]
    fn despawn_failure_still_deactivates() {
        let h = make_harness(RegistrySettings::default());
        h.registry.activate(id(1), make_zone(50.0)).unwrap();
        h.registry.add_player(id(1), p(1)).unwrap();
        h.decorations.set_fail_all(true);
        h.lifecycle.set_unavailable(true);

        h.registry.deactivate(id(1)).unwrap();
        assert!(!h.registry.is_active(id(1)));
        assert!(!h.registry.is_player_in_any_arena(p(1)));
        assert_eq!(h.structures.despawn_count(id(1)), 1);
    }

    #[test]
    fn add_player_synthesizes_fallback_zone() {
        let h = make_harness(RegistrySettings::default());
        h.registry.add_player(id(0), p(7)).unwrap();
        let state = h.registry.zone_state(id(0)).unwrap();
        assert!(state.is_active);
        assert_eq!(state.zone.name, FALLBACK_NAME);
        assert_eq!(state.zone.center, FALLBACK_CENTER);
        assert_eq!(h.registry.player_arena_id(p(7)), Some(id(0)));
    }

    #[test]
    fn add_player_uses_configured_default_zone() {
        let settings = RegistrySettings {
            default_zone: DefaultZoneSettings {
                enabled: true,
                center: Position::new(10.0, 0.0, 10.0),
                radius: 30.0,
                name: String::from("Configured"),
            },
            ..RegistrySettings::default()
        };
        let h = make_harness(settings);
        h.registry.add_player(id(4), p(1)).unwrap();
        let state = h.registry.zone_state(id(4)).unwrap();
        assert_eq!(state.zone.name, "Configured");
        assert!(h.registry.is_position_in_arena(id(4), &Position::new(35.0, 0.0, 10.0)));
    }

    #[test]
    fn add_player_reactivates_retained_zone() {
        let h = make_harness(RegistrySettings::default());
        h.registry.activate(id(2), make_zone(15.0)).unwrap();
        h.registry.deactivate(id(2)).unwrap();
        h.registry.add_player(id(2), p(1)).unwrap();

        let state = h.registry.zone_state(id(2)).unwrap();
        assert!(state.is_active);
        assert_eq!(state.zone, make_zone(15.0));
        assert_eq!(h.structures.spawn_count(id(2)), 2);
    }

    #[test]
    fn auto_deactivate_when_enabled() {
        let settings = RegistrySettings {
            auto_deactivate_when_empty: true,
            ..RegistrySettings::default()
        };
        let h = make_harness(settings);
        h.registry.activate(id(1), make_zone(50.0)).unwrap();
        h.registry.add_player(id(1), p(1)).unwrap();
        h.registry.add_player(id(1), p(2)).unwrap();
        h.registry.remove_player(id(1), p(1)).unwrap();
        assert!(h.registry.is_active(id(1)));
        h.registry.remove_player(id(1), p(2)).unwrap();
        assert!(!h.registry.is_active(id(1)));
        assert_eq!(h.structures.despawn_count(id(1)), 1);
        // Already removed, so no forced exit was needed.
        assert_eq!(h.lifecycle.exit_count(p(2)), 0);
    }

    #[test]
    fn clear_all_deactivates_and_empties() {
        let h = make_harness(RegistrySettings::default());
        h.registry.activate(id(1), make_zone(50.0)).unwrap();
        h.registry.activate(id(2), make_zone(10.0)).unwrap();
        h.registry.activate(id(3), make_zone(10.0)).unwrap();
        h.registry.deactivate(id(3)).unwrap();
        h.registry.add_player(id(2), p(5)).unwrap();
        h.structures.fail_arena(id(1));

        let summary = h.registry.clear_all();
        assert_eq!(summary.deactivated, 2);
        assert_eq!(summary.removed, 3);
        assert_eq!(h.registry.zone_count(), 0);
        assert_eq!(h.lifecycle.exit_count(p(5)), 1);
        assert!(h.structures.calls().contains(&SpawnCall::Despawn(id(2))));
    }

    #[test]
    fn position_queries_only_see_active_zones() {
        let h = make_harness(RegistrySettings::default());
        h.registry.activate(id(1), make_zone(10.0)).unwrap();
        let far = Zone::rectangle("Far", Position::new(100.0, 0.0, 0.0), 20.0, 20.0);
        h.registry.activate(id(2), far).unwrap();

        let inside_far = Position::new(105.0, 0.0, 5.0);
        assert!(h.registry.is_position_in_any_arena(&inside_far));
        assert_eq!(h.registry.zone_containing_position(&inside_far).map(|z| z.0), Some(id(2)));
        assert!(h.registry.is_in_transition_zone(&Position::new(9.5, 0.0, 0.0)));
        assert!(!h.registry.is_in_transition_zone(&Position::new(0.0, 0.0, 0.0)));

        let nearest = h.registry.nearest_active_zone(&Position::new(80.0, 0.0, 0.0)).unwrap();
        assert_eq!(nearest.0, id(2));
        assert!((nearest.1 - 20.0).abs() < 1e-4);

        h.registry.deactivate(id(2)).unwrap();
        assert!(!h.registry.is_position_in_any_arena(&inside_far));
        assert_eq!(h.registry.active_arena_ids(), vec![id(1)]);
        assert_eq!(h.registry.active_zones().len(), 1);
    }

    #[test]
    fn immortality_follows_zone_flags() {
        let h = make_harness(RegistrySettings::default());
        let flags = ZoneFlags {
            is_immortal: true,
            ..ZoneFlags::default()
        };
        h.registry.activate(id(1), make_zone(10.0).with_flags(flags)).unwrap();
        h.registry.activate(id(2), make_zone(10.0)).unwrap();
        h.registry.add_player(id(1), p(1)).unwrap();
        h.registry.add_player(id(2), p(2)).unwrap();
        assert!(h.registry.is_player_immortal(p(1)));
        assert!(!h.registry.is_player_immortal(p(2)));
        assert!(!h.registry.is_player_immortal(p(3)));
    }

    #[test]
    fn forced_exit_reaches_lifecycle_state() {
        let h = make_harness(RegistrySettings::default());
        h.registry.activate(id(1), make_zone(10.0)).unwrap();
        h.registry.add_player(id(1), p(1)).unwrap();
        h.lifecycle.set_state(p(1), PvpState::Active);
        h.registry.deactivate(id(1)).unwrap();
        assert_eq!(h.lifecycle.pvp_state(p(1)), PvpState::Outside);
    }

    #[test]
    fn concurrent_mutations_keep_state_consistent() {
        let h = make_harness(RegistrySettings::default());
        let registry = Arc::new(h.registry);
        registry.activate(id(1), make_zone(50.0)).unwrap();

        let workers: Vec<_> = (0..8_u64)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for round in 0..50_u64 {
                        let player = PlayerId::new(worker.saturating_mul(100).saturating_add(round));
                        registry.add_player(id(1), player).unwrap();
                        assert!(registry.is_player_in_any_arena(player));
                        registry.remove_player(id(1), player).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(registry.active_player_count(id(1)), 0);
        assert!(registry.zone_state(id(1)).unwrap().is_consistent());
    }

    /// Panics on every call for one arena, spawns one handle otherwise.
    struct PanickingSpawner {
        arena_id: ArenaId,
    }

    #[allow(clippy::panic)]
    impl Spawner for PanickingSpawner {
        fn spawn(&self, arena_id: ArenaId, _zone: &Zone) -> Result<Vec<SpawnHandle>, crate::SpawnError> {
            if arena_id == self.arena_id {
                panic!("structure backend crashed for arena {arena_id}");
            }
            Ok(vec![SpawnHandle::new()])
        }

        fn despawn(&self, arena_id: ArenaId) -> Result<(), crate::SpawnError> {
            if arena_id == self.arena_id {
                panic!("structure backend crashed for arena {arena_id}");
            }
            Ok(())
        }
    }

    #[test]
    fn spawner_panic_does_not_leak_into_other_arenas() {
        let lifecycle = Arc::new(StubLifecycle::new());
        let registry = Arc::new(ZoneRegistry::new(
            RegistrySettings::default(),
            ZoneCollaborators {
                structures: Arc::new(PanickingSpawner { arena_id: id(1) }),
                decorations: Arc::new(StubSpawner::new(5)),
                lifecycle: lifecycle.clone(),
            },
        ));
        registry.activate(id(2), make_zone(10.0)).unwrap();

        let worker = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.activate(id(1), make_zone(50.0)))
        };
        assert_eq!(
            worker.join().unwrap().unwrap(),
            Activation::Activated {
                structures: 0,
                decorations: 5,
            }
        );

        assert_eq!(registry.add_player(id(2), p(1)).unwrap(), MembershipChange::Joined);
        assert!(registry.is_active(id(2)));
        assert!(registry.is_active(id(1)));
        assert_eq!(registry.zone_state(id(2)).unwrap().structure_handles.len(), 1);

        registry.add_player(id(1), p(2)).unwrap();
        let outcome = registry.deactivate(id(1)).unwrap();
        assert_eq!(outcome, Deactivation::Deactivated { evicted: vec![p(2)] });
        assert!(!registry.is_active(id(1)));
        assert_eq!(lifecycle.exit_count(p(2)), 1);
    }

    #[test]
    #[allow(clippy::panic)]
    fn poisoned_lock_is_recovered() {
        let h = make_harness(RegistrySettings::default());
        h.registry.activate(id(1), make_zone(50.0)).unwrap();
        h.registry.add_player(id(1), p(1)).unwrap();

        let poisoned = thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = h.registry.zones.lock().unwrap();
                    panic!("holder died");
                })
                .join()
        });
        assert!(poisoned.is_err());

        assert!(h.registry.is_active(id(1)));
        assert_eq!(h.registry.active_player_count(id(1)), 1);
        assert_eq!(h.registry.add_player(id(1), p(2)).unwrap(), MembershipChange::Joined);
        assert!(!h.registry.zones.is_poisoned());
    }

    #[test]
    fn active_zones_with_counts_reports_members() {
        let h = make_harness(RegistrySettings::default());
        h.registry.activate(id(1), make_zone(50.0)).unwrap();
        h.registry.activate(id(2), make_zone(10.0)).unwrap();
        h.registry.activate(id(3), make_zone(10.0)).unwrap();
        h.registry.deactivate(id(3)).unwrap();
        h.registry.add_player(id(2), p(1)).unwrap();
        h.registry.add_player(id(2), p(2)).unwrap();

        let counts: Vec<(ArenaId, usize)> = h
            .registry
            .active_zones_with_counts()
            .into_iter()
            .map(|(arena_id, _, members)| (arena_id, members))
            .collect();
        assert_eq!(counts, vec![(id(1), 0), (id(2), 2)]);
    }
}
