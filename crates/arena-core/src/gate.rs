//! Capability gate for automation scripts.
//!
//! Automation may only run for a player who is fully inside the arena:
//! `PvP` state `Active` and a member of an active zone. The gate refuses
//! anything during a snapshot or restore regardless of zone state, and
//! reserves mutating capabilities for administrators.
//!
//! Contexts must be captured *after* the lifecycle service has updated the
//! player's state; [`AutomationContext::capture`] reads both the lifecycle
//! and the registry at call time for that reason.

use arena_types::{AutomationCapability, PlayerId, PvpState};
use arena_zone::ZoneRegistry;
use tracing::info;

/// The facts the gate decides on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationContext {
    /// The player the script acts for.
    pub player_id: PlayerId,
    /// The player's lifecycle state.
    pub pvp_state: PvpState,
    /// Whether the player is a member of an active zone.
    pub in_zone: bool,
    /// Whether the requester is an administrator.
    pub is_admin: bool,
    /// Name of the script asking for the capability.
    pub script_name: String,
}

impl AutomationContext {
    /// Build a context from the current lifecycle and registry state.
    pub fn capture(
        registry: &ZoneRegistry,
        player_id: PlayerId,
        is_admin: bool,
        script_name: impl Into<String>,
    ) -> Self {
        Self {
            player_id,
            pvp_state: registry.lifecycle().pvp_state(player_id),
            in_zone: registry.is_player_in_any_arena(player_id),
            is_admin,
            script_name: script_name.into(),
        }
    }
}

/// Why the gate refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateDenial {
    /// Player id `0` is reserved.
    #[error("invalid player id")]
    InvalidPlayer,

    /// The script did not identify itself.
    #[error("missing script name")]
    MissingScriptName,

    /// A snapshot or restore is in progress.
    #[error("automation blocked during {0:?}")]
    Transitioning(PvpState),

    /// The player is not in the `Active` state.
    #[error("player is {0:?}, automation requires Active")]
    NotActive(PvpState),

    /// The player is not a member of an active zone.
    #[error("player is not in an arena zone")]
    NotInZone,

    /// The capability needs an administrator.
    #[error("{0:?} requires an administrator")]
    AdminRequired(AutomationCapability),
}

/// Decides whether an automation capability may run.
pub trait AutomationGate: Send + Sync {
    /// Return the reason for refusal, if any.
    fn check(&self, context: &AutomationContext, capability: AutomationCapability) -> Result<(), GateDenial>;

    /// Whether `capability` may run for `context`.
    fn can_execute(&self, context: &AutomationContext, capability: AutomationCapability) -> bool {
        self.check(context, capability).is_ok()
    }
}

/// The standard gate: arena members in the `Active` state only, admin for
/// anything that mutates.
#[derive(Debug, Clone, Copy, Default)]
pub struct PvpAutomationGate;

impl PvpAutomationGate {
    /// Create the gate.
    pub const fn new() -> Self {
        Self
    }

    /// Reject contexts that no capability may run under.
    pub fn validate_context(context: &AutomationContext) -> Result<(), GateDenial> {
        if context.player_id.into_inner() == 0 {
            return Err(GateDenial::InvalidPlayer);
        }
        if context.script_name.trim().is_empty() {
            return Err(GateDenial::MissingScriptName);
        }
        if context.pvp_state.is_transient() {
            return Err(GateDenial::Transitioning(context.pvp_state));
        }
        Ok(())
    }
}

impl AutomationGate for PvpAutomationGate {
    fn check(&self, context: &AutomationContext, capability: AutomationCapability) -> Result<(), GateDenial> {
        Self::validate_context(context)?;
        if context.pvp_state != PvpState::Active {
            return Err(GateDenial::NotActive(context.pvp_state));
        }
        if !context.in_zone {
            return Err(GateDenial::NotInZone);
        }
        if capability.requires_admin() && !context.is_admin {
            return Err(GateDenial::AdminRequired(capability));
        }
        Ok(())
    }
}

/// Run `action` if the gate allows it, logging the decision either way.
pub fn execute<T>(
    gate: &dyn AutomationGate,
    context: &AutomationContext,
    capability: AutomationCapability,
    action: impl FnOnce() -> T,
) -> Result<T, GateDenial> {
    match gate.check(context, capability) {
        Ok(()) => {
            info!(
                script = %context.script_name,
                capability = ?capability,
                player_id = %context.player_id,
                "Automation ALLOWED"
            );
            Ok(action())
        }
        Err(denial) => {
            info!(
                script = %context.script_name,
                capability = ?capability,
                player_id = %context.player_id,
                reason = %denial,
                "Automation DENIED"
            );
            Err(denial)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use arena_types::{Position, Zone};
    use arena_zone::{RegistrySettings, StubLifecycle, StubSpawner, ZoneCollaborators};

    use super::*;

    fn make_context(pvp_state: PvpState, in_zone: bool, is_admin: bool) -> AutomationContext {
        AutomationContext {
            player_id: PlayerId::new(42),
            pvp_state,
            in_zone,
            is_admin,
            script_name: String::from("refill_potions"),
        }
    }

    #[test]
    fn advisory_capabilities_are_open_to_active_members() {
        let gate = PvpAutomationGate::new();
        let context = make_context(PvpState::Active, true, false);
        assert!(gate.can_execute(&context, AutomationCapability::AdvisoryOnly));
        assert!(gate.can_execute(&context, AutomationCapability::ReadOnlyAnalytics));
        assert!(gate.can_execute(&context, AutomationCapability::Broadcast));
        assert!(gate.can_execute(&context, AutomationCapability::Logging));
    }

    #[test]
    fn mutating_capabilities_need_admin() {
        let gate = PvpAutomationGate::new();
        let member = make_context(PvpState::Active, true, false);
        let admin = make_context(PvpState::Active, true, true);
        for capability in [
            AutomationCapability::PvpVirtualMutation,
            AutomationCapability::CastleBuilding,
            AutomationCapability::CastleManagement,
            AutomationCapability::LogisticsTransfer,
            AutomationCapability::LogisticsRefill,
            AutomationCapability::LogisticsRepair,
            AutomationCapability::LogisticsBalance,
        ] {
            assert_eq!(
                gate.check(&member, capability),
                Err(GateDenial::AdminRequired(capability))
            );
            assert!(gate.can_execute(&admin, capability));
        }
    }

    #[test]
    fn transient_states_are_refused_even_for_admins() {
        let gate = PvpAutomationGate::new();
        for state in [PvpState::Snapshot, PvpState::Restoring] {
            let context = make_context(state, true, true);
            assert_eq!(
                gate.check(&context, AutomationCapability::Logging),
                Err(GateDenial::Transitioning(state))
            );
        }
    }

    #[test]
    fn outside_or_not_in_zone_is_refused() {
        let gate = PvpAutomationGate::new();
        let outside = make_context(PvpState::Outside, true, true);
        assert_eq!(
            gate.check(&outside, AutomationCapability::Logging),
            Err(GateDenial::NotActive(PvpState::Outside))
        );
        let stray = make_context(PvpState::Active, false, true);
        assert_eq!(gate.check(&stray, AutomationCapability::Logging), Err(GateDenial::NotInZone));
    }

    #[test]
    fn invalid_context_is_refused() {
        let mut context = make_context(PvpState::Active, true, true);
        context.script_name = String::from("  ");
        assert_eq!(
            PvpAutomationGate::validate_context(&context),
            Err(GateDenial::MissingScriptName)
        );
        context.script_name = String::from("x");
        context.player_id = PlayerId::new(0);
        assert_eq!(PvpAutomationGate::validate_context(&context), Err(GateDenial::InvalidPlayer));
    }

    #[test]
    fn execute_runs_action_only_when_allowed() {
        let gate = PvpAutomationGate::new();
        let allowed = make_context(PvpState::Active, true, false);
        assert_eq!(execute(&gate, &allowed, AutomationCapability::Broadcast, || 7), Ok(7));

        let mut ran = false;
        let denied = make_context(PvpState::Snapshot, true, false);
        let result = execute(&gate, &denied, AutomationCapability::Broadcast, || ran = true);
        assert!(result.is_err());
        assert!(!ran);
    }

    #[test]
    fn capture_reads_lifecycle_and_registry() {
        let lifecycle = Arc::new(StubLifecycle::new());
        let registry = ZoneRegistry::new(
            RegistrySettings::default(),
            ZoneCollaborators {
                structures: Arc::new(StubSpawner::default()),
                decorations: Arc::new(StubSpawner::default()),
                lifecycle: lifecycle.clone(),
            },
        );
        registry
            .activate(arena_types::ArenaId::new(1), Zone::circle("Pit", Position::default(), 20.0))
            .unwrap();
        let player = PlayerId::new(8);
        registry.add_player(arena_types::ArenaId::new(1), player).unwrap();
        lifecycle.set_state(player, PvpState::Active);

        let context = AutomationContext::capture(&registry, player, false, "scout");
        assert_eq!(context.pvp_state, PvpState::Active);
        assert!(context.in_zone);
        assert!(PvpAutomationGate::new().can_execute(&context, AutomationCapability::AdvisoryOnly));
    }
}
