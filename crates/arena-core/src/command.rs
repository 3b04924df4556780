//! Typed zone and arena commands.
//!
//! Commands arrive already parsed (chat parsing belongs to the host). The
//! [`CommandDispatcher`] checks permissions, calls the registry, the
//! shared transitions, auto-enter, or the automation gate directly, and
//! returns reply lines for the requester.

use std::sync::Arc;

use arena_types::{ArenaId, AutomationCapability, PlayerId, Position, Zone};
use arena_zone::{Activation, Deactivation, ZoneError, ZoneRegistry, geometry};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::auto_enter::{AutoEnterError, AutoEnterService};
use crate::gate::{self, AutomationContext, AutomationGate, GateDenial};
use crate::transition::{self, EnterOutcome, ExitOutcome, TransitionError};

/// A parsed command.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneCommand {
    /// Activate an arena, with the default zone if none is given. Admin.
    Activate {
        /// Arena to activate.
        arena_id: ArenaId,
        /// Zone definition; `None` uses the configured default zone.
        zone: Option<Zone>,
    },
    /// Deactivate an arena, evicting its members. Admin.
    Deactivate {
        /// Arena to deactivate.
        arena_id: ArenaId,
    },
    /// List active zones and their member counts.
    Status,
    /// Describe the zones around a position.
    Info {
        /// Position to inspect.
        position: Position,
    },
    /// Deactivate and forget every zone. Admin.
    ClearAll,
    /// Enter the arena.
    Enter,
    /// Exit the arena.
    Exit,
    /// Show the requester's arena state.
    PlayerStatus,
    /// Opt in or out of auto-enter.
    AutoEnter {
        /// `true` to opt in.
        enabled: bool,
    },
    /// Ask the automation gate to run a script capability.
    RunAutomation {
        /// Capability requested.
        capability: AutomationCapability,
        /// Script name.
        script: String,
    },
}

impl ZoneCommand {
    /// Whether only administrators may issue this command.
    pub const fn requires_admin(&self) -> bool {
        matches!(self, Self::Activate { .. } | Self::Deactivate { .. } | Self::ClearAll)
    }
}

/// Who issued a command, and when.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandContext {
    /// The requesting player.
    pub player_id: PlayerId,
    /// The requester's position, if known.
    pub position: Option<Position>,
    /// Whether the requester is an administrator.
    pub is_admin: bool,
    /// When the command was issued.
    pub now: DateTime<Utc>,
}

/// Errors from command dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The command is admin-only.
    #[error("this command requires an administrator")]
    AdminRequired,

    /// The registry rejected the operation.
    #[error("{source}")]
    Zone {
        /// The underlying registry error.
        #[from]
        source: ZoneError,
    },

    /// An enter or exit sequence failed.
    #[error("{source}")]
    Transition {
        /// The underlying transition error.
        #[from]
        source: TransitionError,
    },

    /// Auto-enter bookkeeping failed.
    #[error("{source}")]
    AutoEnter {
        /// The underlying auto-enter error.
        #[from]
        source: AutoEnterError,
    },

    /// The automation gate refused.
    #[error("automation denied: {source}")]
    Denied {
        /// Why the gate refused.
        #[from]
        source: GateDenial,
    },
}

/// Executes [`ZoneCommand`]s against the arena services.
pub struct CommandDispatcher {
    registry: Arc<ZoneRegistry>,
    auto_enter: Arc<AutoEnterService>,
    gate: Arc<dyn AutomationGate>,
    arena_id: ArenaId,
    arena_label: String,
}

impl CommandDispatcher {
    /// Create a dispatcher. `arena_id` and `arena_label` are used by
    /// `Enter` and as the default for `Exit`.
    pub fn new(
        registry: Arc<ZoneRegistry>,
        auto_enter: Arc<AutoEnterService>,
        gate: Arc<dyn AutomationGate>,
        arena_id: ArenaId,
        arena_label: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            auto_enter,
            gate,
            arena_id,
            arena_label: arena_label.into(),
        }
    }

    /// Run `command` for `ctx` and return the reply lines.
    pub fn dispatch(&self, ctx: &CommandContext, command: ZoneCommand) -> Result<Vec<String>, CommandError> {
        if command.requires_admin() && !ctx.is_admin {
            info!(player_id = %ctx.player_id, command = ?command, "Admin command refused");
            return Err(CommandError::AdminRequired);
        }

        match command {
            ZoneCommand::Activate { arena_id, zone } => self.activate(arena_id, zone),
            ZoneCommand::Deactivate { arena_id } => self.deactivate(arena_id),
            ZoneCommand::Status => Ok(self.status()),
            ZoneCommand::Info { position } => Ok(self.info(&position)),
            ZoneCommand::ClearAll => Ok(self.clear_all()),
            ZoneCommand::Enter => self.enter(ctx.player_id),
            ZoneCommand::Exit => self.exit(ctx.player_id),
            ZoneCommand::PlayerStatus => Ok(self.player_status(ctx)),
            ZoneCommand::AutoEnter { enabled } => Ok(self.auto_enter(ctx, enabled)),
            ZoneCommand::RunAutomation { capability, script } => {
                self.run_automation(ctx, capability, script)
            }
        }
    }

    fn activate(&self, arena_id: ArenaId, zone: Option<Zone>) -> Result<Vec<String>, CommandError> {
        let zone = zone.unwrap_or_else(|| self.registry.settings().default_zone.synthesize());
        let name = zone.name.clone();
        let reply = match self.registry.activate(arena_id, zone)? {
            Activation::Activated {
                structures,
                decorations,
            } => format!(
                "Zone '{name}' activated in arena {arena_id} ({structures} structures, {decorations} decorations)"
            ),
            Activation::AlreadyActive => format!("Arena {arena_id} is already active"),
        };
        Ok(vec![reply])
    }

    fn deactivate(&self, arena_id: ArenaId) -> Result<Vec<String>, CommandError> {
        let reply = match self.registry.deactivate(arena_id)? {
            Deactivation::Deactivated { evicted } => {
                format!("Arena {arena_id} deactivated, {} players removed", evicted.len())
            }
            Deactivation::AlreadyInactive => format!("Arena {arena_id} is already inactive"),
        };
        Ok(vec![reply])
    }

    fn status(&self) -> Vec<String> {
        let zones = self.registry.active_zones_with_counts();
        let mut lines = vec![format!("Active zones: {}", zones.len())];
        for (arena_id, zone, members) in zones {
            lines.push(format!("  [{arena_id}] {} at {}: {members} players", zone.name, zone.center));
        }
        lines
    }

    fn info(&self, position: &Position) -> Vec<String> {
        let mut lines = vec![format!("Position {position}")];
        match self.registry.zone_containing_position(position) {
            Some((arena_id, zone)) => {
                lines.push(format!("  Inside '{}' (arena {arena_id})", zone.name));
                if let Some(d) = geometry::distance_to_boundary(&zone, position) {
                    lines.push(format!("  Distance to border: {d:.1}"));
                }
            }
            None => lines.push(String::from("  Not inside any active zone")),
        }
        lines.push(format!(
            "  Near border: {}",
            self.registry.is_in_transition_zone(position)
        ));
        if let Some((arena_id, distance)) = self.registry.nearest_active_zone(position) {
            lines.push(format!("  Nearest zone center: arena {arena_id}, {distance:.1} units"));
        }
        lines
    }

    fn clear_all(&self) -> Vec<String> {
        let summary = self.registry.clear_all();
        vec![format!(
            "Cleared {} zones ({} were active)",
            summary.removed, summary.deactivated
        )]
    }

    fn enter(&self, player: PlayerId) -> Result<Vec<String>, CommandError> {
        let reply = match transition::enter_arena(&self.registry, self.arena_id, player, &self.arena_label)? {
            EnterOutcome::Entered => "Entered arena successfully!",
            EnterOutcome::AlreadyInArena => "You are already in the arena!",
        };
        Ok(vec![reply.to_owned()])
    }

    fn exit(&self, player: PlayerId) -> Result<Vec<String>, CommandError> {
        let arena_id = self.registry.player_arena_id(player).unwrap_or(self.arena_id);
        let reply = match transition::exit_arena(&self.registry, arena_id, player)? {
            ExitOutcome::Exited => "Exited arena successfully!",
            ExitOutcome::NotInArena => "You are not in the arena!",
        };
        Ok(vec![reply.to_owned()])
    }

    fn player_status(&self, ctx: &CommandContext) -> Vec<String> {
        let player = ctx.player_id;
        let lifecycle = self.registry.lifecycle();
        let mut lines = vec![
            String::from("Arena Status:"),
            format!("  In Arena: {}", lifecycle.is_player_in_arena(player)),
            format!("  PvP State: {:?}", lifecycle.pvp_state(player)),
            format!(
                "  Arena Membership: {}",
                self.registry
                    .player_arena_id(player)
                    .map_or_else(|| String::from("none"), |id| id.to_string())
            ),
            format!("  Auto-enter: {}", self.auto_enter.is_enabled(player)),
            format!("  Immortal: {}", self.registry.is_player_immortal(player)),
        ];
        if let Some(position) = ctx.position {
            lines.push(format!(
                "  In Arena Zone: {}",
                self.registry.is_position_in_any_arena(&position)
            ));
        }
        lines
    }

    fn auto_enter(&self, ctx: &CommandContext, enabled: bool) -> Vec<String> {
        let reply = if enabled {
            if self.auto_enter.enable(ctx.player_id, ctx.now) {
                "Auto-enter enabled"
            } else {
                "Auto-enter is already enabled"
            }
        } else if self.auto_enter.disable(ctx.player_id, ctx.now) {
            "Auto-enter disabled"
        } else {
            "Auto-enter is not enabled"
        };
        vec![reply.to_owned()]
    }

    fn run_automation(
        &self,
        ctx: &CommandContext,
        capability: AutomationCapability,
        script: String,
    ) -> Result<Vec<String>, CommandError> {
        let context = AutomationContext::capture(&self.registry, ctx.player_id, ctx.is_admin, script);
        let reply = gate::execute(self.gate.as_ref(), &context, capability, || {
            format!("Automation '{}' allowed for {capability:?}", context.script_name)
        })?;
        Ok(vec![reply])
    }
}
