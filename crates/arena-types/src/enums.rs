//! Enumeration types shared across the arena crates.

use serde::{Deserialize, Serialize};

/// A player's `PvP` participation state, owned by the lifecycle service.
///
/// Transitions run `Outside -> Snapshot -> Active` on entry and
/// `Active -> Restoring -> Outside` on exit. `Snapshot` and `Restoring`
/// are transient states during which automation is refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PvpState {
    /// Not participating.
    #[default]
    Outside,
    /// Stats and gear are being captured before entry.
    Snapshot,
    /// Participating under arena rules.
    Active,
    /// Stats and gear are being restored after exit.
    Restoring,
}

impl PvpState {
    /// Whether the player is mid-transition (snapshot or restore running).
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Snapshot | Self::Restoring)
    }
}

/// Per-player result of the last proximity scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityState {
    /// Not near any active zone.
    #[default]
    Outside,
    /// Within the hysteresis band of an active zone.
    Inside,
}

/// Capabilities an automation script may request from the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationCapability {
    /// Read-only statistics.
    ReadOnlyAnalytics,
    /// Suggestions that change nothing.
    AdvisoryOnly,
    /// Mutations of the virtual `PvP` state.
    PvpVirtualMutation,
    /// Chat broadcasts.
    Broadcast,
    /// Log output.
    Logging,
    /// Placing castle structures.
    CastleBuilding,
    /// Managing existing castle structures.
    CastleManagement,
    /// Moving items between containers.
    LogisticsTransfer,
    /// Refilling consumables.
    LogisticsRefill,
    /// Repairing gear.
    LogisticsRepair,
    /// Rebalancing stock between containers.
    LogisticsBalance,
}

impl AutomationCapability {
    /// Capabilities that observe or announce without mutating anything.
    pub const fn is_advisory(self) -> bool {
        matches!(
            self,
            Self::ReadOnlyAnalytics | Self::AdvisoryOnly | Self::Broadcast | Self::Logging
        )
    }

    /// Capabilities that require an administrator.
    pub const fn requires_admin(self) -> bool {
        !self.is_advisory()
    }
}
