//! Shared type definitions for the arena zone system.
//!
//! This crate is the single source of truth for the vocabulary used by the
//! zone registry, the proximity monitor, and the host binary.
//!
//! # Modules
//!
//! - [`ids`] -- Arena, player, and spawn-handle identifiers
//! - [`enums`] -- `PvP` state, proximity state, automation capabilities
//! - [`structs`] -- Positions and zone definitions

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{AutomationCapability, ProximityState, PvpState};
pub use ids::{ArenaId, PlayerId, SpawnHandle};
pub use structs::{Position, Zone, ZoneFlags, ZoneShape};
