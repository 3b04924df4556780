//! Error types for the `arena-zone` crate.
//!
//! Registry mutations return [`ZoneError`]; collaborator failures
//! ([`SpawnError`], [`LifecycleError`], and caught panics) are logged at
//! the call site and never escape a registry operation.
//!
//! [`SpawnError`]: crate::spawner::SpawnError
//! [`LifecycleError`]: crate::lifecycle::LifecycleError

use arena_types::ArenaId;

/// Errors returned by zone registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ZoneError {
    /// The zone definition is malformed (non-finite center, non-positive size).
    ///
    /// Raised before any state is touched.
    #[error("invalid geometry for arena {arena_id}: {reason}")]
    InvalidGeometry {
        /// The arena the zone was meant for.
        arena_id: ArenaId,
        /// What is wrong with the geometry.
        reason: &'static str,
    },

    /// No zone state is registered under this arena id.
    #[error("arena not found: {0}")]
    UnknownArena(ArenaId),
}
