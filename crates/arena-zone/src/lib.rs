//! Zone geometry, zone state, and the zone registry.
//!
//! The [`ZoneRegistry`] is the single authority over which arenas are
//! active and who is inside them. It drives two external collaborators
//! through narrow traits: [`Spawner`] for structures and decorations, and
//! [`Lifecycle`] for forced exits on deactivation.
//!
//! # Modules
//!
//! - [`geometry`] -- Containment and border predicates
//! - [`state`] -- Per-arena runtime state
//! - [`registry`] -- The registry and its outcome types
//! - [`spawner`] -- Spawner contract and an in-memory stub
//! - [`lifecycle`] -- Lifecycle contract and an in-memory stub
//! - [`isolation`] -- Catching collaborator panics
//! - [`error`] -- Registry errors

pub mod error;
pub mod geometry;
pub mod isolation;
pub mod lifecycle;
pub mod registry;
pub mod spawner;
pub mod state;

pub use error::ZoneError;
pub use isolation::catch_collaborator;
pub use lifecycle::{Lifecycle, LifecycleError, StubLifecycle};
pub use registry::{
    Activation, ClearSummary, Deactivation, DefaultZoneSettings, MembershipChange,
    RegistrySettings, ZoneCollaborators, ZoneRegistry,
};
pub use spawner::{SpawnCall, SpawnError, Spawner, SpawnerKind, StubSpawner};
pub use state::ZoneState;
