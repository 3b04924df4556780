//! Type-safe identifier wrappers.
//!
//! Arenas and players are identified by small integers handed to us by the
//! host (arena slots and platform ids). Spawned props are identified by
//! opaque [`SpawnHandle`]s minted by whichever spawner created them, using
//! UUID v7 so handles sort by creation time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a transparent newtype wrapper around an integer id.
macro_rules! define_numeric_id {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty)
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Wrap a raw identifier value.
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            /// Return the raw identifier value.
            pub const fn into_inner(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }
    };
}

define_numeric_id! {
    /// Identifier of an arena slot. Slot `0` is the default practice arena.
    ArenaId(u32)
}

define_numeric_id! {
    /// Platform identifier of a connected player.
    PlayerId(u64)
}

/// Opaque handle to an entity created by a spawner.
///
/// The registry never interprets handles; it only stores them so the zone
/// state can report what was spawned on activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpawnHandle(pub Uuid);

impl SpawnHandle {
    /// Create a new handle using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for SpawnHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SpawnHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_display_raw_value() {
        assert_eq!(ArenaId::new(7).to_string(), "7");
        assert_eq!(PlayerId::from(76_561_198_000_000_001).to_string(), "76561198000000001");
    }

    #[test]
    fn numeric_ids_serialize_transparently() {
        let json = serde_json::to_string(&PlayerId::new(42)).ok();
        assert_eq!(json.as_deref(), Some("42"));
        let restored: Result<ArenaId, _> = serde_json::from_str("3");
        assert_eq!(restored.ok(), Some(ArenaId::new(3)));
    }

    #[test]
    fn spawn_handles_are_unique() {
        let a = SpawnHandle::new();
        let b = SpawnHandle::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }
}
