//! Core value types: world positions and zone definitions.
//!
//! A [`Zone`] is an immutable description of an arena region. Runtime
//! state (active flag, members, spawned handles) lives in the registry,
//! never here.

use serde::{Deserialize, Serialize};

/// A point in world space. Height (`y`) is carried but ignored by all
/// zone containment checks, which are planar on `x`/`z`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// East-west coordinate.
    pub x: f32,
    /// Height above the terrain origin.
    pub y: f32,
    /// North-south coordinate.
    pub z: f32,
}

impl Position {
    /// Create a position from its three components.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Whether every component is a finite number.
    pub const fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Distance to `other` on the `x`/`z` plane.
    pub fn planar_distance(&self, other: &Self) -> f32 {
        (self.x - other.x).hypot(self.z - other.z)
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Footprint of a zone around its center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneShape {
    /// A disc of the given radius.
    Circle {
        /// Radius in world units.
        radius: f32,
    },
    /// An axis-aligned rectangle.
    Box {
        /// Full extent along `x`.
        width: f32,
        /// Full extent along `z`.
        length: f32,
    },
}

/// Behavior flags carried by a zone definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneFlags {
    /// Members of this zone cannot die.
    pub is_immortal: bool,
    /// The zone restarts its timer when it runs out.
    pub is_repeating: bool,
    /// Round length in seconds; `0` means no limit.
    pub timer_seconds: f32,
    /// Distance between border glow decorations.
    pub glow_spacing: f32,
}

impl Default for ZoneFlags {
    fn default() -> Self {
        Self {
            is_immortal: false,
            is_repeating: false,
            timer_seconds: 0.0,
            glow_spacing: 2.0,
        }
    }
}

/// An arena region definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Display name shown to players.
    pub name: String,
    /// Center of the footprint.
    pub center: Position,
    /// Footprint shape and size.
    pub shape: ZoneShape,
    /// Behavior flags.
    #[serde(default)]
    pub flags: ZoneFlags,
}

impl Zone {
    /// A circular zone with default flags.
    pub fn circle(name: impl Into<String>, center: Position, radius: f32) -> Self {
        Self {
            name: name.into(),
            center,
            shape: ZoneShape::Circle { radius },
            flags: ZoneFlags::default(),
        }
    }

    /// A rectangular zone with default flags.
    pub fn rectangle(name: impl Into<String>, center: Position, width: f32, length: f32) -> Self {
        Self {
            name: name.into(),
            center,
            shape: ZoneShape::Box { width, length },
            flags: ZoneFlags::default(),
        }
    }

    /// Return this zone with the given flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: ZoneFlags) -> Self {
        self.flags = flags;
        self
    }
}
