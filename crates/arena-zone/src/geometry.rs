//! Pure shape predicates for zone footprints.
//!
//! All checks are planar: height is carried on [`Position`] but ignored.
//! A malformed zone (non-finite center, non-finite or non-positive size)
//! never contains anything and is never near anything, so callers can use
//! these predicates without validating first.

use arena_types::{Position, Zone, ZoneShape};

/// Distance from a border at which a position counts as "transitioning".
pub const DEFAULT_BORDER_THRESHOLD: f32 = 2.0;

/// Upper bound on sampled border points for a single zone.
const MAX_BORDER_POINTS: u16 = 1024;

/// Describe what is wrong with a zone's geometry, or `None` if it is usable.
pub fn geometry_defect(zone: &Zone) -> Option<&'static str> {
    if !zone.center.is_finite() {
        return Some("center is not finite");
    }
    match zone.shape {
        ZoneShape::Circle { radius } => {
            if !radius.is_finite() || radius <= 0.0 {
                return Some("circle radius must be finite and positive");
            }
        }
        ZoneShape::Box { width, length } => {
            if !width.is_finite() || !length.is_finite() || width <= 0.0 || length <= 0.0 {
                return Some("box dimensions must be finite and positive");
            }
        }
    }
    None
}

/// Whether the zone can be activated and queried.
pub fn is_well_formed(zone: &Zone) -> bool {
    geometry_defect(zone).is_none()
}

/// Whether `point` lies inside the zone footprint (borders included).
pub fn contains(zone: &Zone, point: &Position) -> bool {
    signed_boundary_distance(zone, point).is_some_and(|d| d <= 0.0)
}

/// Unsigned planar distance from `point` to the nearest point of the
/// zone's border. `None` for malformed zones or non-finite points.
pub fn distance_to_boundary(zone: &Zone, point: &Position) -> Option<f32> {
    signed_boundary_distance(zone, point).map(f32::abs)
}

/// Whether `point` is strictly closer than `threshold` to the zone border,
/// from either side.
pub fn near_border(zone: &Zone, point: &Position, threshold: f32) -> bool {
    if !threshold.is_finite() || threshold <= 0.0 {
        return false;
    }
    distance_to_boundary(zone, point).is_some_and(|d| d < threshold)
}

/// Planar distance from `point` to the zone center.
pub fn distance_to_center(zone: &Zone, point: &Position) -> Option<f32> {
    if !is_well_formed(zone) || !point.is_finite() {
        return None;
    }
    Some(zone.center.planar_distance(point))
}

/// Negative inside, positive outside, zero on the border.
fn signed_boundary_distance(zone: &Zone, point: &Position) -> Option<f32> {
    if !is_well_formed(zone) || !point.is_finite() {
        return None;
    }
    let center = zone.center;
    let distance = match zone.shape {
        ZoneShape::Circle { radius } => center.planar_distance(point) - radius,
        ZoneShape::Box { width, length } => {
            let dx = (point.x - center.x).abs() - width / 2.0;
            let dz = (point.z - center.z).abs() - length / 2.0;
            let outside = dx.max(0.0).hypot(dz.max(0.0));
            let inside = dx.max(dz).min(0.0);
            outside + inside
        }
    };
    Some(distance)
}

/// Sample the zone outline every `spacing` units, at the zone's height.
///
/// Used to place border glows. Returns an empty list for malformed zones
/// or a non-positive spacing; never returns more than 1024 points.
pub fn border_points(zone: &Zone, spacing: f32) -> Vec<Position> {
    if !is_well_formed(zone) || !spacing.is_finite() || spacing <= 0.0 {
        return Vec::new();
    }
    let center = zone.center;
    match zone.shape {
        ZoneShape::Circle { radius } => {
            let circumference = std::f32::consts::TAU * radius;
            let count = segment_count(circumference, spacing);
            let step = std::f32::consts::TAU / f32::from(count);
            (0..count)
                .map(|i| {
                    let angle = step * f32::from(i);
                    Position::new(
                        radius.mul_add(angle.cos(), center.x),
                        center.y,
                        radius.mul_add(angle.sin(), center.z),
                    )
                })
                .collect()
        }
        ZoneShape::Box { width, length } => {
            let (hw, hl) = (width / 2.0, length / 2.0);
            let corners = [
                Position::new(center.x - hw, center.y, center.z - hl),
                Position::new(center.x + hw, center.y, center.z - hl),
                Position::new(center.x + hw, center.y, center.z + hl),
                Position::new(center.x - hw, center.y, center.z + hl),
            ];
            let edges = corners.iter().zip(corners.iter().cycle().skip(1));
            let mut points = Vec::new();
            for (from, to) in edges {
                let count = segment_count(from.planar_distance(to), spacing);
                for i in 0..count {
                    let t = f32::from(i) / f32::from(count);
                    points.push(Position::new(
                        (to.x - from.x).mul_add(t, from.x),
                        center.y,
                        (to.z - from.z).mul_add(t, from.z),
                    ));
                }
            }
            points.truncate(usize::from(MAX_BORDER_POINTS));
            points
        }
    }
}

/// Number of `spacing`-sized segments needed to cover `length`, at least 1.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn segment_count(length: f32, spacing: f32) -> u16 {
    let raw = (length / spacing).ceil();
    if !raw.is_finite() || raw < 1.0 {
        return 1;
    }
    raw.min(f32::from(MAX_BORDER_POINTS)) as u16
}
