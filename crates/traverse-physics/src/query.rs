//! Collision probe types shared by every movement mode

use std::collections::HashSet;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use traverse_core::EntityId;

/// Result of a single sweep or trace
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HitResult {
    /// Whether the sweep stopped against blocking geometry
    pub blocking_hit: bool,
    /// Whether the shape already overlapped geometry at the start location
    pub start_penetrating: bool,
    /// Time of impact as a fraction of the sweep in [0, 1]
    pub time: f32,
    /// Distance travelled before the impact
    pub distance: f32,
    /// Shape center at the time of impact
    pub location: Vec3,
    /// Contact point on the hit surface
    pub impact_point: Vec3,
    /// Surface normal of the hit geometry at the contact
    pub impact_normal: Vec3,
    /// Normal of the swept shape at the contact; equals `impact_normal` for
    /// rays and spheres, differs at capsule and box edges
    pub normal: Vec3,
    pub trace_start: Vec3,
    pub trace_end: Vec3,
    /// Depth of the initial overlap when `start_penetrating`
    pub penetration_depth: f32,
    /// Owner of the hit geometry, if it was registered with one
    pub actor: Option<EntityId>,
}

impl HitResult {
    /// A miss spanning the whole sweep
    pub fn no_hit(start: Vec3, end: Vec3) -> Self {
        Self {
            time: 1.0,
            distance: (end - start).length(),
            location: end,
            trace_start: start,
            trace_end: end,
            ..Default::default()
        }
    }

    /// Blocking hit that did not start in penetration
    pub fn is_valid_blocking_hit(&self) -> bool {
        self.blocking_hit && !self.start_penetrating
    }

    /// Direction of the sweep, or zero for a degenerate sweep
    pub fn trace_direction(&self) -> Vec3 {
        traverse_core::math::safe_normal(self.trace_end - self.trace_start)
    }
}

/// Primitive shapes that can be swept
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CollisionShape {
    /// Upright capsule; `half_height` includes the hemispherical caps
    Capsule { radius: f32, half_height: f32 },
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    Line,
}

impl CollisionShape {
    pub fn capsule(radius: f32, half_height: f32) -> Self {
        Self::Capsule {
            radius,
            half_height: half_height.max(radius),
        }
    }

    pub fn sphere(radius: f32) -> Self {
        Self::Sphere { radius }
    }

    /// Shrink the shape uniformly, never below a point
    pub fn inflated(&self, amount: f32) -> Self {
        match *self {
            Self::Capsule { radius, half_height } => {
                let r = (radius + amount).max(0.0);
                Self::Capsule {
                    radius: r,
                    half_height: (half_height + amount).max(r),
                }
            }
            Self::Sphere { radius } => Self::Sphere {
                radius: (radius + amount).max(0.0),
            },
            Self::Box { half_extents } => Self::Box {
                half_extents: (half_extents + Vec3::splat(amount)).max(Vec3::ZERO),
            },
            Self::Line => Self::Line,
        }
    }
}

/// Which geometry a query should collide with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionChannel {
    /// Static level geometry only
    WorldStatic,
    /// Level geometry and water surfaces
    Visibility,
    /// Level geometry and other characters
    Pawn,
    /// Swing rope segments
    Rope,
}

/// Per-query options
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub ignored_actors: HashSet<EntityId>,
    /// Skip geometry the shape overlaps at its start location
    pub ignore_initial_overlap: bool,
}

impl QueryParams {
    pub fn ignoring(actor: EntityId) -> Self {
        let mut params = Self::default();
        params.ignored_actors.insert(actor);
        params
    }

    pub fn add_ignored_actor(&mut self, actor: EntityId) {
        self.ignored_actors.insert(actor);
    }

    pub fn remove_ignored_actor(&mut self, actor: EntityId) {
        self.ignored_actors.remove(&actor);
    }

    pub fn is_ignored(&self, actor: Option<EntityId>) -> bool {
        actor.is_some_and(|a| self.ignored_actors.contains(&a))
    }
}

/// Synchronous collision queries against a world
pub trait CollisionQuery {
    /// Sweep `shape` with orientation `rotation` from `start` to `end`
    fn sweep(
        &self,
        shape: &CollisionShape,
        rotation: Quat,
        start: Vec3,
        end: Vec3,
        channel: CollisionChannel,
        params: &QueryParams,
    ) -> HitResult;

    fn line_trace(
        &self,
        start: Vec3,
        end: Vec3,
        channel: CollisionChannel,
        params: &QueryParams,
    ) -> HitResult {
        self.sweep(&CollisionShape::Line, Quat::IDENTITY, start, end, channel, params)
    }

    /// Whether `shape` placed at `location` overlaps blocking geometry
    fn overlap_blocking(
        &self,
        shape: &CollisionShape,
        rotation: Quat,
        location: Vec3,
        channel: CollisionChannel,
        params: &QueryParams,
    ) -> bool {
        let mut params = params.clone();
        params.ignore_initial_overlap = false;
        let hit = self.sweep(shape, rotation, location, location + Vec3::Z * 0.01, channel, &params);
        hit.start_penetrating
    }

    /// Whether the actor moves on its own; dynamic bases disable floor caching
    fn is_dynamic(&self, _actor: EntityId) -> bool {
        false
    }

    /// Whether the actor is a water body rather than solid ground
    fn is_water_body(&self, _actor: EntityId) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_hit_spans_sweep() {
        let hit = HitResult::no_hit(Vec3::ZERO, Vec3::new(0.0, 0.0, -10.0));
        assert!(!hit.blocking_hit);
        assert_eq!(hit.time, 1.0);
        assert_eq!(hit.distance, 10.0);
        assert_eq!(hit.trace_direction(), -Vec3::Z);
    }

    #[test]
    fn test_capsule_never_shorter_than_radius() {
        let shape = CollisionShape::capsule(30.0, 10.0);
        assert_eq!(
            shape,
            CollisionShape::Capsule {
                radius: 30.0,
                half_height: 30.0
            }
        );
        let shrunk = CollisionShape::capsule(30.0, 75.0).inflated(-40.0);
        assert_eq!(
            shrunk,
            CollisionShape::Capsule {
                radius: 0.0,
                half_height: 35.0
            }
        );
    }

    #[test]
    fn test_ignored_actor() {
        let id = EntityId::new();
        let params = QueryParams::ignoring(id);
        assert!(params.is_ignored(Some(id)));
        assert!(!params.is_ignored(Some(EntityId::new())));
        assert!(!params.is_ignored(None));
    }
}
