//! Wall probes used by climbing
//!
//! Three forward sphere sweeps (head, chest, feet) sample the wall in front
//! of the character, plus one along the current motion. The hits are refined
//! with small assist sweeps and averaged into one adhesion point and normal.

use glam::{Quat, Vec3};
use traverse_core::math::{is_nearly_zero, safe_normal, KINDA_SMALL_NUMBER};
use traverse_physics::{CollisionChannel, CollisionShape, HitResult};

use crate::context::MoveContext;
use crate::state::WallHits;

const SURFACE_ASSIST_RADIUS: f32 = 6.0;
const SURFACE_ASSIST_DISTANCE: f32 = 120.0;
/// Eye trace length in front of a fully vertical wall
const FACING_TRACE_BASE_LENGTH: f32 = 80.0;

/// Averaged climbing surface; a zero normal means nothing usable was found
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SurfaceInfo {
    pub position: Vec3,
    pub normal: Vec3,
}

impl SurfaceInfo {
    pub fn is_valid(&self) -> bool {
        self.normal != Vec3::ZERO
    }
}

impl MoveContext<'_> {
    /// Sweep the standing-size sphere forward at head, chest and feet height,
    /// and once along the current motion
    pub fn sweep_wall_hits(&self, location: Vec3, forward: Vec3) -> WallHits {
        let capsule = &self.settings.capsule;
        let radius = capsule.stand_radius;
        let segment = capsule.stand_half_height - radius;
        let shape = CollisionShape::sphere(radius);
        let up = self.capsule.up();
        let reach = forward * radius * 2.0;

        let sweep = |start: Vec3, delta: Vec3| {
            self.world.sweep(
                &shape,
                Quat::IDENTITY,
                start,
                start + delta,
                CollisionChannel::WorldStatic,
                self.params,
            )
        };

        let up_hit = sweep(location + up * segment, reach);
        let forward_hit = sweep(location, reach);
        let down_hit = sweep(location - up * segment, reach);

        // Never probe downwards along the motion
        let velocity = self.state.velocity;
        let motion = if is_nearly_zero(velocity, KINDA_SMALL_NUMBER) {
            self.state.acceleration
        } else {
            velocity
        };
        let motion_dir = safe_normal(Vec3::new(motion.x, motion.y, motion.z.max(0.0)));
        let velocity_hit = if motion_dir == Vec3::ZERO {
            HitResult::no_hit(location, location)
        } else {
            sweep(location, motion_dir * radius * 2.0)
        };

        WallHits {
            all_collided: up_hit.blocking_hit && forward_hit.blocking_hit,
            hits: vec![up_hit, forward_hit, down_hit],
            velocity_hit,
        }
    }

    /// Line trace forward from eye height; true when something blocks it
    pub fn eye_height_trace(&self, distance: f32, location: Vec3, up: Vec3, forward: Vec3) -> bool {
        let offset = self.settings.engine.base_eye_height + self.settings.climbing.eye_height_offset;
        let start = location + up * offset;
        let end = start + forward * distance;
        self.world
            .line_trace(start, end, CollisionChannel::WorldStatic, self.params)
            .blocking_hit
    }

    /// Eye trace whose reach grows as the surface leans away from vertical
    ///
    /// `steepness` is the horizontal share of the surface normal, 1 for a
    /// vertical wall.
    pub fn is_facing_surface(&self, steepness: f32, location: Vec3, up: Vec3, forward: Vec3) -> bool {
        let multiplier = 1.0 + (1.0 - steepness) * 5.0;
        self.eye_height_trace(FACING_TRACE_BASE_LENGTH * multiplier, location, up, forward)
    }

    /// Average the wall hits into one adhesion point and normal
    ///
    /// Each blocking hit is refined by a small sphere swept from `start`
    /// towards its impact point. The velocity probe's normal is blended in
    /// afterwards. With no blocking refinement the result is zero.
    pub fn compute_surface_info(
        &self,
        hits: &[HitResult],
        velocity_hit_normal: Vec3,
        start: Vec3,
    ) -> SurfaceInfo {
        let shape = CollisionShape::sphere(SURFACE_ASSIST_RADIUS);
        let mut position = Vec3::ZERO;
        let mut normal = Vec3::ZERO;
        let mut count = 0;

        for hit in hits.iter().filter(|h| h.blocking_hit) {
            let dir = safe_normal(hit.impact_point - start);
            if dir == Vec3::ZERO {
                continue;
            }
            let assist = self.world.sweep(
                &shape,
                Quat::IDENTITY,
                start,
                start + dir * SURFACE_ASSIST_DISTANCE,
                CollisionChannel::WorldStatic,
                self.params,
            );
            if !assist.blocking_hit {
                continue;
            }
            position += assist.location;
            normal += assist.normal;
            count += 1;
        }

        if count == 0 {
            return SurfaceInfo::default();
        }

        position /= count as f32;
        let normal = safe_normal(safe_normal(normal) + velocity_hit_normal);
        SurfaceInfo { position, normal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_near, SlabWorld, TestRig};

    fn wall_rig(wall_x: f32) -> TestRig {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        world.add_wall(Vec3::new(wall_x, 0.0, 0.0), Vec3::NEG_X);
        let mut rig = TestRig::new(world);
        rig.place_on_floor(Vec3::ZERO, 2.15);
        rig
    }

    #[test]
    fn test_wall_hits_all_collide_against_tall_wall() {
        let mut rig = wall_rig(40.0);
        let ctx = rig.context();
        let hits = ctx.sweep_wall_hits(ctx.location(), Vec3::X);
        assert!(hits.all_collided);
        assert_eq!(hits.hits.len(), 3);
        assert!(hits.hits.iter().all(|h| h.blocking_hit));
        // No motion, no velocity probe
        assert!(!hits.velocity_hit.blocking_hit);
    }

    #[test]
    fn test_velocity_probe_ignores_downward_motion() {
        let mut rig = wall_rig(40.0);
        rig.state.velocity = Vec3::new(0.0, 0.0, -300.0);
        let ctx = rig.context();
        let hits = ctx.sweep_wall_hits(ctx.location(), Vec3::X);
        assert!(!hits.velocity_hit.blocking_hit);

        drop(ctx);
        rig.state.velocity = Vec3::new(200.0, 0.0, -300.0);
        let ctx = rig.context();
        let hits = ctx.sweep_wall_hits(ctx.location(), Vec3::X);
        assert!(hits.velocity_hit.blocking_hit);
        assert_eq!(hits.velocity_hit.impact_normal, Vec3::NEG_X);
    }

    #[test]
    fn test_no_hits_without_wall() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 2.15);
        let ctx = rig.context();
        let hits = ctx.sweep_wall_hits(ctx.location(), Vec3::X);
        assert!(!hits.all_collided);
        let surface = ctx.compute_surface_info(&hits.hits, Vec3::ZERO, ctx.location());
        assert!(!surface.is_valid());
        assert_eq!(surface.position, Vec3::ZERO);
    }

    #[test]
    fn test_surface_info_averages_wall() {
        let mut rig = wall_rig(40.0);
        let ctx = rig.context();
        let location = ctx.location();
        let hits = ctx.sweep_wall_hits(location, Vec3::X);
        let surface = ctx.compute_surface_info(&hits.hits, Vec3::ZERO, location);
        assert!(surface.is_valid());
        assert_near(surface.normal.x, -1.0, 1e-4);
        // Assist spheres stop one radius in front of the wall
        assert_near(surface.position.x, 40.0 - SURFACE_ASSIST_RADIUS, 1e-2);
    }

    #[test]
    fn test_eye_trace_misses_low_wall() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        world.add_box(Vec3::new(40.0, -200.0, 0.0), Vec3::new(100.0, 200.0, 100.0));
        let mut rig = TestRig::new(world);
        rig.place_on_floor(Vec3::ZERO, 2.15);
        let ctx = rig.context();
        // Eye height is 64 above a center at ~77, well over the box
        assert!(!ctx.eye_height_trace(200.0, ctx.location(), Vec3::Z, Vec3::X));
        assert!(ctx.eye_height_trace(200.0, ctx.location() - Vec3::Z * 60.0, Vec3::Z, Vec3::X));
    }

    #[test]
    fn test_facing_reach_grows_with_slant() {
        let mut rig = wall_rig(150.0);
        let ctx = rig.context();
        let location = ctx.location();
        // 80 of reach falls short of the wall at 150
        assert!(!ctx.is_facing_surface(1.0, location, Vec3::Z, Vec3::X));
        assert!(ctx.is_facing_surface(0.7, location, Vec3::Z, Vec3::X));
    }
}
