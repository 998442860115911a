//! Swept capsule moves shared by every integrator
//!
//! Moves never tunnel: the capsule stops at the first blocking hit, pulled
//! back a hair so the next sweep does not start touching. Sliding, two-wall
//! corners, step-ups and ledge handling are built on top of that primitive.

use glam::Vec3;
use traverse_core::math::{
    clamp_length, is_nearly_zero, safe_normal, safe_normal_2d, vector_plane_project,
    KINDA_SMALL_NUMBER,
};
use traverse_core::EntityId;
use traverse_physics::{CollisionChannel, HitResult};

use crate::context::{MoveContext, MAX_FLOOR_DIST, MAX_STEP_SIDE_Z, MIN_FLOOR_DIST};
use crate::dispatch::PhysicsStep;
use crate::floor::is_within_edge_tolerance;
use crate::mode::MovementMode;
use crate::state::FloorResult;

/// Extra distance added to every depenetration vector
const PENETRATION_PULLBACK: f32 = 0.125;
/// Inflation used when testing whether a depenetrated spot is free
const PENETRATION_OVERLAP_INFLATION: f32 = 0.1;

impl MoveContext<'_> {
    /// Sweep the capsule by `delta`, stopping at the first blocking hit
    pub fn move_component(&mut self, delta: Vec3) -> HitResult {
        let start = self.location();
        if is_nearly_zero(delta, 1.0e-8) {
            return HitResult::no_hit(start, start);
        }

        let end = start + delta;
        let shape = self.capsule.shape();
        let rotation = self.rotation();
        let mut hit = self
            .world
            .sweep(&shape, rotation, start, end, CollisionChannel::Pawn, self.params);

        // Moving out of an overlap is always allowed
        if hit.start_penetrating && hit.normal.dot(delta) > 0.0 {
            let mut params = self.params.clone();
            params.ignore_initial_overlap = true;
            hit = self
                .world
                .sweep(&shape, rotation, start, end, CollisionChannel::Pawn, &params);
        }

        // Stop a little short of the contact; `hit.location` keeps the
        // contact itself
        if hit.blocking_hit && !hit.start_penetrating {
            let length = delta.length();
            let time_back = 0.1_f32.clamp(0.1 / length, 1.0 / length) + 0.001;
            hit.time = (hit.time - time_back).clamp(0.0, 1.0);
        }

        let new_location = if hit.blocking_hit {
            start + delta * hit.time
        } else {
            end
        };
        self.capsule.set_location(new_location);
        hit
    }

    /// Move, resolving a starting penetration and retrying once
    pub fn safe_move(&mut self, delta: Vec3) -> HitResult {
        let hit = self.move_component(delta);
        if hit.start_penetrating {
            let adjustment = self.penetration_adjustment(&hit);
            if self.resolve_penetration(adjustment, &hit) {
                return self.move_component(delta);
            }
        }
        hit
    }

    /// Vector that pushes the capsule out of the geometry in `hit`
    pub fn penetration_adjustment(&self, hit: &HitResult) -> Vec3 {
        if !hit.start_penetrating {
            return Vec3::ZERO;
        }
        let depth = if hit.penetration_depth > 0.0 {
            hit.penetration_depth
        } else {
            PENETRATION_PULLBACK
        };
        clamp_length(
            hit.normal * (depth + PENETRATION_PULLBACK),
            self.settings.engine.max_depenetration,
        )
    }

    /// Try to move out of penetration; returns whether the capsule moved
    pub fn resolve_penetration(&mut self, adjustment: Vec3, hit: &HitResult) -> bool {
        if is_nearly_zero(adjustment, KINDA_SMALL_NUMBER) {
            return false;
        }

        let start = self.location();
        let probe = self.capsule.shape().inflated(PENETRATION_OVERLAP_INFLATION);
        let encroached = self.world.overlap_blocking(
            &probe,
            self.rotation(),
            hit.trace_start + adjustment,
            CollisionChannel::Pawn,
            self.params,
        );

        if !encroached {
            self.capsule.set_location(start + adjustment);
            return true;
        }

        let sweep_hit = self.move_component(adjustment);
        let mut moved = self.location() != start;

        if !moved && sweep_hit.start_penetrating {
            // Combine both MTDs to escape a corner
            let second = self.penetration_adjustment(&sweep_hit);
            let combined = adjustment + second;
            if second != adjustment && !is_nearly_zero(combined, KINDA_SMALL_NUMBER) {
                self.move_component(combined);
                moved = self.location() != start;
            }
        }

        if !moved {
            let travel = hit.trace_end - hit.trace_start;
            if !is_nearly_zero(travel, KINDA_SMALL_NUMBER) {
                self.move_component(adjustment + travel);
                moved = self.location() != start;
            }
        }

        if moved && self.state.mode.is_moving_on_ground() {
            self.state.just_teleported |= !self.settings.walking.maintain_horizontal_ground_velocity;
        }
        moved
    }

    /// Project the remaining move onto the hit surface
    pub fn compute_slide_vector(&self, delta: Vec3, time: f32, normal: Vec3, hit: &HitResult) -> Vec3 {
        let slide = vector_plane_project(delta, normal) * time;
        if self.state.mode.is_falling() {
            self.handle_slope_boosting(slide, delta, time, normal, hit)
        } else {
            slide
        }
    }

    /// Keep a falling slide from climbing higher than the original move
    fn handle_slope_boosting(
        &self,
        slide: Vec3,
        delta: Vec3,
        time: f32,
        normal: Vec3,
        _hit: &HitResult,
    ) -> Vec3 {
        let mut result = slide;
        if result.z > 0.0 {
            let z_limit = delta.z * time;
            if result.z - z_limit > KINDA_SMALL_NUMBER {
                if z_limit > 0.0 {
                    result *= z_limit / result.z;
                } else {
                    result = Vec3::ZERO;
                }

                // Spend the lost horizontal motion sliding along the wall
                let remainder = (slide - result) * Vec3::new(1.0, 1.0, 0.0);
                result += vector_plane_project(remainder, safe_normal_2d(normal));
            }
        }
        result
    }

    /// Slide along the surface hit by the previous move
    ///
    /// `hit` is updated with the last move made. Returns the fraction of
    /// `time` the slide actually covered.
    pub fn slide_along_surface(
        &mut self,
        delta: Vec3,
        time: f32,
        in_normal: Vec3,
        hit: &mut HitResult,
        handle_impact: bool,
    ) -> f32 {
        if !hit.blocking_hit {
            return 0.0;
        }

        let mut normal = in_normal;
        if self.state.mode.is_moving_on_ground() {
            if normal.z > 0.0 {
                // Unwalkable ramps act as walls
                if !self.is_walkable(hit) {
                    normal = safe_normal_2d(normal);
                }
            } else if normal.z < -KINDA_SMALL_NUMBER {
                // Hits on the upper half must not push us into the floor
                let floor = self.state.current_floor;
                if floor.floor_dist < MIN_FLOOR_DIST && floor.blocking_hit {
                    let floor_normal = floor.hit.normal;
                    let opposed = delta.dot(floor_normal) < 0.0 && floor_normal.z < 1.0 - 1.0e-5;
                    if opposed {
                        normal = floor_normal;
                    }
                    normal = safe_normal_2d(normal);
                }
            }
        }

        let old_hit_normal = normal;
        let mut slide_delta = self.compute_slide_vector(delta, time, normal, hit);
        if slide_delta.dot(delta) <= 0.0 {
            return 0.0;
        }

        *hit = self.safe_move(slide_delta);
        let first_hit_percent = hit.time;
        let mut percent_time_applied = first_hit_percent;

        if hit.is_valid_blocking_hit() {
            if handle_impact {
                self.handle_impact(hit);
            }

            self.two_wall_adjust(&mut slide_delta, hit, old_hit_normal);

            if !is_nearly_zero(slide_delta, 1.0e-3) && slide_delta.dot(delta) > 0.0 {
                *hit = self.safe_move(slide_delta);
                percent_time_applied += hit.time * (1.0 - first_hit_percent);
                if handle_impact && hit.blocking_hit {
                    self.handle_impact(hit);
                }
            }
        }

        percent_time_applied.clamp(0.0, 1.0)
    }

    /// Adjust a slide that ran into a second wall
    pub fn two_wall_adjust(&self, delta: &mut Vec3, hit: &HitResult, old_hit_normal: Vec3) {
        let in_delta = *delta;
        let hit_normal = hit.normal;

        if old_hit_normal.dot(hit_normal) <= 0.0 {
            // Corner of 90 degrees or less: move along the crease
            let desired = *delta;
            let crease = safe_normal(hit_normal.cross(old_hit_normal));
            *delta = crease * delta.dot(crease) * (1.0 - hit.time);
            if desired.dot(*delta) < 0.0 {
                *delta = -*delta;
            }
        } else {
            let desired = *delta;
            *delta = self.compute_slide_vector(*delta, 1.0 - hit.time, hit_normal, hit);
            if delta.dot(desired) <= 0.0 {
                *delta = Vec3::ZERO;
            } else if (hit_normal.dot(old_hit_normal) - 1.0).abs() < KINDA_SMALL_NUMBER {
                // Same wall twice: nudge away from it
                *delta += hit_normal * 0.01;
            }
        }

        if !self.state.mode.is_moving_on_ground() {
            return;
        }

        // Grounded slides never ride up walls or down into the floor
        if delta.z > 0.0 {
            let walkable_z = self.settings.walkable_floor_z();
            if (hit.normal.z >= walkable_z || self.is_walkable(hit)) && hit.normal.z > KINDA_SMALL_NUMBER {
                let time = 1.0 - hit.time;
                let scaled = safe_normal(*delta) * in_delta.length();
                *delta = Vec3::new(in_delta.x, in_delta.y, scaled.z / hit.normal.z) * time;

                let max_step = self.settings.walking.max_step_height;
                if delta.z > max_step {
                    *delta *= max_step / delta.z;
                }
            } else {
                delta.z = 0.0;
            }
        } else if delta.z < 0.0 {
            let floor = self.state.current_floor;
            if floor.floor_dist < MIN_FLOOR_DIST && floor.blocking_hit {
                delta.z = 0.0;
            }
        }
    }

    /// Redirect a horizontal move along a walkable ramp
    pub fn compute_ground_movement_delta(&self, delta: Vec3, ramp_hit: &HitResult, from_line_trace: bool) -> Vec3 {
        let floor_normal = ramp_hit.impact_normal;
        let contact_normal = ramp_hit.normal;

        if floor_normal.z < 1.0 - KINDA_SMALL_NUMBER
            && floor_normal.z > KINDA_SMALL_NUMBER
            && contact_normal.z > KINDA_SMALL_NUMBER
            && !from_line_trace
            && self.is_walkable(ramp_hit)
        {
            let floor_dot_delta = floor_normal.dot(delta);
            let ramp = Vec3::new(delta.x, delta.y, -floor_dot_delta / floor_normal.z);
            return if self.settings.walking.maintain_horizontal_ground_velocity {
                ramp
            } else {
                safe_normal(ramp) * delta.length()
            };
        }
        delta
    }

    /// Move along the current floor, stepping up or sliding on blocking hits
    ///
    /// Returns the floor found by a successful step-up, if it computed one.
    pub fn move_along_floor(&mut self, velocity: Vec3, delta_seconds: f32) -> Option<FloorResult> {
        if !self.state.current_floor.is_walkable_floor() {
            return None;
        }

        let delta = Vec3::new(velocity.x, velocity.y, 0.0) * delta_seconds;
        let floor = self.state.current_floor;
        let ramp = self.compute_ground_movement_delta(delta, &floor.hit, floor.line_trace);
        let mut hit = self.safe_move(ramp);
        let mut step_down = None;

        if hit.start_penetrating {
            self.handle_impact(&hit);
            let normal = hit.normal;
            self.slide_along_surface(delta, 1.0, normal, &mut hit, true);
        } else if hit.is_valid_blocking_hit() {
            let mut percent_time_applied = hit.time;
            if hit.time > 0.0 && hit.normal.z > KINDA_SMALL_NUMBER && self.is_walkable(&hit) {
                // Another walkable ramp
                let initial_percent_remaining = 1.0 - percent_time_applied;
                let ramp = self.compute_ground_movement_delta(delta * initial_percent_remaining, &hit, false);
                hit = self.safe_move(ramp);
                let second_hit_percent = hit.time * initial_percent_remaining;
                percent_time_applied = (percent_time_applied + second_hit_percent).clamp(0.0, 1.0);
            }

            if hit.is_valid_blocking_hit() {
                let remaining_delta = delta * (1.0 - percent_time_applied);
                if !self.step_up(remaining_delta, &hit, &mut step_down) {
                    self.handle_impact(&hit);
                    let normal = hit.normal;
                    self.slide_along_surface(delta, 1.0 - percent_time_applied, normal, &mut hit, true);
                } else if !self.settings.walking.maintain_horizontal_ground_velocity {
                    self.state.just_teleported = true;
                }
            }
        }

        step_down
    }

    /// Whether the capsule may try to step over `hit`
    pub fn can_step_up(&self, hit: &HitResult) -> bool {
        hit.is_valid_blocking_hit() && self.state.mode != MovementMode::Falling
    }

    /// Step up over an obstacle, forward, and back down
    ///
    /// On failure the capsule is put back where it started. `step_down` is
    /// filled with the floor under the final location when it was computed.
    pub fn step_up(&mut self, delta: Vec3, hit: &HitResult, step_down: &mut Option<FloorResult>) -> bool {
        let max_step_height = self.settings.walking.max_step_height;
        if !self.can_step_up(hit) || max_step_height <= 0.0 {
            return false;
        }

        let old_location = self.location();
        let radius = self.capsule.radius;
        let half_height = self.capsule.half_height;

        // Obstacles touching the top of the capsule cannot be stepped over
        let initial_impact_z = hit.impact_point.z;
        if initial_impact_z > old_location.z + (half_height - radius) {
            return false;
        }

        let mut step_travel_up_height = max_step_height;
        let mut step_travel_down_height = step_travel_up_height;
        let step_side_z = hit.impact_normal.z;
        let mut initial_floor_base_z = old_location.z - half_height;
        let mut floor_point_z = initial_floor_base_z;

        let floor = self.state.current_floor;
        if self.state.mode.is_moving_on_ground() && floor.is_walkable_floor() {
            let floor_dist = floor.distance_to_floor().max(0.0);
            initial_floor_base_z -= floor_dist;
            step_travel_up_height = (step_travel_up_height - floor_dist).max(0.0);
            step_travel_down_height = max_step_height + MAX_FLOOR_DIST * 2.0;

            let hit_vertical_face = !is_within_edge_tolerance(hit.location, hit.impact_point, radius);
            if !floor.line_trace && !hit_vertical_face {
                floor_point_z = floor.hit.impact_point.z;
            } else {
                floor_point_z -= floor.floor_dist;
            }
        }

        // Below the base of the capsule there is nothing to step onto
        if initial_impact_z <= initial_floor_base_z {
            return false;
        }

        let up_hit = self.move_component(Vec3::Z * step_travel_up_height);
        if up_hit.start_penetrating {
            self.capsule.set_location(old_location);
            return false;
        }

        let mut forward_hit = self.move_component(delta);
        if forward_hit.blocking_hit {
            if forward_hit.start_penetrating {
                self.capsule.set_location(old_location);
                return false;
            }

            if up_hit.blocking_hit {
                self.handle_impact(&up_hit);
            }
            self.handle_impact(&forward_hit);

            let forward_hit_time = forward_hit.time;
            let normal = forward_hit.normal;
            let forward_slide_amount =
                self.slide_along_surface(delta, 1.0 - forward_hit.time, normal, &mut forward_hit, true);

            // No progress at all
            if forward_hit_time == 0.0 && forward_slide_amount == 0.0 {
                self.capsule.set_location(old_location);
                return false;
            }
        }

        let down_hit = self.move_component(Vec3::NEG_Z * step_travel_down_height);
        if down_hit.start_penetrating {
            self.capsule.set_location(old_location);
            return false;
        }

        let mut computed_floor = None;
        if down_hit.is_valid_blocking_hit() {
            let delta_z = down_hit.impact_point.z - floor_point_z;
            if delta_z > max_step_height {
                self.capsule.set_location(old_location);
                return false;
            }

            if !self.is_walkable(&down_hit) {
                // Never step onto a slope facing us, nor end up higher on one
                let normal_towards_me = delta.dot(down_hit.impact_normal) < 0.0;
                if normal_towards_me || down_hit.location.z > old_location.z {
                    self.capsule.set_location(old_location);
                    return false;
                }
            }

            if !is_within_edge_tolerance(down_hit.location, down_hit.impact_point, radius) {
                self.capsule.set_location(old_location);
                return false;
            }

            if delta_z > 0.0 && !self.can_step_up(&down_hit) {
                self.capsule.set_location(old_location);
                return false;
            }

            let floor = self.find_floor_from_sweep(self.location(), &down_hit);
            // Steps with a sloped side need a floor to perch on
            if down_hit.location.z > old_location.z && !floor.blocking_hit && step_side_z < MAX_STEP_SIDE_Z {
                self.capsule.set_location(old_location);
                return false;
            }
            computed_floor = Some(floor);
        }

        *step_down = computed_floor;
        self.state.just_teleported |= !self.settings.walking.maintain_horizontal_ground_velocity;
        true
    }

    /// Restore a location saved before a failed sub-step
    pub fn revert_move(
        &mut self,
        old_location: Vec3,
        old_base: Option<EntityId>,
        old_floor: FloorResult,
        fail_move: bool,
    ) {
        self.capsule.set_location(old_location);
        self.state.just_teleported = false;

        if old_base.is_some_and(|base| !self.world.is_dynamic(base)) {
            self.state.current_floor = old_floor;
            self.state.base = old_base;
        } else {
            self.state.base = None;
        }

        if fail_move {
            self.state.velocity = Vec3::ZERO;
            self.state.acceleration = Vec3::ZERO;
        }
    }

    /// Sideways move that keeps the capsule on walkable ground, or zero
    pub fn ledge_move(&self, old_location: Vec3, delta: Vec3) -> Vec3 {
        if delta == Vec3::ZERO {
            return Vec3::ZERO;
        }
        let side = Vec3::new(delta.y, -delta.x, 0.0);
        if self.check_ledge_direction(old_location, side) {
            return side;
        }
        if self.check_ledge_direction(old_location, -side) {
            return -side;
        }
        Vec3::ZERO
    }

    fn check_ledge_direction(&self, old_location: Vec3, side_step: Vec3) -> bool {
        let shape = self.capsule.shape();
        let rotation = self.rotation();
        let side_dest = old_location + side_step;

        let mut result = self.world.sweep(
            &shape,
            rotation,
            old_location,
            side_dest,
            CollisionChannel::Pawn,
            self.params,
        );
        if result.blocking_hit && !self.is_walkable(&result) {
            return false;
        }

        if !result.blocking_hit {
            let walking = &self.settings.walking;
            let down = Vec3::NEG_Z * (walking.max_step_height + walking.ledge_check_threshold);
            result = self.world.sweep(
                &shape,
                rotation,
                side_dest,
                side_dest + down,
                CollisionChannel::Pawn,
                self.params,
            );
        }
        result.time < 1.0 && self.is_walkable(&result)
    }

    /// Walk off a ledge if allowed; `Some` means the walking loop must stop
    pub fn check_fall(
        &mut self,
        delta: Vec3,
        sub_location: Vec3,
        remaining_time: f32,
        time_tick: f32,
        iterations: u32,
        must_jump: bool,
    ) -> Option<PhysicsStep> {
        if must_jump || self.can_walk_off_ledges() {
            if self.state.mode.is_moving_on_ground() {
                return Some(self.start_falling(iterations, remaining_time, time_tick, delta, sub_location));
            }
            return Some(PhysicsStep::Done);
        }
        None
    }

    /// Switch to Falling, refunding the part of the sub-step not travelled
    pub fn start_falling(
        &mut self,
        iterations: u32,
        remaining_time: f32,
        time_tick: f32,
        delta: Vec3,
        sub_location: Vec3,
    ) -> PhysicsStep {
        let desired_dist = delta.length();
        let actual_dist = (self.location() - sub_location).truncate().length();
        let remaining = if desired_dist < KINDA_SMALL_NUMBER {
            0.0
        } else {
            remaining_time + time_tick * (1.0 - (actual_dist / desired_dist).min(1.0))
        };

        if self.state.mode.is_moving_on_ground() {
            self.set_movement_mode(MovementMode::Falling);
        }
        PhysicsStep::Restart {
            remaining,
            iterations,
        }
    }

    /// Drop vertical velocity picked up while following a ramp
    pub fn maintain_horizontal_ground_velocity(&mut self) {
        let velocity = self.state.velocity;
        if velocity.z == 0.0 {
            return;
        }
        self.state.velocity = if self.settings.walking.maintain_horizontal_ground_velocity {
            Vec3::new(velocity.x, velocity.y, 0.0)
        } else {
            safe_normal_2d(velocity) * velocity.length()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_near, SlabWorld, TestRig};

    fn walled_rig() -> TestRig {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        world.add_wall(Vec3::new(100.0, 0.0, 0.0), Vec3::NEG_X);
        let mut rig = TestRig::new(world);
        rig.place_on_floor(Vec3::ZERO, 2.15);
        rig
    }

    #[test]
    fn test_move_stops_before_wall() {
        let mut rig = walled_rig();
        let mut ctx = rig.context();
        let hit = ctx.move_component(Vec3::X * 200.0);
        assert!(hit.is_valid_blocking_hit());
        let x = ctx.location().x;
        assert!(x < 70.0 && x > 68.5, "stopped at {x}");
    }

    #[test]
    fn test_move_out_of_penetration_is_free() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, -3.0);
        let mut ctx = rig.context();
        let start = ctx.location();
        let hit = ctx.move_component(Vec3::Z * 10.0);
        assert!(!hit.blocking_hit);
        assert_near(ctx.location().z, start.z + 10.0, 1e-4);
    }

    #[test]
    fn test_safe_move_resolves_penetration() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, -3.0);
        let mut ctx = rig.context();
        ctx.safe_move(Vec3::X * 10.0);
        assert!(ctx.capsule.bottom().z >= 0.0);
        assert!(ctx.location().x > 9.0);
    }

    #[test]
    fn test_slide_along_angled_wall() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        let normal = Vec3::new(-1.0, -1.0, 0.0).normalize();
        world.add_wall(Vec3::new(100.0, 0.0, 0.0), normal);
        let mut rig = TestRig::new(world);
        rig.place_on_floor(Vec3::ZERO, 2.15);
        let mut ctx = rig.context();

        let delta = Vec3::X * 200.0;
        let mut hit = ctx.safe_move(delta);
        assert!(hit.blocking_hit);
        let before = ctx.location();
        let applied = ctx.slide_along_surface(delta, 1.0 - hit.time, hit.normal, &mut hit, true);
        assert!(applied > 0.0);
        let after = ctx.location();
        // Deflected along the wall towards -Y
        assert!(after.y < before.y);
        assert_near(after.z, before.z, 1e-3);
    }

    #[test]
    fn test_slope_boosting_caps_upward_slide() {
        let mut rig = TestRig::flat_ground();
        rig.state.mode = MovementMode::Falling;
        let ctx = rig.context();
        let normal = Vec3::new(-1.0, 0.0, 1.0).normalize();
        let hit = HitResult {
            blocking_hit: true,
            normal,
            impact_normal: normal,
            ..Default::default()
        };
        let slide = ctx.compute_slide_vector(Vec3::X * 100.0, 1.0, normal, &hit);
        assert!(slide.z <= 1e-4);
    }

    #[test]
    fn test_ground_delta_follows_ramp() {
        let mut rig = TestRig::slope_degrees(30.0);
        rig.place_on_floor(Vec3::ZERO, 2.15);
        let ctx = rig.context();
        let (sin, cos) = 30_f32.to_radians().sin_cos();
        let normal = Vec3::new(-sin, 0.0, cos);
        let ramp_hit = HitResult {
            blocking_hit: true,
            normal,
            impact_normal: normal,
            ..Default::default()
        };
        let delta = ctx.compute_ground_movement_delta(Vec3::X * 10.0, &ramp_hit, false);
        assert_near(delta.x, 10.0, 1e-4);
        assert_near(delta.z, 10.0 * 30_f32.to_radians().tan(), 1e-3);

        let flat = ctx.compute_ground_movement_delta(Vec3::X * 10.0, &ramp_hit, true);
        assert_eq!(flat, Vec3::X * 10.0);
    }

    #[test]
    fn test_step_up_onto_low_box() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        world.add_box(Vec3::new(60.0, -200.0, 0.0), Vec3::new(400.0, 200.0, 30.0));
        let mut rig = TestRig::new(world);
        rig.place_on_floor(Vec3::ZERO, 2.15);
        let mut ctx = rig.context();
        let location = ctx.location();
        ctx.state.current_floor = ctx.find_floor(location, false);

        ctx.move_along_floor(Vec3::X * 400.0, 0.25);
        // Over the lip and onto the top of the box
        assert!(ctx.location().x > 60.0);
        assert!(ctx.capsule.bottom().z > 29.0);
    }

    #[test]
    fn test_step_up_rejects_tall_box() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        world.add_box(Vec3::new(60.0, -200.0, 0.0), Vec3::new(400.0, 200.0, 80.0));
        let mut rig = TestRig::new(world);
        rig.place_on_floor(Vec3::ZERO, 2.15);
        let mut ctx = rig.context();
        let location = ctx.location();
        ctx.state.current_floor = ctx.find_floor(location, false);

        ctx.move_along_floor(Vec3::X * 400.0, 0.25);
        assert!(ctx.location().x < 31.0);
        assert!(ctx.capsule.bottom().z < 5.0);
    }

    #[test]
    fn test_revert_move_clears_dynamic_base() {
        let mut rig = TestRig::flat_ground();
        let mut ctx = rig.context();
        let old = ctx.location();
        ctx.capsule.set_location(old + Vec3::X * 50.0);
        ctx.state.velocity = Vec3::X * 100.0;
        ctx.revert_move(old, None, FloorResult::default(), true);
        assert_eq!(ctx.location(), old);
        assert_eq!(ctx.state.base, None);
        assert_eq!(ctx.state.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_start_falling_refunds_time() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 2.15);
        let mut ctx = rig.context();
        let sub_location = ctx.location();
        // Travelled half of the desired distance
        ctx.capsule.set_location(sub_location + Vec3::X * 5.0);
        let step = ctx.start_falling(2, 0.1, 0.05, Vec3::X * 10.0, sub_location);
        assert_eq!(ctx.state.mode, MovementMode::Falling);
        match step {
            PhysicsStep::Restart { remaining, iterations } => {
                assert_near(remaining, 0.125, 1e-5);
                assert_eq!(iterations, 2);
            }
            PhysicsStep::Done => panic!("expected a restart"),
        }
    }
}
