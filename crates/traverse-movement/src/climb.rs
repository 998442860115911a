//! Free climbing: the start predicate, the anti-flicker timer, the climbing
//! integrator with its dash, and the climb-down-ledge test

use glam::{Quat, Vec3};
use tracing::debug;
use traverse_core::math::{
    degrees_between, is_nearly_zero, project_onto_normal, q_interp_to, rotation_from_x,
    safe_normal, safe_normal_2d, vector_plane_project, KINDA_SMALL_NUMBER,
};
use traverse_physics::{CollisionChannel, CollisionShape};

use crate::context::{MoveContext, MIN_TICK_TIME};
use crate::dispatch::PhysicsStep;
use crate::hooks::MantleKind;
use crate::mode::{CustomMode, MovementMode};
use crate::state::ClimbDownTarget;

/// Slack on angle thresholds so a value computed at the threshold passes
const ANGLE_TOLERANCE: f32 = 1.0e-3;
const BASE_PROBE_RADIUS: f32 = 6.0;

/// A candidate surface measured against the character
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimbSurfaceAngles {
    /// Between the facing and the wall's horizontal inward direction
    pub forward_degrees: f32,
    /// Between the horizontal input and the wall's inward direction
    pub acceleration_degrees: f32,
    /// Horizontal share of the normal; 1 for a vertical wall
    pub steepness: f32,
    /// Elevation of the normal above the horizontal plane
    pub vertical_degrees: f32,
    /// The normal has no horizontal part
    pub is_ceiling: bool,
}

impl ClimbSurfaceAngles {
    pub fn measure(normal: Vec3, forward: Vec3, acceleration: Vec3) -> Self {
        let horizontal_normal = safe_normal_2d(normal);
        let steepness = normal.dot(horizontal_normal);
        Self {
            forward_degrees: degrees_between(forward, -horizontal_normal),
            acceleration_degrees: degrees_between(safe_normal_2d(acceleration), -horizontal_normal),
            steepness,
            vertical_degrees: steepness.clamp(-1.0, 1.0).acos().to_degrees(),
            is_ceiling: steepness.abs() <= KINDA_SMALL_NUMBER,
        }
    }
}

/// Outcome of [`MoveContext::can_start_climbing`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimbCheck {
    pub can_climb: bool,
    /// Input alignment with the wall, fed to the climb timer
    pub acceleration_degrees: f32,
}

impl MoveContext<'_> {
    /// Facing, steepness and ceiling parts of the climb predicate
    pub fn surface_accepts(&self, angles: &ClimbSurfaceAngles) -> bool {
        let climbing = &self.settings.climbing;
        angles.forward_degrees <= climbing.min_horizontal_degrees_to_start_climbing + ANGLE_TOLERANCE
            && angles.vertical_degrees
                <= 90.0 - self.settings.walking.walkable_floor_angle + ANGLE_TOLERANCE
            && !angles.is_ceiling
    }

    /// Probe the wall in front of `location` and decide whether a climb may
    /// start; the probes replace the stored wall hits
    pub fn can_start_climbing(&mut self, location: Vec3, forward: Vec3) -> ClimbCheck {
        let mode = self.state.mode;
        if mode.is_climbing() || (mode.is_swimming() && !self.state.is_swim_on_surface) {
            return ClimbCheck {
                can_climb: false,
                acceleration_degrees: 180.0,
            };
        }

        let wall_hits = self.sweep_wall_hits(location, forward);
        let surface = self.compute_surface_info(&wall_hits.hits, Vec3::ZERO, location);
        let all_collided = wall_hits.all_collided;
        self.state.wall_hits = wall_hits;

        let angles = ClimbSurfaceAngles::measure(surface.normal, forward, self.state.acceleration);
        let can_climb = all_collided
            && self.surface_accepts(&angles)
            && self.is_facing_surface(angles.steepness, location, Vec3::Z, forward);

        ClimbCheck {
            can_climb,
            acceleration_degrees: angles.acceleration_degrees,
        }
    }

    /// Accumulate time while the input points at a climbable wall; a full
    /// duration sets the climb intent
    pub fn start_climbing_timer(&mut self, acceleration_degrees: f32, dt: f32, can_start: bool) {
        if !can_start {
            return;
        }
        let climbing = &self.settings.climbing;
        let duration = climbing.try_enter_climb_duration.max(MIN_TICK_TIME);

        if acceleration_degrees <= climbing.min_horizontal_degrees_to_start_climbing + ANGLE_TOLERANCE {
            self.state.try_enter_climb_time = (self.state.try_enter_climb_time + dt).clamp(0.0, duration);
            self.state.try_enter_climb_alpha = self.state.try_enter_climb_time / duration;

            if self.state.try_enter_climb_alpha >= 1.0 {
                debug!("Climb timer completed");
                self.hooks.on_auto_try_climb();
                self.state.wants_to_climb = true;
                self.state.try_enter_climb_time = 0.0;
                self.state.try_enter_climb_alpha = 0.0;
            }
        } else {
            self.state.try_enter_climb_time = (self.state.try_enter_climb_time - dt).clamp(0.0, duration);
            self.state.try_enter_climb_alpha = self.state.try_enter_climb_time / duration;
        }
    }

    /// Whether the climb has to end this step
    ///
    /// Ends when the intent is gone, no surface is left, every probe faces
    /// down (an overhang), or every probe is floor-like with a walkable floor
    /// below. The floor case notifies `on_climb_to_walk`.
    pub fn should_stop_climbing(&mut self) -> bool {
        if self.water_info().is_some() && self.state.velocity.z < 0.0 && !self.state.swim_to_climb {
            return true;
        }

        let climbing = &self.settings.climbing;
        let degrees: Vec<f32> = self
            .state
            .wall_hits
            .hits
            .iter()
            .map(|hit| degrees_between(hit.impact_normal, Vec3::NEG_Z))
            .collect();

        let overhang = degrees
            .iter()
            .all(|d| *d <= climbing.min_vertical_degrees_to_start_climbing);
        let walkable_limit =
            self.settings.walking.walkable_floor_angle - climbing.stop_climbing_walkable_angle_threshold;
        let mut walkable = degrees.iter().all(|d| 180.0 - d <= walkable_limit);
        if walkable {
            let feet = self.location() - self.capsule.up() * self.capsule.half_height;
            walkable = self.find_floor_at(feet, true).is_walkable_floor();
        }

        if !self.state.wants_to_climb || self.state.climbing_normal == Vec3::ZERO || overhang || walkable {
            if walkable {
                self.hooks.on_climb_to_walk();
            }
            return true;
        }
        false
    }

    /// Descending onto walkable ground with room below to stand
    pub fn climb_down_to_floor(&self) -> bool {
        if !(self.state.velocity.z < 0.0 && self.state.acceleration.z < 0.0) {
            return false;
        }

        let location = self.location();
        let floor = self.find_floor_at(location, false);
        if !floor.is_walkable_floor() || !self.is_valid_landing_spot(location, &floor.hit) {
            return false;
        }

        let capsule = &self.settings.capsule;
        let space = self.world.sweep(
            &CollisionShape::sphere(capsule.stand_radius),
            Quat::IDENTITY,
            location,
            location - Vec3::Z * capsule.stand_half_height,
            CollisionChannel::Visibility,
            self.params,
        );
        self.is_walkable(&space)
    }

    /// Leave climbing, onto the floor or into a fall, and hand the remaining
    /// time to the new mode
    pub fn stop_climbing(&mut self, remaining: f32, iterations: u32, climb_down_floor: bool) -> PhysicsStep {
        self.state.wants_to_climb = false;
        if climb_down_floor {
            self.set_movement_mode(MovementMode::Walking);
            self.hooks.on_climb_down_to_floor();
            self.state.velocity = Vec3::ZERO;
        } else {
            self.set_movement_mode(MovementMode::Falling);
        }
        PhysicsStep::Restart { remaining, iterations }
    }

    /// Start a dash along the input, or straight up without input
    pub fn try_climb_dash(&mut self) {
        if self.state.is_climb_dashing
            || !self.state.mode.is_climbing()
            || self.settings.climbing.dash_curve.keys.is_empty()
        {
            return;
        }

        self.state.is_climb_dashing = true;
        self.state.current_climb_dash_time = 0.0;
        self.hooks.on_enter_climb_dash();

        let threshold = self.settings.climbing.max_climbing_acceleration / 10.0;
        let acceleration = self.state.acceleration;
        self.state.climb_dash_direction = if acceleration.length() > threshold {
            safe_normal(acceleration)
        } else {
            self.capsule.up()
        };
    }

    pub fn stop_climb_dashing(&mut self) {
        if !self.state.is_climb_dashing {
            return;
        }
        self.state.is_climb_dashing = false;
        self.state.current_climb_dash_time = 0.0;
        self.state.climb_dash_direction = Vec3::ZERO;
        self.hooks.on_exit_climb_dash();
    }

    fn update_climb_dash_state(&mut self, dt: f32) {
        if !self.state.is_climb_dashing {
            return;
        }
        self.state.current_climb_dash_time += dt;
        let (_, max_time) = self.settings.climbing.dash_curve.time_range();
        if self.state.current_climb_dash_time >= max_time {
            self.stop_climb_dashing();
        }
    }

    fn compute_climbing_velocity(&mut self, dt: f32) {
        if self.state.is_climb_dashing {
            let direction =
                vector_plane_project(self.state.climb_dash_direction, self.state.climbing_normal);
            self.state.climb_dash_direction = direction;
            let speed = self
                .settings
                .climbing
                .dash_curve
                .value_at(self.state.current_climb_dash_time);
            self.state.velocity = direction * speed;
        } else {
            let braking = self.settings.climbing.braking_deceleration_climbing;
            self.calc_velocity(dt, 0.0, false, braking);
        }
    }

    /// Turn to face into the surface, faster when moving quickly
    fn climbing_rotation(&self, dt: f32) -> Quat {
        let climbing = &self.settings.climbing;
        let target = rotation_from_x(-self.state.climbing_normal);
        let speed_ratio = if climbing.max_climbing_speed > 0.0 {
            self.state.velocity.length() / climbing.max_climbing_speed
        } else {
            1.0
        };
        let speed = climbing.climbing_rotation_speed * speed_ratio.max(1.0);
        q_interp_to(self.rotation(), target, dt, speed)
    }

    fn move_along_climbing_surface(&mut self, dt: f32) {
        let delta = self.state.velocity * dt;
        let rotation = self.climbing_rotation(dt);
        self.capsule.set_rotation(rotation);

        let mut hit = self.safe_move(delta);
        if hit.blocking_hit && hit.time < 1.0 {
            self.handle_impact(&hit);
            let normal = hit.normal;
            self.slide_along_surface(delta, 1.0 - hit.time, normal, &mut hit, true);
        }
    }

    /// Pull the capsule towards its standoff distance from the wall
    fn snap_to_climbing_surface(&mut self, dt: f32) {
        let forward = self.capsule.forward();
        let forward_difference =
            project_onto_normal(self.state.climbing_position - self.location(), forward);
        let offset = -self.state.climbing_normal
            * (forward_difference.length() - self.settings.climbing.distance_from_surface);
        self.move_component(offset * self.settings.climbing.climbing_snap_speed * dt);
    }

    /// Nothing in front at eye height: the top of the wall
    pub fn has_reached_edge(&self) -> bool {
        let distance = self.capsule.radius * 2.5;
        !self.eye_height_trace(distance, self.location(), self.capsule.up(), self.capsule.forward())
    }

    pub fn phys_climbing(&mut self, delta_time: f32, iterations: u32) -> PhysicsStep {
        if delta_time < MIN_TICK_TIME {
            return PhysicsStep::Done;
        }

        let mut remaining = delta_time;
        let mut iterations = iterations;
        while remaining >= MIN_TICK_TIME && iterations < self.settings.engine.max_simulation_iterations {
            if iterations > 0 {
                let (location, forward) = (self.location(), self.capsule.forward());
                self.state.wall_hits = self.sweep_wall_hits(location, forward);
            }
            iterations += 1;
            let time_tick = self.simulation_time_step(remaining, iterations);
            let old_location = self.location();

            let wall_hits = self.state.wall_hits.clone();
            let surface =
                self.compute_surface_info(&wall_hits.hits, wall_hits.velocity_hit.impact_normal, old_location);
            self.state.climbing_position = surface.position;
            self.state.climbing_normal = surface.normal;
            self.set_base_from_wall();

            let climb_down_floor = self.climb_down_to_floor();
            let should_stop = self.should_stop_climbing();
            if should_stop || climb_down_floor {
                return self.stop_climbing(remaining, iterations, climb_down_floor);
            }
            remaining -= time_tick;

            self.update_climb_dash_state(time_tick);
            self.compute_climbing_velocity(time_tick);
            self.move_along_climbing_surface(time_tick);

            let up_speed = self.state.velocity.dot(self.capsule.up());
            let moving_up = up_speed >= 1.0 && self.state.acceleration.z > 1.0;
            if moving_up && self.has_reached_edge() {
                let (location, forward) = (self.location(), self.capsule.forward());
                if self.hooks.try_mantle(MantleKind::FreeClimb, location, forward) {
                    self.state.wants_to_climb = false;
                    self.state.velocity = (self.location() - old_location) / time_tick;
                    self.set_movement_mode(MovementMode::Custom(CustomMode::Mantle));
                    return PhysicsStep::Done;
                }
            }

            self.state.velocity = (self.location() - old_location) / time_tick;
            self.snap_to_climbing_surface(time_tick);
        }
        PhysicsStep::Done
    }

    /// Take the wall behind the adhesion point as the movement base
    fn set_base_from_wall(&mut self) {
        let normal = self.state.climbing_normal;
        if normal == Vec3::ZERO {
            return;
        }
        let position = self.state.climbing_position;
        let hit = self.world.sweep(
            &CollisionShape::sphere(BASE_PROBE_RADIUS),
            Quat::IDENTITY,
            position,
            position - normal * BASE_PROBE_RADIUS,
            CollisionChannel::WorldStatic,
            self.params,
        );
        if hit.blocking_hit {
            self.state.base = hit.actor;
        }
    }

    /// Test whether the character can climb down over the ledge in front
    ///
    /// Only while standing still on the ground. Looks for open space ahead,
    /// the wall below the lip, a climbable surface on it, the lip itself and
    /// room to step out over it.
    pub fn check_climb_down_ledge(&self) -> Option<ClimbDownTarget> {
        if !is_nearly_zero(self.state.acceleration, KINDA_SMALL_NUMBER)
            || !is_nearly_zero(self.state.velocity, KINDA_SMALL_NUMBER)
            || !self.state.mode.is_moving_on_ground()
        {
            return None;
        }

        let radius = self.settings.capsule.stand_radius;
        let half_height = self.settings.capsule.stand_half_height;
        let sphere = CollisionShape::sphere(radius);
        let location = self.location();
        let bottom = location - Vec3::Z * self.capsule.half_height;
        let forward = self.capsule.forward();

        // Nothing to stand on ahead, and no wall in the way
        let ahead = location + forward * radius * 2.5;
        let ahead_floor = self.find_floor_at(ahead, false);
        let ahead_wall = self.world.sweep(
            &sphere,
            Quat::IDENTITY,
            location,
            ahead,
            CollisionChannel::Visibility,
            self.params,
        );
        if ahead_floor.is_walkable_floor() || ahead_wall.blocking_hit {
            return None;
        }

        // The wall below the lip, traced back towards the character
        let drop = Vec3::Z * half_height * 1.25;
        let line_start = bottom + forward * radius * 3.0 - drop;
        let line_end = bottom - drop - forward * radius * 2.0;
        let wall = self
            .world
            .line_trace(line_start, line_end, CollisionChannel::WorldStatic, self.params);
        if !wall.is_valid_blocking_hit() {
            return None;
        }

        let check_location = wall.impact_point + wall.impact_normal * radius;
        let check_direction = safe_normal_2d(-wall.impact_normal);

        let water = self.world.line_trace(
            check_location,
            check_location - Vec3::Z,
            CollisionChannel::WorldStatic,
            self.params,
        );
        if water.actor.is_some_and(|actor| self.world.is_water_body(actor)) {
            return None;
        }

        let wall_hits = self.sweep_wall_hits(check_location, check_direction);
        let surface = self.compute_surface_info(&wall_hits.hits, Vec3::ZERO, check_location);
        let angles = ClimbSurfaceAngles::measure(surface.normal, check_direction, Vec3::ZERO);
        if !self.surface_accepts(&angles)
            || !self.is_facing_surface(angles.steepness, check_location, Vec3::Z, check_direction)
        {
            return None;
        }

        // The lip at floor height
        let edge_start = Vec3::new(check_location.x, check_location.y, bottom.z);
        let edge = self.world.sweep(
            &sphere,
            Quat::IDENTITY,
            edge_start,
            edge_start + check_direction * radius * 2.0,
            CollisionChannel::Visibility,
            self.params,
        );
        if !edge.blocking_hit {
            return None;
        }

        // Room to step out over the lip
        let step_out = edge.impact_point + safe_normal_2d(wall.impact_normal) * radius * 2.0;
        let space = self.world.sweep(
            &sphere,
            Quat::IDENTITY,
            step_out,
            step_out + Vec3::Z * (half_height - radius) * 2.0,
            CollisionChannel::Visibility,
            self.params,
        );
        if space.blocking_hit {
            return None;
        }

        Some(ClimbDownTarget {
            forward: step_out,
            down: check_location - Vec3::Z * half_height,
            face_to: rotation_from_x(-surface.normal),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::LocomotionEvent;
    use crate::state::WallHits;
    use traverse_physics::HitResult;
    use crate::testing::{assert_near, Slab, SlabWorld, TestRig};

    fn wall_rig() -> TestRig {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        world.add_wall(Vec3::new(40.0, 0.0, 0.0), Vec3::NEG_X);
        let mut rig = TestRig::new(world);
        rig.place_on_floor(Vec3::ZERO, 2.15);
        rig
    }

    fn at_degrees(degrees: f32) -> Vec3 {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Vec3::new(cos, sin, 0.0)
    }

    #[test]
    fn test_facing_threshold_is_inclusive() {
        let mut rig = TestRig::flat_ground();
        let ctx = rig.context();
        let at = ClimbSurfaceAngles::measure(Vec3::NEG_X, at_degrees(50.0), Vec3::ZERO);
        assert!(ctx.surface_accepts(&at));
        let over = ClimbSurfaceAngles::measure(Vec3::NEG_X, at_degrees(51.0), Vec3::ZERO);
        assert!(!ctx.surface_accepts(&over));
    }

    #[test]
    fn test_shallow_surface_rejected() {
        let mut rig = TestRig::flat_ground();
        let ctx = rig.context();
        // Normal 80 degrees above the horizontal: a gentle ramp
        let elevation = 80_f32.to_radians();
        let normal = Vec3::new(-elevation.cos(), 0.0, elevation.sin());
        let angles = ClimbSurfaceAngles::measure(normal, Vec3::X, Vec3::X);
        assert_near(angles.vertical_degrees, 80.0, 1e-3);
        assert!(!ctx.surface_accepts(&angles));

        let ceiling = ClimbSurfaceAngles::measure(Vec3::NEG_Z, Vec3::X, Vec3::X);
        assert!(ceiling.is_ceiling);
        assert!(!ctx.surface_accepts(&ceiling));
    }

    #[test]
    fn test_can_start_climbing_against_wall() {
        let mut rig = wall_rig();
        rig.state.acceleration = Vec3::X * 1000.0;
        let mut ctx = rig.context();
        let location = ctx.location();
        let check = ctx.can_start_climbing(location, Vec3::X);
        assert!(check.can_climb);
        assert_near(check.acceleration_degrees, 0.0, 1e-3);
        assert!(ctx.state.wall_hits.all_collided);
    }

    #[test]
    fn test_cannot_start_climbing_in_open_space() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 2.15);
        let mut ctx = rig.context();
        let location = ctx.location();
        assert!(!ctx.can_start_climbing(location, Vec3::X).can_climb);
    }

    #[test]
    fn test_climb_timer_sets_intent_once() {
        let mut rig = TestRig::flat_ground();
        let mut ctx = rig.context();
        for _ in 0..3 {
            ctx.start_climbing_timer(10.0, 0.1, true);
        }
        assert!(!ctx.state.wants_to_climb);
        assert_near(ctx.state.try_enter_climb_alpha, 0.75, 1e-4);
        ctx.start_climbing_timer(10.0, 0.1, true);
        assert!(ctx.state.wants_to_climb);
        assert_eq!(ctx.state.try_enter_climb_time, 0.0);
        drop(ctx);
        assert_eq!(rig.hooks.count(LocomotionEvent::AutoTryClimb), 1);
    }

    #[test]
    fn test_climb_timer_decays_when_input_turns_away() {
        let mut rig = TestRig::flat_ground();
        let mut ctx = rig.context();
        ctx.start_climbing_timer(0.0, 0.2, true);
        ctx.start_climbing_timer(90.0, 0.1, true);
        assert_near(ctx.state.try_enter_climb_time, 0.1, 1e-5);
        ctx.start_climbing_timer(90.0, 1.0, true);
        assert_eq!(ctx.state.try_enter_climb_time, 0.0);
        ctx.start_climbing_timer(0.0, 0.2, false);
        assert_eq!(ctx.state.try_enter_climb_time, 0.0);
    }

    #[test]
    fn test_should_stop_without_intent_or_surface() {
        let mut rig = wall_rig();
        rig.state.mode = MovementMode::Custom(CustomMode::FreeClimb);
        let mut ctx = rig.context();
        let location = ctx.location();
        ctx.state.wall_hits = ctx.sweep_wall_hits(location, Vec3::X);
        ctx.state.climbing_normal = Vec3::NEG_X;
        ctx.state.wants_to_climb = true;
        assert!(!ctx.should_stop_climbing());

        ctx.state.wants_to_climb = false;
        assert!(ctx.should_stop_climbing());

        ctx.state.wants_to_climb = true;
        ctx.state.climbing_normal = Vec3::ZERO;
        assert!(ctx.should_stop_climbing());
    }

    #[test]
    fn test_floor_like_surface_stops_near_the_floor() {
        let floor_like = || WallHits {
            hits: vec![
                HitResult {
                    blocking_hit: true,
                    impact_normal: Vec3::Z,
                    normal: Vec3::Z,
                    ..Default::default()
                };
                3
            ],
            ..Default::default()
        };

        let mut rig = TestRig::flat_ground();
        rig.state.mode = MovementMode::Custom(CustomMode::FreeClimb);
        rig.place_on_floor(Vec3::ZERO, 200.0);
        {
            let mut ctx = rig.context();
            ctx.state.wall_hits = floor_like();
            ctx.state.climbing_normal = Vec3::Z;
            ctx.state.wants_to_climb = true;
            assert!(!ctx.should_stop_climbing());
        }

        // Out of reach of the centre, but not of the feet
        rig.place_on_floor(Vec3::ZERO, 100.0);
        let mut ctx = rig.context();
        assert!(ctx.should_stop_climbing());
        drop(ctx);
        assert_eq!(rig.hooks.count(LocomotionEvent::ClimbToWalk), 1);
    }

    #[test]
    fn test_climbing_moves_up_the_wall() {
        let mut rig = wall_rig();
        rig.capsule.set_location(rig.capsule.location() + Vec3::Z * 20.0);
        let mut ctx = rig.context();
        ctx.state.wants_to_climb = true;
        ctx.set_movement_mode(MovementMode::Custom(CustomMode::FreeClimb));
        assert_eq!(ctx.capsule.half_height, 45.0);

        let start = ctx.location();
        for _ in 0..30 {
            ctx.state.acceleration = Vec3::Z * 380.0;
            ctx.state.analog_input_modifier = 1.0;
            let location = ctx.location();
            let forward = ctx.capsule.forward();
            ctx.state.wall_hits = ctx.sweep_wall_hits(location, forward);
            ctx.start_new_physics(1.0 / 60.0, 0);
        }
        assert!(ctx.state.mode.is_climbing());
        assert!(ctx.location().z > start.z + 20.0);
        // Snapped against the wall, which stops the capsule at x = 10
        let x = ctx.location().x;
        assert!(x > 8.0 && x <= 10.0, "ended at {x}");
        assert_near(ctx.state.climbing_normal.x, -1.0, 1e-3);
    }

    #[test]
    fn test_climb_dash_runs_its_curve() {
        let mut rig = wall_rig();
        rig.state.mode = MovementMode::Custom(CustomMode::FreeClimb);
        let mut ctx = rig.context();
        ctx.try_climb_dash();
        assert!(ctx.state.is_climb_dashing);
        assert_eq!(ctx.state.climb_dash_direction, Vec3::Z);
        // A second request while dashing is ignored
        ctx.try_climb_dash();
        ctx.update_climb_dash_state(0.25);
        assert!(ctx.state.is_climb_dashing);
        ctx.update_climb_dash_state(0.2);
        assert!(!ctx.state.is_climb_dashing);
        drop(ctx);
        assert_eq!(rig.hooks.count(LocomotionEvent::EnterClimbDash), 1);
        assert_eq!(rig.hooks.count(LocomotionEvent::ExitClimbDash), 1);
    }

    #[test]
    fn test_no_dash_outside_climbing() {
        let mut rig = TestRig::flat_ground();
        let mut ctx = rig.context();
        ctx.try_climb_dash();
        assert!(!ctx.state.is_climb_dashing);
    }

    /// Ground that ends at x = 0 with a cliff face dropping away below it
    fn ledge_rig() -> TestRig {
        let mut world = SlabWorld::default();
        world.add(
            Slab::plane(Vec3::ZERO, Vec3::Z)
                .bounded(Vec3::new(-1000.0, -1000.0, 0.0), Vec3::new(0.0, 1000.0, 0.0)),
        );
        world.add(
            Slab::plane(Vec3::ZERO, Vec3::X)
                .bounded(Vec3::new(0.0, -1000.0, -1000.0), Vec3::new(0.0, 1000.0, 5.0)),
        );
        let mut rig = TestRig::new(world);
        rig.place_on_floor(Vec3::new(-40.0, 0.0, 0.0), 2.15);
        rig
    }

    #[test]
    fn test_climb_down_ledge_target() {
        let mut rig = ledge_rig();
        let ctx = rig.context();
        let target = ctx.check_climb_down_ledge().expect("ledge should be climbable");
        assert_near(target.forward.x, 60.0, 1e-2);
        assert_near(target.down.x, 30.0, 1e-2);
        assert!(target.down.z < -100.0);
        let facing = target.face_to * Vec3::X;
        assert_near(facing.x, -1.0, 1e-3);
    }

    #[test]
    fn test_climb_down_ledge_requires_standing_still() {
        let mut rig = ledge_rig();
        rig.state.velocity = Vec3::X * 100.0;
        let ctx = rig.context();
        assert!(ctx.check_climb_down_ledge().is_none());
    }

    #[test]
    fn test_no_climb_down_on_open_ground() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 2.15);
        let ctx = rig.context();
        assert!(ctx.check_climb_down_ledge().is_none());
    }
}
