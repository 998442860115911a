//! Airborne integrators: falling and gliding
//!
//! Gliding is falling with a different vertical rule: instead of gravity the
//! descent speed is pulled towards `max_glide_down_speed`. Landing, wall
//! slides, corner handling and the stuck-in-a-ditch escape are shared.

use glam::Vec3;
use rand::Rng;
use tracing::debug;
use traverse_core::math::{safe_normal_2d, KINDA_SMALL_NUMBER};
use traverse_physics::{CollisionChannel, HitResult};

use crate::context::{MoveContext, MIN_TICK_TIME, VERTICAL_SLOPE_NORMAL_Z};
use crate::dispatch::PhysicsStep;
use crate::hooks::MantleKind;
use crate::mode::{CustomMode, MovementMode};

impl MoveContext<'_> {
    pub fn phys_falling(&mut self, delta_time: f32, iterations: u32) -> PhysicsStep {
        self.airborne_move(delta_time, iterations, false)
    }

    pub fn phys_gliding(&mut self, delta_time: f32, iterations: u32) -> PhysicsStep {
        self.airborne_move(delta_time, iterations, true)
    }

    /// Leave the air: swim when landing in water, walk otherwise
    pub fn process_landed(&mut self, hit: &HitResult, remaining: f32, iterations: u32) -> PhysicsStep {
        self.hooks.on_landed(hit);
        if self.state.mode.is_falling() {
            let mode = if self.is_in_water() {
                MovementMode::Swimming
            } else {
                MovementMode::Walking
            };
            self.set_movement_mode(mode);
        }
        PhysicsStep::Restart { remaining, iterations }
    }

    /// Start or stop gliding; returns whether the mode changed
    pub fn toggle_glide(&mut self) -> bool {
        if self.state.mode.is_gliding() {
            self.set_movement_mode(MovementMode::Falling);
            return true;
        }
        if self.check_can_glide() {
            self.set_movement_mode(MovementMode::Custom(CustomMode::Gliding));
            return true;
        }
        false
    }

    /// Falling, with enough clearance below and no water underneath
    pub fn check_can_glide(&self) -> bool {
        if !self.state.mode.is_base_falling() {
            return false;
        }

        let start = self.location();
        let end = start + Vec3::NEG_Z * self.settings.gliding.can_start_glide_height;
        let clearance = self
            .world
            .line_trace(start, end, CollisionChannel::Pawn, self.params);
        if clearance.blocking_hit {
            return false;
        }

        let below = self
            .world
            .line_trace(start, end, CollisionChannel::WorldStatic, self.params);
        let over_water_body = below.actor.is_some_and(|actor| self.world.is_water_body(actor));
        let over_water_volume = self
            .water
            .water_info(start, self.settings.gliding.can_start_glide_height)
            .is_some();
        !over_water_body && !over_water_volume
    }

    /// Launch from the ground with the configured jump speed
    pub fn jump(&mut self) -> bool {
        if !self.state.mode.is_moving_on_ground() {
            return false;
        }
        self.state.velocity.z = self.state.velocity.z.max(self.settings.walking.jump_z_velocity);
        self.set_movement_mode(MovementMode::Falling);
        true
    }

    fn airborne_move(&mut self, delta_time: f32, iterations: u32, gliding: bool) -> PhysicsStep {
        if delta_time < MIN_TICK_TIME {
            return PhysicsStep::Done;
        }

        let (air_control, lateral_friction) = if gliding {
            let glide = &self.settings.gliding;
            (glide.gliding_air_control, glide.gliding_lateral_friction)
        } else {
            let engine = &self.settings.engine;
            (engine.air_control, engine.falling_lateral_friction)
        };

        let fall_acceleration = self.falling_lateral_acceleration(air_control);
        let has_limited_air_control = fall_acceleration != Vec3::ZERO;

        let mut iterations = iterations;
        let mut remaining = delta_time;

        while remaining >= MIN_TICK_TIME && iterations < self.settings.engine.max_simulation_iterations {
            iterations += 1;
            let time_tick = self.simulation_time_step(remaining, iterations);
            remaining -= time_tick;

            let old_location = self.location();
            let old_velocity = self.state.velocity;

            let velocity_no_air_control = if has_limited_air_control {
                self.lateral_velocity(time_tick, Vec3::ZERO, lateral_friction)
            } else {
                old_velocity
            };
            self.state.velocity = self.lateral_velocity(time_tick, fall_acceleration, lateral_friction);

            let gravity = self.airborne_gravity(gliding, time_tick);
            self.state.velocity = self.new_fall_velocity(self.state.velocity, gravity, time_tick);
            let velocity_no_air_control = self.new_fall_velocity(velocity_no_air_control, gravity, time_tick);
            let air_control_accel = (self.state.velocity - velocity_no_air_control) / time_tick;

            let adjusted = (old_velocity + self.state.velocity) * 0.5 * time_tick;
            let mut hit = self.safe_move(adjusted);
            let mut last_move_time_slice = time_tick;
            let mut sub_remaining = time_tick * (1.0 - hit.time);

            if self.is_in_water() {
                remaining += sub_remaining;
                self.set_movement_mode(MovementMode::Swimming);
                return self.start_swimming(old_location, old_velocity, time_tick, remaining, iterations);
            }

            if hit.blocking_hit {
                if let Some(step) = self.try_land(&hit, remaining + sub_remaining, iterations) {
                    return step;
                }

                if gliding && self.try_glide_mantle(&hit) {
                    return PhysicsStep::Done;
                }

                self.handle_impact(&hit);

                let mut adjusted = adjusted;
                if has_limited_air_control && hit.normal.z > VERTICAL_SLOPE_NORMAL_Z {
                    let delta_v = self.limit_air_control(air_control_accel, &hit, false) * last_move_time_slice;
                    adjusted = (velocity_no_air_control + delta_v) * last_move_time_slice;
                }

                let old_hit_normal = hit.normal;
                let old_hit_impact_normal = hit.impact_normal;
                let mut delta = self.compute_slide_vector(adjusted, 1.0 - hit.time, old_hit_normal, &hit);

                if sub_remaining > KINDA_SMALL_NUMBER && !self.state.just_teleported {
                    self.state.velocity = delta / sub_remaining;
                }

                if sub_remaining > KINDA_SMALL_NUMBER && delta.dot(adjusted) > 0.0 {
                    hit = self.safe_move(delta);

                    if hit.blocking_hit {
                        last_move_time_slice = sub_remaining;
                        sub_remaining *= 1.0 - hit.time;

                        if self.is_valid_landing_spot(self.location(), &hit) {
                            return self.process_landed(&hit, remaining + sub_remaining, iterations);
                        }

                        self.handle_impact(&hit);

                        if has_limited_air_control && hit.normal.z > VERTICAL_SLOPE_NORMAL_Z {
                            let delta_v =
                                self.limit_air_control(air_control_accel, &hit, false) * last_move_time_slice;
                            let retry = (velocity_no_air_control + delta_v) * last_move_time_slice;
                            delta = self.compute_slide_vector(retry, 1.0 - hit.time, old_hit_normal, &hit);
                        }

                        self.two_wall_adjust(&mut delta, &hit, old_hit_normal);

                        if sub_remaining > KINDA_SMALL_NUMBER && !self.state.just_teleported {
                            self.state.velocity = delta / sub_remaining;
                        }

                        // Stuck between two opposing slopes
                        let ditch = old_hit_impact_normal.z > 0.0
                            && hit.impact_normal.z > 0.0
                            && delta.z.abs() <= KINDA_SMALL_NUMBER
                            && hit.impact_normal.dot(old_hit_impact_normal) < 0.0;

                        hit = self.safe_move(delta);
                        if hit.time == 0.0 {
                            let mut side = safe_normal_2d(old_hit_normal + hit.impact_normal);
                            if side == Vec3::ZERO {
                                side = safe_normal_2d(Vec3::new(old_hit_normal.y, -old_hit_normal.x, 0.0));
                            }
                            hit = self.safe_move(side);
                        }

                        if ditch || self.is_valid_landing_spot(self.location(), &hit) || hit.time == 0.0 {
                            return self.process_landed(&hit, 0.0, iterations);
                        }

                        if self.settings.walking.perch_radius_threshold > 0.0
                            && hit.time == 1.0
                            && old_hit_impact_normal.z >= self.settings.walkable_floor_z()
                        {
                            self.escape_perch_ditch(old_location, time_tick);
                        }
                    }
                }
            }

            if self.state.velocity.truncate().length_squared() <= KINDA_SMALL_NUMBER * 10.0 {
                self.state.velocity.x = 0.0;
                self.state.velocity.y = 0.0;
            }

            if gliding && self.glide_reached_landing() {
                debug!("Landing spot within glide check height");
                self.set_movement_mode(MovementMode::Falling);
                return PhysicsStep::Restart { remaining, iterations };
            }
        }

        PhysicsStep::Done
    }

    /// Integrate lateral velocity for one sub-step under `acceleration`,
    /// leaving the vertical component untouched
    fn lateral_velocity(&mut self, time_tick: f32, acceleration: Vec3, friction: f32) -> Vec3 {
        let saved_velocity = self.state.velocity;
        let saved_acceleration = self.state.acceleration;

        self.state.acceleration = acceleration;
        self.state.velocity.z = 0.0;
        let braking = self.max_braking_deceleration();
        self.calc_velocity(time_tick, friction, false, braking);
        let mut lateral = self.state.velocity;
        lateral.z = saved_velocity.z;

        self.state.velocity = saved_velocity;
        self.state.acceleration = saved_acceleration;
        lateral
    }

    /// Gravity for this sub-step; gliding eases the descent towards its cap
    fn airborne_gravity(&self, gliding: bool, time_tick: f32) -> Vec3 {
        if !gliding {
            return Vec3::new(0.0, 0.0, self.gravity_z());
        }
        let glide = &self.settings.gliding;
        let down_speed = self.state.velocity.dot(Vec3::NEG_Z);
        Vec3::NEG_Z * (glide.max_glide_down_speed - down_speed) * glide.interp_to_target_glide_speed * time_tick
    }

    /// Land on `hit` or on a walkable floor just under the capsule's rim
    fn try_land(&mut self, hit: &HitResult, remaining: f32, iterations: u32) -> Option<PhysicsStep> {
        let location = self.location();
        if self.is_valid_landing_spot(location, hit) {
            return Some(self.process_landed(hit, remaining, iterations));
        }
        if self.should_check_for_valid_landing_spot(hit) {
            let floor = self.find_floor(location, false);
            if floor.is_walkable_floor() && self.is_valid_landing_spot(location, &floor.hit) {
                return Some(self.process_landed(&floor.hit, remaining, iterations));
            }
        }
        None
    }

    fn try_glide_mantle(&mut self, hit: &HitResult) -> bool {
        if hit.impact_normal.z.abs() > VERTICAL_SLOPE_NORMAL_Z * 100.0 {
            return false;
        }
        let (location, forward) = (self.location(), self.capsule.forward());
        if !self.hooks.try_mantle(MantleKind::Gliding, location, forward) {
            return false;
        }
        self.set_movement_mode(MovementMode::Custom(CustomMode::Mantle));
        true
    }

    /// Nudge the capsule out of a dip narrower than its perch radius
    fn escape_perch_ditch(&mut self, old_location: Vec3, time_tick: f32) {
        let moved = self.location() - old_location;
        if moved.z.abs() > 0.2 * time_tick || moved.truncate().length() > 4.0 * time_tick {
            return;
        }
        let max_speed = self.max_speed();
        let mut rng = rand::thread_rng();
        self.state.velocity.x += 0.25 * max_speed * (rng.gen::<f32>() - 0.5);
        self.state.velocity.y += 0.25 * max_speed * (rng.gen::<f32>() - 0.5);
        self.state.velocity.z = (self.settings.walking.jump_z_velocity * 0.25).max(1.0);
        let delta = self.state.velocity * time_tick;
        self.safe_move(delta);
    }

    /// A valid landing spot within the glide check height ends the glide
    fn glide_reached_landing(&self) -> bool {
        let check = self.location() - Vec3::Z * self.settings.gliding.glide_to_fall_check_height;
        self.find_floor_at(check, false).is_walkable_floor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::LocomotionEvent;
    use crate::testing::{assert_near, SlabWorld, TestRig};
    use traverse_physics::WaterVolume;

    const DT: f32 = 1.0 / 60.0;

    fn airborne(height: f32) -> TestRig {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, height);
        rig.state.mode = MovementMode::Falling;
        rig
    }

    #[test]
    fn test_falls_under_gravity() {
        let mut rig = airborne(1000.0);
        let mut ctx = rig.context();
        let start = ctx.location();
        ctx.start_new_physics(0.1, 0);
        assert_eq!(ctx.state.mode, MovementMode::Falling);
        assert_near(ctx.state.velocity.z, -98.0, 1e-2);
        // Midpoint integration of constant gravity is exact
        assert_near(ctx.location().z, start.z - 4.9, 1e-2);
    }

    #[test]
    fn test_lands_and_notifies() {
        let mut rig = airborne(30.0);
        let mut ctx = rig.context();
        for _ in 0..30 {
            ctx.start_new_physics(DT, 0);
        }
        assert_eq!(ctx.state.mode, MovementMode::Walking);
        assert_eq!(ctx.state.velocity.z, 0.0);
        drop(ctx);
        assert_eq!(rig.hooks.count(LocomotionEvent::Landed), 1);
    }

    #[test]
    fn test_falling_into_water_swims() {
        let mut rig = airborne(300.0);
        rig.water.push(WaterVolume::new(
            Vec3::new(-1000.0, -1000.0, 0.0),
            Vec3::new(1000.0, 1000.0, 200.0),
        ));
        let mut ctx = rig.context();
        for _ in 0..60 {
            ctx.start_new_physics(DT, 0);
            if ctx.state.mode.is_swimming() {
                break;
            }
        }
        assert_eq!(ctx.state.mode, MovementMode::Swimming);
    }

    #[test]
    fn test_air_control_is_partial() {
        let mut rig = airborne(1000.0);
        rig.state.acceleration = Vec3::X * 2048.0;
        rig.state.analog_input_modifier = 1.0;
        // Fast enough that the slow-speed boost does not apply
        rig.state.velocity = Vec3::Y * 100.0;
        let mut ctx = rig.context();
        ctx.start_new_physics(0.05, 0);
        assert_near(ctx.state.velocity.x, 2048.0 * 0.35 * 0.05, 1.0);
    }

    #[test]
    fn test_falling_slides_down_wall() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        world.add_wall(Vec3::new(40.0, 0.0, 0.0), Vec3::NEG_X);
        let mut rig = TestRig::new(world);
        rig.place_on_floor(Vec3::new(9.0, 0.0, 0.0), 400.0);
        rig.state.mode = MovementMode::Falling;
        rig.state.velocity = Vec3::new(300.0, 0.0, 0.0);
        let mut ctx = rig.context();
        let start = ctx.location();
        for _ in 0..10 {
            ctx.start_new_physics(DT, 0);
        }
        assert!(ctx.location().x <= 10.0 + 1e-3);
        assert!(ctx.location().z < start.z);
        assert!(!ctx.state.pending_impacts.is_empty());
    }

    #[test]
    fn test_jump_from_ground() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 2.15);
        let mut ctx = rig.context();
        assert!(ctx.jump());
        assert_eq!(ctx.state.mode, MovementMode::Falling);
        assert_eq!(ctx.state.velocity.z, 420.0);
        // Already airborne
        assert!(!ctx.jump());
    }

    #[test]
    fn test_glide_needs_clearance() {
        let mut rig = airborne(100.0);
        assert!(!rig.context().toggle_glide());
        assert_eq!(rig.state.mode, MovementMode::Falling);

        let mut rig = airborne(400.0);
        assert!(rig.context().toggle_glide());
        assert!(rig.state.mode.is_gliding());
        assert!(rig.context().toggle_glide());
        assert_eq!(rig.state.mode, MovementMode::Falling);
    }

    #[test]
    fn test_no_glide_over_water() {
        let mut rig = airborne(400.0);
        rig.water.push(WaterVolume::new(
            Vec3::new(-1000.0, -1000.0, -300.0),
            Vec3::new(1000.0, 1000.0, 300.0),
        ));
        assert!(!rig.context().check_can_glide());
    }

    #[test]
    fn test_no_glide_from_ground() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 2.15);
        assert!(!rig.context().check_can_glide());
    }

    #[test]
    fn test_glide_descends_at_capped_speed() {
        let mut rig = airborne(3000.0);
        rig.state.mode = MovementMode::Custom(CustomMode::Gliding);
        rig.state.velocity = Vec3::new(0.0, 0.0, -600.0);
        let mut ctx = rig.context();
        for _ in 0..240 {
            ctx.start_new_physics(DT, 0);
        }
        assert!(ctx.state.mode.is_gliding());
        assert_near(ctx.state.velocity.z, -120.0, 1.0);
    }

    #[test]
    fn test_glide_ends_near_ground() {
        let mut rig = airborne(400.0);
        rig.state.mode = MovementMode::Custom(CustomMode::Gliding);
        rig.state.velocity = Vec3::new(0.0, 0.0, -120.0);
        let mut ctx = rig.context();
        for _ in 0..240 {
            ctx.start_new_physics(DT, 0);
            if !ctx.state.mode.is_gliding() {
                break;
            }
        }
        assert!(!ctx.state.mode.is_gliding());
        // Check height plus the floor probe's reach
        let bottom = ctx.location().z - 75.0;
        assert!(bottom > 100.0 && bottom < 160.0);
    }
}
