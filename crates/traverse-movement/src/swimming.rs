//! Swimming integrator and water entry

use glam::Vec3;
use tracing::debug;
use traverse_core::math::{clamp_length, safe_normal, KINDA_SMALL_NUMBER};
use traverse_physics::HitResult;

use crate::context::{MoveContext, MIN_TICK_TIME};
use crate::dispatch::PhysicsStep;
use crate::hooks::MantleKind;
use crate::mode::{CustomMode, MovementMode};

/// Downward speed a swimmer settles to after entering the water
const SWIM_BOB_SPEED: f32 = -80.0;
/// Band below the surface a surface swimmer is held at
const SURFACE_BAND: f32 = 5.0;
/// Nudge applied to the water line towards the water
const WATER_LINE_NUDGE: f32 = 0.1;

impl MoveContext<'_> {
    pub fn phys_swimming(&mut self, delta_time: f32, iterations: u32) -> PhysicsStep {
        if delta_time < MIN_TICK_TIME {
            return PhysicsStep::Done;
        }

        let surface_z = self.water_info().map(|info| info.surface_location.z);
        let location = self.location();
        let buoyancy = match surface_z {
            Some(surface) if self.state.is_swim_on_surface && location.z >= surface - SURFACE_BAND => 1.0,
            Some(_) if self.state.is_swim_on_surface => 1.0 + self.immersion_depth(),
            _ => 1.0,
        } * self.settings.engine.buoyancy;

        let depth = self.immersion_depth();
        let net_buoyancy = buoyancy * depth;
        let max_speed = self.max_speed();
        let original_accel_z = self.state.acceleration.z;
        let mut limited_up_accel = false;

        if self.state.velocity.z > 0.33 * max_speed && net_buoyancy != 0.0 {
            self.state.velocity.z = (0.33 * max_speed).max(self.state.velocity.z * depth * depth);
        } else if depth < 0.65 {
            limited_up_accel = self.state.acceleration.z > 0.0;
            self.state.acceleration.z = self.state.acceleration.z.min(0.1);
        }

        let iterations = iterations + 1;
        let mut old_location = self.location();
        self.state.just_teleported = false;

        let friction = 0.5 * self.settings.swimming.fluid_friction * depth;
        let braking = self.max_braking_deceleration();
        self.calc_velocity(delta_time, friction, true, braking);
        self.state.velocity.z += self.gravity_z() * delta_time * (1.0 - net_buoyancy);

        let mut adjusted = self.state.velocity * delta_time;
        if let Some(surface) = surface_z {
            if self.state.is_swim_on_surface && original_accel_z >= 0.0 {
                let ceiling = surface - SURFACE_BAND - self.location().z;
                adjusted.z = adjusted.z.min(ceiling.max(0.0));
            }
        }

        let mut hit = HitResult::no_hit(self.location(), self.location() + adjusted);
        let remaining = delta_time * self.swim(adjusted, &mut hit);
        if !self.state.mode.is_swimming() {
            return PhysicsStep::Restart { remaining, iterations };
        }

        if hit.time < 1.0 && hit.blocking_hit {
            if limited_up_accel && self.state.velocity.z >= 0.0 {
                // Allow climbing out along an obstacle at the surface
                self.state.velocity.z += original_accel_z * delta_time;
                adjusted = self.state.velocity * (1.0 - hit.time) * delta_time;
                self.swim(adjusted, &mut hit);
                if !self.state.mode.is_swimming() {
                    return PhysicsStep::Restart { remaining, iterations };
                }
            }

            let up_down = Vec3::NEG_Z.dot(safe_normal(self.state.velocity));
            let mut stepped_up = false;
            if hit.impact_normal.z.abs() < 0.2 && up_down < 0.5 && up_down > -0.2 && self.can_step_up(&hit) {
                let step_z = self.location().z;
                let real_velocity = self.state.velocity;
                // Moving up may leave the water
                self.state.velocity.z = 1.0;
                let mut step_down = None;
                stepped_up = self.step_up(adjusted * (1.0 - hit.time), &hit, &mut step_down);
                if stepped_up {
                    if !self.state.mode.is_swimming() {
                        return PhysicsStep::Restart { remaining, iterations };
                    }
                    old_location.z = self.location().z + (old_location.z - step_z);
                }
                self.state.velocity = real_velocity;
            }

            if !stepped_up {
                self.handle_impact(&hit);
                let normal = hit.normal;
                self.slide_along_surface(adjusted, 1.0 - hit.time, normal, &mut hit, true);
            }
        }

        let moved_time = delta_time - remaining;
        if !self.state.just_teleported && moved_time > KINDA_SMALL_NUMBER {
            let vertical = self.state.velocity.z;
            self.state.velocity = (self.location() - old_location) / moved_time;
            if self.water_info().is_none() {
                self.state.velocity.z = vertical;
            }
        }

        if self.try_jump_out_of_water() {
            return PhysicsStep::Restart { remaining, iterations };
        }

        if !self.is_in_water() {
            debug!("Left the water");
            self.set_movement_mode(MovementMode::Falling);
            return PhysicsStep::Restart { remaining, iterations };
        }

        if self.state.is_swim_on_surface && self.state.acceleration.length() > 1.0 {
            let (location, forward) = (self.location(), self.capsule.forward());
            if self.hooks.try_mantle(MantleKind::Swimming, location, forward) {
                self.set_movement_mode(MovementMode::Custom(CustomMode::Mantle));
                return PhysicsStep::Done;
            }
        }

        // River current
        if let Some(info) = self.water_info() {
            let push = info.velocity * self.settings.swimming.water_velocity_force_multiplier * delta_time;
            if push != Vec3::ZERO {
                self.safe_move(push);
            }
        }

        PhysicsStep::Done
    }

    /// Carry the entry velocity into the water and swim the rest of the tick
    pub fn start_swimming(
        &mut self,
        old_location: Vec3,
        old_velocity: Vec3,
        time_tick: f32,
        remaining: f32,
        iterations: u32,
    ) -> PhysicsStep {
        if remaining < MIN_TICK_TIME || time_tick < MIN_TICK_TIME {
            return PhysicsStep::Done;
        }

        let mut remaining = remaining;
        if !self.state.just_teleported {
            let average = (self.location() - old_location) / time_tick;
            let terminal = self.settings.swimming.terminal_velocity;
            self.state.velocity = clamp_length(average * 2.0 - old_velocity, terminal);
        }

        let location = self.location();
        let water_line = self.find_water_line(location, old_location);
        if water_line != location {
            let actual_dist = (location - old_location).length();
            if actual_dist > KINDA_SMALL_NUMBER {
                remaining += time_tick * (water_line - location).length() / actual_dist;
            }
            self.move_component(water_line - location);
        }

        let vz = self.state.velocity.z;
        if vz > 2.0 * SWIM_BOB_SPEED && vz < 0.0 {
            self.state.velocity.z = SWIM_BOB_SPEED - self.state.velocity.truncate().length() * 0.7;
        }

        if remaining >= MIN_TICK_TIME && iterations < self.settings.engine.max_simulation_iterations {
            return self.phys_swimming(remaining, iterations);
        }
        PhysicsStep::Done
    }

    /// Move through the water; returns the fraction of the move spent out
    /// of it
    fn swim(&mut self, delta: Vec3, hit: &mut HitResult) -> f32 {
        let start = self.location();
        *hit = self.safe_move(delta);
        if self.is_in_water() {
            return 0.0;
        }

        let location = self.location();
        let end = self.find_water_line(start, location);
        let desired = delta.length();
        if end == location || desired <= KINDA_SMALL_NUMBER {
            return 0.0;
        }

        let mut air_time = (end - location).length() / desired;
        if (location - start).dot(end - location) > 0.0 {
            air_time = 0.0;
        }
        *hit = self.safe_move(end - location);
        air_time
    }

    /// Point where the segment from `in_water` to `out_of_water` crosses the
    /// water surface, nudged back into the water; `in_water` when it does
    /// not cross
    pub fn find_water_line(&self, in_water: Vec3, out_of_water: Vec3) -> Vec3 {
        let Some(info) = self.water.water_info(in_water, self.capsule.half_height) else {
            return in_water;
        };
        let surface = info.surface_location.z;
        let dz = out_of_water.z - in_water.z;
        if dz.abs() <= KINDA_SMALL_NUMBER || (surface - in_water.z) * (surface - out_of_water.z) > 0.0 {
            return in_water;
        }
        let t = ((surface - in_water.z) / dz).clamp(0.0, 1.0);
        in_water.lerp(out_of_water, t) + safe_normal(in_water - out_of_water) * WATER_LINE_NUDGE
    }

    fn try_jump_out_of_water(&mut self) -> bool {
        let wants = std::mem::take(&mut self.state.wants_to_jump_out_of_water);
        if !wants || !self.state.is_swim_on_surface || !self.settings.swimming.can_jump_out_of_water {
            return false;
        }
        let Some(info) = self.water_info() else {
            return false;
        };
        if self.location().z > info.surface_location.z {
            return false;
        }

        self.set_movement_mode(MovementMode::Falling);
        self.state.velocity.z += self.settings.swimming.out_water_speed;
        self.state.is_jumping_out_of_water = true;
        self.hooks.on_jump_out_of_water();
        true
    }
}
