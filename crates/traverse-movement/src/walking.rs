//! Grounded integrators: walking and sliding
//!
//! Both share one sub-stepped loop. Sliding adds a push down the floor's
//! slope, scales friction down, and only lets input steer sideways.

use glam::Vec3;
use tracing::debug;
use traverse_core::math::{
    is_nearly_zero, project_onto_normal, rotation_from_x, safe_normal_2d, KINDA_SMALL_NUMBER,
};

use crate::context::{MoveContext, MAX_FLOOR_DIST, MIN_TICK_TIME};
use crate::dispatch::PhysicsStep;
use crate::mode::MovementMode;

impl MoveContext<'_> {
    pub fn phys_walking(&mut self, delta_time: f32, iterations: u32) -> PhysicsStep {
        self.ground_move(delta_time, iterations, false)
    }

    pub fn phys_sliding(&mut self, delta_time: f32, iterations: u32) -> PhysicsStep {
        if delta_time < MIN_TICK_TIME {
            return PhysicsStep::Done;
        }
        if !self.can_slide() {
            debug!(speed = self.state.velocity.length(), "Slide ended");
            self.set_movement_mode(MovementMode::Walking);
            return PhysicsStep::Restart {
                remaining: delta_time,
                iterations,
            };
        }

        let step = self.ground_move(delta_time, iterations, true);

        let heading = safe_normal_2d(self.state.velocity);
        if heading != Vec3::ZERO && self.state.mode.is_sliding() {
            self.capsule.set_rotation(rotation_from_x(heading));
        }
        step
    }

    /// Walkable floor below and moving faster than the slide threshold
    pub fn can_slide(&self) -> bool {
        let floor = self.find_floor_at(self.location(), false);
        let min_speed = self.settings.sliding.min_slide_speed;
        floor.is_walkable_floor() && self.state.velocity.length_squared() > min_speed * min_speed
    }

    /// Kick along the current heading and refresh the floor
    pub fn enter_slide(&mut self) {
        let impulse = self.settings.sliding.slide_enter_impulse;
        self.state.velocity += safe_normal_2d(self.state.velocity) * impulse;
        self.hooks.on_enter_slide();
        let location = self.location();
        self.state.current_floor = self.find_floor(location, true);
    }

    pub fn exit_slide(&mut self) {
        self.hooks.on_exit_slide();
    }

    fn ground_move(&mut self, delta_time: f32, iterations: u32, sliding: bool) -> PhysicsStep {
        if delta_time < MIN_TICK_TIME {
            return PhysicsStep::Done;
        }

        self.state.just_teleported = false;
        let starting_mode = self.state.mode;
        let mut iterations = iterations;
        let mut remaining = delta_time;
        let mut checked_fall = false;
        let mut tried_ledge_move = false;

        while remaining >= MIN_TICK_TIME && iterations < self.settings.engine.max_simulation_iterations {
            iterations += 1;
            self.state.just_teleported = false;
            let time_tick = self.simulation_time_step(remaining, iterations);
            remaining -= time_tick;

            let old_base = self.state.base;
            let old_location = self.location();
            let old_floor = self.state.current_floor;

            self.maintain_horizontal_ground_velocity();
            let old_velocity = self.state.velocity;
            let floor_was_walkable = old_floor.is_walkable_floor();

            if sliding {
                self.apply_slide_forces(time_tick);
            } else {
                self.state.acceleration.z = 0.0;
                let friction = self.settings.walking.ground_friction;
                let braking = self.max_braking_deceleration();
                self.calc_velocity(time_tick, friction, false, braking);
            }

            let move_velocity = self.state.velocity;
            let delta = move_velocity * time_tick;
            let zero_delta = is_nearly_zero(delta, KINDA_SMALL_NUMBER);
            let mut step_down = None;

            if zero_delta {
                remaining = 0.0;
            } else {
                step_down = self.move_along_floor(move_velocity, time_tick);

                if self.state.mode != starting_mode {
                    // Refund the part of the sub-step that was not travelled
                    let desired = delta.length();
                    if desired > KINDA_SMALL_NUMBER {
                        let actual = (self.location() - old_location).truncate().length();
                        remaining += time_tick * (1.0 - (actual / desired).min(1.0));
                    }
                    return PhysicsStep::Restart { remaining, iterations };
                }
            }

            self.state.current_floor = match step_down {
                Some(floor) => floor,
                None => {
                    let location = self.location();
                    self.find_floor(location, zero_delta)
                }
            };
            let floor = self.state.current_floor;

            if !self.can_walk_off_ledges() && !floor.is_walkable_floor() {
                let new_delta = if tried_ledge_move {
                    Vec3::ZERO
                } else {
                    self.ledge_move(old_location, delta)
                };
                if new_delta != Vec3::ZERO {
                    self.revert_move(old_location, old_base, old_floor, false);
                    tried_ledge_move = true;
                    self.state.velocity = new_delta / time_tick;
                    remaining += time_tick;
                    continue;
                }

                let must_jump = zero_delta || old_base.is_none();
                if must_jump || !checked_fall {
                    if let Some(step) =
                        self.check_fall(delta, old_location, remaining, time_tick, iterations, must_jump)
                    {
                        return step;
                    }
                }
                self.revert_move(old_location, old_base, old_floor, true);
                break;
            }

            if floor.is_walkable_floor() {
                if !sliding {
                    self.apply_pending_penetration_adjustment();
                }
                self.adjust_floor_height();
                self.set_base_from_floor();
            } else if floor.hit.start_penetrating && remaining <= 0.0 {
                // The floor sweep started inside geometry: pop out upwards
                let mut hit = floor.hit;
                hit.trace_end = hit.trace_start + Vec3::Z * MAX_FLOOR_DIST;
                let adjustment = self.penetration_adjustment(&hit);
                self.resolve_penetration(adjustment, &hit);
                self.state.force_next_floor_check = true;
            }

            if self.is_in_water() {
                self.set_movement_mode(MovementMode::Swimming);
                let velocity = if sliding { old_velocity } else { self.state.velocity };
                return self.start_swimming(old_location, velocity, time_tick, remaining, iterations);
            }

            if !floor.is_walkable_floor() && !floor.hit.start_penetrating {
                let must_jump = self.state.just_teleported || zero_delta || old_base.is_none();
                if must_jump || !checked_fall {
                    if let Some(step) =
                        self.check_fall(delta, old_location, remaining, time_tick, iterations, must_jump)
                    {
                        return step;
                    }
                }
                checked_fall = true;
            }

            let moving_on_ground = self.state.mode.is_moving_on_ground() && (!sliding || floor_was_walkable);
            if moving_on_ground && !self.state.just_teleported && time_tick >= MIN_TICK_TIME {
                if !sliding {
                    self.state.pre_penetration_velocity = Some(move_velocity);
                }
                self.state.velocity = (self.location() - old_location) / time_tick;
                self.maintain_horizontal_ground_velocity();
            }

            // Stuck: later sub-steps would not move either
            if self.location() == old_location {
                break;
            }
        }

        if self.state.mode.is_moving_on_ground() {
            self.maintain_horizontal_ground_velocity();
        }
        PhysicsStep::Done
    }

    /// Push down the slope, steer sideways only, and integrate with the
    /// reduced slide friction
    fn apply_slide_forces(&mut self, time_tick: f32) {
        let sliding = &self.settings.sliding;
        let slope = self.state.current_floor.hit.normal;
        let slope_force = Vec3::new(slope.x, slope.y, 0.0);
        self.state.velocity += slope_force * sliding.slide_gravity_force * time_tick;

        let right = safe_normal_2d(self.capsule.right());
        self.state.acceleration =
            project_onto_normal(self.state.acceleration, right) * sliding.slide_rotation_multiplier;

        let friction = self.settings.walking.ground_friction * sliding.slide_friction_factor;
        let braking = self.max_braking_deceleration();
        self.calc_velocity(time_tick, friction, false, braking);
    }
}
