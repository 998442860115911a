//! Velocity integration: acceleration, friction, braking, gravity

use glam::Vec3;
use traverse_core::math::{clamp_length, safe_normal, vector_plane_project, KINDA_SMALL_NUMBER};
use traverse_physics::HitResult;

use crate::context::{MoveContext, BRAKE_TO_STOP_VELOCITY, MIN_TICK_TIME, VERTICAL_SLOPE_NORMAL_Z};

/// Longest braking sub-step
const BRAKING_SUB_STEP_TIME: f32 = 1.0 / 33.0;

impl MoveContext<'_> {
    /// Whether the velocity is more than 1% over `max_speed`
    pub fn is_exceeding_max_speed(&self, max_speed: f32) -> bool {
        let max_speed = max_speed.max(0.0);
        self.state.velocity.length_squared() > max_speed * max_speed * 1.01
    }

    /// Update velocity from the current acceleration for one sub-step
    ///
    /// With no input, or when over the max speed, the velocity brakes;
    /// otherwise friction turns it towards the input. `fluid` applies
    /// friction as drag on top.
    pub fn calc_velocity(&mut self, dt: f32, friction: f32, fluid: bool, braking_deceleration: f32) {
        if dt < MIN_TICK_TIME {
            return;
        }

        let friction = friction.max(0.0);
        let max_speed = self.max_speed();
        let acceleration = self.state.acceleration;
        let zero_acceleration = acceleration == Vec3::ZERO;
        let velocity_over_max = self.is_exceeding_max_speed(max_speed);

        if zero_acceleration || velocity_over_max {
            let old_velocity = self.state.velocity;
            let engine = &self.settings.engine;
            let braking_friction = if engine.use_separate_braking_friction {
                engine.braking_friction
            } else {
                friction
            };
            self.apply_velocity_braking(dt, braking_friction, braking_deceleration);

            // Braking must not pull us under max speed while still pushing on
            if velocity_over_max
                && self.state.velocity.length_squared() < max_speed * max_speed
                && acceleration.dot(old_velocity) > 0.0
            {
                self.state.velocity = safe_normal(old_velocity) * max_speed;
            }
        } else {
            let accel_dir = safe_normal(acceleration);
            let velocity = self.state.velocity;
            let speed = velocity.length();
            self.state.velocity = velocity - (velocity - accel_dir * speed) * (dt * friction).min(1.0);
        }

        if fluid {
            self.state.velocity *= 1.0 - (friction * dt).min(1.0);
        }

        if !zero_acceleration {
            let max_input_speed = (max_speed * self.state.analog_input_modifier).max(0.0);
            let limit = if self.is_exceeding_max_speed(max_input_speed) {
                self.state.velocity.length()
            } else {
                max_input_speed
            };
            self.state.velocity = clamp_length(self.state.velocity + acceleration * dt, limit);
        }
    }

    /// Slow down under friction and constant deceleration
    pub fn apply_velocity_braking(&mut self, dt: f32, friction: f32, braking_deceleration: f32) {
        if self.state.velocity == Vec3::ZERO || dt < MIN_TICK_TIME {
            return;
        }

        let friction_factor = self.settings.engine.braking_friction_factor.max(0.0);
        let friction = (friction * friction_factor).max(0.0);
        let braking_deceleration = braking_deceleration.max(0.0);
        let zero_friction = friction == 0.0;
        let zero_braking = braking_deceleration == 0.0;
        if zero_friction && zero_braking {
            return;
        }

        let old_velocity = self.state.velocity;
        let max_time_step = BRAKING_SUB_STEP_TIME.clamp(1.0 / 75.0, 1.0 / 20.0);
        let reverse_accel = if zero_braking {
            Vec3::ZERO
        } else {
            -braking_deceleration * safe_normal(old_velocity)
        };

        // Sub-step so high friction cannot overshoot
        let mut remaining = dt;
        while remaining >= MIN_TICK_TIME {
            let step = if remaining > max_time_step && !zero_friction {
                max_time_step.min(remaining * 0.5)
            } else {
                remaining
            };
            remaining -= step;

            let velocity = self.state.velocity;
            self.state.velocity = velocity + (-friction * velocity + reverse_accel) * step;

            // Braking never reverses direction
            if self.state.velocity.dot(old_velocity) <= 0.0 {
                self.state.velocity = Vec3::ZERO;
                return;
            }
        }

        let speed_sq = self.state.velocity.length_squared();
        if speed_sq <= KINDA_SMALL_NUMBER
            || (!zero_braking && speed_sq <= BRAKE_TO_STOP_VELOCITY * BRAKE_TO_STOP_VELOCITY)
        {
            self.state.velocity = Vec3::ZERO;
        }
    }

    /// Apply gravity, clamping speed along gravity to the terminal velocity
    pub fn new_fall_velocity(&self, initial: Vec3, gravity: Vec3, dt: f32) -> Vec3 {
        if dt <= 0.0 {
            return initial;
        }
        let mut result = initial + gravity * dt;
        let gravity_dir = safe_normal(gravity);
        let terminal = self.settings.engine.terminal_velocity.abs();
        if result.dot(gravity_dir) > terminal {
            result = vector_plane_project(result, gravity_dir) + gravity_dir * terminal;
        }
        result
    }

    /// Scale lateral input by the mode's air control
    pub fn air_control(&self, air_control: f32, fall_acceleration: Vec3) -> Vec3 {
        let mut control = air_control;
        if control != 0.0 {
            control = self.boost_air_control(control);
        }
        fall_acceleration * control
    }

    /// More air control while nearly stationary laterally
    fn boost_air_control(&self, air_control: f32) -> f32 {
        let engine = &self.settings.engine;
        let threshold = engine.air_control_boost_velocity_threshold;
        if self.state.velocity.truncate().length_squared() < threshold * threshold {
            return (engine.air_control_boost_multiplier * air_control).min(1.0);
        }
        air_control
    }

    /// Lateral acceleration available while airborne
    pub fn falling_lateral_acceleration(&self, air_control: f32) -> Vec3 {
        let acceleration = self.state.acceleration;
        let mut fall_acceleration = Vec3::new(acceleration.x, acceleration.y, 0.0);
        if fall_acceleration.truncate().length_squared() > 0.0 {
            fall_acceleration = self.air_control(air_control, fall_acceleration);
            fall_acceleration = clamp_length(fall_acceleration, self.max_acceleration());
        }
        fall_acceleration
    }

    /// Remove air control that would push into the surface in `hit`
    pub fn limit_air_control(&self, fall_acceleration: Vec3, hit: &HitResult, check_landing_spot: bool) -> Vec3 {
        let mut result = fall_acceleration;
        if hit.is_valid_blocking_hit() && hit.normal.z > VERTICAL_SLOPE_NORMAL_Z {
            if (!check_landing_spot || !self.is_valid_landing_spot(hit.location, hit))
                && fall_acceleration.dot(hit.normal) < 0.0
            {
                let normal_2d = traverse_core::math::safe_normal_2d(hit.normal);
                result = vector_plane_project(fall_acceleration, normal_2d);
            }
        } else if hit.start_penetrating {
            result = Vec3::ZERO;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_near, TestRig};

    #[test]
    fn test_accelerates_up_to_max_walk_speed() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 2.15);
        rig.state.acceleration = Vec3::X * 2048.0;
        rig.state.analog_input_modifier = 1.0;
        let mut ctx = rig.context();
        for _ in 0..120 {
            ctx.calc_velocity(1.0 / 60.0, 8.0, false, 2048.0);
        }
        assert_near(ctx.state.velocity.length(), 375.0, 0.5);
        assert!(ctx.state.velocity.x > 0.0);
    }

    #[test]
    fn test_brakes_to_stop_without_input() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 2.15);
        rig.state.velocity = Vec3::X * 375.0;
        let mut ctx = rig.context();
        for _ in 0..60 {
            ctx.calc_velocity(1.0 / 60.0, 8.0, false, 2048.0);
        }
        assert_eq!(ctx.state.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_braking_never_reverses() {
        let mut rig = TestRig::flat_ground();
        rig.state.velocity = Vec3::X * 50.0;
        let mut ctx = rig.context();
        ctx.apply_velocity_braking(1.0, 0.0, 10_000.0);
        assert_eq!(ctx.state.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_terminal_velocity_clamp() {
        let mut rig = TestRig::flat_ground();
        let ctx = rig.context();
        let v = ctx.new_fall_velocity(Vec3::new(100.0, 0.0, -3990.0), Vec3::Z * -980.0, 0.1);
        assert_near(v.z, -4000.0, 1e-3);
        assert_near(v.x, 100.0, 1e-3);
    }

    #[test]
    fn test_air_control_boost_when_slow() {
        let mut rig = TestRig::flat_ground();
        let ctx = rig.context();
        let boosted = ctx.air_control(0.35, Vec3::X * 1000.0);
        assert_near(boosted.x, 700.0, 1e-3);

        drop(ctx);
        rig.state.velocity = Vec3::X * 300.0;
        let ctx = rig.context();
        let plain = ctx.air_control(0.35, Vec3::X * 1000.0);
        assert_near(plain.x, 350.0, 1e-3);
    }

    #[test]
    fn test_limit_air_control_against_slope() {
        let mut rig = TestRig::flat_ground();
        let ctx = rig.context();
        let normal = Vec3::new(-1.0, 0.0, 1.0).normalize();
        let hit = HitResult {
            blocking_hit: true,
            normal,
            impact_normal: normal,
            ..Default::default()
        };
        let limited = ctx.limit_air_control(Vec3::X * 100.0, &hit, false);
        assert_near(limited.x, 0.0, 1e-4);

        let penetrating = HitResult {
            blocking_hit: true,
            start_penetrating: true,
            ..Default::default()
        };
        assert_eq!(ctx.limit_air_control(Vec3::X * 100.0, &penetrating, false), Vec3::ZERO);
    }
}
