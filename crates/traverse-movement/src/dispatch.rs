//! Trampoline that runs the active mode's integrator for a tick
//!
//! Integrators never call each other. When one changes the mode mid-step it
//! returns [`PhysicsStep::Restart`] with the time it did not use, and the loop
//! here hands that time to the new mode's integrator.

use tracing::{trace, warn};

use crate::context::{MoveContext, MIN_TICK_TIME};
use crate::mode::{CustomMode, MovementMode};

/// What an integrator asks the dispatcher to do next
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhysicsStep {
    /// The tick's time is used up
    Done,
    /// Continue in the current (new) mode with the given budget
    Restart { remaining: f32, iterations: u32 },
}

impl MoveContext<'_> {
    /// Simulate `delta_time` seconds, following mode changes within the tick
    pub fn start_new_physics(&mut self, delta_time: f32, iterations: u32) {
        let max_iterations = self.settings.engine.max_simulation_iterations;
        let max_hops = self.settings.engine.max_mode_hops;

        let mut step = PhysicsStep::Restart {
            remaining: delta_time,
            iterations,
        };
        let mut hops = 0;

        while let PhysicsStep::Restart { remaining, iterations } = step {
            if remaining < MIN_TICK_TIME || iterations >= max_iterations {
                break;
            }
            if hops >= max_hops {
                warn!(
                    mode = %self.state.mode,
                    remaining,
                    "Mode hop limit reached, dropping the rest of the tick"
                );
                break;
            }
            hops += 1;
            trace!(mode = %self.state.mode, remaining, iterations, "Running integrator");
            step = self.run_mode(remaining, iterations);
        }

        self.state.just_teleported = false;
    }

    fn run_mode(&mut self, delta_time: f32, iterations: u32) -> PhysicsStep {
        match self.state.mode {
            MovementMode::Walking => self.phys_walking(delta_time, iterations),
            MovementMode::Falling => self.phys_falling(delta_time, iterations),
            MovementMode::Swimming => self.phys_swimming(delta_time, iterations),
            MovementMode::Flying => self.phys_flying(delta_time, iterations),
            MovementMode::Custom(CustomMode::FreeClimb) => self.phys_climbing(delta_time, iterations),
            MovementMode::Custom(CustomMode::Slide) => self.phys_sliding(delta_time, iterations),
            MovementMode::Custom(CustomMode::RopeSwing) => self.phys_swing(delta_time, iterations),
            MovementMode::Custom(CustomMode::Gliding) => self.phys_gliding(delta_time, iterations),
            // Driven by the character's mantle, not by physics
            MovementMode::Custom(CustomMode::Mantle) => PhysicsStep::Done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRig;
    use glam::Vec3;

    #[test]
    fn test_tiny_budget_does_nothing() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 20.0);
        rig.state.mode = MovementMode::Falling;
        let mut ctx = rig.context();
        let start = ctx.location();
        ctx.start_new_physics(MIN_TICK_TIME * 0.5, 0);
        assert_eq!(ctx.location(), start);
    }

    #[test]
    fn test_exhausted_iterations_do_nothing() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 20.0);
        rig.state.mode = MovementMode::Falling;
        let mut ctx = rig.context();
        let start = ctx.location();
        let max = ctx.settings.engine.max_simulation_iterations;
        ctx.start_new_physics(1.0 / 60.0, max);
        assert_eq!(ctx.location(), start);
    }

    #[test]
    fn test_mantle_is_not_simulated() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 20.0);
        rig.state.mode = MovementMode::Custom(CustomMode::Mantle);
        rig.state.velocity = Vec3::X * 300.0;
        let mut ctx = rig.context();
        let start = ctx.location();
        ctx.start_new_physics(1.0 / 60.0, 0);
        assert_eq!(ctx.location(), start);
    }

    #[test]
    fn test_fall_then_land_in_one_tick() {
        let mut rig = TestRig::flat_ground();
        rig.place_on_floor(Vec3::ZERO, 1.0);
        rig.state.mode = MovementMode::Falling;
        rig.state.velocity = Vec3::new(0.0, 0.0, -400.0);
        let mut ctx = rig.context();
        ctx.start_new_physics(1.0 / 30.0, 0);
        assert_eq!(ctx.state.mode, MovementMode::Walking);
        assert!(ctx.state.current_floor.is_walkable_floor());
    }
}
