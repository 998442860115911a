//! Flying: free 3D movement under fluid drag, no gravity

use glam::Vec3;
use traverse_core::math::safe_normal;

use crate::context::{MoveContext, MIN_TICK_TIME};
use crate::dispatch::PhysicsStep;

impl MoveContext<'_> {
    pub fn phys_flying(&mut self, delta_time: f32, _iterations: u32) -> PhysicsStep {
        if delta_time < MIN_TICK_TIME {
            return PhysicsStep::Done;
        }

        let friction = 0.5 * self.settings.flying.fluid_friction;
        let braking = self.max_braking_deceleration();
        self.calc_velocity(delta_time, friction, true, braking);

        self.state.just_teleported = false;
        let mut old_location = self.location();
        let adjusted = self.state.velocity * delta_time;
        let mut hit = self.safe_move(adjusted);

        if hit.time < 1.0 && hit.blocking_hit {
            let up_down = Vec3::NEG_Z.dot(safe_normal(self.state.velocity));
            let mut stepped_up = false;
            if hit.impact_normal.z.abs() < 0.2 && up_down < 0.5 && up_down > -0.2 && self.can_step_up(&hit) {
                let step_z = self.location().z;
                let mut step_down = None;
                stepped_up = self.step_up(adjusted * (1.0 - hit.time), &hit, &mut step_down);
                if stepped_up {
                    old_location.z = self.location().z + (old_location.z - step_z);
                }
            }

            if !stepped_up {
                self.handle_impact(&hit);
                let normal = hit.normal;
                self.slide_along_surface(adjusted, 1.0 - hit.time, normal, &mut hit, true);
            }
        }

        if !self.state.just_teleported {
            self.state.velocity = (self.location() - old_location) / delta_time;
        }
        PhysicsStep::Done
    }
}
