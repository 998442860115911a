//! Rope swinging
//!
//! The character rides a point on the rope addressed by its distance from
//! the top. Vertical input slides that point along the rope; the character's
//! weight and input are handed to the rope as forces on the segment it holds.

use std::sync::Arc;

use glam::Vec3;
use tracing::{debug, warn};
use traverse_core::math::safe_normal_2d;
use traverse_physics::SharedRope;

use crate::context::{MoveContext, MIN_TICK_TIME};
use crate::dispatch::PhysicsStep;
use crate::mode::{CustomMode, MovementMode};

/// Weight the rider hangs on the rope with
const RIDER_WEIGHT: f32 = 980.0;

impl MoveContext<'_> {
    /// Grab `rope` at the point nearest the capsule
    pub fn enter_swing(&mut self, rope: &SharedRope) {
        {
            let mut guard = rope.lock();
            self.state.on_rope_distance = guard.distance_at_location(self.location());
            guard.add_rider(self.owner);
        }
        self.state.swing_rope = Some(Arc::downgrade(rope));
        self.set_movement_mode(MovementMode::Custom(CustomMode::RopeSwing));
    }

    /// Let go of the rope, walking if there is floor below and falling
    /// otherwise; a jump launches along the input direction
    pub fn exit_swing(&mut self, wants_to_jump: bool) {
        let Some(weak) = self.state.swing_rope.take() else {
            return;
        };
        if let Some(rope) = weak.upgrade() {
            rope.lock().remove_rider(self.owner);
        }

        if self.state.mode.is_swinging() {
            let location = self.location();
            let floor = self.find_floor_at(location, false);
            if floor.is_walkable_floor() {
                self.set_movement_mode(MovementMode::Walking);
            } else {
                self.set_movement_mode(MovementMode::Falling);
                if wants_to_jump {
                    let jump = self.settings.walking.jump_z_velocity;
                    let horizontal = safe_normal_2d(self.state.acceleration) * jump;
                    self.state.velocity = Vec3::new(horizontal.x, horizontal.y, jump);
                }
            }
        }
        self.state.on_rope_distance = 0.0;
    }

    pub fn phys_swing(&mut self, delta_time: f32, iterations: u32) -> PhysicsStep {
        if delta_time < MIN_TICK_TIME {
            return PhysicsStep::Done;
        }

        let Some(rope) = self.state.swing_rope.as_ref().and_then(|weak| weak.upgrade()) else {
            warn!("Swing rope is gone, letting go");
            self.exit_swing(false);
            return PhysicsStep::Restart {
                remaining: delta_time,
                iterations,
            };
        };

        self.state.velocity = Vec3::ZERO;
        let location = self.location();
        let acceleration = self.state.acceleration;

        let target = {
            let mut rope = rope.lock();
            let max_distance = rope.max_distance();
            let climb = if acceleration.z > 0.0 {
                1.0
            } else if acceleration.z < 0.0 {
                -1.0
            } else {
                0.0
            };
            let step = climb * self.settings.swing.move_up_down_speed * delta_time;
            self.state.on_rope_distance = (self.state.on_rope_distance - step).clamp(0.0, max_distance);

            let distance = self.state.on_rope_distance;
            if rope.points().len() >= 2 {
                let segment = rope.segment_at_distance(distance);
                rope.add_force_at_segment(segment, Vec3::NEG_Z * RIDER_WEIGHT, location);
                rope.add_force_at_segment(segment, acceleration, location);
            }
            rope.location_at_distance(distance)
        };

        let delta = target - location;
        let mut hit = self.safe_move(delta);
        if hit.time < 1.0 && hit.blocking_hit {
            debug!(distance = self.state.on_rope_distance, "Swing blocked");
            self.handle_impact(&hit);
            let normal = hit.normal;
            self.slide_along_surface(delta, 1.0 - hit.time, normal, &mut hit, true);
        }

        PhysicsStep::Done
    }
}
