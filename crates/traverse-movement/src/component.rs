//! The movement component: owns one character's capsule, settings and
//! movement state, and runs a tick against a world
//!
//! The world and water are passed in per tick, so several components can
//! share one read-only world.

use std::sync::Arc;

use glam::Vec3;
use tracing::trace;
use traverse_core::math::clamp_length;
use traverse_core::EntityId;
use traverse_physics::{CapsuleComponent, CollisionQuery, QueryParams, WaterQuery};

use crate::context::{MoveContext, MIN_TICK_TIME};
use crate::hooks::CharacterHooks;
use crate::mode::{CustomMode, MovementMode};
use crate::settings::MovementSettings;
use crate::state::MovementState;

pub struct MovementComponent {
    pub owner: EntityId,
    pub settings: Arc<MovementSettings>,
    pub capsule: CapsuleComponent,
    pub state: MovementState,
    pub params: QueryParams,
    /// Input gathered since the last tick, in world space
    pending_input: Vec3,
}

impl MovementComponent {
    /// Standing capsule centered at `location`
    pub fn new(owner: EntityId, settings: Arc<MovementSettings>, location: Vec3) -> Self {
        let capsule = CapsuleComponent::new(
            location,
            settings.capsule.stand_radius,
            settings.capsule.stand_half_height,
        );
        Self {
            owner,
            settings,
            capsule,
            state: MovementState::new(MovementMode::Walking),
            params: QueryParams::ignoring(owner),
            pending_input: Vec3::ZERO,
        }
    }

    pub fn mode(&self) -> MovementMode {
        self.state.mode
    }

    pub fn location(&self) -> Vec3 {
        self.capsule.location()
    }

    pub fn velocity(&self) -> Vec3 {
        self.state.velocity
    }

    /// Queue movement input for the next tick; magnitudes above 1 are clamped
    pub fn add_input_vector(&mut self, input: Vec3) {
        self.pending_input += input;
    }

    pub fn pending_input(&self) -> Vec3 {
        self.pending_input
    }

    /// Take the velocity the walking integrator saw before a penetration
    /// correction rebuilt it
    pub fn try_consume_pre_penetration_velocity(&mut self) -> Option<Vec3> {
        self.state.pre_penetration_velocity.take()
    }

    /// Borrow everything an integrator needs for one tick
    pub fn context<'a>(
        &'a mut self,
        world: &'a dyn CollisionQuery,
        water: &'a dyn WaterQuery,
        hooks: &'a mut dyn CharacterHooks,
    ) -> MoveContext<'a> {
        MoveContext {
            world,
            water,
            settings: &self.settings,
            capsule: &mut self.capsule,
            state: &mut self.state,
            hooks,
            params: &self.params,
            owner: self.owner,
        }
    }

    /// Consume the pending input and simulate `delta_time` seconds
    pub fn perform_movement(
        &mut self,
        world: &dyn CollisionQuery,
        water: &dyn WaterQuery,
        hooks: &mut dyn CharacterHooks,
        delta_time: f32,
    ) {
        if delta_time < MIN_TICK_TIME {
            return;
        }

        let input = clamp_length(std::mem::take(&mut self.pending_input), 1.0);
        let mut ctx = self.context(world, water, hooks);
        ctx.state.acceleration = input * ctx.max_acceleration();
        ctx.state.analog_input_modifier = input.length().clamp(0.0, 1.0);

        ctx.update_crouch();
        ctx.update_state_before_movement(delta_time);
        ctx.start_new_physics(delta_time, 0);
        ctx.state.pressed_jump = false;

        trace!(
            mode = %ctx.state.mode,
            location = ?ctx.location(),
            velocity = ?ctx.state.velocity,
            "Movement tick"
        );
    }
}

impl MoveContext<'_> {
    /// Apply the crouch intent when the capsule can change size
    ///
    /// Crouching out of a sprint on walkable ground turns into a slide.
    fn update_crouch(&mut self) {
        let can_crouch = self.state.mode.is_moving_on_ground() || self.state.mode.is_base_falling();
        if self.state.wants_to_crouch && !self.state.is_crouched && can_crouch {
            self.crouch();
            if self.state.mode.is_walking() && self.state.sprinting && self.can_slide() {
                self.state.sprinting = false;
                self.set_movement_mode(MovementMode::Custom(CustomMode::Slide));
            }
        } else if !self.state.wants_to_crouch && self.state.is_crouched {
            self.uncrouch();
        } else if self.state.is_crouched && !can_crouch {
            self.uncrouch();
        }
    }
}
