//! Mode changes and the intent evaluation that runs before each tick's
//! physics

use glam::Vec3;
use tracing::debug;
use traverse_core::math::yaw_only;

use crate::context::MoveContext;
use crate::mode::{CustomMode, MovementMode};

impl MoveContext<'_> {
    /// Switch modes, running the exit and entry side effects once; setting
    /// the current mode again does nothing
    pub fn set_movement_mode(&mut self, mode: MovementMode) {
        let previous = self.state.mode;
        if previous == mode {
            return;
        }
        self.state.mode = mode;
        debug!(%previous, current = %mode, "Movement mode changed");
        self.on_movement_mode_changed(previous);
    }

    /// Side effects of leaving `previous` for the current mode
    pub fn on_movement_mode_changed(&mut self, previous: MovementMode) {
        let mode = self.state.mode;

        if previous.is_sliding() {
            self.exit_slide();
        }
        if mode.is_sliding() {
            self.enter_slide();
        }
        if previous.is_swinging() && !mode.is_swinging() {
            self.exit_swing(false);
        }

        if !self.state.is_crouched {
            let capsule = &self.settings.capsule;
            self.capsule
                .set_size(capsule.stand_radius, capsule.stand_half_height, false);
        }

        if mode.is_climbing() {
            if previous.is_swimming() {
                self.state.swim_to_climb = true;
            }
            let radius = self.capsule.radius;
            let half_height = self.settings.climbing_half_height();
            self.capsule.set_size(radius, half_height, false);
            let (location, forward) = (self.location(), self.capsule.forward());
            self.state.wall_hits = self.sweep_wall_hits(location, forward);
        }

        if previous.is_climbing() {
            self.stop_climb_dashing();
            let stand = yaw_only(self.rotation());
            self.capsule.set_rotation(stand);
        }

        if mode.is_swimming() {
            let swimming = &self.settings.swimming;
            self.capsule
                .set_size(swimming.swim_capsule_radius, swimming.swim_capsule_half_height, false);
            self.state.wants_to_jump_out_of_water = false;
        }

        match mode {
            MovementMode::Walking => {
                self.state.velocity.z = 0.0;
                let location = self.location();
                self.state.current_floor = self.find_floor(location, false);
                self.adjust_floor_height();
                self.set_base_from_floor();
            }
            MovementMode::Custom(CustomMode::Slide) => self.set_base_from_floor(),
            _ => {
                self.state.current_floor.clear();
                if !mode.is_climbing() {
                    self.state.base = None;
                }
            }
        }

        self.hooks.on_movement_mode_changed(previous, mode);
    }

    /// Evaluate intents and environment before the physics step: water entry,
    /// climb intent and auto-detection, climb-down availability and landing
    /// while flying
    pub fn update_state_before_movement(&mut self, dt: f32) {
        if self.state.velocity.z < 0.0 {
            self.state.is_jumping_out_of_water = false;
        }

        if self.state.mode.is_swimming() && self.water_info().is_some() {
            let on_surface_depth = self.settings.swimming.swim_on_surface_depth;
            self.state.is_swim_on_surface = self
                .immersion()
                .is_some_and(|immersion| immersion <= on_surface_depth);
        } else {
            self.state.is_swim_on_surface = false;
            if self.is_in_water() && !self.state.is_jumping_out_of_water && !self.state.mode.is_climbing() {
                self.set_movement_mode(MovementMode::Swimming);
            }
        }

        if self.state.wants_to_climb {
            self.set_movement_mode(MovementMode::Custom(CustomMode::FreeClimb));
        }

        let location = self.location();
        let forward = self.capsule.forward();
        if self.state.mode.is_climbing() {
            if self.state.swim_to_climb && (self.water_info().is_none() || self.state.acceleration.z < 0.0) {
                self.state.swim_to_climb = false;
            }
            self.state.wall_hits = self.sweep_wall_hits(location, forward);
        } else if self.state.acceleration.length() > 1.0
            && !self.state.is_crouched
            && self.state.mode.is_moving_on_ground()
        {
            let reach = self.settings.capsule.stand_radius * 5.0;
            if self.eye_height_trace(reach, location, self.capsule.up(), forward) {
                let check = self.can_start_climbing(location, forward);
                self.start_climbing_timer(check.acceleration_degrees, dt, check.can_climb);
            }
        }

        self.state.climb_down_target = self.check_climb_down_ledge();
        self.state.can_climb_down_ledge = self.state.climb_down_target.is_some();

        if self.state.mode.is_flying()
            && self.state.velocity.z < 0.0
            && self.settings.flying.should_check_land
        {
            let location = self.location();
            let floor = self.find_floor(location, false);
            if self.is_valid_landing_spot(location, &floor.hit) {
                self.set_movement_mode(MovementMode::Falling);
            }
        }
    }

    /// Shrink to the crouched height keeping the base where it is
    pub fn crouch(&mut self) {
        let crouched = self
            .settings
            .capsule
            .crouched_half_height
            .max(self.capsule.radius);
        if self.capsule.half_height == crouched {
            self.state.is_crouched = true;
            self.hooks.on_start_crouch(0.0);
            return;
        }

        let old_half_height = self.capsule.half_height;
        let radius = self.capsule.radius;
        self.capsule.set_size(radius, crouched, false);
        if crouched > old_half_height {
            let probe = self.capsule.shape();
            let lowered = self.location() - Vec3::Z * (crouched - old_half_height);
            let encroached = self.world.overlap_blocking(
                &probe,
                self.rotation(),
                lowered,
                traverse_physics::CollisionChannel::Pawn,
                self.params,
            );
            if encroached {
                self.capsule.set_size(radius, old_half_height, false);
                return;
            }
        }

        self.move_component(Vec3::NEG_Z * (old_half_height - crouched));
        self.state.is_crouched = true;
        self.state.force_next_floor_check = true;
        let adjust = self.settings.capsule.stand_half_height - crouched;
        self.hooks.on_start_crouch(adjust);
    }

    /// Grow back to standing height if there is room above
    pub fn uncrouch(&mut self) {
        let stand_half_height = self.settings.capsule.stand_half_height;
        let stand_radius = self.settings.capsule.stand_radius;
        let old_half_height = self.capsule.half_height;
        if old_half_height == stand_half_height {
            self.state.is_crouched = false;
            self.hooks.on_end_crouch(0.0);
            return;
        }

        let adjust = stand_half_height - old_half_height;
        let raised = self.location() + Vec3::Z * adjust;
        let standing = traverse_physics::CollisionShape::capsule(stand_radius, stand_half_height);
        let encroached = self.world.overlap_blocking(
            &standing,
            self.rotation(),
            raised,
            traverse_physics::CollisionChannel::Pawn,
            self.params,
        );
        if encroached {
            return;
        }

        self.capsule.set_size(stand_radius, stand_half_height, true);
        self.state.is_crouched = false;
        self.state.force_next_floor_check = true;
        self.hooks.on_end_crouch(adjust);
    }
}
