//! Borrowed view of one character's movement for the duration of a tick
//!
//! Integrators are methods on [`MoveContext`], spread across the modules
//! that own each concern. The context never outlives the tick; the world,
//! water and settings are shared, while the capsule and state are borrowed
//! mutably from the component.

use glam::{Quat, Vec3};
use traverse_core::math::{safe_normal_2d, KINDA_SMALL_NUMBER};
use traverse_core::EntityId;
use traverse_physics::{
    CapsuleComponent, CollisionQuery, HitResult, QueryParams, WaterInfo, WaterQuery,
};

use crate::hooks::CharacterHooks;
use crate::mode::MovementMode;
use crate::settings::MovementSettings;
use crate::state::MovementState;

/// Shortest sub-step the integrators will simulate
pub const MIN_TICK_TIME: f32 = 1.0e-6;
/// Floor distance the walking integrator keeps the capsule within
pub const MIN_FLOOR_DIST: f32 = 1.9;
pub const MAX_FLOOR_DIST: f32 = 2.4;
/// Hits closer than this to the capsule's rim are treated as walls
pub const SWEEP_EDGE_REJECT_DISTANCE: f32 = 0.15;
pub const BRAKE_TO_STOP_VELOCITY: f32 = 10.0;
/// Normals with less Z than this are vertical walls
pub const VERTICAL_SLOPE_NORMAL_Z: f32 = 0.001;
/// Largest Z of a step's side normal that still counts as a side
pub const MAX_STEP_SIDE_Z: f32 = 0.08;

pub struct MoveContext<'a> {
    pub world: &'a dyn CollisionQuery,
    pub water: &'a dyn WaterQuery,
    pub settings: &'a MovementSettings,
    pub capsule: &'a mut CapsuleComponent,
    pub state: &'a mut MovementState,
    pub hooks: &'a mut dyn CharacterHooks,
    /// Query filter that ignores the owner
    pub params: &'a QueryParams,
    pub owner: EntityId,
}

impl MoveContext<'_> {
    pub fn location(&self) -> Vec3 {
        self.capsule.location()
    }

    pub fn rotation(&self) -> Quat {
        self.capsule.rotation()
    }

    pub fn mode(&self) -> MovementMode {
        self.state.mode
    }

    pub fn gravity_z(&self) -> f32 {
        self.settings.engine.gravity_z
    }

    pub fn is_walkable(&self, hit: &HitResult) -> bool {
        if !hit.is_valid_blocking_hit() {
            return false;
        }
        // Vertical surfaces are never walkable
        if hit.impact_normal.z < KINDA_SMALL_NUMBER {
            return false;
        }
        hit.impact_normal.z >= self.settings.walkable_floor_z()
    }

    pub fn can_walk_off_ledges(&self) -> bool {
        let walking = &self.settings.walking;
        if !walking.can_walk_off_ledges_when_crouching && self.state.is_crouched {
            return false;
        }
        walking.can_walk_off_ledges
    }

    /// Split the remaining time so no sub-step exceeds the configured maximum
    pub fn simulation_time_step(&self, remaining: f32, iterations: u32) -> f32 {
        let engine = &self.settings.engine;
        let mut remaining = remaining;
        if remaining > engine.max_simulation_time_step
            && iterations < engine.max_simulation_iterations
        {
            remaining = engine.max_simulation_time_step.min(remaining * 0.5);
        }
        remaining.max(MIN_TICK_TIME)
    }

    pub fn max_speed(&self) -> f32 {
        let s = self.settings;
        match self.state.mode {
            MovementMode::Custom(crate::mode::CustomMode::FreeClimb) => {
                let slope = self.state.climbing_normal.dot(Vec3::Z);
                s.climbing.max_climbing_speed + slope * s.climbing.slope_speed_multiplier
            }
            MovementMode::Custom(crate::mode::CustomMode::Slide) => s.sliding.max_slide_speed,
            MovementMode::Swimming => {
                if self.state.sprinting {
                    s.swimming.sprint_speed
                } else {
                    s.swimming.run_speed
                }
            }
            MovementMode::Walking => {
                if self.state.is_crouched {
                    s.walking.max_walk_speed_crouched
                } else if self.state.sprinting {
                    s.walking.max_sprint_speed + self.slope_speed_adjustment()
                } else {
                    s.walking.max_walk_speed + self.slope_speed_adjustment()
                }
            }
            MovementMode::Flying => {
                if self.state.sprinting {
                    s.flying.fly_faster_max_speed
                } else {
                    s.flying.max_fly_speed
                }
            }
            MovementMode::Custom(crate::mode::CustomMode::Gliding) => s
                .gliding
                .max_glide_speed
                .max(self.state.velocity.truncate().length()),
            _ => s.walking.max_walk_speed,
        }
    }

    /// Walk speed gained or lost from the slope just ahead of the input
    fn slope_speed_adjustment(&self) -> f32 {
        let walking = &self.settings.walking;
        let input_dir = safe_normal_2d(self.state.acceleration);
        let floor = self.find_floor_at(self.location() + input_dir, true);
        if !floor.blocking_hit {
            return 0.0;
        }
        let normal = floor.hit.impact_normal;
        let slope_dot = normal.dot(safe_normal_2d(normal));
        let face_slope = input_dir.dot(safe_normal_2d(normal));
        let alpha = if face_slope > 0.0 {
            walking.slope_downward_alpha
        } else {
            walking.slope_upward_alpha
        };
        alpha * slope_dot * walking.slope_base_speed * face_slope
    }

    pub fn max_acceleration(&self) -> f32 {
        let s = self.settings;
        match self.state.mode {
            m if m.is_climbing() => s.climbing.max_climbing_acceleration,
            m if m.is_sliding() => s.sliding.max_slide_acceleration,
            m if m.is_gliding() => s.gliding.max_glide_acceleration,
            _ => s.engine.max_acceleration,
        }
    }

    pub fn max_braking_deceleration(&self) -> f32 {
        let s = self.settings;
        match self.state.mode {
            MovementMode::Walking => s.walking.braking_deceleration_walking,
            MovementMode::Falling => s.engine.braking_deceleration_falling,
            MovementMode::Swimming => s.engine.braking_deceleration_swimming,
            MovementMode::Flying => s.flying.braking_deceleration_flying,
            m if m.is_sliding() => s.sliding.braking_deceleration_sliding,
            m if m.is_climbing() => s.climbing.braking_deceleration_climbing,
            m if m.is_gliding() => s.gliding.braking_deceleration_gliding,
            _ => 0.0,
        }
    }

    pub fn water_info(&self) -> Option<WaterInfo> {
        self.water
            .water_info(self.location(), self.capsule.half_height)
    }

    /// Depth of the water surface above the capsule's standing bottom
    pub fn immersion(&self) -> Option<f32> {
        let stand_half_height = self.settings.capsule.stand_half_height;
        self.water_info().map(|info| {
            info.surface_location.z - (self.location().z - stand_half_height)
        })
    }

    /// Fraction of the standing capsule under water, in [0, 1]
    pub fn immersion_depth(&self) -> f32 {
        let height = 2.0 * self.settings.capsule.stand_half_height;
        self.immersion()
            .map(|immersion| (immersion / height).clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }

    /// Deep enough to swim, or with the center below the surface
    pub fn is_in_water(&self) -> bool {
        let Some(info) = self.water_info() else {
            return false;
        };
        let immersion = info.surface_location.z
            - (self.location().z - self.settings.capsule.stand_half_height);
        immersion >= self.settings.swimming.begin_swim_depth
            || self.location().z < info.surface_location.z
    }

    /// Record a blocking hit for the character to react to after the tick
    pub fn handle_impact(&mut self, hit: &HitResult) {
        if hit.blocking_hit {
            self.state.pending_impacts.push(*hit);
        }
    }

    /// Reset the capsule to its standing or crouched size
    pub fn reset_capsule_size(&mut self) {
        let capsule = &self.settings.capsule;
        let half_height = if self.state.is_crouched {
            capsule.crouched_half_height
        } else {
            capsule.stand_half_height
        };
        self.capsule
            .set_size(capsule.stand_radius, half_height, false);
    }
}
