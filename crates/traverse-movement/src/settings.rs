//! Movement tuning values
//!
//! Every section deserializes with `#[serde(default)]`, so a settings file
//! only needs to name the values it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MovementError, Result};

/// One key of a piecewise-linear curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    pub time: f32,
    pub value: f32,
}

/// Piecewise-linear float curve, keys sorted by time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashCurve {
    pub keys: Vec<CurveKey>,
}

impl DashCurve {
    pub fn new(mut keys: Vec<CurveKey>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    /// Sample the curve, holding the end values outside its range
    pub fn value_at(&self, time: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return 0.0;
        };
        if time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }
        for w in self.keys.windows(2) {
            let (a, b) = (w[0], w[1]);
            if time <= b.time {
                let span = b.time - a.time;
                if span <= f32::EPSILON {
                    return b.value;
                }
                return a.value + (b.value - a.value) * (time - a.time) / span;
            }
        }
        last.value
    }

    /// First and last key times
    pub fn time_range(&self) -> (f32, f32) {
        match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first.time, last.time),
            _ => (0.0, 0.0),
        }
    }
}

impl Default for DashCurve {
    fn default() -> Self {
        Self::new(vec![
            CurveKey { time: 0.0, value: 0.0 },
            CurveKey { time: 0.15, value: 450.0 },
            CurveKey { time: 0.4, value: 0.0 },
        ])
    }
}

/// Values shared by every mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Gravity along Z in cm/s²
    pub gravity_z: f32,
    pub max_acceleration: f32,
    /// Multiplier on friction while braking
    pub braking_friction_factor: f32,
    /// Use `braking_friction` instead of the mode's friction while braking
    pub use_separate_braking_friction: bool,
    pub braking_friction: f32,
    pub braking_deceleration_falling: f32,
    pub braking_deceleration_swimming: f32,
    /// Fraction of lateral control while falling
    pub air_control: f32,
    pub air_control_boost_multiplier: f32,
    /// Below this lateral speed the air control boost applies
    pub air_control_boost_velocity_threshold: f32,
    pub falling_lateral_friction: f32,
    /// Sub-steps allowed per tick
    pub max_simulation_iterations: u32,
    /// Longest sub-step in seconds
    pub max_simulation_time_step: f32,
    /// Largest correction applied when resolving penetration
    pub max_depenetration: f32,
    pub terminal_velocity: f32,
    pub buoyancy: f32,
    pub mass: f32,
    /// Eye height above the capsule center
    pub base_eye_height: f32,
    /// Mode changes allowed within one tick before the rest is dropped
    pub max_mode_hops: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            gravity_z: -980.0,
            max_acceleration: 2048.0,
            braking_friction_factor: 2.0,
            use_separate_braking_friction: false,
            braking_friction: 0.0,
            braking_deceleration_falling: 0.0,
            braking_deceleration_swimming: 0.0,
            air_control: 0.35,
            air_control_boost_multiplier: 2.0,
            air_control_boost_velocity_threshold: 25.0,
            falling_lateral_friction: 0.0,
            max_simulation_iterations: 8,
            max_simulation_time_step: 0.05,
            max_depenetration: 100.0,
            terminal_velocity: 4000.0,
            buoyancy: 1.0,
            mass: 100.0,
            base_eye_height: 64.0,
            max_mode_hops: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkingSettings {
    pub max_walk_speed: f32,
    pub max_walk_speed_crouched: f32,
    pub max_sprint_speed: f32,
    pub ground_friction: f32,
    pub braking_deceleration_walking: f32,
    pub max_step_height: f32,
    /// Steepest floor angle, in degrees, that counts as walkable
    pub walkable_floor_angle: f32,
    pub perch_radius_threshold: f32,
    pub perch_additional_height: f32,
    pub ledge_check_threshold: f32,
    pub can_walk_off_ledges: bool,
    pub can_walk_off_ledges_when_crouching: bool,
    pub maintain_horizontal_ground_velocity: bool,
    /// Sweep for the floor every step instead of reusing a static base
    pub always_check_floor: bool,
    pub jump_z_velocity: f32,
    /// Speed added or removed per unit of slope
    pub slope_base_speed: f32,
    pub slope_upward_alpha: f32,
    pub slope_downward_alpha: f32,
}

impl Default for WalkingSettings {
    fn default() -> Self {
        Self {
            max_walk_speed: 375.0,
            max_walk_speed_crouched: 150.0,
            max_sprint_speed: 650.0,
            ground_friction: 8.0,
            braking_deceleration_walking: 2048.0,
            max_step_height: 45.0,
            walkable_floor_angle: 45.0,
            perch_radius_threshold: 20.0,
            perch_additional_height: 40.0,
            ledge_check_threshold: 4.0,
            can_walk_off_ledges: true,
            can_walk_off_ledges_when_crouching: false,
            maintain_horizontal_ground_velocity: true,
            always_check_floor: true,
            jump_z_velocity: 420.0,
            slope_base_speed: 200.0,
            slope_upward_alpha: 1.0,
            slope_downward_alpha: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimbingSettings {
    /// Dash speed over time
    pub dash_curve: DashCurve,
    /// Seconds the climb predicate must hold before auto-climbing
    pub try_enter_climb_duration: f32,
    pub min_vertical_degrees_to_start_climbing: f32,
    /// Margin below the walkable angle at which climbing hands over to walking
    pub stop_climbing_walkable_angle_threshold: f32,
    pub min_horizontal_degrees_to_start_climbing: f32,
    pub max_climbing_speed: f32,
    pub max_climbing_acceleration: f32,
    pub braking_deceleration_climbing: f32,
    pub climbing_rotation_speed: f32,
    pub climbing_snap_speed: f32,
    pub floor_check_distance: f32,
    pub distance_from_surface: f32,
    pub eye_height_offset: f32,
    pub climb_up_ledge_eye_height: f32,
    /// Half height removed from the capsule while climbing
    pub collision_capsule_shrink: f32,
    pub slope_speed_multiplier: f32,
}

impl Default for ClimbingSettings {
    fn default() -> Self {
        Self {
            dash_curve: DashCurve::default(),
            try_enter_climb_duration: 0.4,
            min_vertical_degrees_to_start_climbing: 45.0,
            stop_climbing_walkable_angle_threshold: 10.0,
            min_horizontal_degrees_to_start_climbing: 50.0,
            max_climbing_speed: 120.0,
            max_climbing_acceleration: 380.0,
            braking_deceleration_climbing: 550.0,
            climbing_rotation_speed: 6.0,
            climbing_snap_speed: 4.0,
            floor_check_distance: 100.0,
            distance_from_surface: 5.0,
            eye_height_offset: 0.0,
            climb_up_ledge_eye_height: 20.0,
            collision_capsule_shrink: 30.0,
            slope_speed_multiplier: 80.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlidingSettings {
    pub min_slide_speed: f32,
    pub max_slide_speed: f32,
    pub slide_enter_impulse: f32,
    pub slide_gravity_force: f32,
    pub slide_friction_factor: f32,
    pub braking_deceleration_sliding: f32,
    pub max_slide_acceleration: f32,
    /// Scale on lateral input while sliding
    pub slide_rotation_multiplier: f32,
}

impl Default for SlidingSettings {
    fn default() -> Self {
        Self {
            min_slide_speed: 400.0,
            max_slide_speed: 250.0,
            slide_enter_impulse: 400.0,
            slide_gravity_force: 3200.0,
            slide_friction_factor: 0.06,
            braking_deceleration_sliding: 1000.0,
            max_slide_acceleration: 300.0,
            slide_rotation_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwimmingSettings {
    pub run_speed: f32,
    pub sprint_speed: f32,
    pub can_jump_out_of_water: bool,
    /// Upward speed added when leaving the water
    pub out_water_speed: f32,
    /// Immersion, measured from the capsule bottom, that starts swimming
    pub begin_swim_depth: f32,
    pub swim_capsule_radius: f32,
    pub swim_capsule_half_height: f32,
    /// Immersion at or below which the swimmer counts as on the surface
    pub swim_on_surface_depth: f32,
    pub fluid_friction: f32,
    /// Speed cap on the velocity carried into the water
    pub terminal_velocity: f32,
    /// Scale on the water body's flow
    pub water_velocity_force_multiplier: f32,
}

impl Default for SwimmingSettings {
    fn default() -> Self {
        Self {
            run_speed: 300.0,
            sprint_speed: 500.0,
            can_jump_out_of_water: true,
            out_water_speed: 550.0,
            begin_swim_depth: 75.0,
            swim_capsule_radius: 30.0,
            swim_capsule_half_height: 90.0,
            swim_on_surface_depth: 200.0,
            fluid_friction: 5.0,
            terminal_velocity: 4000.0,
            water_velocity_force_multiplier: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlidingSettings {
    pub max_glide_down_speed: f32,
    pub interp_to_target_glide_speed: f32,
    pub gliding_lateral_friction: f32,
    pub gliding_air_control: f32,
    pub braking_deceleration_gliding: f32,
    pub max_glide_acceleration: f32,
    pub max_glide_speed: f32,
    /// Clearance below the character required to start gliding
    pub can_start_glide_height: f32,
    pub glide_rotation_interp_speed: f32,
    /// A valid landing spot within this distance ends the glide
    pub glide_to_fall_check_height: f32,
}

impl Default for GlidingSettings {
    fn default() -> Self {
        Self {
            max_glide_down_speed: 120.0,
            interp_to_target_glide_speed: 150.0,
            gliding_lateral_friction: 1.0,
            gliding_air_control: 0.7,
            braking_deceleration_gliding: 600.0,
            max_glide_acceleration: 600.0,
            max_glide_speed: 450.0,
            can_start_glide_height: 250.0,
            glide_rotation_interp_speed: 0.5,
            glide_to_fall_check_height: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlyingSettings {
    pub max_fly_speed: f32,
    pub braking_deceleration_flying: f32,
    pub fly_faster_max_speed: f32,
    /// Drag applied while flying
    pub fluid_friction: f32,
    /// Drop to falling when descending onto a valid landing spot
    pub should_check_land: bool,
}

impl Default for FlyingSettings {
    fn default() -> Self {
        Self {
            max_fly_speed: 300.0,
            braking_deceleration_flying: 1.0,
            fly_faster_max_speed: 600.0,
            fluid_friction: 0.3,
            should_check_land: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwingSettings {
    /// Speed along the rope per unit of vertical input
    pub move_up_down_speed: f32,
    /// How far from the capsule center a rope can be grabbed
    pub grab_reach: f32,
}

impl Default for SwingSettings {
    fn default() -> Self {
        Self {
            move_up_down_speed: 50.0,
            grab_reach: 45.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsuleSettings {
    pub stand_radius: f32,
    pub stand_half_height: f32,
    pub crouched_half_height: f32,
}

impl Default for CapsuleSettings {
    fn default() -> Self {
        Self {
            stand_radius: 30.0,
            stand_half_height: 75.0,
            crouched_half_height: 60.0,
        }
    }
}

/// Complete movement configuration for one character
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementSettings {
    pub engine: EngineSettings,
    pub walking: WalkingSettings,
    pub climbing: ClimbingSettings,
    pub sliding: SlidingSettings,
    pub swimming: SwimmingSettings,
    pub gliding: GlidingSettings,
    pub flying: FlyingSettings,
    pub swing: SwingSettings,
    pub capsule: CapsuleSettings,
}

impl MovementSettings {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: Self = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and validate settings from a TOML file
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source =
            std::fs::read_to_string(path).map_err(|e| MovementError::Io(path.to_path_buf(), e))?;
        let settings = Self::from_toml_str(&source)?;
        info!("Loaded movement settings from {}", path.display());
        Ok(settings)
    }

    /// Load settings from a TOML file, falling back to defaults
    pub fn load(path: impl AsRef<Path>) -> Self {
        match Self::try_load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load movement settings, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let speeds = [
            ("walking.max_walk_speed", self.walking.max_walk_speed),
            ("walking.max_walk_speed_crouched", self.walking.max_walk_speed_crouched),
            ("walking.max_sprint_speed", self.walking.max_sprint_speed),
            ("climbing.max_climbing_speed", self.climbing.max_climbing_speed),
            ("sliding.min_slide_speed", self.sliding.min_slide_speed),
            ("sliding.max_slide_speed", self.sliding.max_slide_speed),
            ("swimming.run_speed", self.swimming.run_speed),
            ("swimming.sprint_speed", self.swimming.sprint_speed),
            ("gliding.max_glide_speed", self.gliding.max_glide_speed),
            ("gliding.max_glide_down_speed", self.gliding.max_glide_down_speed),
            ("flying.max_fly_speed", self.flying.max_fly_speed),
            ("swing.move_up_down_speed", self.swing.move_up_down_speed),
            ("engine.max_acceleration", self.engine.max_acceleration),
            ("engine.terminal_velocity", self.engine.terminal_velocity),
        ];
        if let Some((name, value)) = speeds.iter().find(|(_, v)| *v < 0.0 || !v.is_finite()) {
            return Err(MovementError::InvalidSettings(format!(
                "{name} must be a non-negative number, got {value}"
            )));
        }

        if self.engine.max_simulation_iterations == 0 || self.engine.max_mode_hops == 0 {
            return Err(MovementError::InvalidSettings(
                "iteration caps must be at least 1".into(),
            ));
        }
        if self.engine.max_simulation_time_step <= 0.0 {
            return Err(MovementError::InvalidSettings(
                "engine.max_simulation_time_step must be positive".into(),
            ));
        }

        let angles = [
            ("walking.walkable_floor_angle", self.walking.walkable_floor_angle),
            (
                "climbing.min_vertical_degrees_to_start_climbing",
                self.climbing.min_vertical_degrees_to_start_climbing,
            ),
            (
                "climbing.min_horizontal_degrees_to_start_climbing",
                self.climbing.min_horizontal_degrees_to_start_climbing,
            ),
        ];
        if let Some((name, value)) = angles.iter().find(|(_, a)| *a <= 0.0 || *a > 90.0) {
            return Err(MovementError::InvalidSettings(format!(
                "{name} must be in (0, 90] degrees, got {value}"
            )));
        }

        let capsule = &self.capsule;
        if capsule.stand_radius <= 0.0
            || capsule.stand_half_height <= 0.0
            || capsule.crouched_half_height <= 0.0
            || self.swimming.swim_capsule_radius <= 0.0
            || self.swimming.swim_capsule_half_height <= 0.0
        {
            return Err(MovementError::InvalidSettings(
                "capsule sizes must be positive".into(),
            ));
        }
        if capsule.stand_half_height - self.climbing.collision_capsule_shrink < capsule.stand_radius {
            return Err(MovementError::InvalidSettings(
                "climbing.collision_capsule_shrink leaves a capsule shorter than its radius".into(),
            ));
        }

        Ok(())
    }

    /// Minimum floor normal Z that counts as walkable
    pub fn walkable_floor_z(&self) -> f32 {
        self.walking.walkable_floor_angle.to_radians().cos()
    }

    /// Half height used while climbing
    pub fn climbing_half_height(&self) -> f32 {
        self.capsule.stand_half_height - self.climbing.collision_capsule_shrink
    }
}
