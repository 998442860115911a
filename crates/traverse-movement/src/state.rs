//! Per-character movement state mutated by the integrators

use std::sync::Weak;

use glam::{Quat, Vec3};
use parking_lot::Mutex;
use traverse_core::EntityId;
use traverse_physics::{HitResult, SwingRope};

use crate::mode::MovementMode;

/// Outcome of a downward floor probe
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FloorResult {
    pub blocking_hit: bool,
    pub walkable_floor: bool,
    /// Whether the result came from the fallback line trace
    pub line_trace: bool,
    /// Distance from the capsule bottom to the floor, from the sweep
    pub floor_dist: f32,
    /// Distance from the capsule bottom to the floor, from the line trace
    pub line_dist: f32,
    pub hit: HitResult,
}

impl FloorResult {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_walkable_floor(&self) -> bool {
        self.blocking_hit && self.walkable_floor
    }

    pub fn set_from_sweep(&mut self, hit: HitResult, sweep_floor_dist: f32, walkable: bool) {
        self.blocking_hit = hit.is_valid_blocking_hit();
        self.walkable_floor = walkable;
        self.line_trace = false;
        self.floor_dist = sweep_floor_dist;
        self.line_dist = 0.0;
        self.hit = hit;
    }

    /// Take the normal and actor from a line trace while keeping the
    /// sweep's impact location
    pub fn set_from_line_trace(
        &mut self,
        hit: HitResult,
        sweep_floor_dist: f32,
        line_dist: f32,
        walkable: bool,
    ) {
        if !(self.blocking_hit && hit.blocking_hit) {
            return;
        }
        let old = self.hit;
        self.hit = HitResult {
            time: old.time,
            impact_point: old.impact_point,
            location: old.location,
            trace_start: old.trace_start,
            trace_end: old.trace_end,
            ..hit
        };
        self.line_trace = true;
        self.floor_dist = sweep_floor_dist;
        self.line_dist = line_dist;
        self.walkable_floor = walkable;
    }

    /// Distance to the floor, preferring the line trace when it was used
    pub fn distance_to_floor(&self) -> f32 {
        if self.line_trace {
            self.line_dist
        } else {
            self.floor_dist
        }
    }
}

/// Wall samples around the capsule used by climbing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WallHits {
    /// Up, forward and down probes, in that order
    pub hits: Vec<HitResult>,
    /// Probe along the current velocity or input
    pub velocity_hit: HitResult,
    /// Both the up and forward probes blocked
    pub all_collided: bool,
}

impl WallHits {
    pub fn clear(&mut self) {
        self.hits.clear();
        self.velocity_hit = HitResult::default();
        self.all_collided = false;
    }
}

/// Where a committed climb-down-ledge descends to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimbDownTarget {
    /// Point out over the ledge the character first moves to
    pub forward: Vec3,
    /// Point below the ledge lip, against the wall
    pub down: Vec3,
    /// Facing toward the wall
    pub face_to: Quat,
}

/// Everything the movement component mutates during a tick
#[derive(Debug, Clone, Default)]
pub struct MovementState {
    pub mode: MovementMode,
    pub velocity: Vec3,
    /// Input acceleration for this tick
    pub acceleration: Vec3,
    pub current_floor: FloorResult,
    pub wall_hits: WallHits,
    pub climbing_normal: Vec3,
    pub climbing_position: Vec3,

    pub wants_to_climb: bool,
    pub wants_to_jump_out_of_water: bool,
    pub wants_to_crouch: bool,
    pub is_crouched: bool,
    pub pressed_jump: bool,
    pub sprinting: bool,

    pub is_swim_on_surface: bool,
    pub is_jumping_out_of_water: bool,
    /// Climbing began from the water
    pub swim_to_climb: bool,

    pub try_enter_climb_time: f32,
    pub try_enter_climb_alpha: f32,
    pub is_climb_dashing: bool,
    pub current_climb_dash_time: f32,
    pub climb_dash_direction: Vec3,
    pub can_climb_down_ledge: bool,
    pub climb_down_target: Option<ClimbDownTarget>,

    /// Rope being ridden; the rope owns its own lifetime
    pub swing_rope: Option<Weak<Mutex<SwingRope>>>,
    pub on_rope_distance: f32,

    /// Depenetration found by the last floor sweep, not yet applied
    pub pending_penetration_adjustment: Vec3,
    /// Walking velocity before it was rebuilt from the move, which may
    /// include a penetration correction
    pub pre_penetration_velocity: Option<Vec3>,

    /// Actor currently stood on
    pub base: Option<EntityId>,
    pub force_next_floor_check: bool,
    /// The last position change was not travel and must not become velocity
    pub just_teleported: bool,
    /// Input magnitude relative to the max acceleration, in [0, 1]
    pub analog_input_modifier: f32,
    /// Blocking hits reported during the tick, drained by the character
    pub pending_impacts: Vec<HitResult>,
}

impl MovementState {
    pub fn new(mode: MovementMode) -> Self {
        Self {
            mode,
            force_next_floor_check: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocking_hit(normal: Vec3) -> HitResult {
        HitResult {
            blocking_hit: true,
            time: 0.5,
            impact_normal: normal,
            normal,
            impact_point: Vec3::new(1.0, 2.0, 3.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_floor_line_trace_keeps_sweep_location() {
        let mut floor = FloorResult::default();
        floor.set_from_sweep(blocking_hit(Vec3::X), 2.0, false);
        assert!(floor.blocking_hit);
        assert!(!floor.is_walkable_floor());

        let mut line = blocking_hit(Vec3::Z);
        line.impact_point = Vec3::ZERO;
        line.time = 0.9;
        floor.set_from_line_trace(line, 2.0, 2.2, true);
        assert!(floor.line_trace);
        assert!(floor.is_walkable_floor());
        assert_eq!(floor.hit.impact_normal, Vec3::Z);
        assert_eq!(floor.hit.impact_point, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(floor.hit.time, 0.5);
        assert_eq!(floor.distance_to_floor(), 2.2);
    }

    #[test]
    fn test_line_trace_ignored_without_sweep_hit() {
        let mut floor = FloorResult::default();
        floor.set_from_line_trace(blocking_hit(Vec3::Z), 0.0, 1.0, true);
        assert!(!floor.line_trace);
        assert!(!floor.is_walkable_floor());
    }
}
