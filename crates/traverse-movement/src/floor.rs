//! Floor finding with penetration bookkeeping
//!
//! The downward capsule sweep shrinks the capsule so starting on a surface
//! does not register as a hit, rejects contacts on the capsule rim, falls back
//! to a line trace, and finally tries to "perch" on ledges narrower than the
//! capsule. Any depenetration the sweep discovers is cached on the state and
//! applied once by the walking integrator after the floor has been consumed.

use glam::Vec3;
use tracing::warn;
use traverse_core::math::KINDA_SMALL_NUMBER;
use traverse_physics::{CollisionChannel, CollisionShape, HitResult};

use crate::context::{MoveContext, MAX_FLOOR_DIST, MIN_FLOOR_DIST, SWEEP_EDGE_REJECT_DISTANCE};
use crate::state::FloorResult;

/// A floor result together with the side effects the query wants to apply
#[derive(Debug, Clone, Copy, Default)]
struct FloorProbe {
    floor: FloorResult,
    /// Depenetration discovered by a sweep that started inside geometry
    penetration: Option<Vec3>,
    /// Whether a fresh sweep ran, consuming a forced floor check
    swept: bool,
}

impl MoveContext<'_> {
    /// Find the floor below `location`, caching any penetration the sweep
    /// discovers for [`Self::apply_pending_penetration_adjustment`]
    pub fn find_floor(&mut self, location: Vec3, can_use_cached: bool) -> FloorResult {
        let probe = self.probe_floor(location, can_use_cached, None);
        if let Some(adjustment) = probe.penetration {
            self.state.pending_penetration_adjustment = adjustment;
        }
        if probe.swept {
            self.state.force_next_floor_check = false;
        }
        probe.floor
    }

    /// Find the floor below `location` without touching movement state
    pub fn find_floor_at(&self, location: Vec3, can_use_cached: bool) -> FloorResult {
        self.probe_floor(location, can_use_cached, None).floor
    }

    /// Find the floor reusing a downward sweep that already hit it
    pub fn find_floor_from_sweep(&self, location: Vec3, downward: &HitResult) -> FloorResult {
        self.probe_floor(location, false, Some(downward)).floor
    }

    fn probe_floor(
        &self,
        location: Vec3,
        can_use_cached: bool,
        downward: Option<&HitResult>,
    ) -> FloorProbe {
        let walking = &self.settings.walking;
        let mut probe = FloorProbe::default();

        // Look slightly further while grounded so the height adjustment
        // cannot invalidate the floor it just used
        let height_check_adjust = if self.state.mode.is_moving_on_ground() {
            MAX_FLOOR_DIST + KINDA_SMALL_NUMBER
        } else {
            -MAX_FLOOR_DIST
        };
        let sweep_dist = MAX_FLOOR_DIST.max(walking.max_step_height + height_check_adjust);
        let line_dist = sweep_dist;

        let use_cached = can_use_cached
            && !walking.always_check_floor
            && !self.state.force_next_floor_check
            && !self.state.just_teleported
            && self
                .state
                .base
                .is_some_and(|base| !self.world.is_dynamic(base));
        if use_cached {
            probe.floor = self.state.current_floor;
            return probe;
        }

        probe.swept = true;
        self.compute_floor_dist(
            location,
            line_dist,
            sweep_dist,
            self.capsule.radius,
            downward,
            &mut probe,
        );

        if probe.floor.blocking_hit
            && !probe.floor.line_trace
            && self.should_compute_perch_result(&probe.floor.hit, true)
        {
            let mut max_perch_floor_dist = MAX_FLOOR_DIST.max(walking.max_step_height + height_check_adjust);
            if self.state.mode.is_moving_on_ground() {
                max_perch_floor_dist += walking.perch_additional_height.max(0.0);
            }

            let hit = probe.floor.hit;
            match self.compute_perch_result(self.valid_perch_radius(), &hit, max_perch_floor_dist, &mut probe.penetration) {
                Some(perch) => {
                    // Keep the height adjustment from lifting us past the perch
                    let avg_floor_dist = (MIN_FLOOR_DIST + MAX_FLOOR_DIST) * 0.5;
                    let move_up_dist = avg_floor_dist - probe.floor.floor_dist;
                    if move_up_dist + perch.floor_dist >= max_perch_floor_dist {
                        probe.floor.floor_dist = avg_floor_dist;
                    }

                    if !probe.floor.walkable_floor {
                        let floor_dist = probe.floor.floor_dist;
                        probe.floor.set_from_line_trace(
                            perch.hit,
                            floor_dist,
                            floor_dist.max(MIN_FLOOR_DIST),
                            true,
                        );
                    }
                }
                None => probe.floor.walkable_floor = false,
            }
        }

        probe
    }

    /// Sweep and trace down from `location` to classify the floor
    fn compute_floor_dist(
        &self,
        location: Vec3,
        line_distance: f32,
        sweep_distance: f32,
        sweep_radius: f32,
        downward: Option<&HitResult>,
        probe: &mut FloorProbe,
    ) {
        let floor = &mut probe.floor;
        floor.clear();

        let pawn_radius = self.capsule.radius;
        let pawn_half_height = self.capsule.half_height;

        let mut skip_sweep = false;
        if let Some(down) = downward.filter(|hit| hit.is_valid_blocking_hit()) {
            let travel = down.trace_start - down.trace_end;
            let is_downward = travel.z > 0.0;
            let is_vertical = travel.truncate().length_squared() <= KINDA_SMALL_NUMBER;
            if is_downward
                && is_vertical
                && is_within_edge_tolerance(down.location, down.impact_point, pawn_radius)
            {
                skip_sweep = true;
                let walkable = self.is_walkable(down);
                let floor_dist = location.z - down.location.z;
                floor.set_from_sweep(*down, floor_dist, walkable);
                if walkable {
                    return;
                }
            }
        }

        if sweep_distance < line_distance {
            warn!(
                "Floor sweep distance {} is shorter than line distance {}",
                sweep_distance, line_distance
            );
            debug_assert!(sweep_distance >= line_distance);
            return;
        }

        if !skip_sweep && sweep_distance > 0.0 && sweep_radius > 0.0 {
            // A shorter capsule keeps sweeps that start on a surface sane and
            // lets negative distances pull us out of penetration
            const SHRINK_SCALE: f32 = 0.9;
            const SHRINK_SCALE_OVERLAP: f32 = 0.1;
            let mut shrink_height = (pawn_half_height - pawn_radius) * (1.0 - SHRINK_SCALE);
            let mut trace_dist = sweep_distance + shrink_height;
            let mut radius = sweep_radius;
            let mut half_height = pawn_half_height - shrink_height;

            let mut hit = self.floor_sweep(location, trace_dist, radius, half_height);
            if hit.start_penetrating {
                probe.penetration = Some(hit.normal * hit.penetration_depth);
            }

            if hit.blocking_hit {
                if hit.start_penetrating
                    || !is_within_edge_tolerance(location, hit.impact_point, radius)
                {
                    // Narrower and shorter capsule to miss the adjacent wall
                    radius = (radius - SWEEP_EDGE_REJECT_DISTANCE - KINDA_SMALL_NUMBER).max(0.0);
                    if radius > KINDA_SMALL_NUMBER {
                        shrink_height = (pawn_half_height - pawn_radius) * (1.0 - SHRINK_SCALE_OVERLAP);
                        trace_dist = sweep_distance + shrink_height;
                        half_height = (pawn_half_height - shrink_height).max(radius);
                        hit = self.floor_sweep(location, trace_dist, radius, half_height);
                    }
                }

                let max_penetration_adjust = MAX_FLOOR_DIST.max(pawn_radius);
                let sweep_result = (hit.time * trace_dist - shrink_height).max(-max_penetration_adjust);

                floor.set_from_sweep(hit, sweep_result, false);
                if hit.is_valid_blocking_hit()
                    && self.is_walkable(&hit)
                    && sweep_result <= sweep_distance
                {
                    floor.walkable_floor = true;
                    return;
                }
            }
        }

        // A sweep that missed everything makes the shorter line trace
        // pointless, unless the sweep was stuck in penetration
        if !floor.blocking_hit && !floor.hit.start_penetrating {
            floor.floor_dist = sweep_distance;
            return;
        }

        if line_distance > 0.0 {
            let shrink_height = pawn_half_height;
            let trace_dist = line_distance + shrink_height;
            let hit = self.world.line_trace(
                location,
                location - Vec3::Z * trace_dist,
                CollisionChannel::Pawn,
                self.params,
            );

            if hit.blocking_hit && hit.time > 0.0 {
                let max_penetration_adjust = MAX_FLOOR_DIST.max(pawn_radius);
                let line_result = (hit.time * trace_dist - shrink_height).max(-max_penetration_adjust);

                floor.blocking_hit = true;
                if line_result <= line_distance && self.is_walkable(&hit) {
                    let floor_dist = floor.floor_dist;
                    floor.set_from_line_trace(hit, floor_dist, line_result, true);
                    return;
                }
            }
        }

        floor.walkable_floor = false;
    }

    fn floor_sweep(&self, location: Vec3, trace_dist: f32, radius: f32, half_height: f32) -> HitResult {
        self.world.sweep(
            &CollisionShape::capsule(radius, half_height),
            self.rotation(),
            location,
            location - Vec3::Z * trace_dist,
            CollisionChannel::Pawn,
            self.params,
        )
    }

    fn perch_radius_threshold(&self) -> f32 {
        self.settings.walking.perch_radius_threshold.max(0.0)
    }

    /// Radius of the virtual capsule used when perching
    pub fn valid_perch_radius(&self) -> f32 {
        let radius = self.capsule.radius;
        (radius - self.perch_radius_threshold()).clamp(0.11, radius)
    }

    /// Whether a hit outside the perch radius deserves a perch test
    pub fn should_compute_perch_result(&self, hit: &HitResult, check_radius: bool) -> bool {
        if !hit.is_valid_blocking_hit() {
            return false;
        }
        if self.perch_radius_threshold() <= SWEEP_EDGE_REJECT_DISTANCE {
            return false;
        }
        if check_radius {
            let dist_sq = (hit.impact_point - hit.location).truncate().length_squared();
            let standing_radius = self.valid_perch_radius();
            if dist_sq <= standing_radius * standing_radius {
                return false;
            }
        }
        true
    }

    /// Look for a walkable floor under a narrower capsule at the hit location
    ///
    /// Returns the perch floor when it is walkable and within
    /// `max_floor_dist` of the capsule bottom.
    pub fn compute_perch_result(
        &self,
        test_radius: f32,
        hit: &HitResult,
        max_floor_dist: f32,
        penetration: &mut Option<Vec3>,
    ) -> Option<FloorResult> {
        if max_floor_dist <= 0.0 {
            return None;
        }

        let pawn_radius = self.capsule.radius;
        let pawn_half_height = self.capsule.half_height;

        // Sweep further than requested: the narrower capsule can miss what
        // the full radius would touch
        let hit_above_base = (hit.impact_point.z - (hit.location.z - pawn_half_height)).max(0.0);
        let perch_line_dist = (max_floor_dist - hit_above_base).max(0.0);
        let perch_sweep_dist = max_floor_dist.max(0.0);
        let actual_sweep_dist = perch_sweep_dist + pawn_radius;

        let mut perch = FloorProbe::default();
        self.compute_floor_dist(
            hit.location,
            perch_line_dist,
            actual_sweep_dist,
            test_radius,
            None,
            &mut perch,
        );
        if perch.penetration.is_some() {
            *penetration = perch.penetration;
        }

        if !perch.floor.is_walkable_floor() {
            return None;
        }
        if hit_above_base + perch.floor.floor_dist > max_floor_dist {
            return None;
        }
        Some(perch.floor)
    }

    /// Whether a hit could be a floor to land on
    pub fn is_valid_landing_spot(&self, capsule_location: Vec3, hit: &HitResult) -> bool {
        if !hit.is_valid_blocking_hit() {
            return false;
        }

        if !hit.start_penetrating {
            if !self.is_walkable(hit) {
                return false;
            }

            // Hits above the lower hemisphere come from sliding down a wall
            let radius = self.capsule.radius;
            let lower_hemisphere_z = hit.location.z - self.capsule.half_height + radius;
            if hit.impact_point.z >= lower_hemisphere_z {
                return false;
            }
            if !is_within_edge_tolerance(hit.location, hit.impact_point, radius) {
                return false;
            }
        } else if hit.normal.z < KINDA_SMALL_NUMBER {
            // Depenetrating away from a wall or overhang, not onto a floor
            return false;
        }

        self.find_floor_from_sweep(capsule_location, hit)
            .is_walkable_floor()
    }

    /// Whether a hit on the capsule's lower edge might hide a walkable top
    pub fn should_check_for_valid_landing_spot(&self, hit: &HitResult) -> bool {
        hit.normal.z > KINDA_SMALL_NUMBER
            && !hit.normal.abs_diff_eq(hit.impact_normal, KINDA_SMALL_NUMBER)
            && is_within_edge_tolerance(self.location(), hit.impact_point, self.capsule.radius)
    }

    /// Resolve the depenetration cached by the last floor sweep, at most once
    pub fn apply_pending_penetration_adjustment(&mut self) {
        let adjustment = self.state.pending_penetration_adjustment;
        if traverse_core::math::is_nearly_zero(adjustment, KINDA_SMALL_NUMBER) {
            return;
        }
        let floor_hit = self.state.current_floor.hit;
        self.resolve_penetration(adjustment, &floor_hit);
        self.state.pending_penetration_adjustment = Vec3::ZERO;
    }

    /// Keep the capsule between the min and max floor distance
    pub fn adjust_floor_height(&mut self) {
        let floor = self.state.current_floor;
        if !floor.is_walkable_floor() {
            return;
        }

        let mut old_floor_dist = floor.floor_dist;
        if floor.line_trace {
            // Stepping up onto the line trace would climb unwalkable walls
            if old_floor_dist < MIN_FLOOR_DIST && floor.line_dist >= MIN_FLOOR_DIST {
                return;
            }
            old_floor_dist = floor.line_dist;
        }

        if (MIN_FLOOR_DIST..=MAX_FLOOR_DIST).contains(&old_floor_dist) {
            return;
        }

        let initial_z = self.location().z;
        let avg_floor_dist = (MIN_FLOOR_DIST + MAX_FLOOR_DIST) * 0.5;
        let move_dist = avg_floor_dist - old_floor_dist;
        let adjust_hit = self.safe_move(Vec3::Z * move_dist);

        if !adjust_hit.is_valid_blocking_hit() {
            self.state.current_floor.floor_dist += move_dist;
        } else if move_dist > 0.0 {
            self.state.current_floor.floor_dist += self.location().z - initial_z;
        } else {
            let floor_dist = self.location().z - adjust_hit.location.z;
            self.state.current_floor.floor_dist = floor_dist;
            if self.is_walkable(&adjust_hit) {
                self.state
                    .current_floor
                    .set_from_sweep(adjust_hit, floor_dist, true);
            }
        }

        // The height change must not feed back into velocity
        self.state.just_teleported |=
            !self.settings.walking.maintain_horizontal_ground_velocity || old_floor_dist < 0.0;
        self.state.force_next_floor_check = true;
    }

    pub fn set_base_from_floor(&mut self) {
        let floor = self.state.current_floor;
        self.state.base = if floor.is_walkable_floor() {
            floor.hit.actor
        } else {
            None
        };
    }
}

/// Whether `impact` lies inside the capsule's radius minus the rim band
pub fn is_within_edge_tolerance(capsule_location: Vec3, impact: Vec3, capsule_radius: f32) -> bool {
    let dist_sq = (impact - capsule_location).truncate().length_squared();
    let reduced = (SWEEP_EDGE_REJECT_DISTANCE + KINDA_SMALL_NUMBER)
        .max(capsule_radius - SWEEP_EDGE_REJECT_DISTANCE);
    dist_sq < reduced * reduced
}
