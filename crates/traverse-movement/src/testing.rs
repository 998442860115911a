//! Deterministic collision world for integrator tests
//!
//! Geometry is a set of one-sided slabs: a plane with a rectangular extent
//! and a thickness behind it. Shapes are treated as upright and swept
//! analytically, so results do not depend on the rapier backend.

use glam::{Quat, Vec3};
use traverse_core::math::safe_normal;
use traverse_core::EntityId;
use traverse_physics::{
    CapsuleComponent, CollisionChannel, CollisionQuery, CollisionShape, HitResult, QueryParams,
    WaterVolume,
};

use crate::context::MoveContext;
use crate::hooks::HookRecorder;
use crate::mode::MovementMode;
use crate::settings::MovementSettings;
use crate::state::MovementState;

const BOUNDS_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Slab {
    pub point: Vec3,
    pub normal: Vec3,
    pub min: Vec3,
    pub max: Vec3,
    pub thickness: f32,
    pub actor: EntityId,
    pub dynamic: bool,
}

impl Slab {
    pub fn plane(point: Vec3, normal: Vec3) -> Self {
        Self {
            point,
            normal: safe_normal(normal),
            min: Vec3::splat(-1.0e6),
            max: Vec3::splat(1.0e6),
            thickness: 50.0,
            actor: EntityId::new(),
            dynamic: false,
        }
    }

    pub fn bounded(mut self, min: Vec3, max: Vec3) -> Self {
        self.min = min.min(max);
        self.max = max.max(min);
        self
    }

    pub fn thickness(mut self, thickness: f32) -> Self {
        self.thickness = thickness;
        self
    }

    fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min - Vec3::splat(BOUNDS_EPSILON)).all()
            && p.cmple(self.max + Vec3::splat(BOUNDS_EPSILON)).all()
    }

    /// Distance from the slab plane to the nearest point of `shape` at `center`
    fn support_distance(&self, shape: &CollisionShape, center: Vec3) -> f32 {
        self.normal.dot(center - self.point) - extent_along(shape, self.normal)
    }

    /// Point of `shape` at `center` that touches the plane first
    fn contact_point(&self, shape: &CollisionShape, center: Vec3) -> Vec3 {
        let n = self.normal;
        match *shape {
            CollisionShape::Capsule { radius, half_height } => {
                let segment = half_height - radius;
                if n.z > 1.0e-3 {
                    center - Vec3::Z * segment - n * radius
                } else if n.z < -1.0e-3 {
                    center + Vec3::Z * segment - n * radius
                } else {
                    // Walls see the capsule as a cylinder of its full height
                    let z = center
                        .z
                        .clamp(self.min.z, self.max.z)
                        .clamp(center.z - half_height, center.z + half_height);
                    Vec3::new(center.x, center.y, z) - n * radius
                }
            }
            CollisionShape::Sphere { radius } => center - n * radius,
            CollisionShape::Box { half_extents } => {
                center - Vec3::new(
                    half_extents.x * n.x.signum(),
                    half_extents.y * n.y.signum(),
                    half_extents.z * n.z.signum(),
                )
            }
            CollisionShape::Line => center,
        }
    }
}

fn extent_along(shape: &CollisionShape, n: Vec3) -> f32 {
    match *shape {
        CollisionShape::Capsule { radius, half_height } => {
            radius + (half_height - radius) * n.z.abs()
        }
        CollisionShape::Sphere { radius } => radius,
        CollisionShape::Box { half_extents } => {
            (half_extents * n).abs().dot(Vec3::ONE)
        }
        CollisionShape::Line => 0.0,
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SlabWorld {
    pub slabs: Vec<Slab>,
}

impl SlabWorld {
    pub fn add(&mut self, slab: Slab) -> EntityId {
        let actor = slab.actor;
        self.slabs.push(slab);
        actor
    }

    pub fn add_ground(&mut self, z: f32) -> EntityId {
        self.add(Slab::plane(Vec3::new(0.0, 0.0, z), Vec3::Z))
    }

    /// Vertical wall facing `normal` through `point`
    pub fn add_wall(&mut self, point: Vec3, normal: Vec3) -> EntityId {
        self.add(Slab::plane(point, normal))
    }

    /// Solid axis-aligned box; every face shares one actor
    pub fn add_box(&mut self, min: Vec3, max: Vec3) -> EntityId {
        let actor = EntityId::new();
        let size = max - min;
        let faces = [
            (Vec3::X, Vec3::new(max.x, min.y, min.z), Vec3::new(max.x, max.y, max.z), size.x),
            (Vec3::NEG_X, Vec3::new(min.x, min.y, min.z), Vec3::new(min.x, max.y, max.z), size.x),
            (Vec3::Y, Vec3::new(min.x, max.y, min.z), Vec3::new(max.x, max.y, max.z), size.y),
            (Vec3::NEG_Y, Vec3::new(min.x, min.y, min.z), Vec3::new(max.x, min.y, max.z), size.y),
            (Vec3::Z, Vec3::new(min.x, min.y, max.z), Vec3::new(max.x, max.y, max.z), size.z),
            (Vec3::NEG_Z, Vec3::new(min.x, min.y, min.z), Vec3::new(max.x, max.y, min.z), size.z),
        ];
        for (normal, face_min, face_max, depth) in faces {
            let mut slab = Slab::plane(face_min, normal)
                .bounded(face_min, face_max)
                .thickness(depth);
            slab.actor = actor;
            self.slabs.push(slab);
        }
        actor
    }
}

impl CollisionQuery for SlabWorld {
    fn sweep(
        &self,
        shape: &CollisionShape,
        _rotation: Quat,
        start: Vec3,
        end: Vec3,
        _channel: CollisionChannel,
        params: &QueryParams,
    ) -> HitResult {
        let delta = end - start;
        let mut best: Option<HitResult> = None;

        for slab in &self.slabs {
            if params.is_ignored(Some(slab.actor)) {
                continue;
            }
            let d0 = slab.support_distance(shape, start);
            let d1 = slab.support_distance(shape, end);

            let candidate = if d0 < 0.0 {
                if params.ignore_initial_overlap || d0 <= -slab.thickness {
                    continue;
                }
                let impact_point = slab.contact_point(shape, start);
                if !slab.contains(impact_point - slab.normal * d0) {
                    continue;
                }
                HitResult {
                    blocking_hit: true,
                    start_penetrating: true,
                    time: 0.0,
                    distance: 0.0,
                    location: start,
                    impact_point,
                    impact_normal: slab.normal,
                    normal: slab.normal,
                    trace_start: start,
                    trace_end: end,
                    penetration_depth: -d0,
                    actor: Some(slab.actor),
                }
            } else if d1 < 0.0 {
                let time = d0 / (d0 - d1);
                let location = start + delta * time;
                let impact_point = slab.contact_point(shape, location);
                if !slab.contains(impact_point) {
                    continue;
                }
                HitResult {
                    blocking_hit: true,
                    start_penetrating: false,
                    time,
                    distance: delta.length() * time,
                    location,
                    impact_point,
                    impact_normal: slab.normal,
                    normal: slab.normal,
                    trace_start: start,
                    trace_end: end,
                    penetration_depth: 0.0,
                    actor: Some(slab.actor),
                }
            } else {
                continue;
            };

            let better = match &best {
                None => true,
                Some(current) if candidate.start_penetrating && current.start_penetrating => {
                    candidate.penetration_depth > current.penetration_depth
                }
                Some(current) if current.start_penetrating => false,
                Some(current) => candidate.start_penetrating || candidate.time < current.time,
            };
            if better {
                best = Some(candidate);
            }
        }

        best.unwrap_or_else(|| HitResult::no_hit(start, end))
    }

    fn is_dynamic(&self, actor: EntityId) -> bool {
        self.slabs.iter().any(|s| s.actor == actor && s.dynamic)
    }
}

/// Everything a [`MoveContext`] borrows, owned in one place
pub(crate) struct TestRig {
    pub world: SlabWorld,
    pub water: Vec<WaterVolume>,
    pub settings: MovementSettings,
    pub capsule: CapsuleComponent,
    pub state: MovementState,
    pub hooks: HookRecorder,
    pub params: QueryParams,
    pub owner: EntityId,
}

impl TestRig {
    pub fn new(world: SlabWorld) -> Self {
        let settings = MovementSettings::default();
        let owner = EntityId::new();
        let capsule = CapsuleComponent::new(
            Vec3::new(0.0, 0.0, settings.capsule.stand_half_height),
            settings.capsule.stand_radius,
            settings.capsule.stand_half_height,
        );
        Self {
            world,
            water: Vec::new(),
            settings,
            capsule,
            state: MovementState::new(MovementMode::Walking),
            hooks: HookRecorder::default(),
            params: QueryParams::ignoring(owner),
            owner,
        }
    }

    pub fn flat_ground() -> Self {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        Self::new(world)
    }

    /// Ground through the origin rising towards +X
    pub fn slope_degrees(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let mut world = SlabWorld::default();
        world.add(Slab::plane(Vec3::ZERO, Vec3::new(-sin, 0.0, cos)));
        Self::new(world)
    }

    /// Stand the capsule with its bottom `gap` above the highest upward
    /// facing surface under `xy`
    pub fn place_on_floor(&mut self, xy: Vec3, gap: f32) {
        let radius = self.capsule.radius;
        let segment = self.capsule.half_height - radius;
        let ground_z = self
            .world
            .slabs
            .iter()
            .filter(|s| s.normal.z > 0.1)
            .filter(|s| {
                xy.x >= s.min.x - BOUNDS_EPSILON
                    && xy.x <= s.max.x + BOUNDS_EPSILON
                    && xy.y >= s.min.y - BOUNDS_EPSILON
                    && xy.y <= s.max.y + BOUNDS_EPSILON
            })
            .map(|s| {
                let n = s.normal;
                // Height of the lower sphere center when it rests on the plane
                (radius + n.dot(s.point) - n.x * xy.x - n.y * xy.y) / n.z - radius
            })
            .fold(f32::MIN, f32::max);
        let ground_z = if ground_z == f32::MIN { 0.0 } else { ground_z };
        self.capsule
            .set_location(Vec3::new(xy.x, xy.y, ground_z + radius + segment + gap));
    }

    pub fn context(&mut self) -> MoveContext<'_> {
        MoveContext {
            world: &self.world,
            water: &self.water,
            settings: &self.settings,
            capsule: &mut self.capsule,
            state: &mut self.state,
            hooks: &mut self.hooks,
            params: &self.params,
            owner: self.owner,
        }
    }
}

pub(crate) fn assert_near(a: f32, b: f32, tolerance: f32) {
    assert!((a - b).abs() <= tolerance, "{a} is not within {tolerance} of {b}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capsule_sweep_lands_on_ground() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        let shape = CollisionShape::capsule(30.0, 75.0);
        let hit = world.sweep(
            &shape,
            Quat::IDENTITY,
            Vec3::new(0.0, 0.0, 100.0),
            Vec3::new(0.0, 0.0, 50.0),
            CollisionChannel::Pawn,
            &QueryParams::default(),
        );
        assert!(hit.is_valid_blocking_hit());
        assert_near(hit.location.z, 75.0, 1e-3);
        assert_near(hit.impact_point.z, 0.0, 1e-3);
    }

    #[test]
    fn test_box_face_bounds() {
        let mut world = SlabWorld::default();
        world.add_box(Vec3::new(50.0, -50.0, 0.0), Vec3::new(100.0, 50.0, 20.0));
        let params = QueryParams::default();
        // A ray above the box misses the front face
        let miss = world.line_trace(
            Vec3::new(0.0, 0.0, 30.0),
            Vec3::new(200.0, 0.0, 30.0),
            CollisionChannel::Pawn,
            &params,
        );
        assert!(!miss.blocking_hit);
        let hit = world.line_trace(
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(200.0, 0.0, 10.0),
            CollisionChannel::Pawn,
            &params,
        );
        assert!(hit.blocking_hit);
        assert_eq!(hit.impact_normal, Vec3::NEG_X);
        assert_near(hit.location.x, 50.0, 1e-3);
    }

    #[test]
    fn test_place_on_slope() {
        let mut rig = TestRig::slope_degrees(30.0);
        rig.place_on_floor(Vec3::ZERO, 0.0);
        let hit = rig.world.sweep(
            &rig.capsule.shape(),
            Quat::IDENTITY,
            rig.capsule.location(),
            rig.capsule.location() - Vec3::Z * 10.0,
            CollisionChannel::Pawn,
            &QueryParams::default(),
        );
        assert!(hit.blocking_hit);
        assert_near(hit.time, 0.0, 1e-3);
    }
}
