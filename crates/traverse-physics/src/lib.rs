//! Traverse Physics - Collision probes and simulated props using rapier3d
//!
//! Provides the [`CollisionQuery`] implementation the movement component
//! sweeps against, water volumes for swimming, and rope chains for swinging.
//! The world is Z-up and measured in centimeters.

mod capsule;
pub mod query;
pub mod rope;
pub mod water;

pub use capsule::CapsuleComponent;
pub use query::{CollisionChannel, CollisionQuery, CollisionShape, HitResult, QueryParams};
pub use rope::{nearest_rope, RopeForce, SharedRope, SwingRope};
pub use water::{WaterInfo, WaterQuery, WaterVolume};

use std::collections::{HashMap, HashSet};

use glam::{Quat, Vec3};
use nalgebra::{Quaternion, Unit, UnitQuaternion};
use rapier3d::parry::query::{contact, ShapeCastOptions, ShapeCastStatus};
use rapier3d::prelude::*;
use tracing::debug;
use traverse_core::EntityId;

const STATIC_GROUP: Group = Group::GROUP_1;
const PAWN_GROUP: Group = Group::GROUP_2;
const WATER_GROUP: Group = Group::GROUP_3;
const ROPE_GROUP: Group = Group::GROUP_4;

/// Physics world configuration
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    /// Gravity vector (default: -980 cm/s² on Z)
    pub gravity: Vec3,
    /// Physics timestep (default: 1/60)
    pub timestep: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, 0.0, -980.0),
            timestep: 1.0 / 60.0,
        }
    }
}

/// Simulated rope and the bodies backing it
struct RopeChain {
    rope: SharedRope,
    bodies: Vec<RigidBodyHandle>,
    half_height: f32,
}

/// The main physics world containing all simulation state
pub struct PhysicsWorld {
    pub config: PhysicsConfig,

    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,

    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    ccd_solver: CCDSolver,
    /// Query pipeline for raycasts and shape casts
    query_pipeline: QueryPipeline,

    /// Actor owning each collider, used for ignore filters and hit reporting
    owners: HashMap<ColliderHandle, EntityId>,
    dynamic_actors: HashSet<EntityId>,
    water: Vec<WaterVolume>,
    ropes: Vec<RopeChain>,
}

fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

fn to_point(v: Vec3) -> Point<Real> {
    point![v.x, v.y, v.z]
}

fn from_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn from_point(p: &Point<Real>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

fn to_isometry(position: Vec3, rotation: Quat) -> Isometry<Real> {
    let q = UnitQuaternion::from_quaternion(Quaternion::new(
        rotation.w, rotation.x, rotation.y, rotation.z,
    ));
    Isometry::from_parts(to_vector(position).into(), q)
}

fn channel_groups(channel: CollisionChannel) -> InteractionGroups {
    let filter = match channel {
        CollisionChannel::WorldStatic => STATIC_GROUP,
        CollisionChannel::Visibility => STATIC_GROUP | WATER_GROUP,
        CollisionChannel::Pawn => STATIC_GROUP | PAWN_GROUP,
        CollisionChannel::Rope => ROPE_GROUP,
    };
    InteractionGroups::new(Group::ALL, filter)
}

fn to_rapier_shape(shape: &CollisionShape) -> Option<SharedShape> {
    match *shape {
        CollisionShape::Capsule { radius, half_height } => {
            let radius = radius.max(0.01);
            Some(SharedShape::capsule_z((half_height - radius).max(0.0), radius))
        }
        CollisionShape::Sphere { radius } => Some(SharedShape::ball(radius.max(0.01))),
        CollisionShape::Box { half_extents } => Some(SharedShape::cuboid(
            half_extents.x.max(0.01),
            half_extents.y.max(0.01),
            half_extents.z.max(0.01),
        )),
        CollisionShape::Line => None,
    }
}

/// Normal of the swept shape at `impact_point`, pointing away from the surface
fn shape_normal(
    shape: &CollisionShape,
    rotation: Quat,
    center: Vec3,
    impact_point: Vec3,
    fallback: Vec3,
) -> Vec3 {
    let toward_center = match *shape {
        CollisionShape::Sphere { .. } => center - impact_point,
        CollisionShape::Capsule { radius, half_height } => {
            let axis = rotation * Vec3::Z;
            let half_segment = (half_height - radius).max(0.0);
            let along = (impact_point - center).dot(axis).clamp(-half_segment, half_segment);
            center + axis * along - impact_point
        }
        _ => return fallback,
    };
    let n = traverse_core::math::safe_normal(toward_center);
    if n == Vec3::ZERO {
        fallback
    } else {
        n
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self::with_config(PhysicsConfig::default())
    }

    pub fn with_config(config: PhysicsConfig) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.timestep;
        // Tolerances scale with the centimeter world
        integration_parameters.length_unit = 100.0;

        Self {
            config,
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            owners: HashMap::new(),
            dynamic_actors: HashSet::new(),
            water: Vec::new(),
            ropes: Vec::new(),
        }
    }

    /// Step the physics simulation
    ///
    /// Rope forces queued by swinging characters are applied for exactly this
    /// step, then rope splines are refreshed from the simulated segments.
    pub fn step(&mut self) {
        self.apply_rope_forces();

        let gravity = to_vector(self.config.gravity);
        self.physics_pipeline.step(
            &gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );

        self.query_pipeline.update(&self.collider_set);
        self.refresh_rope_points();
    }

    /// Refresh the query acceleration structure without stepping
    pub fn update_queries(&mut self) {
        self.query_pipeline.update(&self.collider_set);
    }

    /// Add a static collider owned by a fresh actor id
    pub fn add_static_collider(&mut self, collider: Collider) -> (ColliderHandle, EntityId) {
        let id = EntityId::new();
        let handle = self.collider_set.insert(collider);
        self.owners.insert(handle, id);
        (handle, id)
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) {
        self.owners.remove(&handle);
        self.collider_set
            .remove(handle, &mut self.island_manager, &mut self.rigid_body_set, true);
    }

    pub fn get_collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.collider_set.get(handle)
    }

    pub fn owner_of(&self, handle: ColliderHandle) -> Option<EntityId> {
        self.owners.get(&handle).copied()
    }

    /// Create a ground plane at height `z`
    pub fn create_ground(&mut self, z: f32) -> (ColliderHandle, EntityId) {
        let normal = Unit::new_normalize(vector![0.0, 0.0, 1.0]);
        let ground = ColliderBuilder::halfspace(normal)
            .translation(vector![0.0, 0.0, z])
            .collision_groups(InteractionGroups::new(STATIC_GROUP, Group::ALL))
            .friction(0.7)
            .restitution(0.0)
            .build();
        self.add_static_collider(ground)
    }

    /// Create a static, optionally rotated box
    pub fn create_static_box(
        &mut self,
        half_extents: Vec3,
        position: Vec3,
        rotation: Quat,
    ) -> (ColliderHandle, EntityId) {
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .position(to_isometry(position, rotation))
            .collision_groups(InteractionGroups::new(STATIC_GROUP, Group::ALL))
            .friction(0.7)
            .build();
        self.add_static_collider(collider)
    }

    /// Register a water volume; it is visible to `Visibility` traces only
    pub fn add_water_volume(&mut self, volume: WaterVolume) -> EntityId {
        let half = (volume.max - volume.min) * 0.5;
        let center = volume.min + half;
        let collider = ColliderBuilder::cuboid(half.x, half.y, half.z)
            .translation(to_vector(center))
            .sensor(true)
            .collision_groups(InteractionGroups::new(WATER_GROUP, Group::ALL))
            .build();
        let handle = self.collider_set.insert(collider);
        self.owners.insert(handle, volume.id);
        self.water.push(volume);
        volume.id
    }

    /// Register another character's capsule so `Pawn` sweeps see it
    pub fn add_pawn(&mut self, owner: EntityId, capsule: &CapsuleComponent) -> ColliderHandle {
        let radius = capsule.radius;
        let collider = ColliderBuilder::capsule_z((capsule.half_height - radius).max(0.0), radius)
            .position(to_isometry(capsule.location(), capsule.rotation()))
            .collision_groups(InteractionGroups::new(PAWN_GROUP, Group::ALL))
            .build();
        let handle = self.collider_set.insert(collider);
        self.owners.insert(handle, owner);
        self.dynamic_actors.insert(owner);
        handle
    }

    /// Move a registered pawn collider to match its capsule
    pub fn sync_pawn(&mut self, handle: ColliderHandle, capsule: &CapsuleComponent) {
        if let Some(collider) = self.collider_set.get_mut(handle) {
            collider.set_position(to_isometry(capsule.location(), capsule.rotation()));
            collider.set_shape(SharedShape::capsule_z(
                (capsule.half_height - capsule.radius).max(0.0),
                capsule.radius,
            ));
        }
    }

    /// Spawn a rope hanging from `anchor` made of `segments` capsules
    ///
    /// Segments are joined by spherical joints; the top one is pinned to a
    /// fixed anchor body.
    pub fn spawn_rope(
        &mut self,
        anchor: Vec3,
        segments: usize,
        half_height: f32,
        radius: f32,
    ) -> SharedRope {
        let rope = SwingRope::new(Vec::new());
        let rope_id = rope.id;
        let half_segment = (half_height - radius).max(0.0);

        let mut parent = self
            .rigid_body_set
            .insert(RigidBodyBuilder::fixed().translation(to_vector(anchor)).build());
        let mut parent_anchor = point![0.0, 0.0, 0.0];
        let mut bodies = Vec::with_capacity(segments);

        for i in 0..segments {
            let center = anchor - Vec3::Z * (half_height * (2 * i + 1) as f32);
            let body = RigidBodyBuilder::dynamic()
                .translation(to_vector(center))
                .linear_damping(0.5)
                .angular_damping(0.5)
                .build();
            let handle = self.rigid_body_set.insert(body);
            let collider = ColliderBuilder::capsule_z(half_segment, radius)
                .collision_groups(InteractionGroups::new(ROPE_GROUP, STATIC_GROUP))
                .build();
            let collider_handle =
                self.collider_set
                    .insert_with_parent(collider, handle, &mut self.rigid_body_set);
            self.owners.insert(collider_handle, rope_id);

            let joint = SphericalJointBuilder::new()
                .local_anchor1(parent_anchor)
                .local_anchor2(point![0.0, 0.0, half_height]);
            self.impulse_joint_set.insert(parent, handle, joint, true);

            parent = handle;
            parent_anchor = point![0.0, 0.0, -half_height];
            bodies.push(handle);
        }

        self.dynamic_actors.insert(rope_id);
        let shared = rope.into_shared();
        self.ropes.push(RopeChain {
            rope: shared.clone(),
            bodies,
            half_height,
        });
        self.refresh_rope_points();
        self.query_pipeline.update(&self.collider_set);
        debug!("Spawned rope {:?} with {} segments", rope_id, segments);
        shared
    }

    pub fn ropes(&self) -> Vec<SharedRope> {
        self.ropes.iter().map(|chain| chain.rope.clone()).collect()
    }

    pub fn water_volumes(&self) -> &Vec<WaterVolume> {
        &self.water
    }

    fn apply_rope_forces(&mut self) {
        for chain in &self.ropes {
            let forces = chain.rope.lock().drain_forces();
            for handle in &chain.bodies {
                if let Some(body) = self.rigid_body_set.get_mut(*handle) {
                    body.reset_forces(false);
                }
            }
            for f in forces {
                let Some(handle) = chain.bodies.get(f.segment) else {
                    continue;
                };
                if let Some(body) = self.rigid_body_set.get_mut(*handle) {
                    body.add_force_at_point(to_vector(f.force), to_point(f.location), true);
                }
            }
        }
    }

    fn refresh_rope_points(&mut self) {
        for chain in &self.ropes {
            let mut points = Vec::with_capacity(chain.bodies.len() + 1);
            for (i, handle) in chain.bodies.iter().enumerate() {
                let Some(body) = self.rigid_body_set.get(*handle) else {
                    continue;
                };
                let top = body.position() * point![0.0, 0.0, chain.half_height];
                points.push(from_point(&top));
                if i + 1 == chain.bodies.len() {
                    let bottom = body.position() * point![0.0, 0.0, -chain.half_height];
                    points.push(from_point(&bottom));
                }
            }
            chain.rope.lock().set_points(points);
        }
    }

    fn trace_ray(
        &self,
        start: Vec3,
        end: Vec3,
        filter: QueryFilter,
        params: &QueryParams,
    ) -> HitResult {
        let delta = end - start;
        if delta.length_squared() < f32::EPSILON {
            return HitResult::no_hit(start, end);
        }
        let ray = Ray::new(to_point(start), to_vector(delta));
        let solid = !params.ignore_initial_overlap;
        let Some((handle, hit)) = self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            1.0,
            solid,
            filter,
        ) else {
            return HitResult::no_hit(start, end);
        };

        let time = hit.time_of_impact;
        let location = start + delta * time;
        let normal = from_vector(&hit.normal);
        HitResult {
            blocking_hit: true,
            start_penetrating: solid && time <= 0.0,
            time,
            distance: delta.length() * time,
            location,
            impact_point: location,
            impact_normal: normal,
            normal,
            trace_start: start,
            trace_end: end,
            penetration_depth: 0.0,
            actor: self.owner_of(handle),
        }
    }
}

impl CollisionQuery for PhysicsWorld {
    fn sweep(
        &self,
        shape: &CollisionShape,
        rotation: Quat,
        start: Vec3,
        end: Vec3,
        channel: CollisionChannel,
        params: &QueryParams,
    ) -> HitResult {
        let predicate = |handle: ColliderHandle, _: &Collider| !params.is_ignored(self.owner_of(handle));
        let filter = QueryFilter::default()
            .groups(channel_groups(channel))
            .predicate(&predicate);

        let Some(rapier_shape) = to_rapier_shape(shape) else {
            return self.trace_ray(start, end, filter, params);
        };

        let iso = to_isometry(start, rotation);
        let delta = end - start;
        let options = ShapeCastOptions {
            max_time_of_impact: 1.0,
            target_distance: 0.0,
            stop_at_penetration: !params.ignore_initial_overlap,
            compute_impact_geometry_on_penetration: true,
        };
        let Some((handle, hit)) = self.query_pipeline.cast_shape(
            &self.rigid_body_set,
            &self.collider_set,
            &iso,
            &to_vector(delta),
            &*rapier_shape,
            options,
            filter,
        ) else {
            return HitResult::no_hit(start, end);
        };

        let time = hit.time_of_impact.clamp(0.0, 1.0);
        let location = start + delta * time;
        let mut impact_point = from_point(&hit.witness1);
        let mut impact_normal = traverse_core::math::safe_normal(from_vector(&hit.normal1));
        let mut penetration_depth = 0.0;
        let start_penetrating =
            matches!(hit.status, ShapeCastStatus::PenetratingOrWithinTargetDist) && time <= 0.0;

        if start_penetrating {
            if let Some(collider) = self.collider_set.get(handle) {
                if let Ok(Some(c)) =
                    contact(collider.position(), collider.shape(), &iso, &*rapier_shape, 0.0)
                {
                    penetration_depth = (-c.dist).max(0.0);
                    impact_normal = from_vector(&c.normal1);
                    impact_point = from_point(&c.point1);
                }
            }
        }

        HitResult {
            blocking_hit: true,
            start_penetrating,
            time,
            distance: delta.length() * time,
            location,
            impact_point,
            impact_normal,
            normal: if start_penetrating {
                impact_normal
            } else {
                shape_normal(shape, rotation, location, impact_point, impact_normal)
            },
            trace_start: start,
            trace_end: end,
            penetration_depth,
            actor: self.owner_of(handle),
        }
    }

    fn is_dynamic(&self, actor: EntityId) -> bool {
        self.dynamic_actors.contains(&actor)
    }

    fn is_water_body(&self, actor: EntityId) -> bool {
        self.water.iter().any(|w| w.id == actor)
    }
}

impl WaterQuery for PhysicsWorld {
    fn water_info(&self, location: Vec3, half_height: f32) -> Option<WaterInfo> {
        self.water.water_info(location, half_height)
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}
