//! Character façade: the intent surface an input or AI layer drives
//!
//! Wraps a [`MovementComponent`] with the character-level actions that sit
//! above the integrators: climb input remapping, swim up/down, rope grabbing,
//! the scripted climb-down-ledge, capsule-hit climb attempts and mesh offset
//! smoothing.

use std::sync::Arc;

use glam::{Quat, Vec3};
use tracing::{debug, info};
use traverse_core::math::{interpolate_quaternion_fast, spring_damp_float};
use traverse_core::{EntityId, SpringFloatState};
use traverse_physics::{nearest_rope, CollisionQuery, HitResult, SharedRope, WaterQuery};

use crate::climb::ClimbSurfaceAngles;
use crate::component::MovementComponent;
use crate::context::MoveContext;
use crate::hooks::CharacterHooks;
use crate::mode::{CustomMode, MovementMode};
use crate::replication::MovementRpc;
use crate::settings::MovementSettings;
use crate::state::ClimbDownTarget;

/// Seconds spent on each leg of the climb-down-ledge descent
const CLIMB_DOWN_STEP_TIME: f32 = 0.35;

const MESH_SPRING_FREQUENCY: f32 = 0.4;
const MESH_SPRING_DAMPING_RATIO: f32 = 4.0;
const MESH_ROTATION_SPEED: f32 = 30.0;
/// Rate the offset decays at while smoothing is disabled
const MESH_RELAX_SPEED: f32 = 15.0;

/// What a character moves through
#[derive(Clone, Copy)]
pub struct Surroundings<'a> {
    pub world: &'a dyn CollisionQuery,
    pub water: &'a dyn WaterQuery,
    pub ropes: &'a [SharedRope],
}

/// Smoothed mesh placement relative to the capsule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshPose {
    pub offset_z: f32,
    pub rotation: Quat,
}

#[derive(Debug, Clone, Default)]
struct MeshOffset {
    offset_z: f32,
    rotation: Quat,
    spring: SpringFloatState,
}

impl MeshOffset {
    fn reset(&mut self) {
        self.offset_z = 0.0;
        self.rotation = Quat::IDENTITY;
        self.spring.reset();
    }
}

#[derive(Debug, Clone, Copy)]
struct ClimbDownProgress {
    target: ClimbDownTarget,
    start: Vec3,
    start_rotation: Quat,
    elapsed: f32,
}

pub struct Character<H: CharacterHooks> {
    pub movement: MovementComponent,
    pub hooks: H,
    mesh: MeshOffset,
    climb_down: Option<ClimbDownProgress>,
    /// Swim-up was pressed below the surface and has not been released
    jump_input_under_water: bool,
}

impl<H: CharacterHooks> Character<H> {
    pub fn new(settings: Arc<MovementSettings>, location: Vec3, hooks: H) -> Self {
        Self {
            movement: MovementComponent::new(EntityId::new(), settings, location),
            hooks,
            mesh: MeshOffset::default(),
            climb_down: None,
            jump_input_under_water: false,
        }
    }

    pub fn mode(&self) -> MovementMode {
        self.movement.mode()
    }

    pub fn location(&self) -> Vec3 {
        self.movement.location()
    }

    pub fn is_climbing_down_ledge(&self) -> bool {
        self.climb_down.is_some()
    }

    fn context<'a>(&'a mut self, env: Surroundings<'a>) -> MoveContext<'a> {
        self.movement.context(env.world, env.water, &mut self.hooks)
    }

    /// Advance the character by `delta_time` seconds
    pub fn tick(&mut self, env: Surroundings<'_>, delta_time: f32) {
        if let Some(progress) = self.climb_down.take() {
            self.climb_down = self.advance_climb_down(env, progress, delta_time);
            return;
        }

        let previous = self.mode();
        self.movement
            .perform_movement(env.world, env.water, &mut self.hooks, delta_time);

        let impacts = std::mem::take(&mut self.movement.state.pending_impacts);
        for hit in &impacts {
            self.on_capsule_hit(env, hit);
        }

        let current = self.mode();
        if previous.is_climbing() != current.is_climbing() {
            self.mesh.reset();
        }
    }

    /// Queue movement input. While climbing, `x` climbs along the wall and
    /// `y` moves sideways on it; otherwise the direction is used as is.
    pub fn add_movement_input(&mut self, direction: Vec3) {
        if self.climb_down.is_some() {
            return;
        }

        let direction = if self.mode().is_climbing() {
            let normal = self.movement.state.climbing_normal;
            let capsule = &self.movement.capsule;
            let along = normal.cross(-capsule.right()) * direction.x;
            let across = normal.cross(capsule.up()) * direction.y;
            along + across
        } else {
            direction
        };
        self.movement.add_input_vector(direction);
    }

    /// Jump off the ground, or off the rope while swinging
    pub fn jump(&mut self, env: Surroundings<'_>) -> bool {
        if self.mode().is_swinging() {
            self.exit_swing(env, true);
            return true;
        }
        self.movement.state.pressed_jump = true;
        self.context(env).jump()
    }

    pub fn swim_up(&mut self) {
        let mode = self.mode();
        if !(mode.is_swimming() || mode.is_flying()) {
            return;
        }
        self.add_movement_input(Vec3::Z);
        let on_surface = self.movement.state.is_swim_on_surface;
        if !on_surface {
            self.jump_input_under_water = true;
        }
        if !self.jump_input_under_water && on_surface {
            self.movement.state.wants_to_jump_out_of_water = true;
        }
    }

    pub fn swim_up_stop(&mut self) {
        self.jump_input_under_water =
            self.mode().is_swimming() && !self.movement.state.is_swim_on_surface;
    }

    pub fn swim_down(&mut self) {
        let mode = self.mode();
        if mode.is_swimming() || mode.is_flying() {
            self.add_movement_input(Vec3::NEG_Z);
        }
    }

    pub fn toggle_glide(&mut self, env: Surroundings<'_>) -> bool {
        self.context(env).toggle_glide()
    }

    /// Start sliding from a run fast enough on walkable ground
    pub fn try_slide(&mut self, env: Surroundings<'_>) -> bool {
        if !self.mode().is_walking() {
            return false;
        }
        let mut ctx = self.context(env);
        if !ctx.can_slide() {
            return false;
        }
        ctx.set_movement_mode(MovementMode::Custom(CustomMode::Slide));
        true
    }

    pub fn try_climb_dash(&mut self, env: Surroundings<'_>) {
        self.context(env).try_climb_dash();
    }

    /// Grab the nearest rope within reach of the capsule
    pub fn try_start_swing(&mut self, env: Surroundings<'_>) -> bool {
        if self.mode().is_swinging() {
            return false;
        }
        let reach = self.movement.settings.swing.grab_reach + self.movement.capsule.radius;
        let Some(rope) = nearest_rope(env.ropes, self.location(), reach) else {
            return false;
        };
        self.context(env).enter_swing(&rope);
        true
    }

    pub fn exit_swing(&mut self, env: Surroundings<'_>, wants_to_jump: bool) {
        self.context(env).exit_swing(wants_to_jump);
    }

    /// Vertical input along the rope; positive climbs towards the anchor
    pub fn swing_move_up_down(&mut self, up_down: f32) {
        if self.mode().is_swinging() {
            self.movement.add_input_vector(Vec3::Z * up_down);
        }
    }

    pub fn sprint(&mut self) {
        self.movement.state.sprinting = true;
    }

    pub fn stop_sprinting(&mut self) {
        self.movement.state.sprinting = false;
    }

    /// Crouch on the next tick; from a sprint on walkable ground this
    /// starts a slide instead
    pub fn crouch(&mut self) {
        self.movement.state.wants_to_crouch = true;
    }

    pub fn uncrouch(&mut self) {
        self.movement.state.wants_to_crouch = false;
    }

    /// Commit to the climb-down target found this tick; the character is
    /// moved out over the ledge, then down against the wall, and starts
    /// climbing from there
    pub fn try_climb_down_ledge(&mut self, env: Surroundings<'_>) -> bool {
        if self.climb_down.is_some() || !self.movement.state.can_climb_down_ledge {
            return false;
        }
        let Some(target) = self.movement.state.climb_down_target else {
            return false;
        };

        info!(down = ?target.down, "Climbing down ledge");
        self.movement.state.velocity = Vec3::ZERO;
        self.context(env).set_movement_mode(MovementMode::Flying);
        self.mesh.reset();
        self.climb_down = Some(ClimbDownProgress {
            target,
            start: self.location(),
            start_rotation: self.movement.capsule.rotation(),
            elapsed: 0.0,
        });
        true
    }

    fn advance_climb_down(
        &mut self,
        env: Surroundings<'_>,
        mut progress: ClimbDownProgress,
        delta_time: f32,
    ) -> Option<ClimbDownProgress> {
        progress.elapsed += delta_time;
        let target = progress.target;
        let capsule = &mut self.movement.capsule;

        if progress.elapsed < CLIMB_DOWN_STEP_TIME {
            let alpha = progress.elapsed / CLIMB_DOWN_STEP_TIME;
            capsule.set_location(progress.start.lerp(target.forward, alpha));
            return Some(progress);
        }
        if progress.elapsed < CLIMB_DOWN_STEP_TIME * 2.0 {
            let alpha = progress.elapsed / CLIMB_DOWN_STEP_TIME - 1.0;
            capsule.set_location(target.forward.lerp(target.down, alpha));
            capsule.set_rotation(progress.start_rotation.slerp(target.face_to, alpha));
            return Some(progress);
        }

        capsule.set_location(target.down);
        capsule.set_rotation(target.face_to);
        debug!("Climb down ledge finished");

        let mut ctx = self.context(env);
        ctx.state.velocity = Vec3::ZERO;
        ctx.set_movement_mode(MovementMode::Falling);
        ctx.hooks.on_auto_try_climb();
        ctx.state.wants_to_climb = true;
        ctx.state.try_enter_climb_time = 0.0;
        ctx.state.try_enter_climb_alpha = 0.0;
        None
    }

    /// End an accepted mantle, standing if there is floor below
    pub fn finish_mantle(&mut self, env: Surroundings<'_>) {
        if !self.mode().is_mantling() {
            return;
        }
        let mut ctx = self.context(env);
        let location = ctx.location();
        let mode = if ctx.find_floor_at(location, false).is_walkable_floor() {
            MovementMode::Walking
        } else {
            MovementMode::Falling
        };
        ctx.set_movement_mode(mode);
    }

    /// A blocking hit while falling or swimming tries to grab the wall when
    /// the input points into it
    pub fn on_capsule_hit(&mut self, env: Surroundings<'_>, hit: &HitResult) {
        let mode = self.mode();
        if !hit.blocking_hit || !(mode.is_falling() || mode.is_swimming()) {
            return;
        }

        let mut ctx = self.context(env);
        let forward = ctx.capsule.forward();
        let angles = ClimbSurfaceAngles::measure(hit.normal, forward, ctx.state.acceleration);
        if !ctx.surface_accepts(&angles) {
            return;
        }

        let location = ctx.location();
        let check = ctx.can_start_climbing(location, forward);
        let min_degrees = ctx.settings.climbing.min_horizontal_degrees_to_start_climbing;
        if check.can_climb && check.acceleration_degrees <= min_degrees {
            debug!(%mode, "Capsule hit starts a climb");
            ctx.hooks.on_auto_try_climb();
            ctx.state.wants_to_climb = true;
            ctx.state.try_enter_climb_time = 0.0;
            ctx.state.try_enter_climb_alpha = 0.0;
        }
    }

    /// Run a client intent on the server
    pub fn apply_rpc(&mut self, env: Surroundings<'_>, rpc: MovementRpc) -> bool {
        match rpc {
            MovementRpc::ToggleGlide => self.toggle_glide(env),
            MovementRpc::ClimbDownLedge => self.try_climb_down_ledge(env),
            MovementRpc::JumpOutOfWater => {
                self.movement.state.wants_to_jump_out_of_water = true;
                true
            }
        }
    }

    /// Ease the mesh towards a target vertical offset and rotation; with
    /// smoothing disabled the offset relaxes back onto the capsule
    pub fn smooth_mesh_offset(
        &mut self,
        target_offset_z: f32,
        target_rotation: Quat,
        delta_time: f32,
        enabled: bool,
    ) -> MeshPose {
        let mesh = &mut self.mesh;
        if enabled {
            mesh.offset_z = spring_damp_float(
                mesh.offset_z,
                target_offset_z,
                &mut mesh.spring,
                delta_time,
                MESH_SPRING_FREQUENCY,
                MESH_SPRING_DAMPING_RATIO,
                1.0,
            );
            mesh.rotation = interpolate_quaternion_fast(
                mesh.rotation,
                target_rotation,
                MESH_ROTATION_SPEED,
                delta_time,
            );
        } else {
            mesh.spring.reset();
            mesh.offset_z *= 1.0 - (delta_time * MESH_RELAX_SPEED).clamp(0.0, 1.0);
            mesh.rotation = interpolate_quaternion_fast(
                mesh.rotation,
                Quat::IDENTITY,
                MESH_RELAX_SPEED,
                delta_time,
            );
        }
        MeshPose {
            offset_z: mesh.offset_z,
            rotation: mesh.rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookRecorder, LocomotionEvent};
    use crate::testing::{assert_near, Slab, SlabWorld};
    use traverse_physics::{SwingRope, WaterVolume};

    const DT: f32 = 1.0 / 60.0;

    struct Scene {
        world: SlabWorld,
        water: Vec<WaterVolume>,
        ropes: Vec<SharedRope>,
    }

    impl Scene {
        fn new(world: SlabWorld) -> Self {
            Self {
                world,
                water: Vec::new(),
                ropes: Vec::new(),
            }
        }

        fn env(&self) -> Surroundings<'_> {
            Surroundings {
                world: &self.world,
                water: &self.water,
                ropes: &self.ropes,
            }
        }
    }

    fn character_at(location: Vec3) -> Character<HookRecorder> {
        Character::new(
            Arc::new(MovementSettings::default()),
            location,
            HookRecorder::default(),
        )
    }

    #[test]
    fn test_climb_input_follows_wall() {
        let mut character = character_at(Vec3::ZERO);
        character.movement.state.mode = MovementMode::Custom(CustomMode::FreeClimb);
        character.movement.state.climbing_normal = Vec3::NEG_X;

        character.add_movement_input(Vec3::X);
        let up = character.movement.pending_input();
        assert_near(up.z, 1.0, 1e-5);
        assert_near(up.x, 0.0, 1e-5);

        character.add_movement_input(-Vec3::X + Vec3::Y);
        let right = character.movement.pending_input();
        assert_near(right.y, 1.0, 1e-5);
        assert_near(right.z, 0.0, 1e-5);
    }

    #[test]
    fn test_ground_input_passes_through() {
        let mut character = character_at(Vec3::ZERO);
        character.add_movement_input(Vec3::new(0.5, 0.5, 0.0));
        assert_eq!(character.movement.pending_input(), Vec3::new(0.5, 0.5, 0.0));
    }

    #[test]
    fn test_swim_up_at_surface_wants_out() {
        let mut character = character_at(Vec3::ZERO);
        character.movement.state.mode = MovementMode::Swimming;
        character.movement.state.is_swim_on_surface = true;
        character.swim_up();
        assert!(character.movement.state.wants_to_jump_out_of_water);
        assert_eq!(character.movement.pending_input(), Vec3::Z);
    }

    #[test]
    fn test_swim_up_from_depth_waits_for_release() {
        let mut character = character_at(Vec3::ZERO);
        character.movement.state.mode = MovementMode::Swimming;
        character.swim_up();
        assert!(!character.movement.state.wants_to_jump_out_of_water);

        // Reaching the surface while still holding does not jump out
        character.movement.state.is_swim_on_surface = true;
        character.swim_up();
        assert!(!character.movement.state.wants_to_jump_out_of_water);

        character.swim_up_stop();
        character.swim_up();
        assert!(character.movement.state.wants_to_jump_out_of_water);
    }

    #[test]
    fn test_swim_down_ignored_on_ground() {
        let mut character = character_at(Vec3::ZERO);
        character.swim_down();
        assert_eq!(character.movement.pending_input(), Vec3::ZERO);
    }

    #[test]
    fn test_walks_through_ticks() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        let scene = Scene::new(world);
        let mut character = character_at(Vec3::new(0.0, 0.0, 77.15));
        for _ in 0..60 {
            character.add_movement_input(Vec3::X);
            character.tick(scene.env(), DT);
        }
        assert_eq!(character.mode(), MovementMode::Walking);
        assert!(character.location().x > 250.0);
    }

    #[test]
    fn test_jump_leaves_ground() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        let scene = Scene::new(world);
        let mut character = character_at(Vec3::new(0.0, 0.0, 77.15));
        character.tick(scene.env(), DT);
        assert!(character.jump(scene.env()));
        assert!(character.mode().is_base_falling());
        character.tick(scene.env(), DT);
        assert!(character.location().z > 77.15);
    }

    #[test]
    fn test_try_slide_needs_speed() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        let scene = Scene::new(world);
        let mut character = character_at(Vec3::new(0.0, 0.0, 77.15));
        assert!(!character.try_slide(scene.env()));

        character.movement.state.velocity = Vec3::X * 450.0;
        assert!(character.try_slide(scene.env()));
        assert!(character.mode().is_sliding());
        assert_eq!(character.hooks.count(LocomotionEvent::EnterSlide), 1);
    }

    #[test]
    fn test_crouch_while_sprinting_slides() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        let scene = Scene::new(world);
        let mut character = character_at(Vec3::new(0.0, 0.0, 77.15));
        character.tick(scene.env(), DT);

        character.sprint();
        character.movement.state.velocity = Vec3::X * 600.0;
        character.crouch();
        character.add_movement_input(Vec3::X);
        character.tick(scene.env(), DT);

        assert!(character.mode().is_sliding());
        assert!(character.movement.state.is_crouched);
        assert!(!character.movement.state.sprinting);
        assert_eq!(character.hooks.count(LocomotionEvent::EnterSlide), 1);
    }

    #[test]
    fn test_slow_crouch_while_sprinting_keeps_walking() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        let scene = Scene::new(world);
        let mut character = character_at(Vec3::new(0.0, 0.0, 77.15));
        character.tick(scene.env(), DT);

        character.sprint();
        character.movement.state.velocity = Vec3::X * 300.0;
        character.crouch();
        character.add_movement_input(Vec3::X);
        character.tick(scene.env(), DT);

        assert!(character.mode().is_walking());
        assert!(character.movement.state.is_crouched);
        assert_eq!(character.hooks.count(LocomotionEvent::EnterSlide), 0);
    }

    #[test]
    fn test_crouch_without_sprint_keeps_walking() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        let scene = Scene::new(world);
        let mut character = character_at(Vec3::new(0.0, 0.0, 77.15));
        character.tick(scene.env(), DT);

        character.movement.state.velocity = Vec3::X * 600.0;
        character.crouch();
        character.tick(scene.env(), DT);
        assert!(character.mode().is_walking());
    }

    #[test]
    fn test_swing_grab_and_jump_off() {
        let mut scene = Scene::new(SlabWorld::default());
        scene.ropes.push(
            SwingRope::new(vec![Vec3::new(0.0, 0.0, 900.0), Vec3::new(0.0, 0.0, 500.0)]).into_shared(),
        );
        let mut character = character_at(Vec3::new(200.0, 0.0, 700.0));
        character.movement.state.mode = MovementMode::Falling;
        assert!(!character.try_start_swing(scene.env()));

        character.movement.capsule.set_location(Vec3::new(50.0, 0.0, 700.0));
        assert!(character.try_start_swing(scene.env()));
        assert!(character.mode().is_swinging());

        character.swing_move_up_down(1.0);
        character.tick(scene.env(), DT);
        assert_near(character.location().x, 0.0, 1e-3);

        assert!(character.jump(scene.env()));
        assert!(character.mode().is_base_falling());
        assert!(scene.ropes[0].lock().riders().is_empty());
    }

    /// Ground that ends at x = 0 with a cliff face below it
    fn ledge_scene() -> Scene {
        let mut world = SlabWorld::default();
        world.add(
            Slab::plane(Vec3::ZERO, Vec3::Z)
                .bounded(Vec3::new(-1000.0, -1000.0, 0.0), Vec3::new(0.0, 1000.0, 0.0)),
        );
        world.add(
            Slab::plane(Vec3::ZERO, Vec3::X)
                .bounded(Vec3::new(0.0, -1000.0, -1000.0), Vec3::new(0.0, 1000.0, 5.0)),
        );
        Scene::new(world)
    }

    #[test]
    fn test_climb_down_ledge_sequence() {
        let scene = ledge_scene();
        let mut character = character_at(Vec3::new(-40.0, 0.0, 77.15));
        assert!(!character.try_climb_down_ledge(scene.env()));

        character.tick(scene.env(), DT);
        assert!(character.movement.state.can_climb_down_ledge);
        assert!(character.try_climb_down_ledge(scene.env()));
        assert_eq!(character.mode(), MovementMode::Flying);
        assert!(character.is_climbing_down_ledge());

        // Input is ignored during the descent
        character.add_movement_input(Vec3::X);
        assert_eq!(character.movement.pending_input(), Vec3::ZERO);

        let mut ticks = 0;
        while character.is_climbing_down_ledge() && ticks < 120 {
            character.tick(scene.env(), DT);
            ticks += 1;
        }
        assert!(!character.is_climbing_down_ledge());
        assert_eq!(character.mode(), MovementMode::Falling);
        assert!(character.movement.state.wants_to_climb);
        assert_near(character.location().x, 30.0, 1e-2);
        assert_eq!(character.hooks.count(LocomotionEvent::AutoTryClimb), 1);
    }

    fn blocking_hit(normal: Vec3) -> HitResult {
        HitResult {
            blocking_hit: true,
            normal,
            impact_normal: normal,
            ..HitResult::no_hit(Vec3::ZERO, Vec3::X)
        }
    }

    #[test]
    fn test_capsule_hit_while_falling_grabs_wall() {
        let mut world = SlabWorld::default();
        world.add_wall(Vec3::new(40.0, 0.0, 0.0), Vec3::NEG_X);
        let scene = Scene::new(world);
        let mut character = character_at(Vec3::new(0.0, 0.0, 300.0));
        character.movement.state.mode = MovementMode::Falling;
        character.movement.state.acceleration = Vec3::X * 1000.0;

        character.on_capsule_hit(scene.env(), &blocking_hit(Vec3::NEG_X));
        assert!(character.movement.state.wants_to_climb);
        assert_eq!(character.hooks.count(LocomotionEvent::AutoTryClimb), 1);
    }

    #[test]
    fn test_capsule_hit_ignored_on_ground() {
        let mut world = SlabWorld::default();
        world.add_wall(Vec3::new(40.0, 0.0, 0.0), Vec3::NEG_X);
        let scene = Scene::new(world);
        let mut character = character_at(Vec3::new(0.0, 0.0, 300.0));
        character.movement.state.acceleration = Vec3::X * 1000.0;
        character.on_capsule_hit(scene.env(), &blocking_hit(Vec3::NEG_X));
        assert!(!character.movement.state.wants_to_climb);
    }

    #[test]
    fn test_capsule_hit_needs_input_into_wall() {
        let mut world = SlabWorld::default();
        world.add_wall(Vec3::new(40.0, 0.0, 0.0), Vec3::NEG_X);
        let scene = Scene::new(world);
        let mut character = character_at(Vec3::new(0.0, 0.0, 300.0));
        character.movement.state.mode = MovementMode::Falling;
        character.movement.state.acceleration = Vec3::NEG_X * 1000.0;
        character.on_capsule_hit(scene.env(), &blocking_hit(Vec3::NEG_X));
        assert!(!character.movement.state.wants_to_climb);
    }

    #[test]
    fn test_mantle_finishes_on_floor() {
        let mut world = SlabWorld::default();
        world.add_ground(0.0);
        let scene = Scene::new(world);
        let mut character = character_at(Vec3::new(0.0, 0.0, 77.15));
        character.movement.state.mode = MovementMode::Custom(CustomMode::Mantle);
        character.tick(scene.env(), DT);
        assert!(character.mode().is_mantling());
        character.finish_mantle(scene.env());
        assert_eq!(character.mode(), MovementMode::Walking);
    }

    #[test]
    fn test_rpc_toggles_glide() {
        let scene = Scene::new(SlabWorld::default());
        let mut character = character_at(Vec3::new(0.0, 0.0, 1000.0));
        character.movement.state.mode = MovementMode::Falling;
        assert!(character.apply_rpc(scene.env(), MovementRpc::ToggleGlide));
        assert!(character.mode().is_gliding());
        assert!(character.apply_rpc(scene.env(), MovementRpc::JumpOutOfWater));
        assert!(character.movement.state.wants_to_jump_out_of_water);
    }

    #[test]
    fn test_mesh_offset_springs_towards_target() {
        let mut character = character_at(Vec3::ZERO);
        // The first sample snaps
        let pose = character.smooth_mesh_offset(0.0, Quat::IDENTITY, DT, true);
        assert_eq!(pose.offset_z, 0.0);

        let pose = character.smooth_mesh_offset(10.0, Quat::IDENTITY, DT, true);
        assert!(pose.offset_z.is_finite());
        assert!((pose.offset_z - 10.0).abs() > 1.0);

        let mut relaxed = pose;
        for _ in 0..60 {
            relaxed = character.smooth_mesh_offset(0.0, Quat::IDENTITY, DT, false);
        }
        assert!(relaxed.offset_z.abs() < 1e-3);
    }

    #[test]
    fn test_mesh_rotation_eases() {
        let mut character = character_at(Vec3::ZERO);
        let target = Quat::from_rotation_z(1.0);
        let pose = character.smooth_mesh_offset(0.0, target, 0.01, true);
        assert!(pose.rotation.angle_between(target) > 0.1);
        let mut pose = pose;
        for _ in 0..60 {
            pose = character.smooth_mesh_offset(0.0, target, 0.01, true);
        }
        assert!(pose.rotation.angle_between(target) < 1e-3);
    }
}
