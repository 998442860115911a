//! Traverse - Headless locomotion simulation
//!
//! Builds a small rapier scene with a wall, a pool and a rope, then drives a
//! character through a scripted run and logs every mode transition.

mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use traverse_core::GameTime;
use traverse_movement::{
    Character, ClimbNotifiable, LocomotionNotify, MantleCapable, MovementMode, Surroundings,
};
use traverse_physics::{HitResult, PhysicsConfig, PhysicsWorld, WaterVolume};

use settings::SimSettings;

/// Logs what the animation layer would react to
#[derive(Default)]
struct LoggingHooks {
    transitions: u32,
}

impl LocomotionNotify for LoggingHooks {
    fn on_movement_mode_changed(&mut self, previous: MovementMode, current: MovementMode) {
        self.transitions += 1;
        info!("Mode {} -> {}", previous, current);
    }

    fn on_enter_slide(&mut self) {
        info!("Slide started");
    }

    fn on_landed(&mut self, hit: &HitResult) {
        debug!("Landed at {:?}", hit.impact_point);
    }

    fn on_jump_out_of_water(&mut self) {
        info!("Jumped out of water");
    }
}

impl ClimbNotifiable for LoggingHooks {
    fn on_auto_try_climb(&mut self) {
        info!("Grabbing wall");
    }

    fn on_climb_to_walk(&mut self) {
        info!("Climbed onto walkable ground");
    }
}

impl MantleCapable for LoggingHooks {}

/// A scripted intent
#[derive(Debug, Clone, Copy)]
enum Action {
    Move(Vec3),
    Jump,
    ToggleGlide,
    Sprint(bool),
    Crouch(bool),
    SwimUp,
    GrabRope,
    LetGo,
    Teleport(Vec3),
}

/// Intents keyed by the simulated second they fire at
const SCRIPT: &[(f32, Action)] = &[
    (0.0, Action::Move(Vec3::X)),
    (4.0, Action::Teleport(Vec3::new(0.0, 0.0, 77.0))),
    (4.0, Action::Move(Vec3::NEG_X)),
    (4.0, Action::Sprint(true)),
    (4.3, Action::Jump),
    (5.4, Action::Crouch(true)),
    (5.9, Action::Crouch(false)),
    (5.9, Action::Sprint(false)),
    (6.0, Action::Teleport(Vec3::new(0.0, 600.0, 400.0))),
    (6.0, Action::Move(Vec3::ZERO)),
    (6.05, Action::GrabRope),
    (7.5, Action::LetGo),
    (7.8, Action::Teleport(Vec3::new(0.0, -600.0, 1500.0))),
    (7.9, Action::ToggleGlide),
    (9.0, Action::Teleport(Vec3::new(-900.0, 0.0, 77.0))),
    (9.0, Action::Move(Vec3::NEG_X)),
    (11.0, Action::SwimUp),
];

fn init_logging(settings: &SimSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level().as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn build_scene(world: &mut PhysicsWorld) {
    world.create_ground(0.0);
    // Climbable wall ahead of the start
    world.create_static_box(
        Vec3::new(50.0, 400.0, 300.0),
        Vec3::new(650.0, 0.0, 300.0),
        Quat::IDENTITY,
    );
    world.add_water_volume(WaterVolume::new(
        Vec3::new(-2400.0, -400.0, 0.0),
        Vec3::new(-1200.0, 400.0, 220.0),
    ));
    world.spawn_rope(Vec3::new(0.0, 600.0, 900.0), 10, 30.0, 4.0);
    world.update_queries();
}

fn apply(character: &mut Character<LoggingHooks>, env: Surroundings<'_>, action: Action) {
    match action {
        Action::Move(_) => {}
        Action::Jump => {
            character.jump(env);
        }
        Action::ToggleGlide => {
            character.toggle_glide(env);
        }
        Action::Sprint(true) => character.sprint(),
        Action::Sprint(false) => character.stop_sprinting(),
        Action::Crouch(true) => character.crouch(),
        Action::Crouch(false) => character.uncrouch(),
        Action::SwimUp => character.swim_up(),
        Action::GrabRope => {
            character.try_start_swing(env);
        }
        Action::LetGo => character.exit_swing(env, true),
        Action::Teleport(location) => {
            character.movement.capsule.set_location(location);
            character.movement.state.velocity = Vec3::ZERO;
            character.movement.state.wants_to_climb = false;
            character.movement.state.just_teleported = true;
            character.movement.state.force_next_floor_check = true;
            character
                .movement
                .context(env.world, env.water, &mut character.hooks)
                .set_movement_mode(MovementMode::Falling);
        }
    }
}

fn main() -> Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    let settings = SimSettings::load(path.as_deref())?;
    init_logging(&settings)?;

    info!("Starting Traverse simulation for {}s", settings.duration);

    let mut world = PhysicsWorld::with_config(PhysicsConfig {
        gravity: Vec3::new(0.0, 0.0, settings.movement.engine.gravity_z),
        timestep: settings.time.fixed_timestep,
    });
    build_scene(&mut world);
    let ropes = world.ropes();

    let mut character = Character::new(
        Arc::new(settings.movement.clone()),
        Vec3::new(0.0, 0.0, 77.0),
        LoggingHooks::default(),
    );

    let mut time = GameTime::new(settings.time.clone());
    let step = settings.time.fixed_timestep;
    let mut elapsed = 0.0_f32;
    let mut next_action = 0;
    let mut input = Vec3::ZERO;

    // Render-rate frames; the fixed steps inside drive the movement
    let frame = 1.0 / 50.0;
    while elapsed < settings.duration {
        time.update(frame);
        for _ in 0..time.fixed_steps() {
            let env = Surroundings {
                world: &world,
                water: &world,
                ropes: &ropes,
            };

            while let Some((at, action)) = SCRIPT.get(next_action).copied() {
                if at > elapsed {
                    break;
                }
                debug!("t={:.2} {:?}", elapsed, action);
                if let Action::Move(direction) = action {
                    input = direction;
                }
                apply(&mut character, env, action);
                next_action += 1;
            }

            if character.mode().is_swinging() {
                character.swing_move_up_down(0.5);
            } else {
                character.add_movement_input(input);
            }
            character.tick(env, step);
            world.step();
            elapsed += step;
        }
    }

    info!(
        "Finished at {:?} in {} after {} mode changes",
        character.location(),
        character.mode(),
        character.hooks.transitions
    );
    Ok(())
}
