//! Traverse Movement - Character locomotion modes and their integrators
//!
//! This crate provides the movement component for Traverse characters:
//! - Walking, sliding, falling and gliding, swimming, flying, free climbing
//!   and rope swinging, each with its own integrator
//! - A mode state machine whose transitions run once per edge and notify the
//!   character through [`hooks`]
//! - Floor finding with perching, step-up and penetration caching
//! - Saved-move prediction and a replication snapshot for networked play
//! - The [`Character`] façade an input or AI layer drives

mod air;
pub mod character;
mod climb;
pub mod component;
mod context;
mod dispatch;
pub mod error;
mod floor;
mod flying;
pub mod hooks;
pub mod mode;
mod mover;
pub mod prediction;
mod probe;
pub mod replication;
pub mod settings;
pub mod state;
mod swimming;
mod swing;
mod transition;
mod velocity;
mod walking;

#[cfg(test)]
pub(crate) mod testing;

pub use character::{Character, MeshPose, Surroundings};
pub use climb::{ClimbCheck, ClimbSurfaceAngles};
pub use component::MovementComponent;
pub use context::MoveContext;
pub use dispatch::PhysicsStep;
pub use error::{MovementError, Result};
pub use hooks::{
    CharacterHooks, ClimbNotifiable, HookRecorder, LocomotionEvent, LocomotionNotify,
    MantleCapable, MantleKind, NoHooks,
};
pub use mode::{CustomMode, MovementMode};
pub use prediction::{CompressedFlags, PredictionBuffer, SavedMove};
pub use probe::SurfaceInfo;
pub use replication::{MovementRpc, MovementSnapshot};
pub use settings::MovementSettings;
pub use state::{FloorResult, MovementState};
