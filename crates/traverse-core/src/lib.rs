//! Traverse Core - Core types and utilities for the Traverse locomotion engine
//!
//! This crate provides the foundational types used throughout the engine:
//! - Mathematical primitives (re-exported from glam) and interpolation helpers
//! - Transform for actor positioning in the Z-up world
//! - Fixed-step time accumulation for the movement simulation

pub mod math;
pub mod time;
pub mod types;

pub use glam::{Mat3, Quat, Vec2, Vec3};
pub use math::SpringFloatState;
pub use time::{GameTime, TimeConfig};
pub use types::{EntityId, Transform};
