//! Replicated movement state and server intents
//!
//! Both travel as JSON. Modes go over the wire as their `(mode, custom)`
//! byte pair so an unknown tag is rejected at decode time.

use std::sync::Arc;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::component::MovementComponent;
use crate::error::Result;
use crate::mode::MovementMode;
use crate::prediction::CompressedFlags;

/// Server-authoritative movement state sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementSnapshot {
    pub timestamp: f32,
    pub mode: u8,
    pub custom_mode: u8,
    pub location: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub flags: CompressedFlags,
    pub is_climb_dashing: bool,
    pub climb_dash_time: f32,
    pub climb_dash_direction: Vec3,
    pub on_rope_distance: f32,
    pub move_up_down_speed: f32,
}

impl MovementSnapshot {
    pub fn capture(component: &MovementComponent, timestamp: f32) -> Self {
        let (mode, custom_mode) = component.mode().to_wire();
        let state = &component.state;
        Self {
            timestamp,
            mode,
            custom_mode,
            location: component.location(),
            rotation: component.capsule.rotation(),
            velocity: state.velocity,
            flags: CompressedFlags::encode(state),
            is_climb_dashing: state.is_climb_dashing,
            climb_dash_time: state.current_climb_dash_time,
            climb_dash_direction: state.climb_dash_direction,
            on_rope_distance: state.on_rope_distance,
            move_up_down_speed: component.settings.swing.move_up_down_speed,
        }
    }

    /// Overwrite the component with this state; the mode is set without
    /// running transition side effects
    pub fn apply(&self, component: &mut MovementComponent) -> Result<()> {
        let mode = self.movement_mode()?;
        if mode != component.mode() {
            debug!(from = %component.mode(), to = %mode, "Snapshot corrected mode");
        }

        component.capsule.set_location(self.location);
        component.capsule.set_rotation(self.rotation);
        let state = &mut component.state;
        state.mode = mode;
        state.velocity = self.velocity;
        self.flags.decode(state);
        state.is_climb_dashing = self.is_climb_dashing;
        state.current_climb_dash_time = self.climb_dash_time;
        state.climb_dash_direction = self.climb_dash_direction;
        state.on_rope_distance = self.on_rope_distance;
        state.force_next_floor_check = true;

        if component.settings.swing.move_up_down_speed != self.move_up_down_speed {
            Arc::make_mut(&mut component.settings).swing.move_up_down_speed =
                self.move_up_down_speed;
        }
        Ok(())
    }

    pub fn movement_mode(&self) -> Result<MovementMode> {
        MovementMode::from_wire(self.mode, self.custom_mode)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.movement_mode()?;
        Ok(snapshot)
    }
}

/// Intent calls a client sends to the server
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MovementRpc {
    ToggleGlide,
    ClimbDownLedge,
    JumpOutOfWater,
}

impl MovementRpc {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
