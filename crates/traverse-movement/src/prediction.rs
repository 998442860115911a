//! Client-side prediction: saved moves and the buffer that replays them
//!
//! Each client tick records the input and intents it simulated with. Moves
//! stay in the buffer until the server acknowledges them; on a correction the
//! component is reset to the server state and the unacknowledged moves are
//! replayed on top.

use std::collections::VecDeque;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;
use traverse_physics::{CollisionQuery, WaterQuery};

use crate::component::MovementComponent;
use crate::hooks::CharacterHooks;
use crate::mode::MovementMode;
use crate::state::MovementState;

/// Longest span a combined move may cover
pub const MAX_COMBINED_DELTA_TIME: f32 = 1.0 / 30.0;
/// Moves kept before the oldest unacknowledged ones are dropped
pub const MAX_SAVED_MOVES: usize = 96;

/// Intent bits sent with every move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct CompressedFlags(pub u8);

impl CompressedFlags {
    pub const JUMP_PRESSED: u8 = 0x01;
    pub const WANTS_TO_CROUCH: u8 = 0x02;
    pub const WANTS_TO_CLIMB: u8 = 0x20;
    pub const WANTS_TO_JUMP_OUT_OF_WATER: u8 = 0x40;

    /// Pack the intents of `state`
    pub fn encode(state: &MovementState) -> Self {
        let mut bits = 0;
        if state.pressed_jump {
            bits |= Self::JUMP_PRESSED;
        }
        if state.wants_to_crouch {
            bits |= Self::WANTS_TO_CROUCH;
        }
        if state.wants_to_climb {
            bits |= Self::WANTS_TO_CLIMB;
        }
        if state.wants_to_jump_out_of_water {
            bits |= Self::WANTS_TO_JUMP_OUT_OF_WATER;
        }
        Self(bits)
    }

    /// Write the packed intents back onto `state`
    pub fn decode(self, state: &mut MovementState) {
        state.pressed_jump = self.contains(Self::JUMP_PRESSED);
        state.wants_to_crouch = self.contains(Self::WANTS_TO_CROUCH);
        state.wants_to_climb = self.contains(Self::WANTS_TO_CLIMB);
        state.wants_to_jump_out_of_water = self.contains(Self::WANTS_TO_JUMP_OUT_OF_WATER);
    }

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

/// Restore intents received from a client before simulating its move
pub fn update_from_compressed_flags(component: &mut MovementComponent, flags: CompressedFlags) {
    flags.decode(&mut component.state);
}

/// One simulated client tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedMove {
    pub timestamp: f32,
    pub delta_time: f32,
    /// Input vector, at most unit length
    pub input: Vec3,
    pub flags: CompressedFlags,
    pub start_mode: MovementMode,
    pub start_location: Vec3,
    pub start_velocity: Vec3,
    pub saved_location: Vec3,
    pub saved_velocity: Vec3,
}

impl Default for SavedMove {
    fn default() -> Self {
        Self {
            timestamp: 0.0,
            delta_time: 0.0,
            input: Vec3::ZERO,
            flags: CompressedFlags::default(),
            start_mode: MovementMode::Walking,
            start_location: Vec3::ZERO,
            start_velocity: Vec3::ZERO,
            saved_location: Vec3::ZERO,
            saved_velocity: Vec3::ZERO,
        }
    }
}

impl SavedMove {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Capture the component's state and intents before it simulates
    pub fn set_move_for(
        &mut self,
        component: &MovementComponent,
        timestamp: f32,
        delta_time: f32,
        input: Vec3,
    ) {
        self.timestamp = timestamp;
        self.delta_time = delta_time;
        self.input = input;
        self.flags = CompressedFlags::encode(&component.state);
        self.start_mode = component.mode();
        self.start_location = component.location();
        self.start_velocity = component.velocity();
        self.saved_location = self.start_location;
        self.saved_velocity = self.start_velocity;
    }

    /// Record where the move ended
    pub fn post_update(&mut self, component: &MovementComponent) {
        self.saved_location = component.location();
        self.saved_velocity = component.velocity();
    }

    /// Put the saved intents and input back on the component for a replay
    pub fn prep_move_for(&self, component: &mut MovementComponent) {
        update_from_compressed_flags(component, self.flags);
        component.add_input_vector(self.input);
    }

    /// Whether `newer` can be folded into this move
    pub fn can_combine_with(&self, newer: &SavedMove) -> bool {
        if self.flags != newer.flags {
            return false;
        }
        if self.start_mode != newer.start_mode {
            return false;
        }
        if self.delta_time + newer.delta_time > MAX_COMBINED_DELTA_TIME + 1e-6 {
            return false;
        }
        let both_idle = self.input == Vec3::ZERO && newer.input == Vec3::ZERO;
        both_idle || self.input.abs_diff_eq(newer.input, 1e-3)
    }

    /// Fold `newer` into this move, keeping this move's start
    pub fn combine(&mut self, newer: &SavedMove) {
        self.timestamp = newer.timestamp;
        self.delta_time += newer.delta_time;
        self.saved_location = newer.saved_location;
        self.saved_velocity = newer.saved_velocity;
    }
}

/// Moves not yet acknowledged by the server, oldest first
#[derive(Debug, Default)]
pub struct PredictionBuffer {
    moves: VecDeque<SavedMove>,
}

impl PredictionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn moves(&self) -> impl Iterator<Item = &SavedMove> {
        self.moves.iter()
    }

    /// Append a move, folding it into the previous one when allowed
    pub fn push(&mut self, saved: SavedMove) {
        if let Some(last) = self.moves.back_mut() {
            if last.can_combine_with(&saved) {
                last.combine(&saved);
                return;
            }
        }
        if self.moves.len() >= MAX_SAVED_MOVES {
            self.moves.pop_front();
        }
        self.moves.push_back(saved);
    }

    /// Drop every move the server has processed
    pub fn acknowledge(&mut self, timestamp: f32) {
        let before = self.moves.len();
        self.moves.retain(|saved| saved.timestamp > timestamp);
        debug!(
            timestamp,
            dropped = before - self.moves.len(),
            "Acknowledged saved moves"
        );
    }

    /// Re-simulate the unacknowledged moves on top of a corrected component
    pub fn replay(
        &mut self,
        component: &mut MovementComponent,
        world: &dyn CollisionQuery,
        water: &dyn WaterQuery,
        hooks: &mut dyn CharacterHooks,
    ) {
        debug!(moves = self.moves.len(), "Replaying saved moves");
        for saved in self.moves.iter_mut() {
            saved.prep_move_for(component);
            component.perform_movement(world, water, hooks, saved.delta_time);
            saved.post_update(component);
        }
    }
}
