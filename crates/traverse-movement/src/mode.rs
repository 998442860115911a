//! Movement mode tags

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MovementError, Result};

/// Submode selected while the mode is [`MovementMode::Custom`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomMode {
    /// Scripted ledge climb driven from outside the integrators
    Mantle,
    Slide,
    FreeClimb,
    RopeSwing,
    Gliding,
}

impl CustomMode {
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Mantle => 0,
            Self::Slide => 1,
            Self::FreeClimb => 2,
            Self::RopeSwing => 3,
            Self::Gliding => 4,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Mantle),
            1 => Some(Self::Slide),
            2 => Some(Self::FreeClimb),
            3 => Some(Self::RopeSwing),
            4 => Some(Self::Gliding),
            _ => None,
        }
    }
}

/// Active locomotion mode; the submode only exists under `Custom`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovementMode {
    #[default]
    Walking,
    Falling,
    Swimming,
    Flying,
    Custom(CustomMode),
}

const WIRE_WALKING: u8 = 1;
const WIRE_FALLING: u8 = 3;
const WIRE_SWIMMING: u8 = 4;
const WIRE_FLYING: u8 = 5;
const WIRE_CUSTOM: u8 = 6;

impl MovementMode {
    pub fn is_walking(self) -> bool {
        self == Self::Walking
    }

    pub fn is_sliding(self) -> bool {
        self == Self::Custom(CustomMode::Slide)
    }

    pub fn is_climbing(self) -> bool {
        self == Self::Custom(CustomMode::FreeClimb)
    }

    pub fn is_gliding(self) -> bool {
        self == Self::Custom(CustomMode::Gliding)
    }

    pub fn is_swinging(self) -> bool {
        self == Self::Custom(CustomMode::RopeSwing)
    }

    pub fn is_mantling(self) -> bool {
        self == Self::Custom(CustomMode::Mantle)
    }

    pub fn is_swimming(self) -> bool {
        self == Self::Swimming
    }

    pub fn is_flying(self) -> bool {
        self == Self::Flying
    }

    /// Plain falling, without gliding
    pub fn is_base_falling(self) -> bool {
        self == Self::Falling
    }

    /// Falling or gliding
    pub fn is_falling(self) -> bool {
        self.is_base_falling() || self.is_gliding()
    }

    /// Walking or sliding
    pub fn is_moving_on_ground(self) -> bool {
        self.is_walking() || self.is_sliding()
    }

    /// Encode as (mode byte, custom submode byte)
    pub fn to_wire(self) -> (u8, u8) {
        match self {
            Self::Walking => (WIRE_WALKING, 0),
            Self::Falling => (WIRE_FALLING, 0),
            Self::Swimming => (WIRE_SWIMMING, 0),
            Self::Flying => (WIRE_FLYING, 0),
            Self::Custom(custom) => (WIRE_CUSTOM, custom.to_wire()),
        }
    }

    pub fn from_wire(mode: u8, custom: u8) -> Result<Self> {
        match mode {
            WIRE_WALKING => Ok(Self::Walking),
            WIRE_FALLING => Ok(Self::Falling),
            WIRE_SWIMMING => Ok(Self::Swimming),
            WIRE_FLYING => Ok(Self::Flying),
            WIRE_CUSTOM => CustomMode::from_wire(custom)
                .map(Self::Custom)
                .ok_or(MovementError::UnknownMode(mode, custom)),
            _ => Err(MovementError::UnknownMode(mode, custom)),
        }
    }
}

impl fmt::Display for MovementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Walking => write!(f, "Walking"),
            Self::Falling => write!(f, "Falling"),
            Self::Swimming => write!(f, "Swimming"),
            Self::Flying => write!(f, "Flying"),
            Self::Custom(custom) => write!(f, "Custom({:?})", custom),
        }
    }
}
