//! Notification and capability interfaces implemented by the character
//!
//! The movement core calls these synchronously, once per transition edge,
//! before the new mode integrates. Every method has an empty default so a
//! character only overrides what its animation or gameplay layer consumes.

use glam::Vec3;
use traverse_physics::HitResult;

use crate::mode::MovementMode;

/// Generic locomotion edges
pub trait LocomotionNotify {
    fn on_movement_mode_changed(&mut self, _previous: MovementMode, _current: MovementMode) {}
    fn on_enter_slide(&mut self) {}
    fn on_exit_slide(&mut self) {}
    fn on_landed(&mut self, _hit: &HitResult) {}
    fn on_jump_out_of_water(&mut self) {}
    /// The capsule shrank by `half_height_adjust`
    fn on_start_crouch(&mut self, _half_height_adjust: f32) {}
    fn on_end_crouch(&mut self, _half_height_adjust: f32) {}
}

/// Climbing edges
pub trait ClimbNotifiable {
    /// The climb predicate held long enough and the climb intent was set
    fn on_auto_try_climb(&mut self) {}
    fn on_climb_to_walk(&mut self) {}
    fn on_climb_down_to_floor(&mut self) {}
    fn on_enter_climb_dash(&mut self) {}
    fn on_exit_climb_dash(&mut self) {}
}

/// Situation a mantle is attempted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MantleKind {
    Swimming,
    FreeClimb,
    Gliding,
}

/// Ledge mantling owned by the character
pub trait MantleCapable {
    /// Start a mantle over a ledge in front of `location`; returns whether
    /// the character took over
    fn try_mantle(&mut self, _kind: MantleKind, _location: Vec3, _forward: Vec3) -> bool {
        false
    }
}

/// Everything the movement core needs from its character
pub trait CharacterHooks: LocomotionNotify + ClimbNotifiable + MantleCapable {}

impl<T: LocomotionNotify + ClimbNotifiable + MantleCapable> CharacterHooks for T {}

/// Character with no animation or gameplay layer attached
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl LocomotionNotify for NoHooks {}
impl ClimbNotifiable for NoHooks {}
impl MantleCapable for NoHooks {}

/// A notification as recorded by [`HookRecorder`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocomotionEvent {
    ModeChanged(MovementMode, MovementMode),
    EnterSlide,
    ExitSlide,
    Landed,
    JumpOutOfWater,
    StartCrouch,
    EndCrouch,
    AutoTryClimb,
    ClimbToWalk,
    ClimbDownToFloor,
    EnterClimbDash,
    ExitClimbDash,
    Mantle(MantleKind),
}

/// Records every notification in order
#[derive(Debug, Clone, Default)]
pub struct HookRecorder {
    pub events: Vec<LocomotionEvent>,
    /// Answer given to mantle attempts
    pub accept_mantle: bool,
}

impl HookRecorder {
    pub fn count(&self, event: LocomotionEvent) -> usize {
        self.events.iter().filter(|e| **e == event).count()
    }

    /// Drain the recorded events
    pub fn take(&mut self) -> Vec<LocomotionEvent> {
        std::mem::take(&mut self.events)
    }
}

impl LocomotionNotify for HookRecorder {
    fn on_movement_mode_changed(&mut self, previous: MovementMode, current: MovementMode) {
        self.events
            .push(LocomotionEvent::ModeChanged(previous, current));
    }

    fn on_enter_slide(&mut self) {
        self.events.push(LocomotionEvent::EnterSlide);
    }

    fn on_exit_slide(&mut self) {
        self.events.push(LocomotionEvent::ExitSlide);
    }

    fn on_landed(&mut self, _hit: &HitResult) {
        self.events.push(LocomotionEvent::Landed);
    }

    fn on_jump_out_of_water(&mut self) {
        self.events.push(LocomotionEvent::JumpOutOfWater);
    }

    fn on_start_crouch(&mut self, _half_height_adjust: f32) {
        self.events.push(LocomotionEvent::StartCrouch);
    }

    fn on_end_crouch(&mut self, _half_height_adjust: f32) {
        self.events.push(LocomotionEvent::EndCrouch);
    }
}

impl ClimbNotifiable for HookRecorder {
    fn on_auto_try_climb(&mut self) {
        self.events.push(LocomotionEvent::AutoTryClimb);
    }

    fn on_climb_to_walk(&mut self) {
        self.events.push(LocomotionEvent::ClimbToWalk);
    }

    fn on_climb_down_to_floor(&mut self) {
        self.events.push(LocomotionEvent::ClimbDownToFloor);
    }

    fn on_enter_climb_dash(&mut self) {
        self.events.push(LocomotionEvent::EnterClimbDash);
    }

    fn on_exit_climb_dash(&mut self) {
        self.events.push(LocomotionEvent::ExitClimbDash);
    }
}

impl MantleCapable for HookRecorder {
    fn try_mantle(&mut self, kind: MantleKind, _location: Vec3, _forward: Vec3) -> bool {
        if self.accept_mantle {
            self.events.push(LocomotionEvent::Mantle(kind));
        }
        self.accept_mantle
    }
}
