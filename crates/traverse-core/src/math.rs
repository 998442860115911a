//! Math helpers shared by the probe layer and the movement integrators
//!
//! Conventions: Z is up, angles are handed around in degrees at the settings
//! boundary and converted here.

use std::f32::consts::PI;

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Threshold for "nearly zero" comparisons on lengths and dot products
pub const KINDA_SMALL_NUMBER: f32 = 1.0e-4;
/// Threshold for squared-length comparisons
pub const SMALL_NUMBER: f32 = 1.0e-8;

/// Normalize, returning zero for degenerate input
pub fn safe_normal(v: Vec3) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq < SMALL_NUMBER {
        Vec3::ZERO
    } else {
        v / len_sq.sqrt()
    }
}

/// Normalize the horizontal part of a vector, dropping Z
pub fn safe_normal_2d(v: Vec3) -> Vec3 {
    safe_normal(Vec3::new(v.x, v.y, 0.0))
}

/// Horizontal part of a vector
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, 0.0)
}

/// Project `v` onto the plane with normal `n`
pub fn vector_plane_project(v: Vec3, n: Vec3) -> Vec3 {
    v - n * v.dot(n)
}

/// Project `v` onto the unit direction `n`
pub fn project_onto_normal(v: Vec3, n: Vec3) -> Vec3 {
    n * v.dot(n)
}

/// Angle in degrees between two unit vectors
///
/// The dot product is clamped before `acos` so values marginally outside
/// [-1, 1] from float error do not produce NaN.
pub fn degrees_between(a: Vec3, b: Vec3) -> f32 {
    a.dot(b).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Returns true if `v` is within `tolerance` of the zero vector on every axis
pub fn is_nearly_zero(v: Vec3, tolerance: f32) -> bool {
    v.x.abs() <= tolerance && v.y.abs() <= tolerance && v.z.abs() <= tolerance
}

pub fn clamp_length(v: Vec3, max: f32) -> Vec3 {
    v.clamp_length_max(max.max(0.0))
}

/// Build a rotation whose local +X axis points along `x`
///
/// Z is used as the reference up unless `x` is nearly vertical, in which case
/// world X is used. Returns identity for a zero direction.
pub fn rotation_from_x(x: Vec3) -> Quat {
    let forward = safe_normal(x);
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let reference = if forward.z.abs() < 1.0 - KINDA_SMALL_NUMBER {
        Vec3::Z
    } else {
        Vec3::X
    };
    let right = reference.cross(forward).normalize();
    let up = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(forward, right, up)).normalize()
}

/// Strip pitch and roll, keeping only the heading of `rotation`
pub fn yaw_only(rotation: Quat) -> Quat {
    let forward = flatten(rotation * Vec3::X);
    if forward.length_squared() < SMALL_NUMBER {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_z(forward.y.atan2(forward.x))
}

/// Scalar exponential-style interpolation toward a target at `speed` per second
pub fn f_interp_to(current: f32, target: f32, dt: f32, speed: f32) -> f32 {
    if speed <= 0.0 {
        return target;
    }
    let dist = target - current;
    if dist * dist < SMALL_NUMBER {
        return target;
    }
    current + dist * (dt * speed).clamp(0.0, 1.0)
}

/// Spherical interpolation toward `target` at a constant fraction rate
pub fn q_interp_to(current: Quat, target: Quat, dt: f32, speed: f32) -> Quat {
    if speed <= 0.0 || current.abs_diff_eq(target, 1.0e-6) {
        return target;
    }
    let alpha = (speed * dt).clamp(0.0, 1.0);
    current.slerp(target, alpha).normalize()
}

/// Normalized-lerp quaternion interpolation along the shortest arc
pub fn interpolate_quaternion_fast(current: Quat, target: Quat, speed: f32, dt: f32) -> Quat {
    if speed <= 0.0 {
        return target;
    }
    let alpha = (speed * dt).clamp(0.0, 1.0);
    let target = if current.dot(target) < 0.0 { -target } else { target };
    current.lerp(target, alpha).normalize()
}

/// Persistent state for [`spring_damp_float`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpringFloatState {
    pub velocity: f32,
    pub previous_target: f32,
    pub state_valid: bool,
}

impl SpringFloatState {
    /// Forget the spring history; the next evaluation snaps to its target
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Damped spring toward `target`
///
/// Integrated implicitly so large `dt` stays stable. The target's own motion
/// since the previous call is fed in as target velocity, scaled by
/// `target_velocity_amount` in [0, 1]. An invalid state snaps to the target.
pub fn spring_damp_float(
    current: f32,
    target: f32,
    state: &mut SpringFloatState,
    dt: f32,
    frequency: f32,
    damping_ratio: f32,
    target_velocity_amount: f32,
) -> f32 {
    if dt <= SMALL_NUMBER {
        return current;
    }
    if !state.state_valid {
        state.velocity = 0.0;
        state.previous_target = target;
        state.state_valid = true;
        return target;
    }

    let target_velocity =
        (target - state.previous_target) * target_velocity_amount.clamp(0.0, 1.0) / dt;
    state.previous_target = target;

    let omega = 2.0 * PI * frequency;
    let omega_sq = omega * omega;
    let f = 1.0 + 2.0 * dt * damping_ratio * omega;
    let det_inv = 1.0 / (f + dt * dt * omega_sq);

    // Solve relative to the moving target
    let x = current - target;
    let v = state.velocity - target_velocity;
    let new_x = (f * x + dt * v) * det_inv;
    let new_v = (v - dt * omega_sq * x) * det_inv;

    state.velocity = new_v + target_velocity;
    target + new_x
}
