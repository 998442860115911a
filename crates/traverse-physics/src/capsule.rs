//! Upright character capsule moved by the movement component

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use traverse_core::Transform;

use crate::query::CollisionShape;

/// Character collision capsule
///
/// The transform position is the capsule center. `half_height` is measured
/// from the center to the tip of a cap, so it is never smaller than `radius`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapsuleComponent {
    pub transform: Transform,
    pub radius: f32,
    pub half_height: f32,
}

impl CapsuleComponent {
    pub fn new(location: Vec3, radius: f32, half_height: f32) -> Self {
        Self {
            transform: Transform::from_position(location),
            radius,
            half_height: half_height.max(radius),
        }
    }

    pub fn location(&self) -> Vec3 {
        self.transform.position
    }

    pub fn set_location(&mut self, location: Vec3) {
        self.transform.position = location;
    }

    pub fn rotation(&self) -> Quat {
        self.transform.rotation
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation.normalize();
    }

    pub fn forward(&self) -> Vec3 {
        self.transform.forward()
    }

    pub fn right(&self) -> Vec3 {
        self.transform.right()
    }

    pub fn up(&self) -> Vec3 {
        self.transform.up()
    }

    /// Lowest point of the capsule
    pub fn bottom(&self) -> Vec3 {
        self.location() - Vec3::Z * self.half_height
    }

    pub fn shape(&self) -> CollisionShape {
        CollisionShape::capsule(self.radius, self.half_height)
    }

    /// Resize the capsule; `keep_base` keeps the bottom in place
    pub fn set_size(&mut self, radius: f32, half_height: f32, keep_base: bool) {
        let half_height = half_height.max(radius);
        if keep_base {
            let delta = half_height - self.half_height;
            self.transform.position.z += delta;
        }
        self.radius = radius;
        self.half_height = half_height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capsule_bottom() {
        let capsule = CapsuleComponent::new(Vec3::new(0.0, 0.0, 75.0), 30.0, 75.0);
        assert_eq!(capsule.bottom(), Vec3::ZERO);
    }

    #[test]
    fn test_resize_keeps_base() {
        let mut capsule = CapsuleComponent::new(Vec3::new(0.0, 0.0, 75.0), 30.0, 75.0);
        capsule.set_size(30.0, 60.0, true);
        assert_eq!(capsule.bottom(), Vec3::ZERO);
        assert_eq!(capsule.location().z, 60.0);

        capsule.set_size(30.0, 90.0, false);
        assert_eq!(capsule.location().z, 60.0);
        assert_eq!(capsule.half_height, 90.0);
    }
}
