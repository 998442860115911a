//! Water volumes and the swimming-facing water query

use glam::Vec3;
use serde::{Deserialize, Serialize};
use traverse_core::EntityId;

/// Water sampled at a character location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterInfo {
    /// Owning water body
    pub body: EntityId,
    /// Point on the water surface directly above or below the query
    pub surface_location: Vec3,
    pub surface_normal: Vec3,
    /// Current flow velocity
    pub velocity: Vec3,
    /// Distance from the surface to the bottom of the volume
    pub depth: f32,
}

/// Lookup of the water body a character is in
pub trait WaterQuery {
    /// Water overlapped by a character centered at `location` whose extent
    /// above and below the center is `half_height`
    fn water_info(&self, location: Vec3, half_height: f32) -> Option<WaterInfo>;
}

/// Axis-aligned body of water with a flat surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaterVolume {
    pub id: EntityId,
    /// Minimum corner; `min.z` is the floor of the volume
    pub min: Vec3,
    /// Maximum corner; `max.z` is the water surface
    pub max: Vec3,
    /// River flow
    pub velocity: Vec3,
}

impl WaterVolume {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            id: EntityId::new(),
            min: min.min(max),
            max: max.max(min),
            velocity: Vec3::ZERO,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn surface_z(&self) -> f32 {
        self.max.z
    }

    fn overlaps(&self, location: Vec3, half_height: f32) -> bool {
        location.x >= self.min.x
            && location.x <= self.max.x
            && location.y >= self.min.y
            && location.y <= self.max.y
            && location.z - half_height <= self.max.z
            && location.z + half_height >= self.min.z
    }

    fn info(&self, location: Vec3) -> WaterInfo {
        WaterInfo {
            body: self.id,
            surface_location: Vec3::new(location.x, location.y, self.max.z),
            surface_normal: Vec3::Z,
            velocity: self.velocity,
            depth: self.max.z - self.min.z,
        }
    }
}

impl WaterQuery for Vec<WaterVolume> {
    fn water_info(&self, location: Vec3, half_height: f32) -> Option<WaterInfo> {
        // Highest surface wins when volumes overlap
        self.iter()
            .filter(|v| v.overlaps(location, half_height))
            .max_by(|a, b| a.max.z.total_cmp(&b.max.z))
            .map(|v| v.info(location))
    }
}
