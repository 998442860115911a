//! Swing rope shape and force accumulation
//!
//! The rope itself is a chain of simulated capsule segments owned by the
//! physics world. Characters only see this spline view: an ordered list of
//! points addressed by distance from the top, plus an additive force queue
//! the world drains once per physics step.

use std::sync::Arc;

use glam::Vec3;
use parking_lot::Mutex;
use traverse_core::EntityId;

/// Shared handle to a rope
pub type SharedRope = Arc<Mutex<SwingRope>>;

/// Force queued against one rope segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RopeForce {
    pub segment: usize,
    pub force: Vec3,
    pub location: Vec3,
}

#[derive(Debug, Clone)]
pub struct SwingRope {
    pub id: EntityId,
    /// Segment tops followed by the bottom of the last segment
    points: Vec<Vec3>,
    pending_forces: Vec<RopeForce>,
    riders: Vec<EntityId>,
}

impl SwingRope {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self {
            id: EntityId::new(),
            points,
            pending_forces: Vec::new(),
            riders: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedRope {
        Arc::new(Mutex::new(self))
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn set_points(&mut self, points: Vec<Vec3>) {
        self.points = points;
    }

    /// Total length of the spline
    pub fn max_distance(&self) -> f32 {
        self.points.windows(2).map(|w| w[0].distance(w[1])).sum()
    }

    pub fn location_at_distance(&self, distance: f32) -> Vec3 {
        let Some(first) = self.points.first() else {
            return Vec3::ZERO;
        };
        let mut remaining = distance.max(0.0);
        for w in self.points.windows(2) {
            let len = w[0].distance(w[1]);
            if remaining <= len {
                if len <= f32::EPSILON {
                    return w[0];
                }
                return w[0].lerp(w[1], remaining / len);
            }
            remaining -= len;
        }
        self.points.last().copied().unwrap_or(*first)
    }

    /// Distance along the spline of the point closest to `location`
    pub fn distance_at_location(&self, location: Vec3) -> f32 {
        let mut best = (f32::MAX, 0.0);
        let mut travelled = 0.0;
        for w in self.points.windows(2) {
            let seg = w[1] - w[0];
            let len_sq = seg.length_squared();
            let t = if len_sq > f32::EPSILON {
                ((location - w[0]).dot(seg) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let closest = w[0] + seg * t;
            let dist_sq = closest.distance_squared(location);
            if dist_sq < best.0 {
                best = (dist_sq, travelled + len_sq.sqrt() * t);
            }
            travelled += len_sq.sqrt();
        }
        best.1
    }

    /// Shortest distance from `location` to the rope
    pub fn distance_to(&self, location: Vec3) -> f32 {
        let along = self.distance_at_location(location);
        self.location_at_distance(along).distance(location)
    }

    /// Index of the segment containing `distance`, clamped to the last segment
    pub fn segment_at_distance(&self, distance: f32) -> usize {
        let last_segment = self.points.len().saturating_sub(2);
        let mut travelled = 0.0;
        for (i, w) in self.points.windows(2).enumerate() {
            travelled += w[0].distance(w[1]);
            if distance < travelled {
                return i.min(last_segment);
            }
        }
        last_segment
    }

    pub fn add_force_at_segment(&mut self, segment: usize, force: Vec3, location: Vec3) {
        self.pending_forces.push(RopeForce {
            segment,
            force,
            location,
        });
    }

    /// Remove and return every force queued since the last drain
    pub fn drain_forces(&mut self) -> Vec<RopeForce> {
        std::mem::take(&mut self.pending_forces)
    }

    pub fn add_rider(&mut self, rider: EntityId) {
        if !self.riders.contains(&rider) {
            self.riders.push(rider);
        }
    }

    pub fn remove_rider(&mut self, rider: EntityId) {
        self.riders.retain(|r| *r != rider);
    }

    pub fn riders(&self) -> &[EntityId] {
        &self.riders
    }
}

/// Rope nearest to `location` within `reach`
pub fn nearest_rope(ropes: &[SharedRope], location: Vec3, reach: f32) -> Option<SharedRope> {
    ropes
        .iter()
        .map(|rope| (rope.lock().distance_to(location), rope))
        .filter(|(dist, _)| *dist <= reach)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, rope)| Arc::clone(rope))
}
