//! Physics-related types: the axis-aligned box used for hitbox queries and collision clipping.

use bevy_math::DVec3;
use serde::{Deserialize, Serialize};

/// An axis-aligned box in world space, `min` inclusive, `max` exclusive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Corner with the smallest coordinates.
    pub min: DVec3,
    /// Corner with the largest coordinates.
    pub max: DVec3,
}

impl Aabb {
    /// Constructs a box from two corners; the caller keeps `min <= max` per axis.
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// The unit cube whose minimum corner sits at the given integer coordinate.
    pub fn unit_cube(corner: DVec3) -> Self {
        Self {
            min: corner,
            max: corner + DVec3::ONE,
        }
    }

    /// Moves the box by the given offset.
    pub fn translate(&mut self, delta: DVec3) {
        self.min += delta;
        self.max += delta;
    }

    /// Returns the box covering this box swept along the given motion.
    pub fn expand(&self, motion: DVec3) -> Self {
        Self {
            min: self.min + motion.min(DVec3::ZERO),
            max: self.max + motion.max(DVec3::ZERO),
        }
    }

    /// Whether the two boxes overlap on every axis.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    fn overlaps_axes(&self, other: &Aabb, a: usize, b: usize) -> bool {
        self.min[a] < other.max[a]
            && self.max[a] > other.min[a]
            && self.min[b] < other.max[b]
            && self.max[b] > other.min[b]
    }

    fn clip_axis(&self, other: &Aabb, axis: usize, skip_a: usize, skip_b: usize, motion: f64) -> f64 {
        if !self.overlaps_axes(other, skip_a, skip_b) {
            return motion;
        }
        if motion > 0.0 && self.max[axis] <= other.min[axis] {
            motion.min(other.min[axis] - self.max[axis])
        } else if motion < 0.0 && self.min[axis] >= other.max[axis] {
            motion.max(other.max[axis] - self.min[axis])
        } else {
            motion
        }
    }

    /// Largest X motion this box can make before touching `other`.
    pub fn clip_move_x(&self, other: &Aabb, motion: f64) -> f64 {
        self.clip_axis(other, 0, 1, 2, motion)
    }

    /// Largest Y motion this box can make before touching `other`.
    pub fn clip_move_y(&self, other: &Aabb, motion: f64) -> f64 {
        self.clip_axis(other, 1, 0, 2, motion)
    }

    /// Largest Z motion this box can make before touching `other`.
    pub fn clip_move_z(&self, other: &Aabb, motion: f64) -> f64 {
        self.clip_axis(other, 2, 0, 1, motion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_at(x: f64, y: f64, z: f64) -> Aabb {
        Aabb::unit_cube(DVec3::new(x, y, z))
    }

    #[test]
    fn expansion_covers_motion() {
        let swept = unit_at(0.0, 0.0, 0.0).expand(DVec3::new(2.0, -1.5, 0.0));
        assert_eq!(swept.min, DVec3::new(0.0, -1.5, 0.0));
        assert_eq!(swept.max, DVec3::new(3.0, 1.0, 1.0));
    }

    #[test]
    fn falling_box_clips_on_floor() {
        let body = Aabb::new(DVec3::new(0.2, 1.0, 0.2), DVec3::new(0.8, 2.0, 0.8));
        let floor = unit_at(0.0, 0.0, 0.0);
        assert_eq!(body.clip_move_y(&floor, -0.5), -0.0);
        assert_eq!(body.clip_move_y(&floor, 0.5), 0.5);

        let tall = Aabb::new(DVec3::new(0.2, 1.5, 0.2), DVec3::new(0.8, 2.5, 0.8));
        assert_eq!(tall.clip_move_y(&floor, -2.0), -0.5);
    }

    #[test]
    fn side_motion_ignores_out_of_plane_boxes() {
        let body = unit_at(0.0, 0.0, 0.0);
        let wall = unit_at(2.0, 0.0, 0.0);
        let far_wall = unit_at(2.0, 5.0, 0.0);
        assert_eq!(body.clip_move_x(&wall, 3.0), 1.0);
        // No Y overlap: no clipping.
        assert_eq!(body.clip_move_x(&far_wall, 3.0), 3.0);
        // Motion away from the wall is unrestricted.
        assert_eq!(body.clip_move_x(&wall, -3.0), -3.0);
    }

    #[test]
    fn intersection_is_exclusive_on_touch() {
        let a = unit_at(0.0, 0.0, 0.0);
        assert!(!a.intersects(&unit_at(1.0, 0.0, 0.0)));
        assert!(a.intersects(&unit_at(0.5, 0.5, 0.5)));
    }
}
