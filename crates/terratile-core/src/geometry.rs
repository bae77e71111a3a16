//! Geometry
//!
//! Double-precision bounding volumes and view frustum used for tile culling.
//! Globe-scale coordinates overflow the useful precision of `f32`, so
//! everything here is built on glam's `f64` types.

pub use glam::{DMat4, DVec2, DVec3, DVec4};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: DVec3,
    /// Maximum corner
    pub max: DVec3,
}

impl Aabb {
    /// An empty box that any point expands
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    /// Create an AABB from min and max corners
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point
    pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Self {
        let mut result = Self::EMPTY;
        for point in points {
            result.expand_to_include(point);
        }
        result
    }

    /// Get the center of the AABB
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the full size of the AABB
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Check if the AABB is empty
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Check if a point is inside the AABB
    pub fn contains_point(&self, point: DVec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Expand the AABB to include a point
    pub fn expand_to_include(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow the box by `margin` on every side
    pub fn inflate(&self, margin: f64) -> Aabb {
        Aabb {
            min: self.min - DVec3::splat(margin),
            max: self.max + DVec3::splat(margin),
        }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A plane in 3D space (ax + by + cz + d = 0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector
    pub normal: DVec3,
    /// Distance from origin
    pub distance: f64,
}

impl Plane {
    /// Create a new plane
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Get the signed distance from a point to the plane
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }
}

/// View frustum (left, right, bottom, top, near, far)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract the frustum planes from an OpenGL-style view-projection matrix
    pub fn from_matrix(matrix: DMat4) -> Self {
        let rows = [matrix.row(0), matrix.row(1), matrix.row(2), matrix.row(3)];

        Self {
            planes: [
                Self::normalize_plane(rows[3] + rows[0]),
                Self::normalize_plane(rows[3] - rows[0]),
                Self::normalize_plane(rows[3] + rows[1]),
                Self::normalize_plane(rows[3] - rows[1]),
                Self::normalize_plane(rows[3] + rows[2]),
                Self::normalize_plane(rows[3] - rows[2]),
            ],
        }
    }

    /// A frustum that contains all of space. Useful for offscreen capture
    /// passes that must see every tile.
    pub fn unbounded() -> Self {
        Self {
            planes: [Plane::new(DVec3::ZERO, 1.0); 6],
        }
    }

    fn normalize_plane(plane: DVec4) -> Plane {
        let normal = plane.truncate();
        let length = normal.length();
        if length > 0.0 {
            Plane::new(normal / length, plane.w / length)
        } else {
            Plane::new(DVec3::ZERO, 0.0)
        }
    }

    /// Check if a point is inside the frustum
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if an AABB intersects the frustum
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }

        for plane in &self.planes {
            // Positive vertex: the corner furthest along the plane normal
            let p = DVec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );

            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}
