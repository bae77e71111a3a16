//! Globe model used to place tiles in Cartesian space.

use crate::geometry::DVec3;
use crate::sector::MercatorSector;

/// WGS84 equatorial radius in meters
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Provider of globe geometry
pub trait Globe: Send + Sync {
    /// Radius in meters
    fn radius(&self) -> f64;

    /// Cartesian point for a geographic position (degrees) and elevation in meters.
    ///
    /// Axes follow the usual globe convention: +Y through the north pole,
    /// +Z through (0°, 0°), +X through (0°, 90°E).
    fn compute_point(&self, latitude: f64, longitude: f64, elevation: f64) -> DVec3;

    /// Terrain elevation at a position, in meters
    fn elevation(&self, _latitude: f64, _longitude: f64) -> f64 {
        0.0
    }

    /// Minimum and maximum terrain elevation inside a sector
    fn elevation_bounds(&self, _sector: &MercatorSector) -> (f64, f64) {
        (0.0, 0.0)
    }
}

/// Perfect sphere with no terrain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereGlobe {
    radius: f64,
}

impl SphereGlobe {
    /// Create a sphere of the given radius
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }

    /// An Earth-sized sphere
    pub fn earth() -> Self {
        Self::new(EARTH_RADIUS)
    }
}

impl Default for SphereGlobe {
    fn default() -> Self {
        Self::earth()
    }
}

impl Globe for SphereGlobe {
    fn radius(&self) -> f64 {
        self.radius
    }

    fn compute_point(&self, latitude: f64, longitude: f64, elevation: f64) -> DVec3 {
        let (lat, lon) = (latitude.to_radians(), longitude.to_radians());
        let r = self.radius + elevation;
        DVec3::new(
            r * lat.cos() * lon.sin(),
            r * lat.sin(),
            r * lat.cos() * lon.cos(),
        )
    }
}
