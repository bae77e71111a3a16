//! Mercator Sectors
//!
//! A sector is a rectangle in Mercator space. The vertical axis is the
//! normalized Mercator ordinate `y` in `[-1, 1]` (`y = 1` is the top edge of
//! the Web Mercator square, roughly 85.0511° north); the horizontal axis is
//! longitude in degrees. Bisecting in `y` rather than in latitude keeps every
//! child tile square in projected space, which is what the imagery is
//! rendered in.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::geometry::{DVec2, DVec3};
use crate::globe::Globe;

/// Latitude of the Mercator ordinate `y = 1`, in degrees
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_59;

/// Converts a normalized Mercator ordinate to latitude in degrees
pub fn gudermannian(y: f64) -> f64 {
    (y * PI).sinh().atan().to_degrees()
}

/// Converts a latitude in degrees to the normalized Mercator ordinate
pub fn gudermannian_inverse(latitude: f64) -> f64 {
    if latitude >= MAX_MERCATOR_LATITUDE {
        return 1.0;
    }
    if latitude <= -MAX_MERCATOR_LATITUDE {
        return -1.0;
    }
    latitude.to_radians().tan().asinh() / PI
}

/// Rectangle in (Mercator y, longitude) space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MercatorSector {
    pub min_y: f64,
    pub max_y: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl MercatorSector {
    /// The whole Web Mercator square
    pub const FULL_SPHERE: Self = Self {
        min_y: -1.0,
        max_y: 1.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };

    /// Create a sector from Mercator ordinates and longitudes
    pub fn new(min_y: f64, max_y: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_y,
            max_y,
            min_lon,
            max_lon,
        }
    }

    /// Create a sector from geographic latitudes and longitudes in degrees
    pub fn from_degrees(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self::new(
            gudermannian_inverse(min_lat),
            gudermannian_inverse(max_lat),
            min_lon,
            max_lon,
        )
    }

    /// Southern edge latitude in degrees
    pub fn min_latitude(&self) -> f64 {
        gudermannian(self.min_y)
    }

    /// Northern edge latitude in degrees
    pub fn max_latitude(&self) -> f64 {
        gudermannian(self.max_y)
    }

    /// Height of the sector in Mercator units
    pub fn delta_y(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Width of the sector in degrees of longitude
    pub fn delta_lon(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Geographic height of the sector in radians
    pub fn delta_lat_radians(&self) -> f64 {
        (self.max_latitude() - self.min_latitude()).to_radians()
    }

    /// Area in (Mercator y × degrees) units
    pub fn projected_area(&self) -> f64 {
        self.delta_y() * self.delta_lon()
    }

    /// Check that the bounds are finite, ordered, and inside the Mercator square
    pub fn is_valid(&self) -> bool {
        [self.min_y, self.max_y, self.min_lon, self.max_lon]
            .iter()
            .all(|v| v.is_finite())
            && self.min_y < self.max_y
            && self.min_lon < self.max_lon
            && self.min_y >= -1.0
            && self.max_y <= 1.0
            && self.min_lon >= -180.0
            && self.max_lon <= 180.0
    }

    /// Check whether two sectors overlap, edges included
    pub fn intersects(&self, other: &MercatorSector) -> bool {
        self.min_y <= other.max_y
            && self.max_y >= other.min_y
            && self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
    }

    /// Check whether two sectors share interior area
    pub fn intersects_interior(&self, other: &MercatorSector) -> bool {
        self.min_y < other.max_y
            && self.max_y > other.min_y
            && self.min_lon < other.max_lon
            && self.max_lon > other.min_lon
    }

    /// Check whether a geographic position (degrees) lies inside the sector.
    /// Latitudes beyond the Mercator limit are never contained.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        if latitude.abs() > MAX_MERCATOR_LATITUDE {
            return false;
        }
        let y = gudermannian_inverse(latitude);
        y >= self.min_y && y <= self.max_y && longitude >= self.min_lon && longitude <= self.max_lon
    }

    /// Check whether `other` lies entirely inside this sector
    pub fn contains_sector(&self, other: &MercatorSector) -> bool {
        other.min_y >= self.min_y
            && other.max_y <= self.max_y
            && other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
    }

    /// Split into four quadrants: south-west, south-east, north-west, north-east
    pub fn bisect(&self) -> [MercatorSector; 4] {
        let mid_y = (self.min_y + self.max_y) * 0.5;
        let mid_lon = (self.min_lon + self.max_lon) * 0.5;

        [
            Self::new(self.min_y, mid_y, self.min_lon, mid_lon),
            Self::new(self.min_y, mid_y, mid_lon, self.max_lon),
            Self::new(mid_y, self.max_y, self.min_lon, mid_lon),
            Self::new(mid_y, self.max_y, mid_lon, self.max_lon),
        ]
    }

    /// Geographic centroid in degrees (latitude, longitude)
    pub fn centroid(&self) -> (f64, f64) {
        (
            gudermannian((self.min_y + self.max_y) * 0.5),
            (self.min_lon + self.max_lon) * 0.5,
        )
    }

    /// Corner points on the globe (SW, SE, NE, NW) at the given vertical exaggeration
    pub fn corner_points(&self, globe: &dyn Globe, exaggeration: f64) -> [DVec3; 4] {
        let (min_lat, max_lat) = (self.min_latitude(), self.max_latitude());
        let point = |lat: f64, lon: f64| {
            globe.compute_point(lat, lon, globe.elevation(lat, lon) * exaggeration)
        };

        [
            point(min_lat, self.min_lon),
            point(min_lat, self.max_lon),
            point(max_lat, self.max_lon),
            point(max_lat, self.min_lon),
        ]
    }

    /// Centroid point on the globe at the given vertical exaggeration
    pub fn center_point(&self, globe: &dyn Globe, exaggeration: f64) -> DVec3 {
        let (lat, lon) = self.centroid();
        globe.compute_point(lat, lon, globe.elevation(lat, lon) * exaggeration)
    }

    /// Transform mapping this sector's unit texture coordinates into the
    /// texture coordinates of an enclosing `ancestor` sector.
    ///
    /// `ancestor_uv = uv * scale + offset`
    pub fn texture_transform_within(&self, ancestor: &MercatorSector) -> TextureTransform {
        let scale = DVec2::new(
            self.delta_lon() / ancestor.delta_lon(),
            self.delta_y() / ancestor.delta_y(),
        );
        let offset = DVec2::new(
            (self.min_lon - ancestor.min_lon) / ancestor.delta_lon(),
            (self.min_y - ancestor.min_y) / ancestor.delta_y(),
        );
        TextureTransform { scale, offset }
    }
}

impl std::fmt::Display for MercatorSector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.6}°, {:.6}°) - ({:.6}°, {:.6}°)",
            self.min_latitude(),
            self.min_lon,
            self.max_latitude(),
            self.max_lon
        )
    }
}

/// Texture coordinate remapping for drawing a tile with an ancestor's texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureTransform {
    pub scale: DVec2,
    pub offset: DVec2,
}

impl TextureTransform {
    /// The identity transform, for tiles drawn with their own texture
    pub const IDENTITY: Self = Self {
        scale: DVec2::ONE,
        offset: DVec2::ZERO,
    };

    /// Apply the transform to a texture coordinate
    pub fn apply(&self, uv: DVec2) -> DVec2 {
        uv * self.scale + self.offset
    }
}
