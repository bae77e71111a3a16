//! Tile identity and descriptors.

use serde::{Deserialize, Serialize};

use crate::geometry::{Aabb, DVec3};
use crate::globe::Globe;
use crate::sector::MercatorSector;

/// Samples per sector edge when building a bounding volume
const EXTENT_SAMPLES: usize = 5;

/// Hashable tile identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub level: u32,
    pub row: i64,
    pub col: i64,
}

impl TileKey {
    /// Create a key from its components
    pub fn new(level: u32, row: i64, col: i64) -> Self {
        Self { level, row, col }
    }

    /// Key of the tile one level up that contains this one
    pub fn parent(&self) -> Option<TileKey> {
        (self.level > 0).then(|| TileKey::new(self.level - 1, self.row.div_euclid(2), self.col.div_euclid(2)))
    }

    /// Check whether `self` is `other` or one of its ancestors
    pub fn is_ancestor_or_self_of(&self, other: &TileKey) -> bool {
        if self.level > other.level {
            return false;
        }
        let shift = other.level - self.level;
        other.row >> shift == self.row && other.col >> shift == self.col
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.col)
    }
}

/// Immutable tile: identity plus the sector it covers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileDescriptor {
    pub key: TileKey,
    pub sector: MercatorSector,
}

impl TileDescriptor {
    /// Create a descriptor
    pub fn new(key: TileKey, sector: MercatorSector) -> Self {
        Self { key, sector }
    }

    /// Zoom level
    pub fn level(&self) -> u32 {
        self.key.level
    }

    /// Row, counted northward from the tiling origin
    pub fn row(&self) -> i64 {
        self.key.row
    }

    /// Column, counted eastward from the tiling origin
    pub fn col(&self) -> i64 {
        self.key.col
    }

    /// The four tiles at the next level, ordered SW, SE, NW, NE
    pub fn children(&self) -> [TileDescriptor; 4] {
        let [sw, se, nw, ne] = self.sector.bisect();
        let (row, col, level) = (self.key.row * 2, self.key.col * 2, self.key.level + 1);

        [
            TileDescriptor::new(TileKey::new(level, row, col), sw),
            TileDescriptor::new(TileKey::new(level, row, col + 1), se),
            TileDescriptor::new(TileKey::new(level, row + 1, col), nw),
            TileDescriptor::new(TileKey::new(level, row + 1, col + 1), ne),
        ]
    }

    /// Conservative Cartesian bounding box of the tile's surface.
    ///
    /// The sector is sampled on a grid at the terrain's minimum and maximum
    /// elevation, then inflated by the sagitta of the widest sample span so
    /// that the curved surface between samples stays inside the box.
    pub fn extent(&self, globe: &dyn Globe, exaggeration: f64) -> Aabb {
        let (min_elev, max_elev) = globe.elevation_bounds(&self.sector);
        let elevations = [min_elev * exaggeration, max_elev * exaggeration];
        let steps = (EXTENT_SAMPLES - 1) as f64;

        let (min_lat, max_lat) = (self.sector.min_latitude(), self.sector.max_latitude());

        let mut aabb = Aabb::EMPTY;
        for i in 0..EXTENT_SAMPLES {
            let lat = min_lat + (max_lat - min_lat) * i as f64 / steps;
            for j in 0..EXTENT_SAMPLES {
                let lon = self.sector.min_lon + self.sector.delta_lon() * j as f64 / steps;
                for elevation in elevations {
                    aabb.expand_to_include(globe.compute_point(lat, lon, elevation));
                }
            }
        }

        // Widest gap between neighbouring samples, measured across the cell diagonal
        let span = self
            .sector
            .delta_lat_radians()
            .max(self.sector.delta_lon().to_radians())
            / steps
            * std::f64::consts::SQRT_2;
        let radius = globe.radius() + elevations[1].max(0.0);
        aabb.inflate(radius * (1.0 - (span * 0.5).cos()))
    }

    /// Cartesian centroid of the tile on the globe surface
    pub fn centroid_point(&self, globe: &dyn Globe) -> DVec3 {
        self.sector.center_point(globe, 1.0)
    }

    /// Debug label, `level/row/col`
    pub fn label(&self) -> String {
        self.key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globe::SphereGlobe;

    fn root() -> TileDescriptor {
        TileDescriptor::new(TileKey::new(0, 1, 2), MercatorSector::new(0.0, 1.0, 0.0, 90.0))
    }

    #[test]
    fn test_children_keys() {
        let children = root().children();
        let keys: Vec<_> = children.iter().map(|c| c.key).collect();
        assert_eq!(
            keys,
            vec![
                TileKey::new(1, 2, 4),
                TileKey::new(1, 2, 5),
                TileKey::new(1, 3, 4),
                TileKey::new(1, 3, 5),
            ]
        );
        for child in &children {
            assert_eq!(child.key.parent(), Some(root().key));
            assert!(root().key.is_ancestor_or_self_of(&child.key));
        }
    }

    #[test]
    fn test_children_cover_parent() {
        let parent = root();
        let area: f64 = parent.children().iter().map(|c| c.sector.projected_area()).sum();
        assert!((area - parent.sector.projected_area()).abs() < 1e-12);
    }

    #[test]
    fn test_ancestry() {
        let leaf = TileKey::new(3, 13, 6);
        assert!(TileKey::new(0, 1, 0).is_ancestor_or_self_of(&leaf));
        assert!(TileKey::new(2, 6, 3).is_ancestor_or_self_of(&leaf));
        assert!(leaf.is_ancestor_or_self_of(&leaf));
        assert!(!TileKey::new(2, 6, 2).is_ancestor_or_self_of(&leaf));
        assert!(!leaf.is_ancestor_or_self_of(&TileKey::new(2, 6, 3)));
        assert_eq!(TileKey::new(0, 0, 0).parent(), None);
    }

    #[test]
    fn test_extent_contains_surface() {
        let globe = SphereGlobe::earth();
        let tile = root();
        let extent = tile.extent(&globe, 1.0);

        for (lat, lon) in [(10.0, 10.0), (45.0, 45.0), (80.0, 89.0), (0.0, 0.0)] {
            let p = globe.compute_point(lat, lon, 0.0);
            assert!(extent.contains_point(p), "({lat}, {lon}) outside extent");
        }
        assert!(extent.contains_point(tile.centroid_point(&globe)));
    }

    #[test]
    fn test_label() {
        assert_eq!(root().label(), "0/1/2");
    }
}
