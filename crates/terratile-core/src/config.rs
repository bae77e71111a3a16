//! Configuration
//!
//! Plain configuration structs with sensible defaults. Every struct is
//! serde-deserializable with missing fields falling back to the default,
//! so a JSON file only needs to name what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};
use crate::sector::MercatorSector;

/// Default split scale for the LOD heuristic
pub const DEFAULT_SPLIT_SCALE: f64 = 0.9;

/// Default bound on fetch requests queued per frame
pub const DEFAULT_FETCH_QUEUE_CAPACITY: usize = 200;

/// Deepest pyramid supported. Row and column indices stay well inside `i64`.
pub const MAX_LEVELS: u32 = 32;

/// Latitude and longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLon {
    /// Create a new pair
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Description of an imagery pyramid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PyramidConfig {
    /// Dataset name, used in log output
    pub dataset_name: String,
    /// Root sector covered by the dataset
    pub sector: MercatorSector,
    /// Global tiling origin in degrees
    pub tile_origin: LatLon,
    /// Tile size at level 0 in degrees
    pub level_zero_tile_delta: LatLon,
    /// Number of levels in the pyramid
    pub num_levels: u32,
    /// Number of leading levels that hold no imagery
    pub empty_levels: u32,
    /// Tile width in texels
    pub tile_width: u32,
    /// Tile height in texels
    pub tile_height: u32,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            dataset_name: String::from("mercator"),
            sector: MercatorSector::FULL_SPHERE,
            tile_origin: LatLon::new(-90.0, -180.0),
            level_zero_tile_delta: LatLon::new(90.0, 90.0),
            num_levels: 19,
            empty_levels: 0,
            tile_width: 256,
            tile_height: 256,
        }
    }
}

impl PyramidConfig {
    /// Check the configuration, failing on the first problem found
    pub fn validate(&self) -> TileResult<()> {
        if self.num_levels == 0 {
            return Err(TileError::InvalidConfig("pyramid needs at least one level".into()));
        }
        if self.num_levels > MAX_LEVELS {
            return Err(TileError::InvalidConfig(format!(
                "num_levels ({}) exceeds the maximum of {MAX_LEVELS}",
                self.num_levels
            )));
        }
        if self.empty_levels >= self.num_levels {
            return Err(TileError::InvalidConfig(format!(
                "empty_levels ({}) must be less than num_levels ({})",
                self.empty_levels, self.num_levels
            )));
        }
        if !self.sector.is_valid() {
            return Err(TileError::InvalidConfig(format!("invalid sector {:?}", self.sector)));
        }
        let delta = self.level_zero_tile_delta;
        if !(delta.latitude.is_finite() && delta.latitude > 0.0 && delta.latitude <= 180.0)
            || !(delta.longitude.is_finite() && delta.longitude > 0.0 && delta.longitude <= 360.0)
        {
            return Err(TileError::InvalidConfig(format!("invalid level zero tile delta {delta:?}")));
        }
        let origin = self.tile_origin;
        if !(origin.latitude.is_finite() && origin.longitude.is_finite()) {
            return Err(TileError::InvalidConfig(format!("invalid tile origin {origin:?}")));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(TileError::InvalidConfig("tile dimensions must be non-zero".into()));
        }
        Ok(())
    }
}

/// Per-layer behaviour knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Tiles above this level are always subdivided before drawing
    pub minimum_display_level: u32,
    /// Load level-zero textures synchronously when they are missing
    pub force_level_zero_loads: bool,
    /// Orders of magnitude of eye distance a tile's cell may cover before splitting
    pub split_scale: f64,
    /// Keep level-zero textures out of the evictable cache
    pub retain_level_zero_tiles: bool,
    /// Maximum fetch requests queued per frame
    pub fetch_queue_capacity: usize,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            minimum_display_level: 0,
            force_level_zero_loads: false,
            split_scale: DEFAULT_SPLIT_SCALE,
            retain_level_zero_tiles: false,
            fetch_queue_capacity: DEFAULT_FETCH_QUEUE_CAPACITY,
        }
    }
}

impl LayerConfig {
    /// Check the configuration
    pub fn validate(&self) -> TileResult<()> {
        if !self.split_scale.is_finite() {
            return Err(TileError::InvalidConfig(format!(
                "split_scale must be finite, got {}",
                self.split_scale
            )));
        }
        if self.fetch_queue_capacity == 0 {
            return Err(TileError::InvalidConfig("fetch_queue_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

/// Texture cache sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of unpinned resident tiles
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 3000 }
    }
}

impl CacheConfig {
    /// Check the configuration
    pub fn validate(&self) -> TileResult<()> {
        if self.capacity == 0 {
            return Err(TileError::InvalidConfig("cache capacity must be non-zero".into()));
        }
        Ok(())
    }
}

/// Fetch worker pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Maximum concurrent fetches before the pool reports no capacity
    pub max_in_flight: usize,
    /// Depth of the channel feeding the workers
    pub queue_depth: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: rayon::current_num_threads(),
            max_in_flight: 16,
            queue_depth: 1024,
        }
    }
}

impl FetchConfig {
    /// Check the configuration
    pub fn validate(&self) -> TileResult<()> {
        if self.workers == 0 || self.max_in_flight == 0 || self.queue_depth == 0 {
            return Err(TileError::InvalidConfig(
                "fetch workers, max_in_flight and queue_depth must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerratileConfig {
    pub pyramid: PyramidConfig,
    pub layer: LayerConfig,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
}

impl TerratileConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> TileResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_json_file(path: &Path) -> TileResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_string(&self) -> TileResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every section
    pub fn validate(&self) -> TileResult<()> {
        self.pyramid.validate()?;
        self.layer.validate()?;
        self.cache.validate()?;
        self.fetch.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TerratileConfig::default();
        assert_eq!(config.layer.minimum_display_level, 0);
        assert!(!config.layer.force_level_zero_loads);
        assert_eq!(config.layer.split_scale, 0.9);
        assert!(!config.layer.retain_level_zero_tiles);
        assert_eq!(config.layer.fetch_queue_capacity, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = TerratileConfig::from_json_str(
            r#"{ "pyramid": { "num_levels": 4 }, "layer": { "split_scale": 1.5 } }"#,
        )
        .unwrap();
        assert_eq!(config.pyramid.num_levels, 4);
        assert_eq!(config.pyramid.tile_width, 256);
        assert_eq!(config.layer.split_scale, 1.5);
        assert_eq!(config.layer.fetch_queue_capacity, 200);
    }

    #[test]
    fn test_invalid_pyramid_rejected() {
        let result = TerratileConfig::from_json_str(r#"{ "pyramid": { "num_levels": 0 } }"#);
        assert!(matches!(result, Err(TileError::InvalidConfig(_))));

        let mut pyramid = PyramidConfig::default();
        pyramid.level_zero_tile_delta = LatLon::new(-1.0, 90.0);
        assert!(pyramid.validate().is_err());

        let mut pyramid = PyramidConfig::default();
        pyramid.empty_levels = pyramid.num_levels;
        assert!(pyramid.validate().is_err());
    }

    #[test]
    fn test_limits_rejected() {
        let result = TerratileConfig::from_json_str(r#"{ "cache": { "capacity": 0 } }"#);
        assert!(matches!(result, Err(TileError::InvalidConfig(_))));

        let mut pyramid = PyramidConfig::default();
        pyramid.num_levels = MAX_LEVELS;
        assert!(pyramid.validate().is_ok());
        pyramid.num_levels = 64;
        assert!(pyramid.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        let result = TerratileConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(TileError::SerializationError(_))));
    }
}
