//! Level Pyramid
//!
//! The ordered set of zoom levels for a dataset and the per-tile
//! "resource absent" negative cache. The negative cache is the one piece of
//! state written from fetch workers while the render thread reads it, so each
//! level carries its own lock and tiles on different levels never contend.

use ahash::AHashSet;
use parking_lot::RwLock;

use crate::config::{LatLon, PyramidConfig};
use crate::error::{TileError, TileResult};
use crate::sector::{gudermannian_inverse, MercatorSector};
use crate::tile::{TileDescriptor, TileKey};

/// Slack applied when snapping sector edges to tile rows and columns
const GRID_EPSILON: f64 = 1e-9;

/// Static description of one zoom level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    /// Level number, 0 is the coarsest
    pub number: u32,
    /// Tile size in degrees of latitude and longitude
    pub tile_delta: LatLon,
    /// Tile height in Mercator units
    pub tile_delta_y: f64,
    /// Level holds no imagery and is never requested
    pub is_empty: bool,
    /// Angular size of one texel in radians
    pub texel_size: f64,
}

/// Ordered list of zoom levels plus the resource-absent negative cache
#[derive(Debug)]
pub struct LevelPyramid {
    config: PyramidConfig,
    levels: Vec<LevelInfo>,
    absent: Vec<RwLock<AHashSet<(i64, i64)>>>,
}

impl LevelPyramid {
    /// Build a pyramid from a caller's configuration.
    ///
    /// The configuration is copied, so the caller may keep mutating its
    /// value without affecting traversals that use this pyramid.
    pub fn new(config: &PyramidConfig) -> TileResult<Self> {
        config.validate()?;
        let config = config.clone();

        let levels = (0..config.num_levels)
            .map(|number| {
                let scale = 0.5f64.powi(number as i32);
                let tile_delta = LatLon::new(
                    config.level_zero_tile_delta.latitude * scale,
                    config.level_zero_tile_delta.longitude * scale,
                );
                LevelInfo {
                    number,
                    tile_delta,
                    tile_delta_y: tile_delta.latitude / 90.0,
                    is_empty: number < config.empty_levels,
                    texel_size: tile_delta.latitude.to_radians() / config.tile_height as f64,
                }
            })
            .collect();

        let absent = (0..config.num_levels)
            .map(|_| RwLock::new(AHashSet::new()))
            .collect();

        log::info!(
            "Created pyramid '{}' with {} levels over {}",
            config.dataset_name,
            config.num_levels,
            config.sector
        );

        Ok(Self {
            config,
            levels,
            absent,
        })
    }

    /// The configuration this pyramid was built from
    pub fn config(&self) -> &PyramidConfig {
        &self.config
    }

    /// Number of levels
    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Level description, if the level exists
    pub fn level(&self, level: u32) -> Option<&LevelInfo> {
        self.levels.get(level as usize)
    }

    /// Level description, failing for levels outside the pyramid
    pub fn try_level(&self, level: u32) -> TileResult<&LevelInfo> {
        self.level(level).ok_or(TileError::LevelOutOfRange {
            level,
            count: self.level_count(),
        })
    }

    /// Tile size of a level in degrees (latitude, longitude)
    pub fn tile_angular_delta(&self, level: u32) -> Option<(f64, f64)> {
        self.level(level)
            .map(|info| (info.tile_delta.latitude, info.tile_delta.longitude))
    }

    /// Root sector of the dataset
    pub fn sector(&self) -> &MercatorSector {
        &self.config.sector
    }

    /// Global tiling origin in degrees
    pub fn tile_origin(&self) -> LatLon {
        self.config.tile_origin
    }

    /// Check whether a level exists in the pyramid
    pub fn contains_level(&self, level: u32) -> bool {
        (level as usize) < self.levels.len()
    }

    /// True only for the deepest level
    pub fn is_final_level(&self, level: u32) -> bool {
        level + 1 == self.level_count()
    }

    /// True for levels that hold no imagery. Unknown levels count as empty.
    pub fn is_level_empty(&self, level: u32) -> bool {
        self.level(level).is_none_or(|info| info.is_empty)
    }

    /// Check the negative cache for a tile
    pub fn is_resource_absent(&self, level: u32, row: i64, col: i64) -> bool {
        self.absent
            .get(level as usize)
            .is_some_and(|set| set.read().contains(&(row, col)))
    }

    /// Record that a tile is known to be missing
    pub fn mark_resource_absent(&self, level: u32, row: i64, col: i64) {
        if let Some(set) = self.absent.get(level as usize) {
            if set.write().insert((row, col)) {
                log::trace!("Marked {level}/{row}/{col} resource-absent");
            }
        }
    }

    /// Forget a previous absence, allowing the tile to be requested again
    pub fn unmark_resource_absent(&self, level: u32, row: i64, col: i64) {
        if let Some(set) = self.absent.get(level as usize) {
            set.write().remove(&(row, col));
        }
    }

    /// Check the negative cache by key
    pub fn is_key_absent(&self, key: &TileKey) -> bool {
        self.is_resource_absent(key.level, key.row, key.col)
    }

    /// Mark by key
    pub fn mark_key_absent(&self, key: &TileKey) {
        self.mark_resource_absent(key.level, key.row, key.col);
    }

    /// Unmark by key
    pub fn unmark_key_absent(&self, key: &TileKey) {
        self.unmark_resource_absent(key.level, key.row, key.col);
    }

    /// Drop every absence marker, e.g. after the backing store was invalidated
    pub fn clear_resource_absent(&self) {
        for set in &self.absent {
            set.write().clear();
        }
    }

    /// Number of tiles currently marked absent
    pub fn absent_count(&self) -> usize {
        self.absent.iter().map(|set| set.read().len()).sum()
    }

    /// Coarsest non-empty level whose texel size is no larger than
    /// `texel_size` radians. Falls back to the deepest level.
    pub fn level_for_resolution(&self, texel_size: f64) -> u32 {
        let last = self.level_count() - 1;
        let target = self
            .levels
            .iter()
            .take(last as usize)
            .find(|info| !info.is_empty && info.texel_size <= texel_size)
            .map_or(last, |info| info.number);

        log::debug!("Selected level {target} for resolution {texel_size:e} rad");
        target
    }

    /// Row index of the tile band containing Mercator ordinate `y`
    fn row_for(&self, info: &LevelInfo, y: f64) -> i64 {
        let origin_y = gudermannian_inverse(self.config.tile_origin.latitude);
        ((y - origin_y) / info.tile_delta_y).floor() as i64
    }

    /// Column index of the tile band containing `longitude`
    fn col_for(&self, info: &LevelInfo, longitude: f64) -> i64 {
        ((longitude - self.config.tile_origin.longitude) / info.tile_delta.longitude).floor() as i64
    }

    /// First and last row and column overlapping the root sector at a level,
    /// as `(first_row, last_row, first_col, last_col)`. Sector edges that sit
    /// on a grid line within `GRID_EPSILON` snap to it.
    fn grid_bounds(&self, info: &LevelInfo) -> (i64, i64, i64, i64) {
        let origin_y = gudermannian_inverse(self.config.tile_origin.latitude);
        let origin_lon = self.config.tile_origin.longitude;
        let sector = &self.config.sector;

        let first_row = ((sector.min_y - origin_y) / info.tile_delta_y + GRID_EPSILON).floor() as i64;
        let last_row = ((sector.max_y - origin_y) / info.tile_delta_y - GRID_EPSILON).ceil() as i64 - 1;
        let first_col =
            ((sector.min_lon - origin_lon) / info.tile_delta.longitude + GRID_EPSILON).floor() as i64;
        let last_col =
            ((sector.max_lon - origin_lon) / info.tile_delta.longitude - GRID_EPSILON).ceil() as i64 - 1;

        (first_row, last_row, first_col, last_col)
    }

    /// Sector of the tile at `level`, `row`, `col` in the global grid
    pub fn tile_sector(&self, info: &LevelInfo, row: i64, col: i64) -> MercatorSector {
        let origin_y = gudermannian_inverse(self.config.tile_origin.latitude);
        let min_y = origin_y + row as f64 * info.tile_delta_y;
        let min_lon = self.config.tile_origin.longitude + col as f64 * info.tile_delta.longitude;
        MercatorSector::new(
            min_y,
            min_y + info.tile_delta_y,
            min_lon,
            min_lon + info.tile_delta.longitude,
        )
    }

    /// Descriptor of the tile at `level` containing a geographic position.
    ///
    /// Positions on the outer edge of the root sector resolve to the last
    /// row or column inside it.
    pub fn tile_for_position(&self, level: u32, latitude: f64, longitude: f64) -> TileResult<TileDescriptor> {
        let info = self.try_level(level)?;
        let (first_row, last_row, first_col, last_col) = self.grid_bounds(info);
        let row = self
            .row_for(info, gudermannian_inverse(latitude))
            .clamp(first_row, last_row.max(first_row));
        let col = self
            .col_for(info, longitude)
            .clamp(first_col, last_col.max(first_col));
        Ok(TileDescriptor::new(
            TileKey::new(level, row, col),
            self.tile_sector(info, row, col),
        ))
    }

    /// Sector of the tile at `level` containing a geographic position
    pub fn sector_for_position(&self, level: u32, latitude: f64, longitude: f64) -> TileResult<MercatorSector> {
        Ok(self.tile_for_position(level, latitude, longitude)?.sector)
    }

    /// Level-zero tiles covering the root sector, aligned to the global
    /// tiling origin. Rows run south to north, columns west to east.
    pub fn top_level_tiles(&self) -> Vec<TileDescriptor> {
        let info = &self.levels[0];
        let (first_row, last_row, first_col, last_col) = self.grid_bounds(info);

        let mut tiles = Vec::with_capacity(
            ((last_row - first_row + 1).max(0) * (last_col - first_col + 1).max(0)) as usize,
        );
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                tiles.push(TileDescriptor::new(
                    TileKey::new(0, row, col),
                    self.tile_sector(info, row, col),
                ));
            }
        }
        tiles
    }
}

impl Clone for LevelPyramid {
    /// Deep copy, including the current negative cache
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            levels: self.levels.clone(),
            absent: self
                .absent
                .iter()
                .map(|set| RwLock::new(set.read().clone()))
                .collect(),
        }
    }
}
