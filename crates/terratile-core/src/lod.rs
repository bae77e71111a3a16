//! Level of detail
//!
//! A tile is detailed enough when the size of its cell, measured along the
//! globe, is small relative to how far the eye is from the tile. The distance
//! used is the minimum over the four corners and the center, so a tile the
//! eye hovers over is judged by its nearest part.
//!
//! ```text
//! cell_size = π · Δlat · R / 20
//! split     ⇔ log10(cell_size) > log10(d_min) − split_scale
//! ```
//!
//! Raising `split_scale` splits earlier and so draws finer tiles.

use std::f64::consts::PI;

use crate::config::DEFAULT_SPLIT_SCALE;
use crate::error::{TileError, TileResult};
use crate::pyramid::LevelPyramid;
use crate::sector::MercatorSector;
use crate::tile::TileDescriptor;
use crate::view::Viewer;

/// Decides whether a tile must be replaced by its children
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitEvaluator {
    split_scale: f64,
}

impl SplitEvaluator {
    /// Create an evaluator with the given split scale
    pub fn new(split_scale: f64) -> Self {
        Self { split_scale }
    }

    /// The configured split scale
    pub fn split_scale(&self) -> f64 {
        self.split_scale
    }

    /// Evaluate the split criterion, reporting degenerate geometry as an error
    pub fn try_needs_split(&self, view: &dyn Viewer, sector: &MercatorSector) -> TileResult<bool> {
        if view.is_capture_mode() {
            return Ok(true);
        }

        let globe = view.globe();
        let eye = view.eye_point();
        let exaggeration = view.vertical_exaggeration();

        let corners = sector.corner_points(globe, exaggeration);
        let center = sector.center_point(globe, exaggeration);
        let min_distance = corners
            .iter()
            .chain(std::iter::once(&center))
            .map(|point| eye.distance(*point))
            .fold(f64::INFINITY, f64::min);

        let cell_size = PI * sector.delta_lat_radians() * globe.radius() / 20.0;

        if !min_distance.is_finite() || !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(TileError::Evaluation(format!(
                "{sector}: eye distance {min_distance}, cell size {cell_size}"
            )));
        }

        Ok(cell_size.log10() > min_distance.log10() - self.split_scale)
    }

    /// Evaluate the split criterion. A failed evaluation counts as a split.
    pub fn needs_split(&self, view: &dyn Viewer, sector: &MercatorSector) -> bool {
        self.try_needs_split(view, sector).unwrap_or_else(|err| {
            log::trace!("{err}, splitting");
            true
        })
    }

    /// Check whether a tile can be drawn as-is
    pub fn meets_render_criteria(
        &self,
        view: &dyn Viewer,
        pyramid: &LevelPyramid,
        tile: &TileDescriptor,
    ) -> bool {
        pyramid.is_final_level(tile.level()) || !self.needs_split(view, &tile.sector)
    }

    /// Check whether the view already shows the finest imagery available
    /// where the viewport center falls.
    pub fn is_at_max_resolution(&self, view: &dyn Viewer, pyramid: &LevelPyramid) -> bool {
        let Some(center) = view.viewport_center() else {
            return false;
        };

        if !pyramid.sector().contains(center.latitude, center.longitude) {
            return true;
        }

        let count = pyramid.level_count();
        if count < 2 {
            return true;
        }

        match pyramid.sector_for_position(count - 2, center.latitude, center.longitude) {
            Ok(sector) => self.needs_split(view, &sector),
            Err(err) => {
                log::trace!("{err}");
                false
            }
        }
    }
}

impl Default for SplitEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_SPLIT_SCALE)
    }
}
