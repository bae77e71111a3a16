//! Tiled Image Layer
//!
//! Owns a dataset's pyramid and top-level tiles and runs one frame at a
//! time: select tiles, order them for drawing, and hand the frame's fetch
//! requests to a task service.

use std::sync::Arc;

use crate::config::{LayerConfig, PyramidConfig};
use crate::draw_order::sort_draw_list;
use crate::error::{TileError, TileResult};
use crate::fetch::{DispatchStats, FetchQueue, TaskService};
use crate::lod::SplitEvaluator;
use crate::pyramid::LevelPyramid;
use crate::residency::{ForceLoad, ResidencyOracle};
use crate::selector::{DrawEntry, QuadtreeSelector, SelectionStats};
use crate::tile::TileDescriptor;
use crate::view::Viewer;

/// Everything a frame produced
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Frame counter, starting at 1
    pub frame_number: u64,
    /// Tiles to draw, coarsest texture first
    pub draw_list: Vec<DrawEntry>,
    pub selection: SelectionStats,
    pub dispatch: DispatchStats,
    /// Whether the view already shows the finest imagery at its center
    pub at_max_resolution: bool,
}

impl FrameReport {
    /// Deepest level in the draw list
    pub fn deepest_level(&self) -> Option<u32> {
        self.draw_list.iter().map(|entry| entry.tile.level()).max()
    }
}

/// A Mercator imagery layer
#[derive(Debug)]
pub struct TiledImageLayer {
    name: String,
    pyramid: Arc<LevelPyramid>,
    config: LayerConfig,
    top_level_tiles: Vec<TileDescriptor>,
    queue: FetchQueue,
    frame_number: u64,
    level_zero_forced: bool,
    at_max_resolution: bool,
}

impl TiledImageLayer {
    /// Create a layer over a new pyramid
    pub fn new(name: impl Into<String>, pyramid: &PyramidConfig, config: LayerConfig) -> TileResult<Self> {
        Self::with_pyramid(name, Arc::new(LevelPyramid::new(pyramid)?), config)
    }

    /// Create a layer over an existing, possibly shared, pyramid
    pub fn with_pyramid(
        name: impl Into<String>,
        pyramid: Arc<LevelPyramid>,
        config: LayerConfig,
    ) -> TileResult<Self> {
        config.validate()?;

        let top_level_tiles = pyramid.top_level_tiles();
        if top_level_tiles.is_empty() {
            return Err(TileError::InvalidConfig(format!(
                "sector {} contains no level-zero tiles",
                pyramid.sector()
            )));
        }

        let name = name.into();
        log::info!(
            "Created layer '{}': {} levels, {} top-level tiles",
            name,
            pyramid.level_count(),
            top_level_tiles.len()
        );

        Ok(Self {
            name,
            queue: FetchQueue::with_capacity(config.fetch_queue_capacity),
            pyramid,
            config,
            top_level_tiles,
            frame_number: 0,
            level_zero_forced: false,
            at_max_resolution: false,
        })
    }

    /// Run one frame
    pub fn render_frame(
        &mut self,
        view: &dyn Viewer,
        oracle: &dyn ResidencyOracle,
        forcer: &dyn ForceLoad,
        service: &dyn TaskService,
    ) -> FrameReport {
        self.frame_number += 1;

        if self.config.force_level_zero_loads && !self.level_zero_forced {
            self.force_level_zero_loads(oracle, forcer);
            self.level_zero_forced = true;
        }

        self.at_max_resolution =
            SplitEvaluator::new(self.config.split_scale).is_at_max_resolution(view, &self.pyramid);

        let selection = QuadtreeSelector::new(&self.pyramid, view, oracle, &self.config)
            .with_force_load(forcer)
            .select(&self.top_level_tiles, &mut self.queue);

        let mut draw_list = selection.draw_list;
        sort_draw_list(&mut draw_list);

        let dispatch = self.queue.dispatch(service);
        self.queue.clear();

        let stats = selection.stats;
        log::debug!(
            "Frame {} [{}]: {} drawn ({} fallback, {} dropped), {} queued, {} submitted, {} rejected, {} skipped",
            self.frame_number,
            self.name,
            draw_list.len(),
            stats.drawn_fallback,
            stats.dropped,
            stats.fetches_queued,
            dispatch.submitted,
            dispatch.rejected,
            dispatch.skipped
        );

        FrameReport {
            frame_number: self.frame_number,
            draw_list,
            selection: stats,
            dispatch,
            at_max_resolution: self.at_max_resolution,
        }
    }

    fn force_level_zero_loads(&self, oracle: &dyn ResidencyOracle, forcer: &dyn ForceLoad) {
        let mut forced = 0;
        for tile in &self.top_level_tiles {
            if !oracle.is_resident(&tile.key) {
                forcer.force_load(&tile.key);
                forced += 1;
            }
        }
        log::info!("Forced {forced} level-zero loads for '{}'", self.name);
    }

    /// Check whether the dataset can be seen at all
    pub fn is_layer_in_view(&self, view: &dyn Viewer) -> bool {
        view.visible_sector()
            .is_none_or(|visible| visible.intersects(self.pyramid.sector()))
    }

    /// More than one level of detail is available
    pub fn is_multi_resolution(&self) -> bool {
        self.pyramid.level_count() > 1
    }

    /// Whether the last frame already showed the finest imagery at the view center
    pub fn is_at_max_resolution(&self) -> bool {
        self.at_max_resolution
    }

    /// Layer name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pyramid
    pub fn pyramid(&self) -> &LevelPyramid {
        &self.pyramid
    }

    /// Shared handle to the pyramid, for fetch workers that write back to it
    pub fn shared_pyramid(&self) -> Arc<LevelPyramid> {
        Arc::clone(&self.pyramid)
    }

    /// Layer configuration
    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    /// Level-zero tiles covering the dataset
    pub fn top_level_tiles(&self) -> &[TileDescriptor] {
        &self.top_level_tiles
    }

    /// Frames rendered so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Subdivide tiles above `level` before drawing
    pub fn set_minimum_display_level(&mut self, level: u32) {
        self.config.minimum_display_level = level;
    }

    /// Enable synchronous level-zero loads. Enabling forces the top-level
    /// tiles again on the next frame.
    pub fn set_force_level_zero_loads(&mut self, force: bool) {
        if force && !self.config.force_level_zero_loads {
            self.level_zero_forced = false;
        }
        self.config.force_level_zero_loads = force;
    }

    /// Change the split scale
    pub fn set_split_scale(&mut self, split_scale: f64) -> TileResult<()> {
        if !split_scale.is_finite() {
            return Err(TileError::InvalidConfig(format!("split_scale must be finite, got {split_scale}")));
        }
        self.config.split_scale = split_scale;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::fetch::FetchRequest;
    use crate::geometry::Frustum;
    use crate::globe::SphereGlobe;
    use crate::residency::{NoForceLoad, TextureCache};
    use crate::sector::MercatorSector;
    use crate::tile::TileKey;
    use crate::view::ViewState;

    /// Loads tiles on the calling thread. Levels at or past `absent_from`
    /// have no imagery.
    struct InlineLoader {
        cache: Arc<TextureCache>,
        pyramid: Arc<LevelPyramid>,
        absent_from: u32,
        submitted: RefCell<Vec<TileKey>>,
    }

    impl InlineLoader {
        fn new(layer: &TiledImageLayer, cache: &Arc<TextureCache>, absent_from: u32) -> Self {
            Self {
                cache: cache.clone(),
                pyramid: layer.shared_pyramid(),
                absent_from,
                submitted: RefCell::new(Vec::new()),
            }
        }
    }

    impl TaskService for InlineLoader {
        fn has_capacity(&self) -> bool {
            true
        }

        fn submit(&self, request: FetchRequest) -> bool {
            self.submitted.borrow_mut().push(request.key);
            if request.key.level >= self.absent_from {
                self.pyramid.mark_key_absent(&request.key);
            } else {
                self.cache.insert(request.key);
            }
            true
        }
    }

    struct CacheForcer(Arc<TextureCache>);

    impl ForceLoad for CacheForcer {
        fn force_load(&self, key: &TileKey) {
            self.0.insert(*key);
        }
    }

    fn layer(levels: u32) -> TiledImageLayer {
        let pyramid = PyramidConfig {
            num_levels: levels,
            ..PyramidConfig::default()
        };
        TiledImageLayer::new("test", &pyramid, LayerConfig::default()).unwrap()
    }

    fn view(altitude: f64) -> ViewState {
        ViewState::looking_down(Arc::new(SphereGlobe::earth()), 10.0, 10.0, altitude, 45.0, 1.0)
            .with_frustum(Frustum::unbounded())
            .with_visible_sector(None)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let pyramid = PyramidConfig {
            num_levels: 0,
            ..PyramidConfig::default()
        };
        assert!(TiledImageLayer::new("bad", &pyramid, LayerConfig::default()).is_err());

        let config = LayerConfig {
            split_scale: f64::NAN,
            ..LayerConfig::default()
        };
        assert!(TiledImageLayer::new("bad", &PyramidConfig::default(), config).is_err());
    }

    #[test]
    fn test_layer_properties() {
        let mut layer = layer(5);
        assert_eq!(layer.name(), "test");
        assert!(layer.is_multi_resolution());
        assert_eq!(layer.top_level_tiles().len(), 8);
        assert!(!self::layer(1).is_multi_resolution());

        layer.set_minimum_display_level(2);
        assert_eq!(layer.config().minimum_display_level, 2);
        assert!(layer.set_split_scale(f64::INFINITY).is_err());
        layer.set_split_scale(1.5).unwrap();
        assert_eq!(layer.config().split_scale, 1.5);
    }

    #[test]
    fn test_frames_converge_as_tiles_load() {
        let mut layer = layer(3);
        let cache = Arc::new(TextureCache::new(1024));
        let loader = InlineLoader::new(&layer, &cache, u32::MAX);
        let state = view(1000.0);

        let first = layer.render_frame(&state, cache.as_ref(), &NoForceLoad, &loader);
        assert_eq!(first.frame_number, 1);
        assert!(first.draw_list.is_empty());
        assert!(first.dispatch.submitted > 0);

        let second = layer.render_frame(&state, cache.as_ref(), &NoForceLoad, &loader);
        assert_eq!(second.selection.drawn_fallback, 0);
        assert_eq!(second.selection.dropped, 0);
        assert_eq!(second.dispatch.submitted, 0);
        assert_eq!(second.deepest_level(), Some(2));
        assert!(second.at_max_resolution);
        assert!(layer.is_at_max_resolution());
    }

    #[test]
    fn test_draw_list_sorted_coarse_first() {
        let mut layer = layer(4);
        let cache = Arc::new(TextureCache::new(1024));
        for tile in layer.top_level_tiles() {
            cache.insert(tile.key);
        }
        let below = layer.pyramid().tile_for_position(3, 10.0, 10.0).unwrap().key;
        cache.insert(below);

        let report = layer.render_frame(&view(1000.0), cache.as_ref(), &NoForceLoad, &NoService);
        let levels: Vec<_> = report.draw_list.iter().map(crate::draw_order::effective_level).collect();
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(report.draw_list.last().map(|e| e.tile.key), Some(below));
        assert!(report.dispatch.skipped > 0);
    }

    struct NoService;

    impl TaskService for NoService {
        fn has_capacity(&self) -> bool {
            false
        }

        fn submit(&self, _request: FetchRequest) -> bool {
            unreachable!("service reported no capacity");
        }
    }

    #[test]
    fn test_force_level_zero_on_first_frame() {
        let mut layer = layer(3);
        layer.set_force_level_zero_loads(true);
        let cache = Arc::new(TextureCache::new(64));
        let forcer = CacheForcer(cache.clone());

        let report = layer.render_frame(&view(1.0e8), cache.as_ref(), &forcer, &NoService);
        assert_eq!(report.draw_list.len(), 8);
        assert_eq!(report.selection.drawn_resident, 8);
        assert_eq!(cache.len(), 8);
    }

    #[test]
    fn test_absent_tiles_not_resubmitted() {
        let mut layer = layer(4);
        let cache = Arc::new(TextureCache::new(1024));
        let loader = InlineLoader::new(&layer, &cache, 2);
        let state = view(1000.0);

        // Settle: the first frames may overflow the queue
        let mut frames = 0;
        loop {
            frames += 1;
            let report = layer.render_frame(&state, cache.as_ref(), &NoForceLoad, &loader);
            if report.dispatch.submitted == 0 || frames == 10 {
                break;
            }
        }
        let absent = layer.pyramid().absent_count();
        assert!(absent > 0);

        let below = layer.pyramid().tile_for_position(3, 10.0, 10.0).unwrap().key;
        assert!(layer.pyramid().is_key_absent(&below));

        for _ in 0..100 {
            loader.submitted.borrow_mut().clear();
            let report = layer.render_frame(&state, cache.as_ref(), &NoForceLoad, &loader);
            assert!(loader.submitted.borrow().is_empty());
            assert_eq!(report.dispatch.submitted, 0);

            // Still drawn, sampling the level-one texture
            let entry = report.draw_list.iter().find(|e| e.tile.key == below).unwrap();
            assert_eq!(entry.fallback.map(|f| f.ancestor.level), Some(1));
        }
        assert_eq!(layer.pyramid().absent_count(), absent);
        assert_eq!(layer.frame_number(), frames + 100);
    }

    /// Render `view` until nothing more is submitted
    fn settle(layer: &mut TiledImageLayer, state: &ViewState, cache: &TextureCache, loader: &InlineLoader) {
        for _ in 0..10 {
            let report = layer.render_frame(state, cache, &NoForceLoad, loader);
            if report.dispatch.submitted == 0 {
                break;
            }
        }
    }

    #[test]
    fn test_ancestors_survive_cache_pressure() {
        let state = view(1000.0);

        let mut sizing_layer = layer(3);
        let roomy = Arc::new(TextureCache::new(4096));
        let sizing_loader = InlineLoader::new(&sizing_layer, &roomy, u32::MAX);
        settle(&mut sizing_layer, &state, roomy.as_ref(), &sizing_loader);
        let working_set = roomy.len();

        let mut layer = layer(3);
        let cache = Arc::new(TextureCache::new(working_set + 4));
        let loader = InlineLoader::new(&layer, &cache, u32::MAX);
        settle(&mut layer, &state, cache.as_ref(), &loader);
        assert_eq!(cache.len(), working_set);

        for i in 0..32 {
            cache.insert(TileKey::new(9, i, i));
            loader.submitted.borrow_mut().clear();

            let report = layer.render_frame(&state, cache.as_ref(), &NoForceLoad, &loader);
            assert!(loader.submitted.borrow().is_empty());
            assert_eq!(report.selection.dropped, 0);
            assert_eq!(report.selection.drawn_fallback, 0);
        }
        for root in layer.top_level_tiles() {
            assert!(cache.contains(&root.key));
        }
    }

    #[test]
    fn test_layer_in_view() {
        let pyramid = PyramidConfig {
            sector: MercatorSector::from_degrees(0.0, 40.0, 0.0, 40.0),
            ..PyramidConfig::default()
        };
        let layer = TiledImageLayer::new("partial", &pyramid, LayerConfig::default()).unwrap();
        assert_eq!(layer.top_level_tiles().len(), 1);

        let elsewhere = view(1.0e6).with_visible_sector(Some(MercatorSector::from_degrees(-40.0, -10.0, 0.0, 40.0)));
        assert!(!layer.is_layer_in_view(&elsewhere));
        assert!(layer.is_layer_in_view(&view(1.0e6)));
    }
}
