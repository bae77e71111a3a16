//! # Terratile Core
//!
//! Tile-pyramid traversal and streaming-cache engine for Mercator imagery
//! draped over a 3D globe.
//!
//! Every frame the engine picks the smallest set of tiles whose resolution
//! fits the current view, falls back to coarser resident imagery where finer
//! tiles have not arrived yet, and queues the missing tiles for loading:
//! - **Pyramid**: zoom levels, tile grid, and the resource-absent negative cache
//! - **LOD**: the eye-distance split criterion
//! - **Selector**: quadtree descent with ancestor fallback
//! - **Fetch**: bounded priority queue drained into a worker pool
//! - **Residency**: LRU texture cache with level-zero pinning

pub mod config;
pub mod draw_order;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod globe;
pub mod layer;
pub mod lod;
pub mod pyramid;
pub mod residency;
pub mod sector;
pub mod selector;
pub mod tile;
pub mod view;
pub mod worker;

use std::sync::Arc;

pub use config::{CacheConfig, FetchConfig, LatLon, LayerConfig, PyramidConfig, TerratileConfig};
pub use draw_order::{effective_level, sort_draw_list};
pub use error::{FetchError, TileError, TileResult};
pub use fetch::{DispatchStats, FetchQueue, FetchRequest, TaskService};
pub use globe::{Globe, SphereGlobe};
pub use layer::{FrameReport, TiledImageLayer};
pub use lod::SplitEvaluator;
pub use pyramid::{LevelInfo, LevelPyramid};
pub use residency::{ForceLoad, NoForceLoad, ResidencyOracle, TextureCache};
pub use sector::{MercatorSector, TextureTransform};
pub use selector::{DrawEntry, FallbackBinding, QuadtreeSelector, Selection, SelectionStats};
pub use tile::{TileDescriptor, TileKey};
pub use view::{ViewState, Viewer};
pub use worker::{FetchOutcome, FetchWorkerPool, TileFetcher};

/// A layer wired to its texture cache and fetch workers
pub struct TileEngine {
    layer: TiledImageLayer,
    cache: Arc<TextureCache>,
    pool: FetchWorkerPool,
}

impl TileEngine {
    /// Build the layer, cache and worker pool described by `config`
    pub fn new(
        name: impl Into<String>,
        config: &TerratileConfig,
        fetcher: Arc<dyn TileFetcher>,
    ) -> TileResult<Self> {
        config.validate()?;

        let layer = TiledImageLayer::new(name, &config.pyramid, config.layer.clone())?;
        let cache = Arc::new(TextureCache::new(config.cache.capacity));
        let pool = FetchWorkerPool::new(&config.fetch, fetcher, cache.clone(), layer.shared_pyramid())?;
        pool.set_retain_level_zero_tiles(config.layer.retain_level_zero_tiles);

        Ok(Self { layer, cache, pool })
    }

    /// Run one frame for `view`
    pub fn render_frame(&mut self, view: &dyn Viewer) -> FrameReport {
        self.layer
            .render_frame(view, self.cache.as_ref(), &self.pool, &self.pool)
    }

    /// Get the layer
    pub fn layer(&self) -> &TiledImageLayer {
        &self.layer
    }

    /// Get mutable access to the layer
    pub fn layer_mut(&mut self) -> &mut TiledImageLayer {
        &mut self.layer
    }

    /// Get the texture cache
    pub fn cache(&self) -> &TextureCache {
        &self.cache
    }

    /// Get the fetch worker pool
    pub fn pool(&self) -> &FetchWorkerPool {
        &self.pool
    }

    /// Block until every submitted fetch has finished
    pub fn wait_idle(&self) {
        self.pool.wait_idle();
    }
}
