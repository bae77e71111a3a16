//! Quadtree Selector
//!
//! Walks the tile pyramid once per frame and decides, for every visible
//! tile, whether to draw it, refine it, or fetch it. Tiles whose imagery has
//! not arrived yet are drawn with the texture of the nearest resident
//! ancestor, so detail sharpens progressively instead of leaving holes.
//!
//! The nearest resident ancestor is threaded through the recursion by value:
//! each call sees the ancestor chosen by its caller and passes its own choice
//! on to its children, with nothing to restore on the way back up.

use smallvec::SmallVec;

use crate::config::LayerConfig;
use crate::fetch::{FetchQueue, FetchRequest};
use crate::lod::SplitEvaluator;
use crate::pyramid::LevelPyramid;
use crate::residency::{ForceLoad, NoForceLoad, ResidencyOracle};
use crate::sector::TextureTransform;
use crate::tile::{TileDescriptor, TileKey};
use crate::view::Viewer;

/// A tile drawn with an ancestor's texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackBinding {
    /// The resident ancestor whose texture is sampled
    pub ancestor: TileKey,
    /// Maps the tile's texture coordinates into the ancestor's texture
    pub transform: TextureTransform,
}

/// One tile in the frame's draw list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawEntry {
    pub tile: TileDescriptor,
    pub fallback: Option<FallbackBinding>,
}

impl DrawEntry {
    /// Entry drawn with the tile's own texture
    pub fn resident(tile: TileDescriptor) -> Self {
        Self { tile, fallback: None }
    }

    /// Entry drawn with `ancestor`'s texture
    pub fn with_fallback(tile: TileDescriptor, ancestor: &TileDescriptor) -> Self {
        Self {
            tile,
            fallback: Some(FallbackBinding {
                ancestor: ancestor.key,
                transform: tile.sector.texture_transform_within(&ancestor.sector),
            }),
        }
    }

    /// Key of the texture this entry samples
    pub fn texture_key(&self) -> TileKey {
        self.fallback.map_or(self.tile.key, |fallback| fallback.ancestor)
    }
}

/// Counters for one traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionStats {
    /// Tiles entered by the traversal
    pub visited: usize,
    /// Split criterion evaluations
    pub split_checks: usize,
    /// Tiles drawn with their own texture
    pub drawn_resident: usize,
    /// Tiles drawn with an ancestor's texture
    pub drawn_fallback: usize,
    /// Tiles skipped for lack of any texture
    pub dropped: usize,
    /// Fetch requests accepted by the queue
    pub fetches_queued: usize,
    /// Fetch requests the queue turned away
    pub fetches_rejected: usize,
}

/// Result of one traversal
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub draw_list: Vec<DrawEntry>,
    pub stats: SelectionStats,
}

/// Mutable state for one traversal
struct Frame<'q> {
    queue: &'q mut FetchQueue,
    draw_list: Vec<DrawEntry>,
    stats: SelectionStats,
}

/// Per-frame tile selection over a level pyramid
pub struct QuadtreeSelector<'a> {
    pyramid: &'a LevelPyramid,
    view: &'a dyn Viewer,
    oracle: &'a dyn ResidencyOracle,
    forcer: &'a dyn ForceLoad,
    config: &'a LayerConfig,
    evaluator: SplitEvaluator,
}

impl<'a> QuadtreeSelector<'a> {
    /// Create a selector for one frame
    pub fn new(
        pyramid: &'a LevelPyramid,
        view: &'a dyn Viewer,
        oracle: &'a dyn ResidencyOracle,
        config: &'a LayerConfig,
    ) -> Self {
        Self {
            pyramid,
            view,
            oracle,
            forcer: &NoForceLoad,
            config,
            evaluator: SplitEvaluator::new(config.split_scale),
        }
    }

    /// Use `forcer` for synchronous level-zero loads
    pub fn with_force_load(mut self, forcer: &'a dyn ForceLoad) -> Self {
        self.forcer = forcer;
        self
    }

    /// Select the tiles to draw this frame, queueing fetches for missing imagery
    pub fn select(&self, roots: &[TileDescriptor], queue: &mut FetchQueue) -> Selection {
        let mut frame = Frame {
            queue,
            draw_list: Vec::new(),
            stats: SelectionStats::default(),
        };

        for root in roots {
            if self.is_tile_visible(root) {
                self.visit(root, None, &mut frame);
            }
        }

        Selection {
            draw_list: frame.draw_list,
            stats: frame.stats,
        }
    }

    /// Check a tile against the dataset bounds, the visible sector and the frustum
    pub fn is_tile_visible(&self, tile: &TileDescriptor) -> bool {
        if !self.pyramid.sector().intersects_interior(&tile.sector) {
            return false;
        }
        if let Some(visible) = self.view.visible_sector() {
            if !visible.intersects(&tile.sector) {
                return false;
            }
        }
        let extent = tile.extent(self.view.globe(), self.view.vertical_exaggeration());
        self.view.frustum().intersects_aabb(&extent)
    }

    fn visit(&self, tile: &TileDescriptor, ancestor: Option<TileDescriptor>, frame: &mut Frame<'_>) {
        frame.stats.visited += 1;
        let level = tile.level();

        if self.pyramid.is_final_level(level)
            || (level >= self.config.minimum_display_level && self.meets_render_criteria(tile, frame))
        {
            self.accept(tile, ancestor, frame);
            return;
        }

        let resident = self.is_resident(tile);
        let ancestor = if resident || level == 0 {
            if resident {
                self.oracle.mark_used(&tile.key);
            } else {
                self.request(tile, frame);
            }
            Some(*tile)
        } else {
            self.request(tile, frame);
            ancestor
        };

        for child in self.visible_children(tile) {
            self.visit(&child, ancestor, frame);
        }
    }

    fn accept(&self, tile: &TileDescriptor, ancestor: Option<TileDescriptor>, frame: &mut Frame<'_>) {
        if self.is_resident(tile) || self.force_level_zero(tile) {
            self.oracle.mark_used(&tile.key);
            frame.draw_list.push(DrawEntry::resident(*tile));
            frame.stats.drawn_resident += 1;
            return;
        }

        self.request(tile, frame);

        if let Some(ancestor) = ancestor {
            if self.is_resident(&ancestor) || self.force_level_zero(&ancestor) {
                self.oracle.mark_used(&ancestor.key);
                frame.draw_list.push(DrawEntry::with_fallback(*tile, &ancestor));
                frame.stats.drawn_fallback += 1;
                return;
            }
        }

        log::trace!("No texture for tile {}, skipping", tile.key);
        frame.stats.dropped += 1;
    }

    fn meets_render_criteria(&self, tile: &TileDescriptor, frame: &mut Frame<'_>) -> bool {
        frame.stats.split_checks += 1;
        self.evaluator.meets_render_criteria(self.view, self.pyramid, tile)
    }

    fn is_resident(&self, tile: &TileDescriptor) -> bool {
        self.oracle.is_resident(&tile.key)
    }

    /// Load a missing level-zero tile in place when configured to.
    /// Returns whether the tile is resident afterwards.
    fn force_level_zero(&self, tile: &TileDescriptor) -> bool {
        if tile.level() != 0 || !self.config.force_level_zero_loads {
            return false;
        }
        self.forcer.force_load(&tile.key);
        self.is_resident(tile)
    }

    fn request(&self, tile: &TileDescriptor, frame: &mut Frame<'_>) {
        let key = tile.key;
        if !self.pyramid.contains_level(key.level)
            || self.pyramid.is_level_empty(key.level)
            || self.pyramid.is_key_absent(&key)
        {
            return;
        }

        if frame.queue.try_push(FetchRequest::for_tile(key)) {
            frame.stats.fetches_queued += 1;
        } else {
            frame.stats.fetches_rejected += 1;
        }
    }

    fn visible_children(&self, tile: &TileDescriptor) -> SmallVec<[TileDescriptor; 4]> {
        tile.children()
            .into_iter()
            .filter(|child| self.is_tile_visible(child))
            .collect()
    }
}
