//! Draw ordering. Coarse textures go first so finer tiles paint over them.

use crate::selector::DrawEntry;

/// Level of the texture an entry samples: the fallback's when it has one
pub fn effective_level(entry: &DrawEntry) -> u32 {
    entry
        .fallback
        .map_or(entry.tile.level(), |fallback| fallback.ancestor.level)
}

/// Stable sort by effective level, coarsest first
pub fn sort_draw_list(entries: &mut [DrawEntry]) {
    entries.sort_by_key(effective_level);
}
