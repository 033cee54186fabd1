//! Decoded glyph cache.
//!
//! Bitmaps are memoized per `(glyph index, block)`. The cache belongs to the
//! editor session and is invalidated whenever the firmware changes identity.
//! A detached cache (no firmware loaded) serves nothing.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::codec::glyph::{GlyphBitmap, GlyphError, decode_glyph};
use crate::firmware::{BlockType, FirmwareImage};

/// Anything that can decode a glyph by index.
pub trait GlyphSource {
    fn decode(&self, index: u8, block: BlockType) -> Result<GlyphBitmap, GlyphError>;
}

impl GlyphSource for FirmwareImage {
    fn decode(&self, index: u8, block: BlockType) -> Result<GlyphBitmap, GlyphError> {
        let glyph = self
            .block(block)
            .glyph(index)
            .ok_or(GlyphError::NotFound { block, index })?;
        decode_glyph(glyph, self)
    }
}

#[derive(Debug, Default)]
pub struct GlyphCache {
    entries: HashMap<(u8, BlockType), Arc<GlyphBitmap>>,
    detached: bool,
    hits: u64,
    misses: u64,
}

impl GlyphCache {
    /// An empty cache ready to serve lookups.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty cache that refuses lookups until attached.
    pub fn detached() -> Self {
        Self {
            detached: true,
            ..Self::default()
        }
    }

    /// Get a bitmap, decoding it through `source` on a miss.
    pub fn get_image<S: GlyphSource + ?Sized>(
        &mut self,
        source: &S,
        index: u8,
        block: BlockType,
    ) -> Result<Arc<GlyphBitmap>, GlyphError> {
        if self.detached {
            return Err(GlyphError::Unavailable { block, index });
        }
        if let Some(bitmap) = self.entries.get(&(index, block)) {
            self.hits += 1;
            debug!(index, block = %block, "Glyph cache hit");
            return Ok(Arc::clone(bitmap));
        }

        self.misses += 1;
        debug!(index, block = %block, "Glyph cache miss");
        let bitmap = Arc::new(source.decode(index, block)?);
        self.entries.insert((index, block), Arc::clone(&bitmap));
        Ok(bitmap)
    }

    /// Rendering-side lookup: any failure means "skip this entry".
    pub fn try_image<S: GlyphSource + ?Sized>(
        &mut self,
        source: &S,
        index: u8,
        block: BlockType,
    ) -> Option<Arc<GlyphBitmap>> {
        self.get_image(source, index, block).ok()
    }

    /// Replace one entry after the glyph was edited.
    pub fn store(&mut self, index: u8, block: BlockType, bitmap: GlyphBitmap) {
        if self.detached {
            return;
        }
        self.entries.insert((index, block), Arc::new(bitmap));
    }

    /// Drop every entry.
    pub fn invalidate(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        debug!(dropped, "Glyph cache invalidated");
    }

    pub fn attach(&mut self) {
        self.detached = false;
    }

    pub fn detach(&mut self) {
        self.invalidate();
        self.detached = true;
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Source that counts decodes and produces a bitmap sized by index.
    struct CountingSource {
        decodes: Cell<usize>,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                decodes: Cell::new(0),
            }
        }
    }

    impl GlyphSource for CountingSource {
        fn decode(&self, index: u8, block: BlockType) -> Result<GlyphBitmap, GlyphError> {
            self.decodes.set(self.decodes.get() + 1);
            if index == 0 {
                return Err(GlyphError::NotFound { block, index });
            }
            Ok(GlyphBitmap::new(index as usize, 8))
        }
    }

    #[test]
    fn test_second_lookup_hits() {
        let source = CountingSource::new();
        let mut cache = GlyphCache::new();

        let first = cache.get_image(&source, 3, BlockType::Block1).unwrap();
        let second = cache.get_image(&source, 3, BlockType::Block1).unwrap();
        assert_eq!(source.decodes.get(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_blocks_are_separate_keys() {
        let source = CountingSource::new();
        let mut cache = GlyphCache::new();
        cache.get_image(&source, 3, BlockType::Block1).unwrap();
        cache.get_image(&source, 3, BlockType::Block2).unwrap();
        assert_eq!(source.decodes.get(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_forces_decode() {
        let source = CountingSource::new();
        let mut cache = GlyphCache::new();
        cache.get_image(&source, 3, BlockType::Block1).unwrap();
        cache.invalidate();
        assert!(cache.is_empty());
        cache.get_image(&source, 3, BlockType::Block1).unwrap();
        assert_eq!(source.decodes.get(), 2);
    }

    #[test]
    fn test_detached_cache_is_unavailable() {
        let source = CountingSource::new();
        let mut cache = GlyphCache::new();
        cache.get_image(&source, 3, BlockType::Block1).unwrap();
        cache.detach();

        assert_eq!(
            cache.get_image(&source, 3, BlockType::Block1),
            Err(GlyphError::Unavailable {
                block: BlockType::Block1,
                index: 3
            })
        );
        assert!(cache.try_image(&source, 3, BlockType::Block1).is_none());
        assert_eq!(source.decodes.get(), 1);

        cache.attach();
        assert!(cache.try_image(&source, 3, BlockType::Block1).is_some());
    }

    #[test]
    fn test_decode_errors_are_not_cached() {
        let source = CountingSource::new();
        let mut cache = GlyphCache::new();
        assert!(cache.get_image(&source, 0, BlockType::Block1).is_err());
        assert!(cache.get_image(&source, 0, BlockType::Block1).is_err());
        assert_eq!(source.decodes.get(), 2);
        assert!(cache.is_empty());
    }
}
