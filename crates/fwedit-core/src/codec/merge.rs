//! Composite previews built from several glyphs.

use std::borrow::Borrow;

use super::glyph::GlyphBitmap;

/// Lay bitmaps out left to right, top-aligned.
///
/// The result is as wide as all inputs together and as tall as the tallest
/// one; pixels below a shorter input stay off.
pub fn merge_images<I, B>(bitmaps: I) -> GlyphBitmap
where
    I: IntoIterator<Item = B>,
    B: Borrow<GlyphBitmap>,
{
    let bitmaps: Vec<B> = bitmaps.into_iter().collect();
    let width = bitmaps.iter().map(|b| b.borrow().width()).sum();
    let height = bitmaps
        .iter()
        .map(|b| b.borrow().height())
        .max()
        .unwrap_or(0);

    let mut merged = GlyphBitmap::new(width, height);
    let mut x = 0;
    for bitmap in &bitmaps {
        let bitmap = bitmap.borrow();
        merged.blit(bitmap, x);
        x += bitmap.width();
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_merge_side_by_side() {
        let a = GlyphBitmap::from_rows(&["#.", ".#", "##"]);
        let b = GlyphBitmap::from_rows(&["####", "....", "#..#"]);
        let merged = merge_images([&a, &b]);

        assert_eq!((merged.width(), merged.height()), (6, 3));
        for row in 0..3 {
            for col in 0..2 {
                assert_eq!(merged.pixel(col, row), a.pixel(col, row));
            }
            for col in 0..4 {
                assert_eq!(merged.pixel(col + 2, row), b.pixel(col, row));
            }
        }
    }

    #[test]
    fn test_merge_pads_shorter_inputs() {
        let short = GlyphBitmap::from_rows(&["##"]);
        let tall = GlyphBitmap::from_rows(&["#", "#", "#"]);
        let merged = merge_images(vec![Arc::new(short), Arc::new(tall)]);
        assert_eq!(merged.to_text('#', '.'), "###\n..#\n..#\n");
    }

    #[test]
    fn test_merge_empty() {
        let merged = merge_images(Vec::<GlyphBitmap>::new());
        assert_eq!((merged.width(), merged.height()), (0, 0));
        assert!(merged.is_empty());
    }
}
