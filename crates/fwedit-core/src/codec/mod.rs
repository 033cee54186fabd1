//! Firmware binary codecs: glyph bitmaps, strings, and merged previews.

pub mod glyph;
pub mod merge;
pub mod string;

pub use glyph::{GlyphBitmap, GlyphError, GlyphFormat, decode_glyph, encode_glyph};
pub use merge::merge_images;
pub use string::{
    CharSlot, CharacterSequence, CharacterSlots, StringError, read_raw, read_string, write_char,
};
