//! Glyph bitmap codec.
//!
//! Glyph pixels are addressed as (col, row) and stored column-major, both in
//! [`GlyphBitmap`] and in the firmware buffer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::firmware::{BlockType, FirmwareImage, GlyphMetadata};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GlyphError {
    #[error("Glyph data at 0x{offset:X} ({len} bytes) is outside the image ({buffer_len} bytes)")]
    OutOfBounds {
        offset: usize,
        len: usize,
        buffer_len: usize,
    },
    #[error("Bitmap is {actual_width}x{actual_height}, glyph expects {width}x{height}")]
    DimensionMismatch {
        width: usize,
        height: usize,
        actual_width: usize,
        actual_height: usize,
    },
    #[error("Pixel ({col}, {row}) is outside a {width}x{height} bitmap")]
    PixelOutOfRange {
        col: usize,
        row: usize,
        width: usize,
        height: usize,
    },
    #[error("Glyph 0x{index:02X} not found in {block}")]
    NotFound { block: BlockType, index: u8 },
    #[error("Glyph 0x{index:02X} in {block} is not available")]
    Unavailable { block: BlockType, index: u8 },
}

/// How a block lays out glyph pixels in the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlyphFormat {
    /// Packed bits, column-major. Each column spans `ceil(height / 8)` bytes,
    /// bit k of page byte p holds row `p * 8 + k`.
    #[default]
    ColumnPages,
    /// One byte per pixel, column-major. Non-zero means on.
    BytePerPixel,
}

impl GlyphFormat {
    /// Bytes needed to store a glyph of the given size.
    pub fn data_len(&self, width: usize, height: usize) -> usize {
        match self {
            GlyphFormat::ColumnPages => width * height.div_ceil(8),
            GlyphFormat::BytePerPixel => width * height,
        }
    }

    fn decode(&self, bytes: &[u8], width: usize, height: usize) -> GlyphBitmap {
        let mut bitmap = GlyphBitmap::new(width, height);
        for col in 0..width {
            for row in 0..height {
                bitmap.pixels[col * height + row] = match self {
                    GlyphFormat::ColumnPages => {
                        let pages = height.div_ceil(8);
                        bytes[col * pages + row / 8] & (1 << (row % 8)) != 0
                    }
                    GlyphFormat::BytePerPixel => bytes[col * height + row] != 0,
                };
            }
        }
        bitmap
    }

    /// Update `bytes` in place so it decodes to `bitmap`. Bits and bytes that
    /// carry no pixel (page padding, non-zero "on" values) are left as found.
    fn encode_into(&self, bitmap: &GlyphBitmap, bytes: &mut [u8]) {
        let (width, height) = (bitmap.width, bitmap.height);
        for col in 0..width {
            for row in 0..height {
                let on = bitmap.pixels[col * height + row];
                match self {
                    GlyphFormat::ColumnPages => {
                        let pages = height.div_ceil(8);
                        let byte = &mut bytes[col * pages + row / 8];
                        let mask = 1u8 << (row % 8);
                        if on {
                            *byte |= mask;
                        } else {
                            *byte &= !mask;
                        }
                    }
                    GlyphFormat::BytePerPixel => {
                        let byte = &mut bytes[col * height + row];
                        if !on {
                            *byte = 0x00;
                        } else if *byte == 0x00 {
                            *byte = 0x01;
                        }
                    }
                }
            }
        }
    }
}

impl fmt::Display for GlyphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlyphFormat::ColumnPages => write!(f, "column pages"),
            GlyphFormat::BytePerPixel => write!(f, "byte per pixel"),
        }
    }
}

/// A width x height matrix of on/off pixels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlyphBitmap {
    width: usize,
    height: usize,
    /// Column-major: pixel (col, row) lives at `col * height + row`.
    pixels: Vec<bool>,
}

impl GlyphBitmap {
    /// A bitmap with every pixel off.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; width * height],
        }
    }

    /// Build a bitmap from text rows, `#` meaning on. Handy in tests and for
    /// importing hand-drawn glyphs.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Self {
        let height = rows.len();
        let width = rows
            .iter()
            .map(|r| r.as_ref().chars().count())
            .max()
            .unwrap_or(0);
        let mut bitmap = Self::new(width, height);
        for (row, line) in rows.iter().enumerate() {
            for (col, c) in line.as_ref().chars().enumerate() {
                bitmap.pixels[col * height + row] = c == '#';
            }
        }
        bitmap
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Pixel state, or `None` outside the bitmap.
    pub fn pixel(&self, col: usize, row: usize) -> Option<bool> {
        if col >= self.width || row >= self.height {
            return None;
        }
        Some(self.pixels[col * self.height + row])
    }

    pub fn set_pixel(&mut self, col: usize, row: usize, on: bool) -> Result<(), GlyphError> {
        let idx = self.index_of(col, row)?;
        self.pixels[idx] = on;
        Ok(())
    }

    /// Flip one pixel and return its new state.
    pub fn toggle_pixel(&mut self, col: usize, row: usize) -> Result<bool, GlyphError> {
        let idx = self.index_of(col, row)?;
        self.pixels[idx] = !self.pixels[idx];
        Ok(self.pixels[idx])
    }

    /// Copy `src` into this bitmap with its left edge at column `x`, top-aligned.
    ///
    /// `src` must fit: `x + src.width <= width` and `src.height <= height`.
    pub(crate) fn blit(&mut self, src: &GlyphBitmap, x: usize) {
        for col in 0..src.width {
            let start = (x + col) * self.height;
            self.pixels[start..start + src.height]
                .copy_from_slice(&src.pixels[col * src.height..(col + 1) * src.height]);
        }
    }

    /// One column of pixels, top to bottom.
    pub fn column(&self, col: usize) -> Option<&[bool]> {
        if col >= self.width {
            return None;
        }
        Some(&self.pixels[col * self.height..(col + 1) * self.height])
    }

    /// Render rows of text using `on`/`off` characters.
    pub fn to_text(&self, on: char, off: char) -> String {
        let mut out = String::with_capacity((self.width + 1) * self.height);
        for row in 0..self.height {
            for col in 0..self.width {
                out.push(if self.pixels[col * self.height + row] {
                    on
                } else {
                    off
                });
            }
            out.push('\n');
        }
        out
    }

    fn index_of(&self, col: usize, row: usize) -> Result<usize, GlyphError> {
        if col >= self.width || row >= self.height {
            return Err(GlyphError::PixelOutOfRange {
                col,
                row,
                width: self.width,
                height: self.height,
            });
        }
        Ok(col * self.height + row)
    }
}

/// Decode the glyph described by `glyph` from the firmware buffer.
pub fn decode_glyph(
    glyph: &GlyphMetadata,
    firmware: &FirmwareImage,
) -> Result<GlyphBitmap, GlyphError> {
    let format = firmware.block(glyph.block).format();
    let len = glyph.byte_len(format);
    let bytes = firmware
        .read_bytes(glyph.offset, len)
        .ok_or(GlyphError::OutOfBounds {
            offset: glyph.offset,
            len,
            buffer_len: firmware.len(),
        })?;
    Ok(format.decode(bytes, glyph.width as usize, glyph.height as usize))
}

/// Write `bitmap` back into the glyph's byte range.
pub fn encode_glyph(
    bitmap: &GlyphBitmap,
    glyph: &GlyphMetadata,
    firmware: &mut FirmwareImage,
) -> Result<(), GlyphError> {
    let (width, height) = (glyph.width as usize, glyph.height as usize);
    if bitmap.width != width || bitmap.height != height {
        return Err(GlyphError::DimensionMismatch {
            width,
            height,
            actual_width: bitmap.width,
            actual_height: bitmap.height,
        });
    }

    let format = firmware.block(glyph.block).format();
    let len = glyph.byte_len(format);
    let buffer_len = firmware.len();
    let bytes = firmware
        .bytes_mut(glyph.offset, len)
        .ok_or(GlyphError::OutOfBounds {
            offset: glyph.offset,
            len,
            buffer_len,
        })?;
    format.encode_into(bitmap, bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::Block;

    fn image_with_glyph(format: GlyphFormat, width: u8, height: u8, data: Vec<u8>) -> (FirmwareImage, GlyphMetadata) {
        let glyph = GlyphMetadata {
            index: 1,
            offset: 2,
            width,
            height,
            block: BlockType::Block1,
        };
        let block1 = Block::new(BlockType::Block1, format, vec![glyph], Vec::new()).unwrap();
        let image = FirmwareImage::new("TEST", data, block1, Block::empty(BlockType::Block2));
        (image, glyph)
    }

    #[test]
    fn test_decode_column_pages() {
        // 3x10 glyph: two pages per column.
        let mut data = vec![0xEEu8, 0xEE];
        data.extend_from_slice(&[0b0000_0001, 0b0000_0010, 0x00, 0x00, 0x80, 0x01]);
        let (image, glyph) = image_with_glyph(GlyphFormat::ColumnPages, 3, 10, data);

        let bitmap = decode_glyph(&glyph, &image).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (3, 10));
        assert_eq!(bitmap.pixel(0, 0), Some(true));
        assert_eq!(bitmap.pixel(0, 9), Some(true));
        assert_eq!(bitmap.pixel(0, 1), Some(false));
        assert!(bitmap.column(1).unwrap().iter().all(|p| !p));
        assert_eq!(bitmap.pixel(2, 7), Some(true));
        assert_eq!(bitmap.pixel(2, 8), Some(true));
        assert_eq!(bitmap.pixel(3, 0), None);
    }

    #[test]
    fn test_decode_byte_per_pixel() {
        let data = vec![0, 0, 0x00, 0xFF, 0x01, 0x00];
        let (image, glyph) = image_with_glyph(GlyphFormat::BytePerPixel, 2, 2, data);
        let bitmap = decode_glyph(&glyph, &image).unwrap();
        assert_eq!(bitmap.to_text('#', '.'), ".#\n#.\n");
    }

    #[test]
    fn test_round_trip_column_pages() {
        let (mut image, glyph) =
            image_with_glyph(GlyphFormat::ColumnPages, 5, 11, vec![0u8; 2 + 10]);
        let bitmap = GlyphBitmap::from_rows(&[
            "#...#", ".#.#.", "..#..", ".#.#.", "#...#", "#####", ".....", "#.#.#", ".#.#.",
            "#####", "#...#",
        ]);
        encode_glyph(&bitmap, &glyph, &mut image).unwrap();
        assert_eq!(decode_glyph(&glyph, &image).unwrap(), bitmap);
    }

    #[test]
    fn test_round_trip_byte_per_pixel() {
        let (mut image, glyph) = image_with_glyph(GlyphFormat::BytePerPixel, 3, 2, vec![0x7Fu8; 8]);
        let bitmap = GlyphBitmap::from_rows(&["#.#", ".#."]);
        encode_glyph(&bitmap, &glyph, &mut image).unwrap();
        assert_eq!(decode_glyph(&glyph, &image).unwrap(), bitmap);
        // Already-on pixels keep their stored value.
        assert_eq!(image.byte(2), Some(0x7F));
        assert_eq!(image.byte(3), Some(0x00));
    }

    #[test]
    fn test_encode_preserves_page_padding_and_neighbours() {
        // 1x4 glyph uses only the low nibble of its single byte.
        let data = vec![0xAA, 0xAA, 0xF0, 0xBB];
        let (mut image, glyph) = image_with_glyph(GlyphFormat::ColumnPages, 1, 4, data);
        let bitmap = GlyphBitmap::from_rows(&["#", ".", ".", "#"]);
        encode_glyph(&bitmap, &glyph, &mut image).unwrap();
        assert_eq!(image.data(), &[0xAA, 0xAA, 0xF9, 0xBB]);
    }

    #[test]
    fn test_encode_dimension_mismatch() {
        let (mut image, glyph) = image_with_glyph(GlyphFormat::ColumnPages, 2, 8, vec![0u8; 4]);
        let err = encode_glyph(&GlyphBitmap::new(3, 8), &glyph, &mut image).unwrap_err();
        assert!(matches!(err, GlyphError::DimensionMismatch { actual_width: 3, .. }));
    }

    #[test]
    fn test_decode_out_of_bounds() {
        let (image, glyph) = image_with_glyph(GlyphFormat::BytePerPixel, 4, 4, vec![0u8; 6]);
        assert_eq!(
            decode_glyph(&glyph, &image),
            Err(GlyphError::OutOfBounds {
                offset: 2,
                len: 16,
                buffer_len: 6
            })
        );
    }

    #[test]
    fn test_toggle_pixel() {
        let mut bitmap = GlyphBitmap::new(2, 2);
        assert_eq!(bitmap.toggle_pixel(1, 0), Ok(true));
        assert_eq!(bitmap.pixel(1, 0), Some(true));
        assert_eq!(bitmap.toggle_pixel(1, 0), Ok(false));
        assert!(matches!(
            bitmap.set_pixel(2, 0, true),
            Err(GlyphError::PixelOutOfRange { col: 2, .. })
        ));
    }
}
