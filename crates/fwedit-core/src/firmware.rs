//! Firmware image model.
//!
//! A loaded firmware is a mutable byte buffer plus two independent blocks,
//! each describing where its glyphs and strings live inside the buffer.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::codec::glyph::GlyphFormat;
use crate::definition::{BlockDefinition, FirmwareDefinition, GlyphTableDefinition};

#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("Duplicate glyph index 0x{index:02X} in {block}")]
    DuplicateGlyphIndex { block: BlockType, index: u8 },
    #[error("Overlapping ranges in {block}: 0x{first:X} and 0x{second:X}")]
    OverlappingRanges {
        block: BlockType,
        first: usize,
        second: usize,
    },
    #[error("Glyph table entry {entry} in {block} at 0x{offset:X} is outside the image ({len} bytes)")]
    GlyphTableOutOfBounds {
        block: BlockType,
        entry: usize,
        offset: usize,
        len: usize,
    },
    #[error("Glyph table in {block} has too many entries: {count} starting at 0x{first_index:02X}")]
    GlyphTableTooLarge {
        block: BlockType,
        first_index: u8,
        count: usize,
    },
}

/// One of the two independent memory partitions of a firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Block1,
    Block2,
}

impl BlockType {
    /// Map a 1-based block number to a block.
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(BlockType::Block1),
            2 => Some(BlockType::Block2),
            _ => None,
        }
    }
}

impl Default for BlockType {
    fn default() -> Self {
        Self::Block1
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Block1 => write!(f, "Block 1"),
            BlockType::Block2 => write!(f, "Block 2"),
        }
    }
}

/// Location and size of one glyph bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphMetadata {
    pub index: u8,
    /// Offset of the first pixel byte.
    pub offset: usize,
    pub width: u8,
    pub height: u8,
    pub block: BlockType,
}

impl GlyphMetadata {
    /// Number of bytes the glyph occupies in the given storage format.
    pub fn byte_len(&self, format: GlyphFormat) -> usize {
        format.data_len(self.width as usize, self.height as usize)
    }
}

/// Location of one fixed-length string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringMetadata {
    pub offset: usize,
    /// Allocated length in bytes, including any trailing padding.
    pub length: usize,
    pub block: BlockType,
}

/// Glyph and string tables for one block.
#[derive(Debug, Clone)]
pub struct Block {
    block_type: BlockType,
    format: GlyphFormat,
    glyphs: Vec<GlyphMetadata>,
    strings: Vec<StringMetadata>,
}

impl Block {
    /// Build a block, checking that glyph indices are unique and that no two
    /// declared ranges overlap.
    pub fn new(
        block_type: BlockType,
        format: GlyphFormat,
        glyphs: Vec<GlyphMetadata>,
        strings: Vec<StringMetadata>,
    ) -> Result<Self, FirmwareError> {
        Self::with_reserved(block_type, format, glyphs, strings, Vec::new())
    }

    /// Like [`Block::new`], with extra `[start, end)` ranges (pointer tables,
    /// glyph headers) that glyphs and strings must not overlap either.
    pub(crate) fn with_reserved(
        block_type: BlockType,
        format: GlyphFormat,
        glyphs: Vec<GlyphMetadata>,
        strings: Vec<StringMetadata>,
        reserved: Vec<(usize, usize)>,
    ) -> Result<Self, FirmwareError> {
        let mut seen = [false; 256];
        for glyph in &glyphs {
            if seen[glyph.index as usize] {
                return Err(FirmwareError::DuplicateGlyphIndex {
                    block: block_type,
                    index: glyph.index,
                });
            }
            seen[glyph.index as usize] = true;
        }

        let mut ranges: Vec<(usize, usize)> = glyphs
            .iter()
            .map(|g| (g.offset, g.offset + g.byte_len(format)))
            .chain(strings.iter().map(|s| (s.offset, s.offset + s.length)))
            .chain(reserved)
            .filter(|(start, end)| end > start)
            .collect();
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Err(FirmwareError::OverlappingRanges {
                    block: block_type,
                    first: pair[0].0,
                    second: pair[1].0,
                });
            }
        }

        Ok(Self {
            block_type,
            format,
            glyphs,
            strings,
        })
    }

    /// A block with no glyphs and no strings.
    pub fn empty(block_type: BlockType) -> Self {
        Self {
            block_type,
            format: GlyphFormat::default(),
            glyphs: Vec::new(),
            strings: Vec::new(),
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn format(&self) -> GlyphFormat {
        self.format
    }

    pub fn glyphs(&self) -> &[GlyphMetadata] {
        &self.glyphs
    }

    pub fn strings(&self) -> &[StringMetadata] {
        &self.strings
    }

    /// Look up a glyph by its index.
    pub fn glyph(&self, index: u8) -> Option<&GlyphMetadata> {
        self.glyphs.iter().find(|g| g.index == index)
    }

    /// Look up a string by its position in the string table.
    pub fn string(&self, position: usize) -> Option<&StringMetadata> {
        self.strings.get(position)
    }

    /// All glyph indices in table order.
    pub fn glyph_indices(&self) -> impl Iterator<Item = u8> + '_ {
        self.glyphs.iter().map(|g| g.index)
    }
}

/// A loaded firmware image.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    definition: String,
    data: Vec<u8>,
    block1: Block,
    block2: Block,
}

impl FirmwareImage {
    pub fn new(definition: impl Into<String>, data: Vec<u8>, block1: Block, block2: Block) -> Self {
        Self {
            definition: definition.into(),
            data,
            block1,
            block2,
        }
    }

    /// Resolve a definition's block tables against raw firmware bytes.
    pub fn from_definition(
        definition: &FirmwareDefinition,
        data: Vec<u8>,
    ) -> Result<Self, FirmwareError> {
        let block1 = resolve_block(BlockType::Block1, &definition.block1, &data)?;
        let block2 = resolve_block(BlockType::Block2, &definition.block2, &data)?;

        info!(
            definition = %definition.name,
            size = data.len(),
            block1_glyphs = block1.glyphs().len(),
            block1_strings = block1.strings().len(),
            block2_glyphs = block2.glyphs().len(),
            block2_strings = block2.strings().len(),
            "Firmware resolved"
        );

        Ok(Self::new(definition.name.clone(), data, block1, block2))
    }

    /// Name of the firmware family this image belongs to.
    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn block(&self, block: BlockType) -> &Block {
        match block {
            BlockType::Block1 => &self.block1,
            BlockType::Block2 => &self.block2,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn byte(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    /// Borrow `len` bytes at `offset`, or `None` if the range leaves the buffer.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.data.get(offset..end)
    }

    pub(crate) fn bytes_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        self.data.get_mut(offset..end)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn resolve_block(
    block_type: BlockType,
    definition: &BlockDefinition,
    data: &[u8],
) -> Result<Block, FirmwareError> {
    let (mut glyphs, reserved) = match &definition.glyph_table {
        Some(table) => read_glyph_table(block_type, table, data)?,
        None => (Vec::new(), Vec::new()),
    };
    glyphs.extend(definition.glyphs.iter().map(|g| GlyphMetadata {
        index: g.index,
        offset: g.offset,
        width: g.width,
        height: g.height,
        block: block_type,
    }));

    let strings = definition
        .strings
        .iter()
        .map(|s| StringMetadata {
            offset: s.offset,
            length: s.length,
            block: block_type,
        })
        .collect();

    Block::with_reserved(block_type, definition.format, glyphs, strings, reserved)
}

/// Walk a table of little-endian u32 pointers. Each pointer addresses a
/// two-byte (width, height) header followed by the glyph's pixel data.
///
/// Also returns the byte ranges of the table and the headers.
fn read_glyph_table(
    block: BlockType,
    table: &GlyphTableDefinition,
    data: &[u8],
) -> Result<(Vec<GlyphMetadata>, Vec<(usize, usize)>), FirmwareError> {
    if table.first_index as usize + table.count > 256 {
        return Err(FirmwareError::GlyphTableTooLarge {
            block,
            first_index: table.first_index,
            count: table.count,
        });
    }

    let mut glyphs = Vec::with_capacity(table.count);
    let mut reserved = Vec::with_capacity(table.count + 1);
    reserved.push((table.offset, table.offset + table.count * 4));
    for entry in 0..table.count {
        let slot = table.offset + entry * 4;
        let pointer_bytes = data
            .get(slot..slot + 4)
            .ok_or(FirmwareError::GlyphTableOutOfBounds {
                block,
                entry,
                offset: slot,
                len: data.len(),
            })?;
        let pointer = LittleEndian::read_u32(pointer_bytes) as usize;
        let header = data
            .get(pointer..pointer + 2)
            .ok_or(FirmwareError::GlyphTableOutOfBounds {
                block,
                entry,
                offset: pointer,
                len: data.len(),
            })?;

        reserved.push((pointer, pointer + 2));

        let index = table.first_index + entry as u8;
        debug!(block = %block, index, pointer = %format!("0x{:X}", pointer), "Glyph table entry");
        glyphs.push(GlyphMetadata {
            index,
            offset: pointer + 2,
            width: header[0],
            height: header[1],
            block,
        });
    }
    Ok((glyphs, reserved))
}
