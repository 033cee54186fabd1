//! Firmware definitions.
//!
//! A definition names a firmware family and declares, for each block, where
//! the glyphs and strings are stored. Definitions are TOML documents:
//!
//! ```toml
//! name = "Evic VTC Mini"
//!
//! [block1]
//! format = "column_pages"
//! glyph_table = { offset = 0x1F000, count = 128, first_index = 1 }
//! strings = [{ offset = 0x2A000, length = 10 }]
//!
//! [block2]
//! format = "byte_per_pixel"
//! glyphs = [{ index = 1, offset = 0x30000, width = 6, height = 8 }]
//! ```

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::glyph::GlyphFormat;

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Malformed definition: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Definition has an empty name")]
    EmptyName,
}

/// Pointer table describing a run of consecutive glyph indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphTableDefinition {
    /// Offset of the first little-endian u32 pointer.
    pub offset: usize,
    /// Number of pointers.
    pub count: usize,
    /// Glyph index of the first entry.
    #[serde(default)]
    pub first_index: u8,
}

/// An explicitly placed glyph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphDefinition {
    pub index: u8,
    pub offset: usize,
    pub width: u8,
    pub height: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringDefinition {
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDefinition {
    #[serde(default)]
    pub format: GlyphFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glyph_table: Option<GlyphTableDefinition>,
    #[serde(default)]
    pub glyphs: Vec<GlyphDefinition>,
    #[serde(default)]
    pub strings: Vec<StringDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareDefinition {
    /// Firmware family name. Patches target definitions by this name.
    pub name: String,
    #[serde(default)]
    pub block1: BlockDefinition,
    #[serde(default)]
    pub block2: BlockDefinition,
}

impl FirmwareDefinition {
    /// Parse a definition from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, DefinitionError> {
        let definition: FirmwareDefinition = toml::from_str(text)?;
        if definition.name.trim().is_empty() {
            return Err(DefinitionError::EmptyName);
        }
        Ok(definition)
    }

    /// Load a definition from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    /// Save the definition to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_definition() {
        let text = r#"
            name = "VTC Mini"

            [block1]
            glyph_table = { offset = 0x100, count = 4, first_index = 1 }
            strings = [{ offset = 0x200, length = 10 }, { offset = 0x20A, length = 6 }]

            [block2]
            format = "byte_per_pixel"
            glyphs = [{ index = 3, offset = 0x300, width = 6, height = 8 }]
        "#;

        let definition = FirmwareDefinition::from_toml_str(text).unwrap();
        assert_eq!(definition.name, "VTC Mini");
        assert_eq!(definition.block1.format, GlyphFormat::ColumnPages);
        assert_eq!(
            definition.block1.glyph_table,
            Some(GlyphTableDefinition {
                offset: 0x100,
                count: 4,
                first_index: 1
            })
        );
        assert_eq!(definition.block1.strings[1].offset, 0x20A);
        assert_eq!(definition.block2.format, GlyphFormat::BytePerPixel);
        assert_eq!(definition.block2.glyphs[0].width, 6);
    }

    #[test]
    fn test_missing_blocks_default_to_empty() {
        let definition = FirmwareDefinition::from_toml_str(r#"name = "Bare""#).unwrap();
        assert!(definition.block1.glyphs.is_empty());
        assert!(definition.block2.glyph_table.is_none());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            FirmwareDefinition::from_toml_str(r#"name = "  ""#),
            Err(DefinitionError::EmptyName)
        ));
        assert!(matches!(
            FirmwareDefinition::from_toml_str("name = 5"),
            Err(DefinitionError::Parse(_))
        ));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let definition = FirmwareDefinition {
            name: "Cuboid".to_string(),
            block1: BlockDefinition {
                strings: vec![StringDefinition {
                    offset: 16,
                    length: 8,
                }],
                ..Default::default()
            },
            block2: BlockDefinition::default(),
        };
        let text = toml::to_string_pretty(&definition).unwrap();
        assert_eq!(FirmwareDefinition::from_toml_str(&text).unwrap(), definition);
    }
}
