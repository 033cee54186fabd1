//! fwedit-core: firmware glyph/string editing and binary patching.
//!
//! This crate edits binary firmware images for embedded devices with small
//! monochrome displays. It decodes the glyph bitmaps and glyph-index strings
//! stored in the firmware and applies or rolls back byte-level patches.
//!
//! # Architecture
//!
//! - **Firmware**: byte buffer plus the two block tables
//! - **Definition**: TOML description of a firmware family's layout
//! - **Codec**: glyph bitmaps, strings, merged previews
//! - **Cache**: memoized glyph decodes
//! - **Patch**: catalog and engine (apply, rollback, bulk)
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: owns the loaded firmware and drives the flows above
//!
//! # Example
//!
//! ```no_run
//! use fwedit_core::{EditorSession, FirmwareDefinition, FirmwareImage, PatchCatalog};
//! use fwedit_core::firmware::BlockType;
//!
//! let definition = FirmwareDefinition::load_from_file("vtc_mini.toml").unwrap();
//! let data = std::fs::read("firmware.bin").unwrap();
//! let image = FirmwareImage::from_definition(&definition, data).unwrap();
//!
//! let mut session = EditorSession::new(PatchCatalog::load_dir("patches").unwrap());
//! session.load_firmware(image);
//! let preview = session.string_preview(BlockType::Block1, 0).unwrap();
//! print!("{}", preview.to_text('#', '.'));
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod definition;
pub mod events;
pub mod firmware;
pub mod patch;
pub mod session;

// Re-exports for convenience
pub use cache::{GlyphCache, GlyphSource};
pub use codec::{
    CharSlot, CharacterSequence, CharacterSlots, GlyphBitmap, GlyphError, GlyphFormat,
    StringError, decode_glyph, encode_glyph, merge_images, read_string, write_char,
};
pub use config::EditorConfig;
pub use definition::{DefinitionError, FirmwareDefinition};
pub use events::{EditorEvent, EditorObserver, NullObserver, TracingObserver};
pub use firmware::{Block, BlockType, FirmwareError, FirmwareImage, GlyphMetadata, StringMetadata};
pub use patch::{
    BulkOperationKind, BulkOperationResult, ByteEdit, Patch, PatchCatalog, PatchError,
    apply_patch, bulk_operation, is_patch_applied, is_patch_compatible, rollback_patch,
};
pub use session::{BulkOutcome, EditorSession, SessionError};
