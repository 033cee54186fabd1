//! Editor session - owns the loaded firmware and everything tied to it.
//!
//! The session hosts the control flows of the editor: loading a firmware
//! (which resets the glyph cache and patch statuses), previewing and editing
//! strings, editing glyph pixels, and bulk patch operations.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::cache::GlyphCache;
use crate::codec::glyph::{GlyphBitmap, GlyphError, decode_glyph, encode_glyph};
use crate::codec::merge::merge_images;
use crate::codec::string::{
    CharacterSequence, CharacterSlots, StringError, read_raw, read_string, write_char,
};
use crate::events::{EditorEvent, EditorObserver, TracingObserver};
use crate::firmware::{BlockType, FirmwareImage, StringMetadata};
use crate::patch::{
    BulkOperationKind, BulkOperationResult, Patch, PatchCatalog, PatchError, bulk_operation,
    is_patch_applied, is_patch_compatible,
};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No firmware loaded")]
    NoFirmware,
    #[error("Unknown patch: {0}")]
    UnknownPatch(String),
    #[error(transparent)]
    Glyph(#[from] GlyphError),
    #[error(transparent)]
    String(#[from] StringError),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// Result of a session-level bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    /// None of the named patches was in a state the operation applies to.
    NothingToDo,
    Completed(BulkOperationResult),
}

pub struct EditorSession<O: EditorObserver> {
    firmware: Option<FirmwareImage>,
    cache: GlyphCache,
    catalog: PatchCatalog,
    observer: Arc<O>,
}

impl EditorSession<TracingObserver> {
    /// Create a session with the default tracing observer.
    pub fn new(catalog: PatchCatalog) -> Self {
        Self::with_observer(catalog, Arc::new(TracingObserver))
    }
}

impl<O: EditorObserver> EditorSession<O> {
    pub fn with_observer(catalog: PatchCatalog, observer: Arc<O>) -> Self {
        Self {
            firmware: None,
            cache: GlyphCache::detached(),
            catalog,
            observer,
        }
    }

    pub fn firmware(&self) -> Option<&FirmwareImage> {
        self.firmware.as_ref()
    }

    pub fn catalog(&self) -> &PatchCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &GlyphCache {
        &self.cache
    }

    /// Make `image` the current firmware.
    #[instrument(skip_all, fields(definition = %image.definition()))]
    pub fn load_firmware(&mut self, image: FirmwareImage) {
        let definition = image.definition().to_string();
        let size = image.len();
        self.firmware = Some(image);

        self.cache.invalidate();
        self.cache.attach();
        self.observer.on_event(&EditorEvent::CacheInvalidated);

        self.refresh_patch_statuses();
        self.observer
            .on_event(&EditorEvent::FirmwareLoaded { definition, size });
    }

    /// Drop the firmware and everything derived from it.
    pub fn reset(&mut self) {
        self.firmware = None;
        self.cache.detach();
        self.refresh_patch_statuses();
        self.observer.on_event(&EditorEvent::WorkspaceReset);
    }

    /// Hand the firmware back, resetting the session.
    pub fn take_firmware(&mut self) -> Option<FirmwareImage> {
        let firmware = self.firmware.take();
        self.reset();
        firmware
    }

    /// Recompute `is_applied`/`is_compatible` for every catalog patch.
    pub fn refresh_patch_statuses(&mut self) {
        for patch in self.catalog.iter_mut() {
            match &self.firmware {
                Some(firmware) => {
                    patch.is_applied = patch.definition == firmware.definition()
                        && is_patch_applied(patch, firmware);
                    patch.is_compatible =
                        is_patch_compatible(patch, firmware) || patch.is_applied;
                }
                None => {
                    patch.is_applied = false;
                    patch.is_compatible = false;
                }
            }
        }
    }

    /// Patches targeting the loaded firmware's definition.
    pub fn suitable_patches(&self) -> Vec<&Patch> {
        match &self.firmware {
            Some(firmware) => self.catalog.suitable_for(firmware.definition()).collect(),
            None => Vec::new(),
        }
    }

    pub fn read_string(
        &self,
        block: BlockType,
        string: usize,
    ) -> Result<CharacterSequence, SessionError> {
        let firmware = self.loaded()?;
        let meta = string_metadata(firmware, block, string)?;
        Ok(read_string(&meta, firmware)?)
    }

    /// Editing slots for one string.
    pub fn character_slots(
        &self,
        block: BlockType,
        string: usize,
    ) -> Result<CharacterSlots, SessionError> {
        let firmware = self.loaded()?;
        let meta = string_metadata(firmware, block, string)?;
        Ok(CharacterSlots::from_raw(read_raw(&meta, firmware)?))
    }

    /// Write one character through `slots`, applying the termination rules.
    ///
    /// Slots cleared by a soft truncation are written as `0x00` too; their
    /// indices are returned.
    pub fn set_char(
        &mut self,
        block: BlockType,
        string: usize,
        slots: &mut CharacterSlots,
        slot: usize,
        value: u8,
    ) -> Result<Vec<usize>, SessionError> {
        let firmware = self.firmware.as_mut().ok_or(SessionError::NoFirmware)?;
        let meta = string_metadata(firmware, block, string)?;

        read_raw(&meta, firmware)?;
        if slots.len() > meta.length {
            return Err(StringError::SlotOutOfRange {
                index: slots.len() - 1,
                length: meta.length,
            }
            .into());
        }
        slots.check_write(slot, value)?;
        write_char(value, slot, &meta, firmware)?;
        let reset = slots.apply_write(slot, value)?;
        for &index in &reset {
            write_char(0x00, index, &meta, firmware)?;
        }

        self.observer.on_event(&EditorEvent::CharWritten {
            block,
            string,
            slot,
            value,
        });
        for &index in &reset {
            self.observer.on_event(&EditorEvent::CharWritten {
                block,
                string,
                slot: index,
                value: 0x00,
            });
        }
        Ok(reset)
    }

    /// Render a string as one bitmap. Characters whose glyph is missing or
    /// cannot be decoded are skipped.
    pub fn string_preview(
        &mut self,
        block: BlockType,
        string: usize,
    ) -> Result<GlyphBitmap, SessionError> {
        let firmware = self.firmware.as_ref().ok_or(SessionError::NoFirmware)?;
        let meta = string_metadata(firmware, block, string)?;
        let chars = read_string(&meta, firmware)?;

        let cache = &mut self.cache;
        let images: Vec<_> = chars
            .iter()
            .filter_map(|&c| cache.try_image(firmware, c, block))
            .collect();
        Ok(merge_images(images))
    }

    pub fn glyph(&mut self, block: BlockType, index: u8) -> Result<Arc<GlyphBitmap>, SessionError> {
        let firmware = self.firmware.as_ref().ok_or(SessionError::NoFirmware)?;
        Ok(self.cache.get_image(firmware, index, block)?)
    }

    /// Rendering-side glyph lookup; `None` means "skip this entry".
    pub fn try_glyph(&mut self, block: BlockType, index: u8) -> Option<Arc<GlyphBitmap>> {
        let firmware = self.firmware.as_ref()?;
        self.cache.try_image(firmware, index, block)
    }

    pub fn set_pixel(
        &mut self,
        block: BlockType,
        index: u8,
        col: usize,
        row: usize,
        on: bool,
    ) -> Result<(), SessionError> {
        self.edit_glyph(block, index, |bitmap| bitmap.set_pixel(col, row, on))
    }

    /// Flip one pixel of a glyph and return its new state.
    pub fn toggle_pixel(
        &mut self,
        block: BlockType,
        index: u8,
        col: usize,
        row: usize,
    ) -> Result<bool, SessionError> {
        self.edit_glyph(block, index, |bitmap| bitmap.toggle_pixel(col, row))
    }

    /// Replace a whole glyph bitmap.
    pub fn write_glyph(
        &mut self,
        block: BlockType,
        index: u8,
        bitmap: &GlyphBitmap,
    ) -> Result<(), SessionError> {
        self.edit_glyph(block, index, |current| {
            *current = bitmap.clone();
            Ok(())
        })
    }

    fn edit_glyph<T>(
        &mut self,
        block: BlockType,
        index: u8,
        edit: impl FnOnce(&mut GlyphBitmap) -> Result<T, GlyphError>,
    ) -> Result<T, SessionError> {
        let firmware = self.firmware.as_mut().ok_or(SessionError::NoFirmware)?;
        let glyph = *firmware
            .block(block)
            .glyph(index)
            .ok_or(GlyphError::NotFound { block, index })?;

        let mut bitmap = decode_glyph(&glyph, firmware)?;
        let out = edit(&mut bitmap)?;
        encode_glyph(&bitmap, &glyph, firmware)?;
        self.cache.store(index, block, bitmap);

        self.observer
            .on_event(&EditorEvent::GlyphEdited { block, index });
        Ok(out)
    }

    /// Apply the named patches that are not yet applied.
    pub fn apply_patches<S: AsRef<str>>(&mut self, names: &[S]) -> Result<BulkOutcome, SessionError> {
        self.bulk(BulkOperationKind::Apply, names)
    }

    /// Roll back the named patches that are applied.
    pub fn rollback_patches<S: AsRef<str>>(
        &mut self,
        names: &[S],
    ) -> Result<BulkOutcome, SessionError> {
        self.bulk(BulkOperationKind::Rollback, names)
    }

    #[instrument(skip(self, names))]
    fn bulk<S: AsRef<str>>(
        &mut self,
        kind: BulkOperationKind,
        names: &[S],
    ) -> Result<BulkOutcome, SessionError> {
        let selected: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
        if let Some(unknown) = selected.iter().find(|n| self.catalog.get(n).is_none()) {
            return Err(SessionError::UnknownPatch(unknown.to_string()));
        }

        let firmware = self.firmware.as_mut().ok_or(SessionError::NoFirmware)?;
        let wants_applied = kind == BulkOperationKind::Rollback;
        let candidates: Vec<&mut Patch> = self
            .catalog
            .iter_mut()
            .filter(|p| selected.contains(&p.name.as_str()) && p.is_applied == wants_applied)
            .collect();
        if candidates.is_empty() {
            info!(kind = %kind, "No candidate patches");
            return Ok(BulkOutcome::NothingToDo);
        }

        let result = bulk_operation(candidates, |patch| kind.run(patch, firmware));

        // Patches may rewrite glyph data.
        if !result.proceeded.is_empty() {
            self.cache.invalidate();
            self.observer.on_event(&EditorEvent::CacheInvalidated);
        }
        self.refresh_patch_statuses();

        for patch in &result.proceeded {
            self.observer.on_event(&EditorEvent::PatchProceeded {
                kind,
                name: patch.name.clone(),
            });
        }
        for patch in &result.conflicted {
            self.observer.on_event(&EditorEvent::PatchConflicted {
                kind,
                name: patch.name.clone(),
            });
        }
        self.observer.on_event(&EditorEvent::BulkCompleted {
            kind,
            proceeded: result.proceeded.len(),
            conflicted: result.conflicted.len(),
        });

        Ok(BulkOutcome::Completed(result))
    }

    fn loaded(&self) -> Result<&FirmwareImage, SessionError> {
        self.firmware.as_ref().ok_or(SessionError::NoFirmware)
    }
}

fn string_metadata(
    firmware: &FirmwareImage,
    block: BlockType,
    index: usize,
) -> Result<StringMetadata, StringError> {
    firmware
        .block(block)
        .string(index)
        .copied()
        .ok_or(StringError::NotFound { block, index })
}
