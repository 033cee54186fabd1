//! String codec.
//!
//! A firmware string is a fixed-length run of glyph indices. The logical
//! string ends at the first `0x00`; a `0x00` in the last allocated byte is
//! padding and never counts as a character.

use std::ops::Deref;

use thiserror::Error;
use tracing::debug;

use crate::firmware::{BlockType, FirmwareImage, StringMetadata};

/// Invalid string data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StringError {
    #[error("Invalid string data: 0x{offset:X}+{length} is outside the image ({buffer_len} bytes)")]
    OutOfBounds {
        offset: usize,
        length: usize,
        buffer_len: usize,
    },
    #[error("Invalid string data: slot {index} is outside a {length}-slot string")]
    SlotOutOfRange { index: usize, length: usize },
    #[error("Invalid string data: slot {index} is disabled")]
    SlotDisabled { index: usize },
    #[error("Invalid string data: the first slot cannot be a terminator")]
    LeadingTerminator,
    #[error("String {index} not found in {block}")]
    NotFound { block: BlockType, index: usize },
}

/// Logical characters of a string, as glyph indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CharacterSequence(Vec<u8>);

impl CharacterSequence {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for CharacterSequence {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Borrow the full allocated range of a string.
pub fn read_raw<'a>(
    string: &StringMetadata,
    firmware: &'a FirmwareImage,
) -> Result<&'a [u8], StringError> {
    firmware
        .read_bytes(string.offset, string.length)
        .ok_or(StringError::OutOfBounds {
            offset: string.offset,
            length: string.length,
            buffer_len: firmware.len(),
        })
}

/// Read the logical characters of a string.
pub fn read_string(
    string: &StringMetadata,
    firmware: &FirmwareImage,
) -> Result<CharacterSequence, StringError> {
    let raw = read_raw(string, firmware)?;
    let end = raw.iter().position(|&b| b == 0x00).unwrap_or(raw.len());
    Ok(CharacterSequence(raw[..end].to_vec()))
}

/// Write one character slot.
pub fn write_char(
    value: u8,
    char_index: usize,
    string: &StringMetadata,
    firmware: &mut FirmwareImage,
) -> Result<(), StringError> {
    if char_index >= string.length {
        return Err(StringError::SlotOutOfRange {
            index: char_index,
            length: string.length,
        });
    }
    let buffer_len = firmware.len();
    let byte = firmware
        .bytes_mut(string.offset + char_index, 1)
        .ok_or(StringError::OutOfBounds {
            offset: string.offset,
            length: string.length,
            buffer_len,
        })?;
    byte[0] = value;
    debug!(
        offset = %format!("0x{:X}", string.offset),
        slot = char_index,
        value = %format!("0x{:02X}", value),
        "Char written"
    );
    Ok(())
}

/// Editable state of one character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharSlot {
    pub index: usize,
    pub value: u8,
    pub enabled: bool,
}

impl CharSlot {
    /// Whether the slot may hold a terminator.
    pub fn accepts_null(&self) -> bool {
        self.index > 0
    }
}

/// Ordered editing slots for one string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CharacterSlots {
    slots: Vec<CharSlot>,
}

impl CharacterSlots {
    /// Build slots from a string's raw allocated bytes.
    ///
    /// A trailing `0x00` gets no slot. Every slot after the first `0x00` starts
    /// disabled.
    pub fn from_raw(raw: &[u8]) -> Self {
        let mut slots = Vec::with_capacity(raw.len());
        let mut null_found = false;
        for (index, &value) in raw.iter().enumerate() {
            if index == raw.len() - 1 && value == 0x00 {
                continue;
            }
            slots.push(CharSlot {
                index,
                value,
                enabled: !null_found,
            });
            null_found |= value == 0x00;
        }
        Self { slots }
    }

    pub fn slots(&self) -> &[CharSlot] {
        &self.slots
    }

    pub fn get(&self, index: usize) -> Option<&CharSlot> {
        self.slots.get(index)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Check that `value` may be written to slot `index`.
    pub fn check_write(&self, index: usize, value: u8) -> Result<(), StringError> {
        let slot = self.slots.get(index).ok_or(StringError::SlotOutOfRange {
            index,
            length: self.slots.len(),
        })?;
        if !slot.enabled {
            return Err(StringError::SlotDisabled { index });
        }
        if value == 0x00 && !slot.accepts_null() {
            return Err(StringError::LeadingTerminator);
        }
        Ok(())
    }

    /// Record a write to slot `index` and apply the termination rules.
    ///
    /// A `0x00` disables every later slot and resets it to `0x00`; the indices
    /// of slots whose value changed are returned so the caller can write them
    /// through. A non-zero value re-enables the next slot if it was disabled
    /// holding `0x00`.
    pub fn apply_write(&mut self, index: usize, value: u8) -> Result<Vec<usize>, StringError> {
        self.check_write(index, value)?;
        self.slots[index].value = value;

        let mut reset = Vec::new();
        if value == 0x00 {
            for slot in &mut self.slots[index + 1..] {
                if slot.value != 0x00 {
                    reset.push(slot.index);
                }
                slot.value = 0x00;
                slot.enabled = false;
            }
        } else if let Some(next) = self.slots.get_mut(index + 1) {
            if next.value == 0x00 && !next.enabled {
                next.enabled = true;
            }
        }
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::Block;

    fn image(data: Vec<u8>) -> FirmwareImage {
        FirmwareImage::new(
            "TEST",
            data,
            Block::empty(BlockType::Block1),
            Block::empty(BlockType::Block2),
        )
    }

    fn string(offset: usize, length: usize) -> StringMetadata {
        StringMetadata {
            offset,
            length,
            block: BlockType::Block1,
        }
    }

    #[test]
    fn test_read_full_string() {
        let fw = image(vec![0xFF, 0x11, 0x12, 0x13, 0x14, 0x15, 0xFF]);
        let seq = read_string(&string(1, 5), &fw).unwrap();
        assert_eq!(seq.as_bytes(), &[0x11, 0x12, 0x13, 0x14, 0x15]);
    }

    #[test]
    fn test_read_stops_at_first_null() {
        let fw = image(vec![0x11, 0x00, 0x13, 0x14, 0x00]);
        assert_eq!(read_string(&string(0, 5), &fw).unwrap().len(), 1);
    }

    #[test]
    fn test_trailing_padding_dropped() {
        let fw = image(vec![0x11, 0x12, 0x13, 0x14, 0x00]);
        assert_eq!(
            read_string(&string(0, 5), &fw).unwrap().as_bytes(),
            &[0x11, 0x12, 0x13, 0x14]
        );
    }

    #[test]
    fn test_null_write_truncates() {
        // Non-final slot.
        let mut fw = image(vec![0x11, 0x12, 0x13, 0x14, 0x15]);
        let meta = string(0, 5);
        write_char(0x00, 2, &meta, &mut fw).unwrap();
        assert_eq!(read_string(&meta, &fw).unwrap().len(), 2);

        // Final slot: the terminator is padding and the length is the slot index.
        let mut fw = image(vec![0x11, 0x12, 0x13, 0x14, 0x15]);
        write_char(0x00, 4, &meta, &mut fw).unwrap();
        assert_eq!(read_string(&meta, &fw).unwrap().len(), 4);

        // Final slot already padding: length unchanged.
        let mut fw = image(vec![0x11, 0x12, 0x13, 0x14, 0x00]);
        write_char(0x00, 4, &meta, &mut fw).unwrap();
        assert_eq!(read_string(&meta, &fw).unwrap().len(), 4);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut fw = image(vec![0x11; 4]);
        let meta = string(2, 5);
        assert_eq!(
            read_string(&meta, &fw),
            Err(StringError::OutOfBounds {
                offset: 2,
                length: 5,
                buffer_len: 4
            })
        );
        assert!(matches!(
            write_char(0x20, 3, &meta, &mut fw),
            Err(StringError::OutOfBounds { .. })
        ));
        assert_eq!(
            write_char(0x20, 5, &meta, &mut fw),
            Err(StringError::SlotOutOfRange {
                index: 5,
                length: 5
            })
        );
        assert_eq!(fw.data(), &[0x11; 4]);
    }

    #[test]
    fn test_slots_from_raw() {
        let slots = CharacterSlots::from_raw(&[0x11, 0x00, 0x13, 0x00]);
        assert_eq!(slots.len(), 3);
        assert!(slots.get(0).unwrap().enabled);
        assert!(slots.get(1).unwrap().enabled);
        assert!(!slots.get(2).unwrap().enabled);
        assert!(!slots.get(0).unwrap().accepts_null());

        assert_eq!(CharacterSlots::from_raw(&[0x11, 0x12]).len(), 2);
        assert!(CharacterSlots::from_raw(&[]).is_empty());
    }

    #[test]
    fn test_slots_after_terminator_stay_disabled() {
        let slots = CharacterSlots::from_raw(&[0x11, 0x00, 0x13, 0x14, 0x15]);
        let enabled: Vec<bool> = slots.slots().iter().map(|s| s.enabled).collect();
        assert_eq!(enabled, vec![true, true, false, false, false]);
        for index in 2..5 {
            assert_eq!(
                slots.check_write(index, 0x20),
                Err(StringError::SlotDisabled { index })
            );
        }
        assert!(slots.check_write(1, 0x20).is_ok());
    }

    #[test]
    fn test_soft_truncation_resets_later_slots() {
        let mut slots = CharacterSlots::from_raw(&[0x11, 0x12, 0x13, 0x00, 0x15]);
        let reset = slots.apply_write(1, 0x00).unwrap();
        assert_eq!(reset, vec![2, 4]);
        for slot in &slots.slots()[2..] {
            assert_eq!(slot.value, 0x00);
            assert!(!slot.enabled);
        }
        assert!(matches!(
            slots.apply_write(3, 0x20),
            Err(StringError::SlotDisabled { index: 3 })
        ));
    }

    #[test]
    fn test_non_null_write_reenables_next_slot() {
        let mut slots = CharacterSlots::from_raw(&[0x11, 0x00, 0x00, 0x00, 0x00]);
        assert!(!slots.get(2).unwrap().enabled);

        slots.apply_write(1, 0x22).unwrap();
        let next = slots.get(2).unwrap();
        assert!(next.enabled);
        assert_eq!(next.value, 0x00);
        assert!(!slots.get(3).unwrap().enabled);
    }

    #[test]
    fn test_leading_terminator_refused() {
        let mut slots = CharacterSlots::from_raw(&[0x11, 0x12]);
        assert_eq!(
            slots.apply_write(0, 0x00),
            Err(StringError::LeadingTerminator)
        );
        assert_eq!(slots.get(0).unwrap().value, 0x11);
    }
}
