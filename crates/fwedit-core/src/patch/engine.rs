//! Patch engine.
//!
//! Apply and rollback validate every edit before writing anything, so a
//! failed call leaves the firmware untouched. Bulk operations run each patch
//! independently against the buffer as left by the previous one.

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use super::catalog::{ByteEdit, Patch};
use crate::firmware::FirmwareImage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error(
        "Patch '{patch}' conflicts at 0x{offset:X}: expected 0x{expected:02X}, found 0x{actual:02X}"
    )]
    Conflict {
        patch: String,
        offset: usize,
        expected: u8,
        actual: u8,
    },
    #[error("Patch '{patch}' targets '{expected}', firmware is '{actual}'")]
    DefinitionMismatch {
        patch: String,
        expected: String,
        actual: String,
    },
    #[error("Patch '{patch}' edits 0x{offset:X}, outside the image ({buffer_len} bytes)")]
    OffsetOutOfBounds {
        patch: String,
        offset: usize,
        buffer_len: usize,
    },
}

/// Which way a bulk operation moves patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOperationKind {
    Apply,
    Rollback,
}

impl BulkOperationKind {
    /// Run this operation on one patch.
    pub fn run(&self, patch: &mut Patch, firmware: &mut FirmwareImage) -> Result<(), PatchError> {
        match self {
            BulkOperationKind::Apply => apply_patch(patch, firmware),
            BulkOperationKind::Rollback => rollback_patch(patch, firmware),
        }
    }
}

impl fmt::Display for BulkOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkOperationKind::Apply => write!(f, "apply"),
            BulkOperationKind::Rollback => write!(f, "rollback"),
        }
    }
}

/// Outcome of a bulk operation. Both lists keep input order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BulkOperationResult {
    pub proceeded: Vec<Patch>,
    pub conflicted: Vec<Patch>,
}

impl BulkOperationResult {
    pub fn total(&self) -> usize {
        self.proceeded.len() + self.conflicted.len()
    }

    /// User-facing summary of the operation.
    pub fn report(&self, kind: BulkOperationKind) -> String {
        let (done, not_done, listed, skipped) = match kind {
            BulkOperationKind::Apply => (
                "Patching is completed.",
                "Patching is not completed.",
                "List of installed patches:",
                "Patches that have not been installed because of conflicts:",
            ),
            BulkOperationKind::Rollback => (
                "Rollback is completed.",
                "Rollback is not completed.",
                "List of rolled back patches:",
                "Patches that have not been rolled back because of conflicts:",
            ),
        };

        let mut out = String::new();
        if !self.proceeded.is_empty() {
            out.push_str(done);
            out.push_str("\n\n");
            out.push_str(listed);
            out.push('\n');
            for patch in &self.proceeded {
                out.push_str(&format!(" - {}\n", patch.name));
            }
        }
        if !self.conflicted.is_empty() {
            if self.proceeded.is_empty() {
                out.push_str(not_done);
                out.push('\n');
            }
            out.push('\n');
            out.push_str(skipped);
            out.push('\n');
            for patch in &self.conflicted {
                out.push_str(&format!(" - {}\n", patch.name));
            }
        }
        out
    }
}

/// True if the firmware is in either the pre- or post-patch state at every
/// edited offset and belongs to the patch's definition.
pub fn is_patch_compatible(patch: &Patch, firmware: &FirmwareImage) -> bool {
    patch.definition == firmware.definition()
        && patch.edits.iter().all(|edit| {
            firmware
                .byte(edit.offset)
                .is_some_and(|b| b == edit.original || b == edit.patched)
        })
}

/// True if every edited offset holds the patched value.
pub fn is_patch_applied(patch: &Patch, firmware: &FirmwareImage) -> bool {
    patch
        .edits
        .iter()
        .all(|edit| firmware.byte(edit.offset) == Some(edit.patched))
}

/// Apply all edits of a patch, or none of them.
pub fn apply_patch(patch: &mut Patch, firmware: &mut FirmwareImage) -> Result<(), PatchError> {
    verify(patch, firmware, |edit| edit.original)?;
    write(patch, firmware, |edit| edit.patched);
    patch.is_applied = true;
    info!(patch = %patch.name, edits = patch.edits.len(), "Patch applied");
    Ok(())
}

/// Restore the original bytes of an applied patch, or none of them.
pub fn rollback_patch(patch: &mut Patch, firmware: &mut FirmwareImage) -> Result<(), PatchError> {
    verify(patch, firmware, |edit| edit.patched)?;
    write(patch, firmware, |edit| edit.original);
    patch.is_applied = false;
    info!(patch = %patch.name, edits = patch.edits.len(), "Patch rolled back");
    Ok(())
}

/// Run `operation` on every patch, collecting successes and failures.
pub fn bulk_operation<'a, I, F>(patches: I, mut operation: F) -> BulkOperationResult
where
    I: IntoIterator<Item = &'a mut Patch>,
    F: FnMut(&mut Patch) -> Result<(), PatchError>,
{
    let mut result = BulkOperationResult::default();
    for patch in patches {
        match operation(patch) {
            Ok(()) => result.proceeded.push(patch.clone()),
            Err(e) => {
                warn!(patch = %patch.name, error = %e, "Patch skipped");
                result.conflicted.push(patch.clone());
            }
        }
    }
    result
}

fn verify(
    patch: &Patch,
    firmware: &FirmwareImage,
    expected: impl Fn(&ByteEdit) -> u8,
) -> Result<(), PatchError> {
    if patch.definition != firmware.definition() {
        return Err(PatchError::DefinitionMismatch {
            patch: patch.name.clone(),
            expected: patch.definition.clone(),
            actual: firmware.definition().to_string(),
        });
    }

    for edit in &patch.edits {
        let actual = firmware
            .byte(edit.offset)
            .ok_or_else(|| PatchError::OffsetOutOfBounds {
                patch: patch.name.clone(),
                offset: edit.offset,
                buffer_len: firmware.len(),
            })?;
        let expected = expected(edit);
        if actual != expected {
            return Err(PatchError::Conflict {
                patch: patch.name.clone(),
                offset: edit.offset,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

// Offsets were checked by `verify`.
fn write(patch: &Patch, firmware: &mut FirmwareImage, value: impl Fn(&ByteEdit) -> u8) {
    let data = firmware.data_mut();
    for edit in &patch.edits {
        data[edit.offset] = value(edit);
    }
}
