//! Event system for UI decoupling.
//!
//! Lets CLI/GUI front-ends follow what the editor session does without the
//! core knowing about any presentation layer.

use crate::firmware::BlockType;
use crate::patch::BulkOperationKind;

/// Events emitted by the editor session.
#[derive(Debug, Clone)]
pub enum EditorEvent {
    /// A firmware image was loaded into the session.
    FirmwareLoaded { definition: String, size: usize },
    /// The workspace was reset and the firmware dropped.
    WorkspaceReset,
    /// Decoded glyphs were thrown away.
    CacheInvalidated,
    /// A character slot was written.
    CharWritten {
        block: BlockType,
        string: usize,
        slot: usize,
        value: u8,
    },
    /// A glyph bitmap was re-encoded into the firmware.
    GlyphEdited { block: BlockType, index: u8 },
    /// A patch moved to the requested state.
    PatchProceeded {
        kind: BulkOperationKind,
        name: String,
    },
    /// A patch was skipped because of a conflict.
    PatchConflicted {
        kind: BulkOperationKind,
        name: String,
    },
    /// A bulk apply/rollback finished.
    BulkCompleted {
        kind: BulkOperationKind,
        proceeded: usize,
        conflicted: usize,
    },
}

/// Observer trait for receiving editor events.
pub trait EditorObserver: Send + Sync {
    fn on_event(&self, event: &EditorEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl EditorObserver for NullObserver {
    fn on_event(&self, _event: &EditorEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl EditorObserver for TracingObserver {
    fn on_event(&self, event: &EditorEvent) {
        match event {
            EditorEvent::FirmwareLoaded { definition, size } => {
                tracing::info!(definition = %definition, size, "Firmware loaded");
            }
            EditorEvent::WorkspaceReset => {
                tracing::info!("Workspace reset");
            }
            EditorEvent::CacheInvalidated => {
                tracing::debug!("Glyph cache invalidated");
            }
            EditorEvent::CharWritten {
                block,
                string,
                slot,
                value,
            } => {
                tracing::debug!(block = %block, string, slot, value = %format!("0x{:02X}", value), "Char written");
            }
            EditorEvent::GlyphEdited { block, index } => {
                tracing::debug!(block = %block, index = %format!("0x{:02X}", index), "Glyph edited");
            }
            EditorEvent::PatchProceeded { kind, name } => {
                tracing::info!(kind = %kind, patch = %name, "Patch proceeded");
            }
            EditorEvent::PatchConflicted { kind, name } => {
                tracing::warn!(kind = %kind, patch = %name, "Patch conflicted");
            }
            EditorEvent::BulkCompleted {
                kind,
                proceeded,
                conflicted,
            } => {
                tracing::info!(kind = %kind, proceeded, conflicted, "Bulk operation complete");
            }
        }
    }
}
