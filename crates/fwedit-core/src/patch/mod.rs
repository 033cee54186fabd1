//! Patch catalog and engine.

pub mod catalog;
pub mod engine;

pub use catalog::{ByteEdit, Patch, PatchCatalog};
pub use engine::{
    BulkOperationKind, BulkOperationResult, PatchError, apply_patch, bulk_operation,
    is_patch_applied, is_patch_compatible, rollback_patch,
};
