//! Patch definitions and the catalog that holds them.
//!
//! Patches are TOML documents:
//!
//! ```toml
//! name = "Unlock max power"
//! version = "1.1"
//! definition = "VTC Mini"
//! author = "someone"
//! description = "Raises the power cap to 75W."
//! edits = [
//!     { offset = 0x1F40, original = 0x3C, patched = 0x4B },
//! ]
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One byte-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteEdit {
    pub offset: usize,
    /// Byte expected before the patch is applied.
    pub original: u8,
    /// Byte written by the patch.
    pub patched: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub name: String,
    pub version: String,
    /// Firmware definition this patch targets.
    pub definition: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    pub edits: Vec<ByteEdit>,
    /// Recomputed on firmware load and after apply/rollback.
    #[serde(skip)]
    pub is_applied: bool,
    #[serde(skip)]
    pub is_compatible: bool,
}

impl Patch {
    /// Parse and validate a patch from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let patch: Patch = toml::from_str(text)?;
        patch.validate()?;
        Ok(patch)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("patch has an empty name");
        }
        if self.edits.is_empty() {
            bail!("patch '{}' has no edits", self.name);
        }
        let mut offsets = HashSet::with_capacity(self.edits.len());
        for edit in &self.edits {
            if !offsets.insert(edit.offset) {
                bail!(
                    "patch '{}' edits offset 0x{:X} twice",
                    self.name,
                    edit.offset
                );
            }
        }
        Ok(())
    }

    /// Author, version and description, for a details pane.
    pub fn details(&self) -> String {
        format!(
            "Author: {}\nVersion: {}\n\n{}\n",
            self.author, self.version, self.description
        )
    }
}

/// The set of known patches, in load order.
#[derive(Debug, Default, Clone)]
pub struct PatchCatalog {
    patches: Vec<Patch>,
}

impl PatchCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog, keeping the first patch of any duplicated name.
    pub fn from_patches(patches: impl IntoIterator<Item = Patch>) -> Self {
        let mut catalog = Self::new();
        for patch in patches {
            catalog.insert(patch);
        }
        catalog
    }

    /// Load every `*.toml` patch in a directory, in file name order.
    /// Files that fail to parse are logged and skipped.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut catalog = Self::new();
        for path in paths {
            let loaded = std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|text| Patch::from_toml_str(&text));
            match loaded {
                Ok(patch) => catalog.insert(patch),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping patch file"),
            }
        }

        info!(dir = %dir.as_ref().display(), count = catalog.len(), "Patches loaded");
        Ok(catalog)
    }

    fn insert(&mut self, patch: Patch) {
        if self.get(&patch.name).is_some() {
            warn!(name = %patch.name, "Duplicate patch name, keeping the first");
            return;
        }
        self.patches.push(patch);
    }

    pub fn get(&self, name: &str) -> Option<&Patch> {
        self.patches.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Patch> {
        self.patches.iter_mut().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Patch> {
        self.patches.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Patch> {
        self.patches.iter_mut()
    }

    /// Patches targeting the given firmware definition.
    pub fn suitable_for<'a>(&'a self, definition: &'a str) -> impl Iterator<Item = &'a Patch> {
        self.patches.iter().filter(move |p| p.definition == definition)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patches.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCH: &str = r#"
        name = "Logo"
        version = "1.0"
        definition = "VTC Mini"
        author = "nfe"
        description = "Custom boot logo."
        edits = [
            { offset = 0x10, original = 0x00, patched = 0x01 },
            { offset = 0x11, original = 0xFF, patched = 0x7F },
        ]
    "#;

    fn patch(name: &str, definition: &str) -> Patch {
        Patch {
            name: name.to_string(),
            version: "1".to_string(),
            definition: definition.to_string(),
            author: String::new(),
            description: String::new(),
            edits: vec![ByteEdit {
                offset: 0,
                original: 0,
                patched: 1,
            }],
            is_applied: false,
            is_compatible: false,
        }
    }

    #[test]
    fn test_parse_patch() {
        let patch = Patch::from_toml_str(PATCH).unwrap();
        assert_eq!(patch.name, "Logo");
        assert_eq!(patch.edits.len(), 2);
        assert_eq!(
            patch.edits[1],
            ByteEdit {
                offset: 0x11,
                original: 0xFF,
                patched: 0x7F
            }
        );
        assert!(!patch.is_applied);
        assert_eq!(
            patch.details(),
            "Author: nfe\nVersion: 1.0\n\nCustom boot logo.\n"
        );
    }

    #[test]
    fn test_reject_invalid_patches() {
        let no_edits = r#"
            name = "Empty"
            version = "1"
            definition = "X"
            edits = []
        "#;
        assert!(Patch::from_toml_str(no_edits).is_err());

        let duplicate = r#"
            name = "Twice"
            version = "1"
            definition = "X"
            edits = [
                { offset = 4, original = 0, patched = 1 },
                { offset = 4, original = 1, patched = 2 },
            ]
        "#;
        assert!(Patch::from_toml_str(duplicate).is_err());
    }

    #[test]
    fn test_catalog_lookup_and_filter() {
        let catalog = PatchCatalog::from_patches([
            patch("a", "VTC"),
            patch("b", "Cuboid"),
            patch("a", "Cuboid"),
            patch("c", "VTC"),
        ]);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("a").unwrap().definition, "VTC");
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        let suitable: Vec<_> = catalog.suitable_for("VTC").map(|p| p.name.as_str()).collect();
        assert_eq!(suitable, vec!["a", "c"]);
    }
}
