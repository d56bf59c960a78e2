//! # Document Handle
//!
//! A Document is one flow file and its pipeline tree.
//!
//! ## Lifecycle
//!
//! ```text
//! Load → Decode → Build tree → Edit → Encode → Save
//!   ↓       ↓          ↓          ↓       ↓       ↓
//! File  Components    Tree    Mutations  Text    File
//! ```
//!
//! Documents start either empty (a fresh root of the catalogue's root
//! type), from text, or from a file read through a `FileSystem`.

use crate::errors::EditorError;
use crate::mutations::{EditEnv, Mutation, MutationResult};
use crate::registry::Registry;
use crate::tree::{NodeId, Tree};
use flowtree_common::FileSystem;
use flowtree_parser::{Component, NestedText};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Document {
    /// Increments on each committed mutation
    pub version: u64,

    tree: Tree,
    registry: Arc<Registry>,
    codec: NestedText,
}

impl Document {
    /// New document holding a default root component
    pub fn new(registry: Arc<Registry>, codec: NestedText) -> Result<Self, EditorError> {
        let root = registry.instantiate(registry.root_type())?;
        let tree = Tree::from_component(&registry, &root)?;
        Ok(Self {
            version: 0,
            tree,
            registry,
            codec,
        })
    }

    /// Memory-backed document from nested text
    pub fn from_text(registry: Arc<Registry>, codec: NestedText, text: &str) -> Result<Self, EditorError> {
        let mut roots = codec.decode_str(text)?;
        let tree = match roots.len() {
            0 => Tree::new(),
            1 => Tree::from_component(&registry, &roots.remove(0))?,
            n => return Err(EditorError::MultipleRoots(n)),
        };
        Ok(Self {
            version: 0,
            tree,
            registry,
            codec,
        })
    }

    /// File-backed document
    pub fn load(
        registry: Arc<Registry>,
        codec: NestedText,
        fs: &dyn FileSystem,
        path: &Path,
    ) -> Result<Self, EditorError> {
        let text = fs.read_to_string(path)?;
        let mut document = Self::from_text(registry, codec, &text)?;
        document.tree.set_file(Some(path.to_path_buf()));
        info!(path = %path.display(), "Loaded flow");
        Ok(document)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// Swaps in a new tree, e.g. one restored from a snapshot
    pub fn replace_tree(&mut self, tree: Tree) -> Tree {
        std::mem::replace(&mut self.tree, tree)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn codec(&self) -> NestedText {
        self.codec
    }

    pub fn path(&self) -> Option<&Path> {
        self.tree.file()
    }

    pub fn is_modified(&self) -> bool {
        self.tree.is_modified()
    }

    /// Validates and applies a mutation without undo bookkeeping
    pub fn apply(&mut self, mutation: &Mutation, fs: &dyn FileSystem) -> Result<MutationResult, EditorError> {
        let env = EditEnv::new(&self.registry, fs).with_codec(self.codec);
        let result = mutation.apply(&mut self.tree, &env)?;
        self.version += 1;
        Ok(result)
    }

    /// The whole document as a deep instance
    pub fn root_component(&self) -> Result<Option<Component>, EditorError> {
        match self.tree.root() {
            Some(root) => Ok(Some(self.tree.full_instance(&self.registry, root)?.component)),
            None => Ok(None),
        }
    }

    /// Nested text as written to disk, with header comments
    pub fn to_text(&self) -> Result<String, EditorError> {
        let roots: Vec<Component> = self.root_component()?.into_iter().collect();
        Ok(self.codec.encode_document(&roots))
    }

    /// Clipboard payload for the given nodes, in the order given
    pub fn copy(&self, ids: &[NodeId]) -> Result<Vec<String>, EditorError> {
        let mut components = Vec::with_capacity(ids.len());
        for &id in ids {
            components.push(self.tree.full_instance(&self.registry, id)?.component);
        }
        Ok(self.codec.encode(&components))
    }

    /// Saves to the document's own file
    pub fn save(&mut self, fs: &dyn FileSystem) -> Result<(), EditorError> {
        let path = self.path().map(PathBuf::from).ok_or(EditorError::NotFileBacked)?;
        self.save_as(fs, &path)
    }

    /// Saves to `path` and makes it the document's file
    pub fn save_as(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<(), EditorError> {
        fs.write(path, &self.to_text()?)?;
        self.tree.set_file(Some(path.to_path_buf()));
        self.tree.set_modified(false);
        debug!(path = %path.display(), "Saved flow");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Lookup;
    use flowtree_common::MockFileSystem;

    const FLOW: &str = "\
# Project: flowtree
Flow -name Flow
  Start -name start
  Display -name show
";

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::builtin().unwrap())
    }

    #[test]
    fn test_new_document_has_default_root() {
        let doc = Document::new(registry(), NestedText::new()).unwrap();
        let root = doc.tree().root().unwrap();
        assert_eq!(doc.tree().type_id(root), Some("Flow"));
        assert!(!doc.is_modified());
        assert_eq!(doc.version, 0);
    }

    #[test]
    fn test_load_edit_save() {
        let fs = MockFileSystem::new();
        fs.add_file("main.flow", FLOW);
        let mut doc = Document::load(registry(), NestedText::new(), &fs, Path::new("main.flow")).unwrap();
        assert_eq!(doc.path(), Some(Path::new("main.flow")));

        let show = doc.tree().locate("Flow.show", Lookup::Direct).unwrap();
        doc.apply(
            &Mutation::Rename {
                target: show,
                name: "out".to_string(),
                propagate: true,
            },
            &fs,
        )
        .unwrap();
        assert!(doc.is_modified());
        assert_eq!(doc.version, 1);

        doc.save(&fs).unwrap();
        assert!(!doc.is_modified());
        let saved = fs.contents(Path::new("main.flow")).unwrap();
        assert!(saved.contains("Display -name out"));
    }

    #[test]
    fn test_memory_document_cannot_save() {
        let fs = MockFileSystem::new();
        let mut doc = Document::from_text(registry(), NestedText::new(), FLOW).unwrap();
        assert!(matches!(doc.save(&fs), Err(EditorError::NotFileBacked)));
    }

    #[test]
    fn test_two_roots_rejected() {
        let text = "Flow -name a\nFlow -name b\n";
        let result = Document::from_text(registry(), NestedText::new(), text);
        assert!(matches!(result, Err(EditorError::MultipleRoots(2))));
    }

    #[test]
    fn test_copy_produces_nested_lines() {
        let doc = Document::from_text(registry(), NestedText::new(), FLOW).unwrap();
        let root = doc.tree().root().unwrap();
        let lines = doc.copy(doc.tree().children(root)).unwrap();
        assert_eq!(lines, vec!["Start -name start", "Display -name show"]);
    }
}
