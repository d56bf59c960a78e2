//! # State Snapshots
//!
//! A snapshot records a whole document together with its view state, so it
//! can be rebuilt later. Undo points and session persistence both use it.
//!
//! The tree is stored either as nested text or as a deep component
//! instance. Expansion and selection are stored as full names and
//! re-located on restore; names that no longer resolve are skipped.

use crate::registry::Registry;
use crate::tree::{Tree, TreeError};
use flowtree_parser::{Component, NestedText, ParseError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Snapshot does not decode: {0}")]
    Decode(#[from] ParseError),

    #[error("Snapshot does not rebuild: {0}")]
    Construction(#[from] TreeError),

    #[error("Snapshot holds {0} top-level components, expected one")]
    MultipleRoots(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotPayload {
    Nested(Vec<String>),
    Instance(Option<Component>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub payload: SnapshotPayload,
    pub expanded: Vec<String>,
    pub selected: Vec<String>,
    pub modified: bool,
    pub file: Option<PathBuf>,
}

/// A restored tree plus the view entries that could not be re-located
#[derive(Debug)]
pub struct Restored {
    pub tree: Tree,
    pub unresolved: Vec<String>,
}

impl StateSnapshot {
    /// Records the tree; `nested` selects the nested-text payload
    pub fn capture(tree: &Tree, registry: &Registry, codec: &NestedText, nested: bool) -> Result<Self, TreeError> {
        let root = match tree.root() {
            Some(root) => Some(tree.full_instance(registry, root)?.component),
            None => None,
        };
        let payload = if nested {
            SnapshotPayload::Nested(root.as_ref().map(|r| codec.encode(std::slice::from_ref(r))).unwrap_or_default())
        } else {
            SnapshotPayload::Instance(root)
        };

        Ok(Self {
            payload,
            expanded: tree.expanded_names(),
            selected: tree.selected_names(),
            modified: tree.is_modified(),
            file: tree.file().map(PathBuf::from),
        })
    }

    /// Builds a fresh tree from the snapshot
    #[instrument(skip_all, fields(selected = self.selected.len()))]
    pub fn restore(&self, registry: &Registry, codec: &NestedText) -> Result<Restored, SnapshotError> {
        let root = match &self.payload {
            SnapshotPayload::Nested(lines) => {
                let mut roots = codec.decode(lines)?;
                match roots.len() {
                    0 => None,
                    1 => Some(roots.remove(0)),
                    n => return Err(SnapshotError::MultipleRoots(n)),
                }
            }
            SnapshotPayload::Instance(root) => root.clone(),
        };

        let mut tree = match root {
            Some(root) => Tree::from_component(registry, &root)?,
            None => Tree::new(),
        };
        tree.set_file(self.file.clone());
        tree.set_modified(self.modified);
        let unresolved = tree.restore_view(&self.expanded, &self.selected);
        debug!(unresolved = unresolved.len(), "Snapshot restored");

        Ok(Restored { tree, unresolved })
    }

    /// Whether the document itself differs, ignoring view state
    pub fn same_document(&self, other: &StateSnapshot) -> bool {
        self.payload == other.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Lookup;

    fn setup() -> (Registry, Tree) {
        let registry = Registry::builtin().unwrap();
        let flow = Component::new("Flow", "Flow")
            .with_child(Component::new("Start", "start"))
            .with_child(Component::new("Tee", "tee").with_child(Component::new("Display", "show")))
            .with_child(Component::new("Null", "null"));
        let tree = Tree::from_component(&registry, &flow).unwrap();
        (registry, tree)
    }

    #[test]
    fn test_nested_and_instance_payloads_restore_alike() {
        let (registry, mut tree) = setup();
        let codec = NestedText::new();
        let tee = tree.locate("Flow.tee", Lookup::Direct).unwrap();
        tree.set_expanded(tee, true);

        for nested in [true, false] {
            let snapshot = StateSnapshot::capture(&tree, &registry, &codec, nested).unwrap();
            let restored = snapshot.restore(&registry, &codec).unwrap();
            assert!(restored.unresolved.is_empty());
            let root = restored.tree.root().unwrap();
            assert_eq!(restored.tree.descendants(root).len(), 5);
            let tee = restored.tree.locate("Flow.tee", Lookup::Direct).unwrap();
            assert!(restored.tree.is_expanded(tee));
        }
    }

    #[test]
    fn test_empty_tree_round_trips() {
        let registry = Registry::builtin().unwrap();
        let codec = NestedText::new();
        let snapshot = StateSnapshot::capture(&Tree::new(), &registry, &codec, true).unwrap();
        assert_eq!(snapshot.payload, SnapshotPayload::Nested(Vec::new()));
        assert!(snapshot.restore(&registry, &codec).unwrap().tree.root().is_none());
    }

    #[test]
    fn test_modified_flag_and_file_are_kept() {
        let (registry, mut tree) = setup();
        let codec = NestedText::new();
        tree.set_modified(true);
        tree.set_file(Some(PathBuf::from("main.flow")));

        let snapshot = StateSnapshot::capture(&tree, &registry, &codec, true).unwrap();
        let restored = snapshot.restore(&registry, &codec).unwrap().tree;
        assert!(restored.is_modified());
        assert_eq!(restored.file(), Some(std::path::Path::new("main.flow")));
    }

    #[test]
    fn test_two_roots_are_rejected() {
        let registry = Registry::builtin().unwrap();
        let codec = NestedText::new();
        let snapshot = StateSnapshot {
            payload: SnapshotPayload::Nested(vec!["Flow".into(), "Flow".into()]),
            expanded: Vec::new(),
            selected: Vec::new(),
            modified: false,
            file: None,
        };
        assert_eq!(
            snapshot.restore(&registry, &codec).unwrap_err(),
            SnapshotError::MultipleRoots(2)
        );
    }
}
