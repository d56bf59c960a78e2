//! # Pipeline Tree
//!
//! Arena of nodes, each wrapping one stripped component. Structure lives
//! in the arena (parent link plus ordered child handles), never in the
//! components themselves, so a node's instance can be swapped without
//! touching its subtree.
//!
//! Handles are generational: once a node is removed its `NodeId` stops
//! resolving, even if the slot is reused.
//!
//! ## Names
//!
//! The dotted full name (`Flow.Sequence.Display`) is the stable handle
//! used across snapshots. Containers with fixed child names force them by
//! index; dynamic containers keep sibling names unique with a `-N` suffix.

use crate::registry::{ComponentKind, Registry};
use flowtree_parser::{join_full_name, split_full_name, Component};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("Unknown component type: {0}")]
    UnknownType(String),

    #[error("{type_id} expects {expected} children, found {found}")]
    ChildCountMismatch {
        type_id: String,
        expected: usize,
        found: usize,
    },

    #[error("{0} is not a container and cannot have children")]
    NotAContainer(String),

    #[error("Node no longer exists")]
    StaleNode,

    #[error("{0} has no parent")]
    NoParent(String),

    #[error("Document is empty")]
    EmptyTree,
}

/// Branch that could not be rebuilt into a full instance
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionError {
    pub full_name: String,
    pub error: TreeError,
}

/// Best-effort deep copy of a subtree
#[derive(Debug, Clone)]
pub struct FullInstance {
    pub component: Component,
    pub errors: Vec<ReconstructionError>,
}

/// How `locate` treats names missing from the direct path
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    Direct,
    /// Also look inside callable pools of the current node and its ancestors
    Shared(&'a Registry),
}

/// Name filter used by `Tree::find`
#[derive(Debug, Clone)]
pub enum SearchPattern {
    /// Case-insensitive substring
    Substring(String),
    Regex(Regex),
}

impl SearchPattern {
    pub fn new(text: &str, is_regex: bool) -> Result<Self, regex::Error> {
        if is_regex {
            Ok(SearchPattern::Regex(Regex::new(text)?))
        } else {
            Ok(SearchPattern::Substring(text.to_lowercase()))
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            SearchPattern::Substring(text) => name.to_lowercase().contains(text),
            SearchPattern::Regex(regex) => regex.is_match(name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    component: Component,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub editable: bool,
    pub bookmarked: bool,
    label: OnceCell<String>,
}

impl Node {
    fn new(component: Component, parent: Option<NodeId>) -> Self {
        Self {
            component,
            parent,
            children: Vec::new(),
            editable: true,
            bookmarked: false,
            label: OnceCell::new(),
        }
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<NodeId>,
    file: Option<PathBuf>,
    modified: bool,
    expanded: HashSet<NodeId>,
    selected: Vec<NodeId>,
}

/// Checks a full instance against the registry before any node is built
pub fn validate_instance(registry: &Registry, component: &Component) -> Result<(), TreeError> {
    let descriptor = registry
        .describe(&component.type_id)
        .ok_or_else(|| TreeError::UnknownType(component.type_id.clone()))?;

    match &descriptor.container {
        None if !component.children.is_empty() => {
            return Err(TreeError::NotAContainer(component.type_id.clone()))
        }
        Some(container) => {
            if let Some(expected) = container.fixed_arity() {
                if component.children.len() != expected {
                    return Err(TreeError::ChildCountMismatch {
                        type_id: component.type_id.clone(),
                        expected,
                        found: component.children.len(),
                    });
                }
            }
        }
        None => {}
    }

    component
        .children
        .iter()
        .try_for_each(|child| validate_instance(registry, child))
}

/// `name`, or `name-N` with the smallest N not already taken
pub fn unique_name(name: &str, taken: &HashSet<&str>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    (1..)
        .map(|n| format!("{}-{}", name, n))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| name.to_string())
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from a full instance; nothing is built if any part of
    /// it is malformed
    pub fn from_component(registry: &Registry, root: &Component) -> Result<Self, TreeError> {
        let mut tree = Self::new();
        tree.set_root(registry, root)?;
        Ok(tree)
    }

    /// Replaces the whole document
    pub fn set_root(&mut self, registry: &Registry, root: &Component) -> Result<NodeId, TreeError> {
        validate_instance(registry, root)?;
        if let Some(old) = self.root.take() {
            self.free_subtree(old);
        }
        let id = self.build(root, None);
        self.root = Some(id);
        self.sync_all_fixed_names(registry);
        Ok(id)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn component(&self, id: NodeId) -> Result<&Component, TreeError> {
        self.node(id).map(Node::component).ok_or(TreeError::StaleNode)
    }

    /// Mutable access to a node's instance; drops the cached label
    pub fn component_mut(&mut self, id: NodeId) -> Result<&mut Component, TreeError> {
        let node = self.node_mut(id).ok_or(TreeError::StaleNode)?;
        node.label = OnceCell::new();
        Ok(&mut node.component)
    }

    /// Swaps the wrapped instance, keeping the node's children
    pub fn set_component(&mut self, id: NodeId, mut component: Component) -> Result<Component, TreeError> {
        component.children.clear();
        let slot = self.component_mut(id)?;
        Ok(std::mem::replace(slot, component))
    }

    pub fn type_id(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.component.type_id.as_str())
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.component.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(Node::children).unwrap_or(&[])
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// False only for nodes explicitly marked read-only
    pub fn is_editable(&self, id: NodeId) -> bool {
        self.node(id).map_or(true, |node| node.editable)
    }

    pub fn set_editable(&mut self, id: NodeId, editable: bool) {
        if let Some(node) = self.node_mut(id) {
            node.editable = editable;
        }
    }

    pub fn set_bookmarked(&mut self, id: NodeId, bookmarked: bool) {
        if let Some(node) = self.node_mut(id) {
            node.bookmarked = bookmarked;
        }
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation += 1;
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId { index, generation: 0 }
            }
        }
    }

    fn build(&mut self, component: &Component, parent: Option<NodeId>) -> NodeId {
        let id = self.allocate(Node::new(component.stripped(), parent));
        let children: Vec<NodeId> = component
            .children
            .iter()
            .map(|child| self.build(child, Some(id)))
            .collect();
        if let Some(node) = self.node_mut(id) {
            node.children = children;
        }
        id
    }

    /// Validates a full instance and builds it below `parent` at `index`
    /// (clamped to the child count)
    pub fn insert_subtree(
        &mut self,
        registry: &Registry,
        parent: NodeId,
        index: usize,
        component: &Component,
    ) -> Result<NodeId, TreeError> {
        if !self.contains(parent) {
            return Err(TreeError::StaleNode);
        }
        validate_instance(registry, component)?;
        let id = self.build(component, Some(parent));
        self.attach(parent, index, id)?;
        for descendant in self.descendants(id) {
            self.sync_fixed_names(registry, descendant);
        }
        Ok(id)
    }

    /// Adds one childless node. Children are expected to be moved in
    /// afterwards, so fixed arity is not checked.
    pub fn insert_node(
        &mut self,
        registry: &Registry,
        parent: NodeId,
        index: usize,
        component: &Component,
    ) -> Result<NodeId, TreeError> {
        if !self.contains(parent) {
            return Err(TreeError::StaleNode);
        }
        if registry.describe(&component.type_id).is_none() {
            return Err(TreeError::UnknownType(component.type_id.clone()));
        }
        let id = self.allocate(Node::new(component.stripped(), Some(parent)));
        self.attach(parent, index, id)?;
        Ok(id)
    }

    /// Unlinks a node from its parent without freeing it; returns its old index
    pub fn detach(&mut self, id: NodeId) -> Result<Option<usize>, TreeError> {
        let parent = self.node(id).ok_or(TreeError::StaleNode)?.parent;
        let Some(parent) = parent else {
            return Ok(None);
        };
        let mut index = None;
        if let Some(node) = self.node_mut(parent) {
            index = node.children.iter().position(|&c| c == id);
            node.children.retain(|&c| c != id);
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
        Ok(index)
    }

    /// Links a detached node below `parent`; `index` is clamped
    pub fn attach(&mut self, parent: NodeId, index: usize, id: NodeId) -> Result<(), TreeError> {
        if !self.contains(id) {
            return Err(TreeError::StaleNode);
        }
        let node = self.node_mut(parent).ok_or(TreeError::StaleNode)?;
        let index = index.min(node.children.len());
        node.children.insert(index, id);
        if let Some(child) = self.node_mut(id) {
            child.parent = Some(parent);
        }
        Ok(())
    }

    /// Detaches and frees a node with everything below it
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.detach(id)?;
        if self.root == Some(id) {
            self.root = None;
        }
        self.free_subtree(id);
        Ok(())
    }

    fn free_subtree(&mut self, id: NodeId) {
        for node_id in self.descendants(id) {
            self.expanded.remove(&node_id);
            self.selected.retain(|&s| s != node_id);
            if let Some(slot) = self.slots.get_mut(node_id.index as usize) {
                slot.node = None;
                self.free.push(node_id.index);
            }
        }
    }

    /// Rebuilds the deep instance of a subtree.
    ///
    /// A branch whose type is no longer registered is left out and reported;
    /// the rest of the subtree is still returned.
    pub fn full_instance(&self, registry: &Registry, id: NodeId) -> Result<FullInstance, TreeError> {
        let node = self.node(id).ok_or(TreeError::StaleNode)?;
        let mut errors = Vec::new();
        let component = self.collect(registry, node, &mut errors, id);
        for error in &errors {
            warn!(full_name = %error.full_name, error = %error.error, "Dropped branch while rebuilding instance");
        }
        Ok(FullInstance { component, errors })
    }

    fn collect(
        &self,
        registry: &Registry,
        node: &Node,
        errors: &mut Vec<ReconstructionError>,
        id: NodeId,
    ) -> Component {
        let mut component = node.component.clone();
        for &child_id in &node.children {
            let Some(child) = self.node(child_id) else {
                errors.push(ReconstructionError {
                    full_name: self.full_name(id),
                    error: TreeError::StaleNode,
                });
                continue;
            };
            if registry.describe(&child.component.type_id).is_none() {
                errors.push(ReconstructionError {
                    full_name: self.full_name(child_id),
                    error: TreeError::UnknownType(child.component.type_id.clone()),
                });
                continue;
            }
            component
                .children
                .push(self.collect(registry, child, errors, child_id));
        }

        if let Some(expected) = registry
            .capability_of(&component.type_id)
            .and_then(|c| c.fixed_arity())
        {
            if component.children.len() != expected {
                errors.push(ReconstructionError {
                    full_name: self.full_name(id),
                    error: TreeError::ChildCountMismatch {
                        type_id: component.type_id.clone(),
                        expected,
                        found: component.children.len(),
                    },
                });
            }
        }
        component
    }

    /// Nodes from the root down to `id`, inclusive
    pub fn path_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = Some(id).filter(|&id| self.contains(id));
        while let Some(node_id) = current {
            path.push(node_id);
            current = self.parent(node_id);
        }
        path.reverse();
        path
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.path_to_root(id).len().saturating_sub(1)
    }

    pub fn full_name(&self, id: NodeId) -> String {
        join_full_name(
            self.path_to_root(id)
                .into_iter()
                .filter_map(|node_id| self.name(node_id)),
        )
    }

    pub fn locate(&self, full_name: &str, lookup: Lookup<'_>) -> Option<NodeId> {
        let segments = split_full_name(full_name);
        let (first, rest) = segments.split_first()?;
        let root = self.root?;
        if self.name(root) != Some(first.as_str()) {
            return None;
        }

        let mut current = root;
        for segment in rest {
            current = match self.child_named(current, segment) {
                Some(child) => child,
                None => match lookup {
                    Lookup::Direct => return None,
                    Lookup::Shared(registry) => self.find_in_pools(registry, current, segment)?,
                },
            };
        }
        Some(current)
    }

    fn child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.name(c) == Some(name))
    }

    fn find_in_pools(&self, registry: &Registry, from: NodeId, name: &str) -> Option<NodeId> {
        self.path_to_root(from).into_iter().rev().find_map(|ancestor| {
            self.children(ancestor)
                .iter()
                .copied()
                .filter(|&c| self.type_id(c).is_some_and(|t| registry.is_pool(t)))
                .find_map(|pool| self.child_named(pool, name))
        })
    }

    /// Pre-order list of `id` and everything below it
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            result.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        result
    }

    /// Every node in pre-order
    pub fn enumerate(&self) -> Vec<NodeId> {
        self.root.map(|root| self.descendants(root)).unwrap_or_default()
    }

    /// First node, in pre-order after `after` (or from the root), whose
    /// name matches
    pub fn find(&self, after: Option<NodeId>, pattern: &SearchPattern) -> Option<NodeId> {
        let all = self.enumerate();
        let start = match after {
            Some(id) => all.iter().position(|&n| n == id)? + 1,
            None => 0,
        };
        all[start..]
            .iter()
            .copied()
            .find(|&id| self.name(id).is_some_and(|name| pattern.matches(name)))
    }

    /// Nearest non-skipped child of `parent`, scanning from `index`
    /// (inclusive) forwards or backwards
    pub fn nearest_active(&self, parent: NodeId, index: usize, forward: bool) -> Option<NodeId> {
        let children = self.children(parent);
        let active = |id: &&NodeId| self.node(**id).is_some_and(|n| !n.component.skip);
        if forward {
            children.iter().skip(index).find(active).copied()
        } else {
            let end = index.saturating_add(1).min(children.len());
            children[..end].iter().rev().find(active).copied()
        }
    }

    /// Makes a node's name fit its container.
    ///
    /// Fixed-name containers dictate the name by index. In a dynamic
    /// container the name is disambiguated against its siblings when
    /// `force` is set or when it collides. Returns whether the name changed.
    pub fn make_unique(&mut self, registry: &Registry, id: NodeId, force: bool) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        let Some(capability) = self.type_id(parent).and_then(|t| registry.capability_of(t)) else {
            return false;
        };
        let Some(current) = self.name(id).map(str::to_string) else {
            return false;
        };

        let wanted = if capability.has_fixed_names() {
            let index = self.index_of(id).unwrap_or(0);
            match capability.fixed_names.get(index) {
                Some(name) => name.clone(),
                None => return false,
            }
        } else if capability.mutable {
            let siblings: Vec<&str> = self
                .children(parent)
                .iter()
                .filter(|&&c| c != id)
                .filter_map(|&c| self.name(c))
                .collect();
            let taken: HashSet<&str> = siblings.into_iter().collect();
            if !force && !taken.contains(current.as_str()) {
                return false;
            }
            unique_name(&current, &taken)
        } else {
            return false;
        };

        if wanted == current {
            return false;
        }
        debug!(from = %current, to = %wanted, "Adjusted node name");
        if let Ok(component) = self.component_mut(id) {
            component.name = wanted;
        }
        true
    }

    /// Re-applies forced names to the children of a fixed-name container
    pub fn sync_fixed_names(&mut self, registry: &Registry, parent: NodeId) {
        let fixed = self
            .type_id(parent)
            .and_then(|t| registry.capability_of(t))
            .map(|c| c.fixed_names.clone())
            .unwrap_or_default();
        if fixed.is_empty() {
            return;
        }
        let children = self.children(parent).to_vec();
        for (child, name) in children.into_iter().zip(fixed) {
            if self.name(child) != Some(name.as_str()) {
                if let Ok(component) = self.component_mut(child) {
                    component.name = name;
                }
            }
        }
    }

    fn sync_all_fixed_names(&mut self, registry: &Registry) {
        for id in self.enumerate() {
            self.sync_fixed_names(registry, id);
        }
    }

    /// Replaces option values equal to `find`, in one node or its whole
    /// subtree; returns the number of values changed
    pub fn replace_option_values(&mut self, id: NodeId, find: &str, replace: &str, recursive: bool) -> usize {
        let targets = if recursive { self.descendants(id) } else { vec![id] };
        let mut count = 0;
        for target in targets {
            let Ok(component) = self.component_mut(target) else {
                continue;
            };
            for (_, value) in component.options.iter_mut() {
                if value.as_deref() == Some(find) {
                    *value = Some(replace.to_string());
                    count += 1;
                }
            }
        }
        count
    }

    /// Nodes whose instance is of the given kind
    pub fn nodes_of_kind(&self, registry: &Registry, kind: ComponentKind) -> Vec<NodeId> {
        self.enumerate()
            .into_iter()
            .filter(|&id| self.type_id(id).and_then(|t| registry.kind_of(t)) == Some(kind))
            .collect()
    }

    /// Display text of a node with its annotation lines, computed once per
    /// instance change
    pub fn label(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        node.label
            .get_or_init(|| {
                let component = &node.component;
                let mut label = if component.name == component.type_id {
                    component.name.clone()
                } else {
                    format!("{} [{}]", component.name, component.type_id)
                };
                if component.skip {
                    label = format!("---{}---", label);
                }
                for line in component.annotation.lines() {
                    label.push('\n');
                    label.push_str(line);
                }
                label
            })
            .clone()
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn set_file(&mut self, file: Option<PathBuf>) {
        self.file = file;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        if !self.contains(id) {
            return;
        }
        if expanded {
            self.expanded.insert(id);
        } else {
            self.expanded.remove(&id);
        }
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.expanded.contains(&id)
    }

    pub fn select(&mut self, ids: Vec<NodeId>) {
        self.selected = ids.into_iter().filter(|&id| self.contains(id)).collect();
    }

    pub fn selected(&self) -> &[NodeId] {
        &self.selected
    }

    /// Full names of expanded nodes, in pre-order
    pub fn expanded_names(&self) -> Vec<String> {
        self.enumerate()
            .into_iter()
            .filter(|id| self.expanded.contains(id))
            .map(|id| self.full_name(id))
            .collect()
    }

    pub fn selected_names(&self) -> Vec<String> {
        self.selected.iter().map(|&id| self.full_name(id)).collect()
    }

    /// Re-applies view state recorded as full names. Names that no longer
    /// resolve are skipped and returned.
    pub fn restore_view(&mut self, expanded: &[String], selected: &[String]) -> Vec<String> {
        let mut unresolved = Vec::new();

        self.expanded.clear();
        for name in expanded {
            match self.locate(name, Lookup::Direct) {
                Some(id) => {
                    self.expanded.insert(id);
                }
                None => unresolved.push(name.clone()),
            }
        }

        let mut selection = Vec::new();
        for name in selected {
            match self.locate(name, Lookup::Direct) {
                Some(id) => selection.push(id),
                None => unresolved.push(name.clone()),
            }
        }
        self.selected = selection;

        for name in &unresolved {
            debug!(full_name = %name, "Skipping view state for missing node");
        }
        unresolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::builtin().unwrap()
    }

    fn sample(registry: &Registry) -> Tree {
        let flow = Component::new("Flow", "Flow")
            .with_child(Component::new("Start", "start"))
            .with_child(
                Component::new("Tee", "tee")
                    .with_child(Component::new("Display", "show"))
                    .with_child(Component::new("Null", "drop")),
            )
            .with_child(Component::new("Display", "final"));
        Tree::from_component(registry, &flow).unwrap()
    }

    #[test]
    fn test_full_instance_round_trip() {
        let registry = registry();
        let tree = sample(&registry);
        let root = tree.root().unwrap();
        let full = tree.full_instance(&registry, root).unwrap();
        assert!(full.errors.is_empty());
        assert_eq!(full.component.count(), 6);
        assert_eq!(full.component.children[1].children[1].name, "drop");
    }

    #[test]
    fn test_nodes_hold_stripped_components() {
        let registry = registry();
        let tree = sample(&registry);
        for id in tree.enumerate() {
            assert!(tree.component(id).unwrap().children.is_empty());
        }
    }

    #[test]
    fn test_full_name_and_locate() {
        let registry = registry();
        let tree = sample(&registry);
        let show = tree.locate("Flow.tee.show", Lookup::Direct).unwrap();
        assert_eq!(tree.full_name(show), "Flow.tee.show");
        assert_eq!(tree.depth(show), 2);
        assert!(tree.locate("Flow.nope", Lookup::Direct).is_none());
        assert!(tree.locate("Other.tee", Lookup::Direct).is_none());
    }

    #[test]
    fn test_locate_falls_back_to_pools() {
        let registry = registry();
        let flow = Component::new("Flow", "Flow")
            .with_child(
                Component::new("CallableActors", "CallableActors").with_child(Component::new("Start", "S")),
            )
            .with_child(Component::new("CallableSource", "CallableSource").with_option("callable", "S"));
        let tree = Tree::from_component(&registry, &flow).unwrap();

        assert!(tree.locate("Flow.S", Lookup::Direct).is_none());
        let s = tree.locate("Flow.S", Lookup::Shared(&registry)).unwrap();
        assert_eq!(tree.full_name(s), "Flow.CallableActors.S");
    }

    #[test]
    fn test_malformed_instance_builds_nothing() {
        let registry = registry();
        let bad = Component::new("Flow", "Flow")
            .with_child(Component::new("Display", "d").with_child(Component::new("Null", "n")));
        assert_eq!(
            Tree::from_component(&registry, &bad).unwrap_err(),
            TreeError::NotAContainer("Display".to_string())
        );

        let wrong_arity = Component::new("IfThenElse", "if").with_child(Component::new("SubProcess", "a"));
        assert!(matches!(
            validate_instance(&registry, &wrong_arity),
            Err(TreeError::ChildCountMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_removed_handles_go_stale() {
        let registry = registry();
        let mut tree = sample(&registry);
        let tee = tree.locate("Flow.tee", Lookup::Direct).unwrap();
        let show = tree.children(tee)[0];
        tree.remove_subtree(tee).unwrap();

        assert!(!tree.contains(tee));
        assert!(!tree.contains(show));
        let root = tree.root().unwrap();
        let replacement = tree
            .insert_subtree(&registry, root, 0, &Component::new("Null", "n"))
            .unwrap();
        assert_ne!(replacement, tee);
        assert_ne!(replacement, show);
    }

    #[test]
    fn test_make_unique_in_dynamic_container() {
        let registry = registry();
        let mut tree = sample(&registry);
        let root = tree.root().unwrap();
        let dup = tree
            .insert_subtree(&registry, root, 3, &Component::new("Display", "final"))
            .unwrap();
        assert!(tree.make_unique(&registry, dup, false));
        assert_eq!(tree.name(dup), Some("final-1"));

        // no collision, nothing to do even when forced
        assert!(!tree.make_unique(&registry, dup, true));
    }

    #[test]
    fn test_fixed_names_are_forced() {
        let registry = registry();
        let mut tree = sample(&registry);
        let root = tree.root().unwrap();
        let mut branch = registry.instantiate("IfThenElse").unwrap();
        branch.children[0].name = "custom".to_string();
        let id = tree.insert_subtree(&registry, root, 0, &branch).unwrap();
        let first = tree.children(id)[0];
        assert_eq!(tree.name(first), Some("then"));

        tree.component_mut(first).unwrap().name = "other".to_string();
        assert!(tree.make_unique(&registry, first, false));
        assert_eq!(tree.name(first), Some("then"));
    }

    #[test]
    fn test_nearest_active_skips_skipped() {
        let registry = registry();
        let mut tree = sample(&registry);
        let root = tree.root().unwrap();
        let tee = tree.children(root)[1];
        tree.component_mut(tee).unwrap().skip = true;

        assert_eq!(tree.nearest_active(root, 1, true), Some(tree.children(root)[2]));
        assert_eq!(tree.nearest_active(root, 1, false), Some(tree.children(root)[0]));
        assert_eq!(tree.nearest_active(root, 3, true), None);
    }

    #[test]
    fn test_find_substring_and_regex() {
        let registry = registry();
        let tree = sample(&registry);
        let pattern = SearchPattern::new("SHOW", false).unwrap();
        let show = tree.find(None, &pattern).unwrap();
        assert_eq!(tree.name(show), Some("show"));
        assert!(tree.find(Some(show), &pattern).is_none());

        let regex = SearchPattern::new("^(drop|final)$", true).unwrap();
        let first = tree.find(None, &regex).unwrap();
        assert_eq!(tree.name(first), Some("drop"));
        assert_eq!(tree.name(tree.find(Some(first), &regex).unwrap()), Some("final"));
        assert!(SearchPattern::new("(", true).is_err());
    }

    #[test]
    fn test_replace_option_values() {
        let registry = registry();
        let flow = Component::new("Flow", "Flow").with_child(
            Component::new("Sequence", "seq")
                .with_option("dir", "/tmp")
                .with_child(Component::new("DumpFile", "dump").with_option("output-file", "/tmp")),
        );
        let mut tree = Tree::from_component(&registry, &flow).unwrap();
        let seq = tree.locate("Flow.seq", Lookup::Direct).unwrap();

        assert_eq!(tree.replace_option_values(seq, "/tmp", "/var", false), 1);
        assert_eq!(tree.replace_option_values(seq, "/tmp", "/var", true), 1);
        let dump = tree.children(seq)[0];
        assert_eq!(tree.component(dump).unwrap().options.get("output-file"), Some("/var"));
    }

    #[test]
    fn test_label_cache_follows_edits() {
        let registry = registry();
        let mut tree = sample(&registry);
        let show = tree.locate("Flow.tee.show", Lookup::Direct).unwrap();
        assert_eq!(tree.label(show), "show [Display]");
        tree.component_mut(show).unwrap().skip = true;
        assert_eq!(tree.label(show), "---show [Display]---");
        tree.component_mut(show).unwrap().annotation = "prints\nresults".to_string();
        assert_eq!(tree.label(show), "---show [Display]---\nprints\nresults");
    }

    #[test]
    fn test_restore_view_skips_missing_names() {
        let registry = registry();
        let mut tree = sample(&registry);
        let unresolved = tree.restore_view(
            &["Flow".to_string(), "Flow.tee".to_string()],
            &["Flow.tee.show".to_string(), "Flow.gone".to_string()],
        );
        assert_eq!(unresolved, vec!["Flow.gone".to_string()]);
        assert_eq!(tree.selected_names(), vec!["Flow.tee.show".to_string()]);
        assert_eq!(tree.expanded_names(), vec!["Flow".to_string(), "Flow.tee".to_string()]);
    }
}
