//! # Structural Mutations
//!
//! High-level edit operations on a pipeline tree.
//!
//! ## Design Principles
//!
//! 1. **Validate, then apply**: every placement rule is checked before the
//!    tree is touched, so a rejected mutation leaves no trace
//! 2. **Names stay consistent**: every node that lands in a container goes
//!    through the fixed-name / uniqueness pass
//! 3. **Effects are reported, not performed**: change events and UI
//!    follow-ups are returned to the caller, in order
//!
//! ## Placement Rules
//!
//! - Standalones only go into containers that allow them
//! - A container with restrictions only takes children matching one of them
//! - Containers with fixed arity never change their child count
//!
//! ## Shared Definitions
//!
//! `ExtractToCallable` moves a subtree into a callable pool and leaves a
//! reference behind. `Externalize` writes a subtree to its own file and
//! leaves an external reference behind. Renaming a pool member reports the
//! rename so reference rewriters can follow it.

use crate::events::{ChangeEvent, FollowUp};
use crate::registry::{ComponentKind, Registry, Role};
use crate::tree::{validate_instance, NodeId, Tree, TreeError};
use flowtree_common::{CommonError, FileSystem, Visitor};
use flowtree_parser::{Component, NestedText, ParseError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub const OPTION_CALLABLE: &str = "callable";
pub const OPTION_FILE: &str = "file";
pub const OPTION_CONDITION: &str = "condition";

/// Where new components go relative to a target node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertPosition {
    /// Last child of the target
    Beneath,
    /// At the target's index, pushing it down
    Here,
    /// Directly after the target
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    Conditional,
    Timed,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Conditional => f.write_str("conditional"),
            Variant::Timed => f.write_str("timed"),
        }
    }
}

/// Semantic edit operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Mutation {
    Insert {
        target: NodeId,
        position: InsertPosition,
        components: Vec<Component>,
    },

    /// Insert components given as nested-text lines
    Paste {
        target: NodeId,
        position: InsertPosition,
        lines: Vec<String>,
    },

    /// Replace a node's instance; rebuilds the subtree when the type or the
    /// child layout changes
    Replace { target: NodeId, component: Component },

    Rename {
        target: NodeId,
        name: String,
        propagate: bool,
    },

    Remove { targets: Vec<NodeId> },

    ToggleSkip { targets: Vec<NodeId> },

    /// Wrap sibling nodes in a new container
    Enclose {
        targets: Vec<NodeId>,
        container: String,
        name: Option<String>,
    },

    /// Replace a container with its children
    PullUp { target: NodeId },

    ExtractToCallable { target: NodeId },

    /// Write sibling nodes to a file and replace them with a reference
    Externalize {
        targets: Vec<NodeId>,
        file: PathBuf,
        suggestion: Option<String>,
    },

    SwapContainer { target: NodeId, container: String },

    Convert {
        target: NodeId,
        variant: Variant,
        condition: Option<String>,
    },

    /// Reset names to their type defaults
    CleanUpNames { targets: Vec<NodeId> },
}

#[derive(Error, Debug)]
pub enum MutationError {
    #[error("Node not found")]
    NodeNotFound,

    #[error("Nothing selected")]
    NothingSelected,

    #[error("{0} has no parent")]
    NoParent(String),

    #[error("{0} is read-only")]
    ReadOnly(String),

    #[error("The root of the document cannot be removed")]
    CannotRemoveRoot,

    #[error("Nodes must share the same parent")]
    NotSiblings,

    #[error("{0} is not a container")]
    NotAContainer(String),

    #[error("Unknown component type: {0}")]
    UnknownType(String),

    #[error("{container} does not allow standalone {type_id}")]
    StandaloneNotAllowed { container: String, type_id: String },

    #[error("{container} does not accept {type_id}")]
    RestrictionViolated { container: String, type_id: String },

    #[error("{0} has a fixed number of children")]
    FixedArity(String),

    #[error("{0} has no children to pull up")]
    NothingToPullUp(String),

    #[error("Standalone {0} cannot become a callable component")]
    StandaloneNotCallable(String),

    #[error("{0} is already a reference")]
    AlreadyReference(String),

    #[error("{0} is already shared")]
    AlreadyShared(String),

    #[error("No ancestor of {0} can hold a callable pool")]
    NoPoolLocation(String),

    #[error("No reference type registered for {0} components")]
    NoReferenceType(Role),

    #[error("No container can enclose components from {first} to {last}")]
    NoEnclosure { first: Role, last: Role },

    #[error("{0} is not an external reference type")]
    NotExternalReference(String),

    #[error("{type_id} has no {variant} equivalent")]
    NoEquivalent { type_id: String, variant: Variant },

    #[error("Nothing to paste")]
    NothingToPaste,

    #[error("Paste failed: {0}")]
    Paste(#[from] ParseError),

    #[error("Invalid structure: {0}")]
    Construction(#[from] TreeError),

    #[error("File error: {0}")]
    File(#[from] CommonError),
}

impl MutationError {
    fn from_catalogue(type_id: &str) -> Self {
        MutationError::UnknownType(type_id.to_string())
    }
}

/// A rename reported to reference rewriters
#[derive(Debug, Clone, PartialEq)]
pub struct Renamed {
    /// Container the renamed node lives in
    pub scope: Option<NodeId>,
    pub old: Component,
    pub new: Component,
}

/// Outcome of a committed mutation
#[derive(Debug, Clone, Default)]
pub struct MutationResult {
    /// Undo point description
    pub comment: String,
    pub changes: Vec<ChangeEvent>,
    pub follow_ups: Vec<FollowUp>,
    /// Problems that did not stop the mutation
    pub warnings: Vec<String>,
    pub renamed: Vec<Renamed>,
    pub created: Vec<NodeId>,
}

impl MutationResult {
    fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            ..Default::default()
        }
    }

    fn change(&mut self, event: ChangeEvent) {
        self.follow_ups.push(FollowUp::Notify(event.clone()));
        self.changes.push(event);
    }
}

/// Services a mutation may need besides the tree
#[derive(Clone, Copy)]
pub struct EditEnv<'a> {
    pub registry: &'a Registry,
    pub fs: &'a dyn FileSystem,
    pub codec: NestedText,
}

impl<'a> EditEnv<'a> {
    pub fn new(registry: &'a Registry, fs: &'a dyn FileSystem) -> Self {
        Self {
            registry,
            fs,
            codec: NestedText::new(),
        }
    }

    pub fn with_codec(mut self, codec: NestedText) -> Self {
        self.codec = codec;
        self
    }
}

/// Collects the targets of callable references in a subtree
struct CallableUsage<'a> {
    registry: &'a Registry,
    names: Vec<String>,
}

impl Visitor for CallableUsage<'_> {
    fn visit_option(&mut self, owner: &Component, key: &str, value: Option<&str>) {
        if key == OPTION_CALLABLE && self.registry.kind_of(&owner.type_id) == Some(ComponentKind::CallableReference) {
            self.names.push(value.unwrap_or_default().to_string());
        }
    }
}

enum PoolSite {
    Existing(NodeId),
    Create { parent: NodeId, index: usize },
}

impl Mutation {
    /// Validate and apply in one step
    pub fn apply(&self, tree: &mut Tree, env: &EditEnv<'_>) -> Result<MutationResult, MutationError> {
        self.validate(tree, env)?;
        self.apply_validated(tree, env)
    }

    /// Nodes whose own content the mutation changes
    fn edited_nodes(&self, tree: &Tree) -> Vec<NodeId> {
        match self {
            Mutation::Insert { target, position, .. } | Mutation::Paste { target, position, .. } => match position {
                InsertPosition::Beneath => vec![*target],
                InsertPosition::Here | InsertPosition::After => tree.parent(*target).into_iter().collect(),
            },
            Mutation::Replace { target, .. }
            | Mutation::Rename { target, .. }
            | Mutation::PullUp { target }
            | Mutation::ExtractToCallable { target }
            | Mutation::SwapContainer { target, .. }
            | Mutation::Convert { target, .. } => vec![*target],
            Mutation::Remove { targets }
            | Mutation::ToggleSkip { targets }
            | Mutation::CleanUpNames { targets }
            | Mutation::Enclose { targets, .. }
            | Mutation::Externalize { targets, .. } => targets.clone(),
        }
    }

    /// Checks every precondition without touching the tree
    pub fn validate(&self, tree: &Tree, env: &EditEnv<'_>) -> Result<(), MutationError> {
        let registry = env.registry;
        if let Some(locked) = self.edited_nodes(tree).into_iter().find(|&id| !tree.is_editable(id)) {
            return Err(MutationError::ReadOnly(tree.full_name(locked)));
        }
        match self {
            Mutation::Insert {
                target,
                position,
                components,
            } => validate_insert(tree, registry, *target, *position, components),

            Mutation::Paste {
                target,
                position,
                lines,
            } => {
                let (components, _) = decode_paste(env, lines)?;
                validate_insert(tree, registry, *target, *position, &components)
            }

            Mutation::Replace { target, component } => {
                require(tree, *target)?;
                if needs_rebuild(tree, *target, component) {
                    validate_instance(registry, component)?;
                } else {
                    registry
                        .require(&component.type_id)
                        .map_err(|_| MutationError::from_catalogue(&component.type_id))?;
                }
                if let Some(parent) = tree.parent(*target) {
                    check_placement(tree, registry, parent, [component.type_id.as_str()])?;
                }
                Ok(())
            }

            Mutation::Rename { target, .. } => require(tree, *target).map(|_| ()),

            Mutation::Remove { targets } => {
                non_empty(targets)?;
                for &target in targets {
                    require(tree, target)?;
                    let parent = tree.parent(target).ok_or(MutationError::CannotRemoveRoot)?;
                    check_mutable(tree, registry, parent)?;
                }
                Ok(())
            }

            Mutation::ToggleSkip { targets } | Mutation::CleanUpNames { targets } => {
                non_empty(targets)?;
                targets.iter().try_for_each(|&t| require(tree, t).map(|_| ()))
            }

            Mutation::Enclose {
                targets,
                container,
                ..
            } => validate_enclose(tree, registry, targets, container),

            Mutation::PullUp { target } => {
                require(tree, *target)?;
                let parent = parent_of(tree, *target)?;
                let children = tree.children(*target);
                if children.is_empty() {
                    return Err(MutationError::NothingToPullUp(tree.full_name(*target)));
                }
                if children.len() != 1 {
                    check_mutable(tree, registry, parent)?;
                }
                let types: Vec<&str> = children.iter().filter_map(|&c| tree.type_id(c)).collect();
                check_placement(tree, registry, parent, types)
            }

            Mutation::ExtractToCallable { target } => validate_extract(tree, registry, *target).map(|_| ()),

            Mutation::Externalize {
                targets,
                suggestion,
                ..
            } => validate_externalize(tree, registry, targets, suggestion.as_deref()).map(|_| ()),

            Mutation::SwapContainer { target, container } => {
                let current = require(tree, *target)?;
                if !registry.is_container(&current.type_id) {
                    return Err(MutationError::NotAContainer(tree.full_name(*target)));
                }
                if !registry.is_container(container) {
                    return Err(MutationError::NotAContainer(container.clone()));
                }
                if let Some(parent) = tree.parent(*target) {
                    check_placement(tree, registry, parent, [container.as_str()])?;
                }
                check_children_fit(tree, registry, *target, container)
            }

            Mutation::Convert { target, variant, .. } => {
                let equivalent = equivalent_of(tree, registry, *target, *variant)?;
                if let Some(parent) = tree.parent(*target) {
                    check_placement(tree, registry, parent, [equivalent.as_str()])?;
                }
                check_children_fit(tree, registry, *target, &equivalent)
            }
        }
    }

    /// Applies a mutation that already passed `validate`
    #[instrument(skip_all)]
    pub fn apply_validated(&self, tree: &mut Tree, env: &EditEnv<'_>) -> Result<MutationResult, MutationError> {
        let result = match self {
            Mutation::Insert {
                target,
                position,
                components,
            } => apply_insert(tree, env.registry, *target, *position, components, Vec::new()),

            Mutation::Paste {
                target,
                position,
                lines,
            } => {
                let (components, warnings) = decode_paste(env, lines)?;
                apply_insert(tree, env.registry, *target, *position, &components, warnings)
            }

            Mutation::Replace { target, component } => apply_replace(tree, env.registry, *target, component),

            Mutation::Rename {
                target,
                name,
                propagate,
            } => apply_rename(tree, env.registry, *target, name, *propagate),

            Mutation::Remove { targets } => apply_remove(tree, targets),

            Mutation::ToggleSkip { targets } => apply_toggle_skip(tree, targets),

            Mutation::Enclose {
                targets,
                container,
                name,
            } => apply_enclose(tree, env.registry, targets, container, name.as_deref()),

            Mutation::PullUp { target } => apply_pull_up(tree, env.registry, *target),

            Mutation::ExtractToCallable { target } => apply_extract(tree, env.registry, *target),

            Mutation::Externalize {
                targets,
                file,
                suggestion,
            } => apply_externalize(tree, env, targets, file, suggestion.as_deref()),

            Mutation::SwapContainer { target, container } => apply_swap(tree, env.registry, *target, container),

            Mutation::Convert {
                target,
                variant,
                condition,
            } => apply_convert(tree, env.registry, *target, *variant, condition.as_deref()),

            Mutation::CleanUpNames { targets } => apply_clean_up(tree, env.registry, targets),
        }?;

        if !result.changes.is_empty() {
            tree.set_modified(true);
        }
        debug!(comment = %result.comment, changes = result.changes.len(), "Mutation applied");
        Ok(result)
    }
}

// Validation helpers

fn require(tree: &Tree, id: NodeId) -> Result<&Component, MutationError> {
    tree.component(id).map_err(|_| MutationError::NodeNotFound)
}

fn non_empty(targets: &[NodeId]) -> Result<(), MutationError> {
    if targets.is_empty() {
        Err(MutationError::NothingSelected)
    } else {
        Ok(())
    }
}

fn parent_of(tree: &Tree, id: NodeId) -> Result<NodeId, MutationError> {
    tree.parent(id)
        .ok_or_else(|| MutationError::NoParent(tree.full_name(id)))
}

/// Where `position` relative to `target` lands: (parent, index)
fn resolve_position(tree: &Tree, target: NodeId, position: InsertPosition) -> Result<(NodeId, usize), MutationError> {
    require(tree, target)?;
    match position {
        InsertPosition::Beneath => Ok((target, tree.children(target).len())),
        InsertPosition::Here | InsertPosition::After => {
            let parent = parent_of(tree, target)?;
            let index = tree.index_of(target).unwrap_or(0);
            Ok(match position {
                InsertPosition::After => (parent, index + 1),
                _ => (parent, index),
            })
        }
    }
}

fn check_mutable(tree: &Tree, registry: &Registry, parent: NodeId) -> Result<(), MutationError> {
    let type_id = tree.type_id(parent).ok_or(MutationError::NodeNotFound)?;
    match registry.capability_of(type_id) {
        Some(capability) if capability.mutable => Ok(()),
        Some(_) => Err(MutationError::FixedArity(tree.full_name(parent))),
        None => Err(MutationError::NotAContainer(tree.full_name(parent))),
    }
}

/// Checks that components of the given types may live below `parent`
fn check_placement<'t>(
    tree: &Tree,
    registry: &Registry,
    parent: NodeId,
    types: impl IntoIterator<Item = &'t str>,
) -> Result<(), MutationError> {
    let parent_type = tree.type_id(parent).ok_or(MutationError::NodeNotFound)?;
    let capability = registry
        .capability_of(parent_type)
        .ok_or_else(|| MutationError::NotAContainer(tree.full_name(parent)))?;

    for type_id in types {
        let role = registry
            .role_of(type_id)
            .ok_or_else(|| MutationError::from_catalogue(type_id))?;
        if role == Role::Standalone && !capability.can_contain_standalones {
            return Err(MutationError::StandaloneNotAllowed {
                container: tree.full_name(parent),
                type_id: type_id.to_string(),
            });
        }
        if !registry.satisfies(type_id, &capability.restrictions) {
            return Err(MutationError::RestrictionViolated {
                container: tree.full_name(parent),
                type_id: type_id.to_string(),
            });
        }
    }
    Ok(())
}

/// Checks that the current children of `target` fit a container of `type_id`
fn check_children_fit(tree: &Tree, registry: &Registry, target: NodeId, type_id: &str) -> Result<(), MutationError> {
    let children = tree.children(target);
    let Some(capability) = registry.capability_of(type_id) else {
        if children.is_empty() {
            return Ok(());
        }
        return Err(MutationError::NotAContainer(type_id.to_string()));
    };

    if let Some(expected) = capability.fixed_arity() {
        if expected != children.len() {
            return Err(TreeError::ChildCountMismatch {
                type_id: type_id.to_string(),
                expected,
                found: children.len(),
            }
            .into());
        }
    }

    for &child in children {
        let child_type = tree.type_id(child).ok_or(MutationError::NodeNotFound)?;
        if registry.role_of(child_type) == Some(Role::Standalone) && !capability.can_contain_standalones {
            return Err(MutationError::StandaloneNotAllowed {
                container: type_id.to_string(),
                type_id: child_type.to_string(),
            });
        }
        if !registry.satisfies(child_type, &capability.restrictions) {
            return Err(MutationError::RestrictionViolated {
                container: type_id.to_string(),
                type_id: child_type.to_string(),
            });
        }
    }
    Ok(())
}

/// Sorted sibling list and their shared parent
fn siblings(tree: &Tree, targets: &[NodeId]) -> Result<(NodeId, Vec<NodeId>), MutationError> {
    non_empty(targets)?;
    let mut parent = None;
    for &target in targets {
        require(tree, target)?;
        let this_parent = parent_of(tree, target)?;
        match parent {
            None => parent = Some(this_parent),
            Some(p) if p != this_parent => return Err(MutationError::NotSiblings),
            Some(_) => {}
        }
    }
    let parent = parent.ok_or(MutationError::NothingSelected)?;

    let mut sorted: Vec<NodeId> = targets.to_vec();
    sorted.sort_by_key(|&id| tree.index_of(id).unwrap_or(usize::MAX));
    sorted.dedup();
    Ok((parent, sorted))
}

/// Roles of the first and last active component of a run; all components
/// count when every one is skipped
fn run_roles(tree: &Tree, registry: &Registry, nodes: &[NodeId]) -> Result<(Role, Role), MutationError> {
    let active: Vec<NodeId> = nodes
        .iter()
        .copied()
        .filter(|&id| tree.component(id).is_ok_and(|c| !c.skip))
        .collect();
    let run = if active.is_empty() { nodes.to_vec() } else { active };

    let role = |id: &NodeId| -> Result<Role, MutationError> {
        let type_id = tree.type_id(*id).ok_or(MutationError::NodeNotFound)?;
        registry
            .role_of(type_id)
            .ok_or_else(|| MutationError::from_catalogue(type_id))
    };
    let first = run.first().ok_or(MutationError::NothingSelected)?;
    let last = run.last().ok_or(MutationError::NothingSelected)?;
    Ok((role(first)?, role(last)?))
}

fn needs_rebuild(tree: &Tree, target: NodeId, replacement: &Component) -> bool {
    let Some(current) = tree.type_id(target) else {
        return true;
    };
    if current != replacement.type_id {
        return true;
    }
    let existing: Vec<&str> = tree.children(target).iter().filter_map(|&c| tree.type_id(c)).collect();
    let proposed: Vec<&str> = replacement.children.iter().map(|c| c.type_id.as_str()).collect();
    existing != proposed
}

fn decode_paste(env: &EditEnv<'_>, lines: &[String]) -> Result<(Vec<Component>, Vec<String>), MutationError> {
    let mut components = Vec::new();
    let mut warnings = Vec::new();
    let mut first_error = None;

    for fragment in env.codec.decode_fragments(lines) {
        match fragment {
            Ok(component) => components.push(component),
            Err(error) => {
                warnings.push(format!("Skipped pasted fragment: {}", error));
                first_error.get_or_insert(error);
            }
        }
    }

    if components.is_empty() {
        return Err(match first_error {
            Some(error) => MutationError::Paste(error),
            None => MutationError::NothingToPaste,
        });
    }
    Ok((components, warnings))
}

fn validate_insert(
    tree: &Tree,
    registry: &Registry,
    target: NodeId,
    position: InsertPosition,
    components: &[Component],
) -> Result<(), MutationError> {
    if components.is_empty() {
        return Err(MutationError::NothingToPaste);
    }
    let (parent, _) = resolve_position(tree, target, position)?;
    check_mutable(tree, registry, parent)?;
    for component in components {
        validate_instance(registry, component)?;
    }
    check_placement(tree, registry, parent, components.iter().map(|c| c.type_id.as_str()))
}

fn validate_enclose(tree: &Tree, registry: &Registry, targets: &[NodeId], container: &str) -> Result<(), MutationError> {
    let (parent, sorted) = siblings(tree, targets)?;
    let capability = registry
        .capability_of(container)
        .ok_or_else(|| MutationError::NotAContainer(container.to_string()))?;

    if sorted.len() != 1 {
        check_mutable(tree, registry, parent)?;
    }
    check_placement(tree, registry, parent, [container])?;

    if let Some(expected) = capability.fixed_arity() {
        if expected != sorted.len() {
            return Err(TreeError::ChildCountMismatch {
                type_id: container.to_string(),
                expected,
                found: sorted.len(),
            }
            .into());
        }
    }
    for &target in &sorted {
        let type_id = tree.type_id(target).ok_or(MutationError::NodeNotFound)?;
        if registry.role_of(type_id) == Some(Role::Standalone) && !capability.can_contain_standalones {
            return Err(MutationError::StandaloneNotAllowed {
                container: container.to_string(),
                type_id: type_id.to_string(),
            });
        }
        if !registry.satisfies(type_id, &capability.restrictions) {
            return Err(MutationError::RestrictionViolated {
                container: container.to_string(),
                type_id: type_id.to_string(),
            });
        }
    }
    Ok(())
}

/// Finds the pool a node would be moved into, or where one would be created
fn pool_site(tree: &Tree, registry: &Registry, target: NodeId) -> Option<PoolSite> {
    let path = tree.path_to_root(target);
    let ancestors: Vec<NodeId> = path.iter().rev().skip(1).copied().collect();

    for &ancestor in &ancestors {
        let existing = tree
            .children(ancestor)
            .iter()
            .copied()
            .filter(|&c| c != target && tree.type_id(c).is_some_and(|t| registry.is_pool(t)))
            .last();
        if let Some(pool) = existing {
            return Some(PoolSite::Existing(pool));
        }
    }

    ancestors.into_iter().find_map(|ancestor| {
        let capability = tree.type_id(ancestor).and_then(|t| registry.capability_of(t))?;
        if !capability.mutable || !capability.can_contain_standalones {
            return None;
        }
        let pool_type = registry.callable_pool_type()?;
        if !registry.satisfies(pool_type, &capability.restrictions) {
            return None;
        }
        let index = tree
            .children(ancestor)
            .iter()
            .rposition(|&c| tree.type_id(c).is_some_and(|t| registry.is_pool(t)))
            .map(|i| i + 1)
            .unwrap_or(0);
        Some(PoolSite::Create { parent: ancestor, index })
    })
}

/// Returns the pool type and the reference type to use
fn validate_extract(tree: &Tree, registry: &Registry, target: NodeId) -> Result<(String, String), MutationError> {
    let component = require(tree, target)?;
    let parent = parent_of(tree, target)?;
    let descriptor = registry
        .require(&component.type_id)
        .map_err(|_| MutationError::from_catalogue(&component.type_id))?;

    let role = descriptor.role();
    if role == Role::Standalone {
        return Err(MutationError::StandaloneNotCallable(tree.full_name(target)));
    }
    if descriptor.kind == ComponentKind::CallableReference {
        return Err(MutationError::AlreadyReference(tree.full_name(target)));
    }
    if tree.type_id(parent).is_some_and(|t| registry.is_pool(t)) {
        return Err(MutationError::AlreadyShared(tree.full_name(target)));
    }

    let pool_type = registry
        .callable_pool_type()
        .ok_or_else(|| MutationError::NoPoolLocation(tree.full_name(target)))?;
    let reference = registry
        .callable_reference_for(role)
        .ok_or(MutationError::NoReferenceType(role))?;
    if pool_site(tree, registry, target).is_none() {
        return Err(MutationError::NoPoolLocation(tree.full_name(target)));
    }
    check_placement(tree, registry, parent, [reference])?;
    Ok((pool_type.to_string(), reference.to_string()))
}

/// Returns the parent, the sorted targets and the reference type to use
fn validate_externalize(
    tree: &Tree,
    registry: &Registry,
    targets: &[NodeId],
    suggestion: Option<&str>,
) -> Result<(NodeId, Vec<NodeId>, String, Option<String>), MutationError> {
    let (parent, sorted) = siblings(tree, targets)?;
    if sorted.len() != 1 {
        check_mutable(tree, registry, parent)?;
    }

    let (role, enclosure) = if sorted.len() == 1 {
        let type_id = tree.type_id(sorted[0]).ok_or(MutationError::NodeNotFound)?;
        let role = registry
            .role_of(type_id)
            .ok_or_else(|| MutationError::from_catalogue(type_id))?;
        (role, None)
    } else {
        let (first, last) = run_roles(tree, registry, &sorted)?;
        let enclosure = registry
            .enclosure_for(first, last)
            .ok_or(MutationError::NoEnclosure { first, last })?;
        let role = registry
            .role_of(enclosure)
            .ok_or_else(|| MutationError::from_catalogue(enclosure))?;
        (role, Some(enclosure.to_string()))
    };

    let suggested = match suggestion {
        Some(type_id) => {
            let descriptor = registry
                .require(type_id)
                .map_err(|_| MutationError::from_catalogue(type_id))?;
            if descriptor.kind != ComponentKind::ExternalReference {
                return Err(MutationError::NotExternalReference(type_id.to_string()));
            }
            (descriptor.role() == role).then(|| type_id.to_string())
        }
        None => None,
    };
    let reference = match suggested {
        Some(type_id) => type_id,
        None => registry
            .external_reference_for(role)
            .ok_or(MutationError::NoReferenceType(role))?
            .to_string(),
    };
    check_placement(tree, registry, parent, [reference.as_str()])?;
    Ok((parent, sorted, reference, enclosure))
}

fn equivalent_of(tree: &Tree, registry: &Registry, target: NodeId, variant: Variant) -> Result<String, MutationError> {
    let component = require(tree, target)?;
    let descriptor = registry
        .require(&component.type_id)
        .map_err(|_| MutationError::from_catalogue(&component.type_id))?;
    let equivalent = match variant {
        Variant::Conditional => &descriptor.equivalents.conditional,
        Variant::Timed => &descriptor.equivalents.timed,
    };
    equivalent.clone().ok_or_else(|| MutationError::NoEquivalent {
        type_id: component.type_id.clone(),
        variant,
    })
}

fn default_name(registry: &Registry, type_id: &str) -> String {
    registry
        .describe(type_id)
        .map(|d| d.default_name().to_string())
        .unwrap_or_else(|| type_id.to_string())
}

fn set_name(tree: &mut Tree, id: NodeId, name: String) -> Result<(), MutationError> {
    tree.component_mut(id)?.name = name;
    Ok(())
}

fn node_label(tree: &Tree, id: NodeId) -> String {
    tree.name(id).unwrap_or_default().to_string()
}

fn count_label(count: usize) -> String {
    match count {
        1 => "component".to_string(),
        n => format!("{} components", n),
    }
}

// Apply helpers

fn apply_insert(
    tree: &mut Tree,
    registry: &Registry,
    target: NodeId,
    position: InsertPosition,
    components: &[Component],
    warnings: Vec<String>,
) -> Result<MutationResult, MutationError> {
    let (parent, index) = resolve_position(tree, target, position)?;
    let mut result = match components {
        [single] => MutationResult::new(format!("Adding {}", single.name)),
        many => MutationResult::new(format!("Adding {}", count_label(many.len()))),
    };
    result.warnings = warnings;

    for (offset, component) in components.iter().enumerate() {
        let mut component = component.clone();
        if component.name.is_empty() {
            component.name = default_name(registry, &component.type_id);
        }
        let id = tree.insert_subtree(registry, parent, index + offset, &component)?;
        tree.make_unique(registry, id, false);
        result.created.push(id);
    }

    result.change(ChangeEvent::structure(parent));
    result.follow_ups.push(FollowUp::Expand(parent));
    result.follow_ups.push(FollowUp::Select(result.created.clone()));
    Ok(result)
}

fn apply_replace(
    tree: &mut Tree,
    registry: &Registry,
    target: NodeId,
    component: &Component,
) -> Result<MutationResult, MutationError> {
    let old = require(tree, target)?.clone();
    let mut replacement = component.clone();
    if replacement.name.is_empty() {
        replacement.name = default_name(registry, &replacement.type_id);
    }

    let mut result = MutationResult::new(format!("Editing {}", old.name));
    let parent = tree.parent(target);

    let node = if needs_rebuild(tree, target, &replacement) {
        let node = match parent {
            None => tree.set_root(registry, &replacement)?,
            Some(parent) => {
                let index = tree.index_of(target).unwrap_or(0);
                tree.remove_subtree(target)?;
                tree.insert_subtree(registry, parent, index, &replacement)?
            }
        };
        result.change(ChangeEvent::structure(parent.unwrap_or(node)));
        node
    } else {
        tree.set_component(target, replacement.stripped())?;
        result.change(ChangeEvent::modify(target));
        target
    };

    tree.make_unique(registry, node, false);
    let new = require(tree, node)?.clone();
    if new.name != old.name {
        result.renamed.push(Renamed {
            scope: parent,
            old,
            new,
        });
    }
    result.follow_ups.push(FollowUp::Select(vec![node]));
    Ok(result)
}

fn apply_rename(
    tree: &mut Tree,
    registry: &Registry,
    target: NodeId,
    name: &str,
    propagate: bool,
) -> Result<MutationResult, MutationError> {
    let old = require(tree, target)?.clone();
    let wanted = if name.is_empty() {
        default_name(registry, &old.type_id)
    } else {
        name.to_string()
    };

    set_name(tree, target, wanted)?;
    tree.make_unique(registry, target, false);
    let new = require(tree, target)?.clone();

    let mut result = MutationResult::new(format!("Renaming {} to {}", old.name, new.name));
    if new.name == old.name {
        return Ok(result);
    }
    result.change(ChangeEvent::modify(target));
    if propagate {
        result.renamed.push(Renamed {
            scope: tree.parent(target),
            old,
            new,
        });
    }
    Ok(result)
}

fn apply_remove(tree: &mut Tree, targets: &[NodeId]) -> Result<MutationResult, MutationError> {
    let mut result = MutationResult::new(format!("Removing {}", count_label(targets.len())));
    let mut parents = Vec::new();

    for &target in targets {
        // already gone with a removed ancestor
        if !tree.contains(target) {
            continue;
        }
        let parent = parent_of(tree, target)?;
        tree.remove_subtree(target)?;
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }

    parents.retain(|&p| tree.contains(p));
    for &parent in &parents {
        result.change(ChangeEvent::structure(parent));
    }
    result.follow_ups.push(FollowUp::Select(parents));
    Ok(result)
}

fn apply_toggle_skip(tree: &mut Tree, targets: &[NodeId]) -> Result<MutationResult, MutationError> {
    let mut toggled = Vec::new();
    for &target in targets {
        let component = tree.component_mut(target)?;
        component.skip = !component.skip;
        if !toggled.contains(&target) {
            toggled.push(target);
        }
    }

    let comment = match toggled.as_slice() {
        [single] => format!("Toggling skip of {}", node_label(tree, *single)),
        many => format!("Toggling skip of {}", count_label(many.len())),
    };
    let mut result = MutationResult::new(comment);
    result.change(ChangeEvent::modified(toggled));
    Ok(result)
}

fn apply_enclose(
    tree: &mut Tree,
    registry: &Registry,
    targets: &[NodeId],
    container: &str,
    name: Option<&str>,
) -> Result<MutationResult, MutationError> {
    let (parent, sorted) = siblings(tree, targets)?;
    let index = tree.index_of(sorted[0]).unwrap_or(0);
    let parent_is_pool = tree.type_id(parent).is_some_and(|t| registry.is_pool(t));

    let mut wrapper = registry
        .instantiate(container)
        .map_err(|_| MutationError::from_catalogue(container))?
        .stripped();
    wrapper.name = match name.filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        // a pool member keeps the name its references use
        None if parent_is_pool && sorted.len() == 1 => node_label(tree, sorted[0]),
        None => wrapper.name,
    };
    let old_single = (parent_is_pool && sorted.len() == 1)
        .then(|| require(tree, sorted[0]).cloned())
        .transpose()?;

    for &target in &sorted {
        tree.detach(target)?;
    }
    let node = tree.insert_node(registry, parent, index, &wrapper)?;
    for (offset, &target) in sorted.iter().enumerate() {
        tree.attach(node, offset, target)?;
    }
    tree.sync_fixed_names(registry, node);
    for &target in &sorted {
        tree.make_unique(registry, target, false);
    }
    tree.make_unique(registry, node, false);

    let mut result = MutationResult::new(format!(
        "Enclosing {} in {}",
        count_label(sorted.len()),
        container
    ));
    if let Some(old) = old_single {
        let new = require(tree, node)?.clone();
        if old.name != new.name {
            result.renamed.push(Renamed {
                scope: Some(parent),
                old,
                new,
            });
        }
    }
    result.created.push(node);
    result.change(ChangeEvent::structure(parent));
    result.follow_ups.push(FollowUp::Expand(node));
    result.follow_ups.push(FollowUp::Select(vec![node]));
    Ok(result)
}

fn apply_pull_up(tree: &mut Tree, registry: &Registry, target: NodeId) -> Result<MutationResult, MutationError> {
    let parent = parent_of(tree, target)?;
    let index = tree.index_of(target).unwrap_or(0);
    let children = tree.children(target).to_vec();
    let mut result = MutationResult::new(format!("Pulling up children of {}", node_label(tree, target)));

    for &child in &children {
        tree.detach(child)?;
    }
    tree.remove_subtree(target)?;
    for (offset, &child) in children.iter().enumerate() {
        tree.attach(parent, index + offset, child)?;
    }
    for &child in &children {
        tree.make_unique(registry, child, true);
    }

    result.change(ChangeEvent::structure(parent));
    result.follow_ups.push(FollowUp::Select(children));
    Ok(result)
}

fn apply_extract(tree: &mut Tree, registry: &Registry, target: NodeId) -> Result<MutationResult, MutationError> {
    let (pool_type, reference_type) = validate_extract(tree, registry, target)?;
    let site = pool_site(tree, registry, target).ok_or_else(|| MutationError::NoPoolLocation(tree.full_name(target)))?;
    let mut result = MutationResult::new(format!("Creating callable {}", node_label(tree, target)));

    let pool = match site {
        PoolSite::Existing(pool) => pool,
        PoolSite::Create { parent, index } => {
            let component = registry
                .instantiate(&pool_type)
                .map_err(|_| MutationError::from_catalogue(&pool_type))?;
            let pool = tree.insert_subtree(registry, parent, index, &component)?;
            tree.make_unique(registry, pool, false);
            result.created.push(pool);
            debug!(pool = %tree.full_name(pool), "Created callable pool");
            pool
        }
    };

    let parent = parent_of(tree, target)?;
    let index = tree.index_of(target).unwrap_or(0);
    tree.detach(target)?;
    let end = tree.children(pool).len();
    tree.attach(pool, end, target)?;
    tree.make_unique(registry, target, false);
    let callable = node_label(tree, target);

    let mut reference = registry
        .instantiate(&reference_type)
        .map_err(|_| MutationError::from_catalogue(&reference_type))?;
    reference.options.set(OPTION_CALLABLE, Some(callable));
    let node = tree.insert_subtree(registry, parent, index, &reference)?;
    tree.make_unique(registry, node, false);
    result.created.push(node);

    result.change(ChangeEvent::structure(pool));
    result.change(ChangeEvent::structure(parent));
    result.follow_ups.push(FollowUp::Select(vec![node]));
    Ok(result)
}

fn apply_externalize(
    tree: &mut Tree,
    env: &EditEnv<'_>,
    targets: &[NodeId],
    file: &PathBuf,
    suggestion: Option<&str>,
) -> Result<MutationResult, MutationError> {
    let registry = env.registry;
    let (parent, sorted, reference_type, enclosure) = validate_externalize(tree, registry, targets, suggestion)?;
    let mut result = MutationResult::new(format!("Externalizing {}", count_label(sorted.len())));

    let mut instances = Vec::new();
    for &target in &sorted {
        let full = tree.full_instance(registry, target)?;
        for error in full.errors {
            result
                .warnings
                .push(format!("{}: {}", error.full_name, error.error));
        }
        instances.push(full.component);
    }
    let subtree = match enclosure {
        Some(type_id) => {
            let mut wrapper = registry
                .instantiate(&type_id)
                .map_err(|_| MutationError::from_catalogue(&type_id))?
                .stripped();
            wrapper.children = instances;
            wrapper
        }
        None => instances.remove(0),
    };

    let mut usage = CallableUsage {
        registry,
        names: Vec::new(),
    };
    usage.visit_component(&subtree);
    if !usage.names.is_empty() {
        let message = format!(
            "{} uses callable components ({}) that will not resolve from {}",
            subtree.name,
            usage.names.join(", "),
            file.display()
        );
        warn!("{}", message);
        result.warnings.push(message);
    }

    env.fs.write(file, &env.codec.encode_document(&[subtree]))?;

    let index = tree.index_of(sorted[0]).unwrap_or(0);
    for &target in &sorted {
        tree.remove_subtree(target)?;
    }
    let mut reference = registry
        .instantiate(&reference_type)
        .map_err(|_| MutationError::from_catalogue(&reference_type))?;
    reference
        .options
        .set(OPTION_FILE, Some(file.display().to_string()));
    let node = tree.insert_subtree(registry, parent, index, &reference)?;
    tree.make_unique(registry, node, false);

    result.created.push(node);
    result.change(ChangeEvent::structure(parent));
    result.follow_ups.push(FollowUp::Select(vec![node]));
    Ok(result)
}

/// Copies options that exist with the same name and kind on both types
fn transfer_options(registry: &Registry, from: &Component, to: &mut Component) {
    let (Some(source), Some(target)) = (registry.describe(&from.type_id), registry.describe(&to.type_id)) else {
        return;
    };
    for spec in &target.options {
        let matches = source
            .option(&spec.name)
            .is_some_and(|other| other.kind == spec.kind);
        if matches && from.options.contains(&spec.name) {
            let value = from.options.get(&spec.name).map(str::to_string);
            to.options.set(&spec.name, value);
        }
    }
}

fn apply_swap(
    tree: &mut Tree,
    registry: &Registry,
    target: NodeId,
    container: &str,
) -> Result<MutationResult, MutationError> {
    let old = require(tree, target)?.clone();
    let mut new = registry
        .instantiate(container)
        .map_err(|_| MutationError::from_catalogue(container))?
        .stripped();
    new.name = old.name.clone();
    new.skip = old.skip;
    new.annotation = old.annotation.clone();
    new.logging_level = old.logging_level.clone();
    transfer_options(registry, &old, &mut new);

    tree.set_component(target, new)?;
    tree.sync_fixed_names(registry, target);
    tree.make_unique(registry, target, false);

    let mut result = MutationResult::new(format!("Swapping {} for {}", old.type_id, container));
    result.change(ChangeEvent::structure(target));
    result.follow_ups.push(FollowUp::Select(vec![target]));
    Ok(result)
}

fn apply_convert(
    tree: &mut Tree,
    registry: &Registry,
    target: NodeId,
    variant: Variant,
    condition: Option<&str>,
) -> Result<MutationResult, MutationError> {
    let equivalent = equivalent_of(tree, registry, target, variant)?;
    let old = require(tree, target)?.clone();
    let mut new = registry
        .instantiate(&equivalent)
        .map_err(|_| MutationError::from_catalogue(&equivalent))?
        .stripped();

    if old.name != default_name(registry, &old.type_id) {
        new.name = old.name.clone();
    }
    new.skip = old.skip;
    new.annotation = old.annotation.clone();
    new.logging_level = old.logging_level.clone();
    if let (Variant::Conditional, Some(condition)) = (variant, condition) {
        new.options.set(OPTION_CONDITION, Some(condition.to_string()));
    }

    tree.set_component(target, new)?;
    tree.sync_fixed_names(registry, target);
    tree.make_unique(registry, target, false);

    let mut result = MutationResult::new(format!("Making {} {}", old.name, variant));
    result.change(ChangeEvent::modify(target));
    result.follow_ups.push(FollowUp::Select(vec![target]));
    Ok(result)
}

fn apply_clean_up(tree: &mut Tree, registry: &Registry, targets: &[NodeId]) -> Result<MutationResult, MutationError> {
    let mut result = MutationResult::new(format!("Cleaning up names of {}", count_label(targets.len())));
    let mut changed = Vec::new();
    let mut seen = HashSet::new();

    for &target in targets {
        if !seen.insert(target) {
            continue;
        }
        let old = require(tree, target)?.clone();
        set_name(tree, target, default_name(registry, &old.type_id))?;
        tree.make_unique(registry, target, false);
        let new = require(tree, target)?.clone();
        if new.name != old.name {
            changed.push(target);
            result.renamed.push(Renamed {
                scope: tree.parent(target),
                old,
                new,
            });
        }
    }

    if !changed.is_empty() {
        result.change(ChangeEvent::modified(changed));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtree_common::MockFileSystem;
    use crate::tree::Lookup;

    fn registry() -> Registry {
        Registry::builtin().unwrap()
    }

    fn tree(registry: &Registry) -> Tree {
        let flow = Component::new("Flow", "Flow")
            .with_child(Component::new("Start", "start"))
            .with_child(Component::new("PassThrough", "T1"))
            .with_child(Component::new("PassThrough", "T2"))
            .with_child(Component::new("Display", "out"));
        Tree::from_component(registry, &flow).unwrap()
    }

    fn node(tree: &Tree, name: &str) -> NodeId {
        tree.locate(name, Lookup::Direct).unwrap()
    }

    #[test]
    fn test_resolve_positions() {
        let registry = registry();
        let tree = tree(&registry);
        let t1 = node(&tree, "Flow.T1");
        let root = tree.root().unwrap();

        assert_eq!(resolve_position(&tree, t1, InsertPosition::Here).unwrap(), (root, 1));
        assert_eq!(resolve_position(&tree, t1, InsertPosition::After).unwrap(), (root, 2));
        assert_eq!(resolve_position(&tree, root, InsertPosition::Beneath).unwrap(), (root, 4));
        assert!(matches!(
            resolve_position(&tree, root, InsertPosition::After),
            Err(MutationError::NoParent(_))
        ));
    }

    #[test]
    fn test_run_roles_ignore_skipped_ends() {
        let registry = registry();
        let mut tree = tree(&registry);
        let start = node(&tree, "Flow.start");
        let t1 = node(&tree, "Flow.T1");
        let out = node(&tree, "Flow.out");
        tree.component_mut(out).unwrap().skip = true;

        let roles = run_roles(&tree, &registry, &[start, t1, out]).unwrap();
        assert_eq!(roles, (Role::Source, Role::Transformer));
    }

    #[test]
    fn test_transfer_matching_options() {
        let registry = registry();
        let from = Component::new("ConditionalTee", "c").with_option("condition", "x > 1");
        let mut to = registry.instantiate("ConditionalSubProcess").unwrap();
        transfer_options(&registry, &from, &mut to);
        assert_eq!(to.options.get("condition"), Some("x > 1"));

        let mut timed = registry.instantiate("TimedTee").unwrap();
        transfer_options(&registry, &from, &mut timed);
        assert!(!timed.options.contains("condition"));
    }

    #[test]
    fn test_callable_usage_visitor() {
        let registry = registry();
        let subtree = Component::new("Sequence", "s")
            .with_child(Component::new("CallableSink", "c").with_option("callable", "shared"));
        let mut usage = CallableUsage {
            registry: &registry,
            names: Vec::new(),
        };
        usage.visit_component(&subtree);
        assert_eq!(usage.names, vec!["shared"]);
    }

    #[test]
    fn test_paste_skips_broken_fragments() {
        let registry = registry();
        let fs = MockFileSystem::new();
        let env = EditEnv::new(&registry, &fs);
        let lines = vec!["Display -name a".to_string(), "Display stray".to_string()];
        let (components, warnings) = decode_paste(&env, &lines).unwrap();
        assert_eq!(components.len(), 1);
        assert_eq!(warnings.len(), 1);

        let broken = vec!["Display stray".to_string()];
        assert!(matches!(decode_paste(&env, &broken), Err(MutationError::Paste(_))));
    }
}
